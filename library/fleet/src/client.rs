use crate::errors::ApiError;
use kube::api::ObjectMeta;
use kube::core::Resource;
use kube::Api;
use result::Result;

/// Returns a raw Kubernetes client configured from the environment (in
/// cluster when deployed, from kubeconfig during development).
///
/// Unlike most boot failures this one is surfaced rather than panicked on:
/// when leader election is disabled the router can serve its entire request
/// path without ever talking to the fleet API, so whether a missing fleet
/// environment is fatal is the caller's decision.
pub async fn raw() -> Result<kube::Client> {
    Ok(kube::Client::try_default().await.map_err(ApiError::from)?)
}

/// Returns a typed, namespaced API handle over the given client.
pub fn namespaced<K>(client: kube::Client, namespace: &str) -> Api<K>
where
    <K as Resource>::DynamicType: Default,
    K: k8s_openapi::Metadata<Ty = ObjectMeta>,
{
    Api::namespaced(client, namespace)
}
