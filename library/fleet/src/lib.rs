pub mod client;
pub mod errors;
pub mod leader;
pub mod pod;
pub mod watcher;

pub use pod::PodExt;
pub use watcher::FleetEvent;

use errors::ApiError;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::Api;
use result::Result;

/// Lists every pod in the fleet that matches the given label selector. This
/// is the "truth" side of the reconciler's diff.
pub async fn list(api: &Api<Pod>, selector: &str) -> Result<Vec<Pod>> {
    let pods = api
        .list(&ListParams::default().labels(selector))
        .await
        .map_err(ApiError::from)?;
    Ok(pods.items)
}
