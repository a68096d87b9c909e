use crate::errors::ApiError;
use chrono::{Duration as ChronoDuration, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{ObjectMeta, PostParams};
use kube::error::ErrorResponse;
use kube::Api;
use log::debug;
use result::Result;
use std::time::Duration;
use term_colors::*;

/// The knobs for a [LeaseLock](LeaseLock).
///
/// `lease_ttl` MUST comfortably exceed the retry period of the loop that is
/// driving [try_acquire_or_renew](LeaseLock::try_acquire_or_renew), or the
/// lock will flap between holders on every missed tick.
pub struct LeaseLockParams {
    pub lease_name: String,
    pub holder_id: String,
    pub lease_ttl: Duration,
}

/// A LeaseLock is a single-holder lock expressed as a coordination-layer
/// Lease object in the orchestrator. Whichever replica most recently wrote
/// its own identity into the lease's `holderIdentity` — and keeps renewing
/// it — is the leader.
///
/// Acquisition is compare-and-swap: every write carries the resource version
/// of the lease that was read, so two replicas racing for an expired lease
/// cannot both win. The loser observes a conflict and reports "not leader".
pub struct LeaseLock {
    api: Api<Lease>,
    params: LeaseLockParams,
}

impl LeaseLock {
    pub fn new(client: kube::Client, namespace: &str, params: LeaseLockParams) -> LeaseLock {
        LeaseLock {
            api: Api::namespaced(client, namespace),
            params,
        }
    }

    /// One step of the election: create the lease if it does not exist,
    /// renew it if we already hold it, steal it if its previous holder let
    /// it expire. Returns whether this replica holds the lease afterwards.
    pub async fn try_acquire_or_renew(&self) -> Result<bool> {
        let lease = match self.api.get(&self.params.lease_name).await {
            Ok(lease) => lease,
            Err(kube::Error::Api(ErrorResponse { code: 404, .. })) => {
                return self.create().await;
            }
            Err(err) => return Err(ApiError::from(err).into()),
        };

        let spec = lease.spec.clone().unwrap_or_default();
        let holder = spec.holder_identity.clone().unwrap_or_default();
        if holder == self.params.holder_id {
            return self.write(lease, false).await;
        }
        if self.expired(&spec) {
            debug!(
                "The lease held by {} has expired, attempting takeover",
                cyan(&holder)
            );
            return self.write(lease, true).await;
        }
        Ok(false)
    }

    /// Whether the lease's renew (or, failing that, acquire) timestamp plus
    /// its own advertised duration is in the past.
    fn expired(&self, spec: &LeaseSpec) -> bool {
        let stamp = spec
            .renew_time
            .as_ref()
            .or(spec.acquire_time.as_ref())
            .map(|t| t.0);
        let duration = spec
            .lease_duration_seconds
            .unwrap_or(self.params.lease_ttl.as_secs() as i32);
        match stamp {
            Some(stamp) => stamp + ChronoDuration::seconds(duration as i64) < Utc::now(),
            // A lease that was never stamped is as good as expired.
            None => true,
        }
    }

    async fn create(&self) -> Result<bool> {
        let now = MicroTime(Utc::now());
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(self.params.lease_name.clone()),
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(self.params.holder_id.clone()),
                lease_duration_seconds: Some(self.params.lease_ttl.as_secs() as i32),
                acquire_time: Some(now.clone()),
                renew_time: Some(now),
                lease_transitions: Some(0),
            }),
        };
        match self.api.create(&PostParams::default(), &lease).await {
            Ok(_) => Ok(true),
            // Somebody else created it first. They win this round.
            Err(kube::Error::Api(ErrorResponse { code: 409, .. })) => Ok(false),
            Err(err) => Err(ApiError::from(err).into()),
        }
    }

    /// Replaces the lease with ourselves as the holder. `takeover` bumps the
    /// transition counter and re-stamps the acquire time; a renewal only
    /// touches the renew time.
    async fn write(&self, current: Lease, takeover: bool) -> Result<bool> {
        let now = MicroTime(Utc::now());
        let spec = current.spec.clone().unwrap_or_default();
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(self.params.lease_name.clone()),
                // Carrying the resource version forward is what makes this a
                // compare-and-swap rather than a blind overwrite.
                resource_version: current.metadata.resource_version.clone(),
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(self.params.holder_id.clone()),
                lease_duration_seconds: Some(self.params.lease_ttl.as_secs() as i32),
                acquire_time: if takeover {
                    Some(now.clone())
                } else {
                    spec.acquire_time.clone()
                },
                renew_time: Some(now),
                lease_transitions: if takeover {
                    Some(spec.lease_transitions.unwrap_or(0) + 1)
                } else {
                    spec.lease_transitions
                },
            }),
        };
        match self
            .api
            .replace(&self.params.lease_name, &PostParams::default(), &lease)
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ErrorResponse { code: 409, .. })) => Ok(false),
            Err(err) => Err(ApiError::from(err).into()),
        }
    }
}
