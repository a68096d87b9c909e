//! Drain: take a pod out of circulation without touching its in-flight
//! work. The draining flag is the ONE signal the allocator's pop scripts
//! consult, so the ordering here is deliberate: remove from the pool first,
//! then set the flag, and if the flag write fails put the pod back. A pod
//! that is out of its pool with no flag set is invisible to allocation AND
//! to zombie recovery, which is a hole nothing would ever climb out of.

use crate::pools::SourcePool;
use crate::{env, tiers};
use error::*;
use result::Result;
use store::{Store, StoreKey};
use term_colors::*;

pub struct Drain {
    pub pod_name: String,
    pub has_active_call: bool,
    pub message: String,
}

pub async fn drain(store: &Store, pod_name: &str) -> Result<Drain> {
    let lease_key = store.key(StoreKey::Lease(pod_name));
    let has_active_call = store.exists(&lease_key).await?;

    let binding_key = store.key(StoreKey::PodTier(pod_name));
    let binding = match store.get(&binding_key).await? {
        Some(binding) => binding,
        None => {
            return Err(PodNotManaged {
                pod_name: pod_name.to_string(),
            }
            .into())
        }
    };
    let table = tiers::snapshot().await;
    let pool = SourcePool::from_binding(&binding, &table);

    let removed = pool.remove_available(store, pod_name).await?;
    let flag_key = store.key(StoreKey::Draining(pod_name));
    if let Err(err) = store
        .set_ex(&flag_key, "true", env::draining_ttl().as_secs())
        .await
    {
        if removed {
            // Roll the removal back; the shared re-add is add-if-absent so
            // an interleaved zombie recovery's score is not clobbered.
            match pool.add_available(store, pod_name).await {
                Ok(()) => warn!(
                    "Draining flag write for {} failed, removal rolled back",
                    cyan(pod_name)
                ),
                Err(rollback) => error!(
                    "Draining flag write for {} failed AND the rollback failed ({}); \
the pod is out of its pool with no flag set",
                    cyan(pod_name),
                    rollback
                ),
            }
        }
        return Err(err);
    }

    let message = if has_active_call {
        format!(
            "Pod {} is draining; its active call will be allowed to finish",
            pod_name
        )
    } else {
        format!("Pod {} is draining; it had no active calls", pod_name)
    };
    info!(
        "Pod {} removed from {} and marked draining",
        cyan(pod_name),
        purple(&binding)
    );

    Ok(Drain {
        pod_name: pod_name.to_string(),
        has_active_call,
        message,
    })
}

#[derive(Error, VcrError, HttpCode, Kind, Debug)]
#[code(Status::BadRequest)]
#[error(
    "Pod {pod_name} has no tier binding in the store, so this router is not \
managing it. Either the name is misspelled or the pod was never bound by \
the pool manager."
)]
pub struct PodNotManaged {
    pod_name: String,
}
