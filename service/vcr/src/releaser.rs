//! The release path: the exact inverse of allocation. Capacity goes back to
//! the pool the call came from, the lease is torn down once the pod has no
//! further calls, and the call record is deleted.

use crate::pools::SourcePool;
use crate::{metrics, tiers};
use chrono::Utc;
use error::*;
use result::Result;
use store::{Store, StoreKey};
use term_colors::*;

pub struct Release {
    pub pod_name: String,
    pub released_to_pool: String,
    pub was_draining: bool,
}

pub async fn release(store: &Store, call_sid: &str) -> Result<Release> {
    let call_key = store.key(StoreKey::Call(call_sid));
    let record = store.hgetall(&call_key).await?;
    if record.is_empty() {
        // Includes records that already expired or were torn down by the
        // reconciler. Clients treat this as success.
        return Err(CallNotFound {
            call_sid: call_sid.to_string(),
        }
        .into());
    }
    let pod_name = match record.get("pod_name") {
        Some(pod) if !pod.is_empty() => pod.clone(),
        _ => {
            return Err(MalformedCallRecord {
                call_sid: call_sid.to_string(),
                missing: "pod_name",
            }
            .into())
        }
    };
    let encoded = match record.get("source_pool") {
        Some(pool) if !pool.is_empty() => pool.clone(),
        _ => {
            return Err(MalformedCallRecord {
                call_sid: call_sid.to_string(),
                missing: "source_pool",
            }
            .into())
        }
    };

    let table = tiers::snapshot().await;
    let pool = match SourcePool::from_encoded(&encoded, &table) {
        Some(pool) => pool,
        None => {
            return Err(MalformedCallRecord {
                call_sid: call_sid.to_string(),
                missing: "a parseable source_pool",
            }
            .into())
        }
    };

    // A draining pod must not come back into circulation, so the pool
    // return is skipped wholesale. The drain already removed the pod from
    // its available structure (a shared pool's member goes with its score),
    // so no remaining-call count survives to consult here. The lease is
    // left alone and its TTL is what eventually clears it; force-clearing
    // it now would let zombie recovery re-seat the pod while calls are
    // still in flight.
    let draining_key = store.key(StoreKey::Draining(&pod_name));
    let was_draining = store.exists(&draining_key).await?;
    if was_draining {
        debug!(
            "Pod {} is draining, not returning it to {}",
            cyan(&pod_name),
            purple(&encoded)
        );
    } else {
        let remaining_calls = pool.release_capacity(store, &pod_name).await?;
        // Lease policy: exclusive and merchant pods always lose their lease
        // on release; shared pods only once no other call still counts
        // against them.
        if !pool.is_shared() || remaining_calls <= 0 {
            let lease_key = store.key(StoreKey::Lease(&pod_name));
            if let Err(err) = store.del(&lease_key).await {
                warn!("Failed to clear the lease for {}: {}", cyan(&pod_name), err);
            }
        }
    }

    let pod_key = store.key(StoreKey::Pod(&pod_name));
    let released_at = Utc::now().timestamp().to_string();
    if let Err(err) = store
        .hset(
            &pod_key,
            &[
                ("status", if was_draining { "draining" } else { "available" }),
                ("allocated_call_sid", ""),
                ("allocated_at", ""),
                ("released_at", released_at.as_str()),
            ],
        )
        .await
    {
        warn!("Failed to update the pod hash for {}: {}", cyan(&pod_name), err);
    }

    store.del(&call_key).await?;

    metrics::RELEASES_TOTAL
        .with_label_values(&[encoded.as_str(), "success"])
        .inc();
    metrics::ACTIVE_CALLS.dec();
    info!(
        "Call {} released {} back toward {}",
        cyan(call_sid),
        cyan(&pod_name),
        purple(&encoded)
    );

    Ok(Release {
        pod_name,
        released_to_pool: encoded,
        was_draining,
    })
}

#[derive(Error, VcrError, HttpCode, Kind, Debug)]
#[code(Status::NotFound)]
#[error(
    "No record exists for call {call_sid}. Either it was already released, \
its record expired, or it was never allocated through this router. Callers \
may safely treat this as an already-released call."
)]
pub struct CallNotFound {
    call_sid: String,
}

#[derive(Error, VcrError, HttpCode, Kind, Debug)]
#[code(Status::InternalServerError)]
#[error(
    "The record for call {call_sid} exists but is missing {missing}. The \
record was torn down as far as possible; please report this, because it \
means an allocation was only partially persisted."
)]
pub struct MalformedCallRecord {
    call_sid: String,
    missing: &'static str,
}
