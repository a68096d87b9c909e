//! The tiered fallback allocator. Given a call, pick exactly one pod,
//! record the assignment durably, and hand back the pod's WebSocket URL.
//!
//! The walk order is: the merchant's dedicated pool (if one is configured),
//! then the merchant's custom fallback chain (or the registry's default
//! chain when there isn't one). The first pool with capacity wins.
//!
//! Allocation is idempotent by call identifier: a repeated allocate for the
//! same call returns the original pod with `was_existing` set, for as long
//! as the call record lives.

use crate::pools::{AcquireOutcome, SourcePool};
use crate::{env, merchants, metrics, tiers, wsurl};
use chrono::Utc;
use error::*;
use result::Result;
use store::{Store, StoreKey};
use term_colors::*;

/// A completed (or replayed) allocation.
pub struct Allocation {
    pub pod_name: String,
    pub ws_url: String,
    pub source_pool: String,
    pub allocated_at: i64,
    pub was_existing: bool,
}

/// Everything the allocator needs to know about one request. `provider`,
/// `flow`, and `template` are already defaulted by the transport layer
/// because the defaults differ per provider.
pub struct AllocateRequest<'a> {
    pub call_sid: &'a str,
    pub merchant_id: Option<&'a str>,
    pub provider: &'a str,
    pub flow: &'a str,
    pub template: &'a str,
}

pub async fn allocate(store: &Store, request: AllocateRequest<'_>) -> Result<Allocation> {
    if request.call_sid.trim().is_empty() {
        return Err(InvalidCallId {}.into());
    }
    let call_key = store.key(StoreKey::Call(request.call_sid));

    ////////////////////////////////////////////////////////////////////////
    // Phase 1: idempotency. One script either returns the existing record
    //          or stamps a short-lived lock and tells us to go allocate.
    ////////////////////////////////////////////////////////////////////////
    let existing = store
        .call_lock(&call_key, env::call_lock_ttl().as_secs())
        .await?;
    if let Some(pod_name) = existing.get("pod_name") {
        let source_pool = existing.get("source_pool").cloned().unwrap_or_default();
        debug!(
            "Call {} is already assigned to {}, replaying the record",
            cyan(request.call_sid),
            cyan(pod_name)
        );
        return Ok(Allocation {
            pod_name: pod_name.clone(),
            // The URL is never persisted; it is rebuilt from this request's
            // own parameters.
            ws_url: wsurl::build(
                &env::ws_base_url(),
                pod_name,
                request.provider,
                request.flow,
                request.template,
            ),
            source_pool,
            allocated_at: existing
                .get("allocated_at")
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(0),
            was_existing: true,
        });
    }
    // A bare `_lock` with no pod_name is either our own freshly stamped
    // lock or a racing allocator's. Either way the only forward path is to
    // proceed; the script's TTL bounds how long a dead lock can linger.

    ////////////////////////////////////////////////////////////////////////
    // Phase 2: resolve the chain and walk it.
    ////////////////////////////////////////////////////////////////////////
    let table = tiers::snapshot().await;
    let merchant = match request.merchant_id {
        Some(id) if !id.is_empty() => merchants::lookup(store, id).await.unwrap_or_else(|err| {
            debug!("Merchant {} config lookup failed ({}), using defaults", id, err);
            Default::default()
        }),
        _ => Default::default(),
    };
    let mut chain: Vec<String> = Vec::new();
    if let Some(pool) = &merchant.pool {
        chain.push(format!("merchant:{}", pool));
    }
    if merchant.fallback.is_empty() {
        chain.extend(table.default_chain.iter().cloned());
    } else {
        chain.extend(merchant.fallback.iter().cloned());
    }

    let mut assigned: Option<(String, SourcePool)> = None;
    for step in &chain {
        let pool = match SourcePool::for_step(step, &table) {
            Some(pool) => pool,
            None => {
                debug!("Skipping unknown chain step {}", purple(step));
                continue;
            }
        };
        match pool.try_acquire(store).await? {
            AcquireOutcome::Pod(pod) => {
                assigned = Some((pod, pool));
                break;
            }
            AcquireOutcome::Empty => {
                debug!(
                    "Pool {} had no capacity for {}",
                    purple(step),
                    cyan(request.call_sid)
                );
            }
            AcquireOutcome::AllDraining => {
                debug!(
                    "Every pod left in {} is draining, moving down the chain",
                    purple(step)
                );
            }
        }
    }
    let (pod_name, pool) = match assigned {
        Some(found) => found,
        None => {
            metrics::NO_PODS_AVAILABLE_TOTAL.inc();
            // The placeholder lock is deliberately left to expire on its
            // own; tearing it down here would just add a failure mode.
            return Err(NoPodsAvailable {
                call_sid: request.call_sid.to_string(),
            }
            .into());
        }
    };
    let source_pool = pool.encode();

    ////////////////////////////////////////////////////////////////////////
    // Phase 3: persist the assignment. Only the call record itself is
    //          load-bearing; the pod hash and the lease are best-effort
    //          because zombie recovery can rebuild from either side.
    ////////////////////////////////////////////////////////////////////////
    let allocated_at = Utc::now().timestamp();
    let allocated_at_str = allocated_at.to_string();
    let record: [(&str, &str); 4] = [
        ("pod_name", &pod_name),
        ("source_pool", &source_pool),
        ("merchant_id", request.merchant_id.unwrap_or("")),
        ("allocated_at", &allocated_at_str),
    ];
    if let Err(err) = store
        .overwrite_call_record(&call_key, &record, env::call_info_ttl().as_secs() as i64)
        .await
    {
        // Best effort un-pop. If this fails too, zombie recovery is the
        // backstop that eventually returns the pod to its pool.
        error!(
            "Failed to write the call record for {}, returning {} to {}",
            cyan(request.call_sid),
            cyan(&pod_name),
            purple(&source_pool)
        );
        if let Err(rollback) = pool.release_capacity(store, &pod_name).await {
            warn!(
                "Could not return {} to {} ({}); zombie recovery will pick it up",
                cyan(&pod_name),
                purple(&source_pool),
                rollback
            );
        }
        return Err(err);
    }

    let pod_key = store.key(StoreKey::Pod(&pod_name));
    if let Err(err) = store
        .hset(
            &pod_key,
            &[
                ("status", "allocated"),
                ("allocated_call_sid", request.call_sid),
                ("allocated_at", allocated_at_str.as_str()),
                ("source_pool", source_pool.as_str()),
            ],
        )
        .await
    {
        warn!("Failed to update the pod hash for {}: {}", cyan(&pod_name), err);
    }
    let lease_key = store.key(StoreKey::Lease(&pod_name));
    if let Err(err) = store
        .set_ex(&lease_key, request.call_sid, env::lease_ttl().as_secs())
        .await
    {
        warn!("Failed to write the lease for {}: {}", cyan(&pod_name), err);
    }

    metrics::ALLOCATIONS_TOTAL
        .with_label_values(&[source_pool.as_str()])
        .inc();
    metrics::ACTIVE_CALLS.inc();
    info!(
        "Call {} assigned to {} from {}",
        cyan(request.call_sid),
        cyan(&pod_name),
        purple(&source_pool)
    );

    Ok(Allocation {
        ws_url: wsurl::build(
            &env::ws_base_url(),
            &pod_name,
            request.provider,
            request.flow,
            request.template,
        ),
        pod_name,
        source_pool,
        allocated_at,
        was_existing: false,
    })
}

#[derive(Error, VcrError, HttpCode, Kind, Debug)]
#[code(Status::BadRequest)]
#[error(
    "The call identifier was empty. Telephony webhooks always carry one \
(CallSid for Twilio and Exotel, CallUUID for Plivo); if you are calling the \
JSON API directly then you must supply a non-empty call_sid."
)]
pub struct InvalidCallId {}

#[derive(Error, VcrError, HttpCode, Kind, Debug)]
#[code(Status::ServiceUnavailable)]
#[error(
    "Every pool in the fallback chain was exhausted while placing call \
{call_sid}. No state was changed; this request is safe to retry once \
capacity frees up or the fleet scales out."
)]
pub struct NoPodsAvailable {
    call_sid: String,
}
