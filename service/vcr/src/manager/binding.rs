//! Binding and unbinding pods to tiers, plus the auto-assigner that decides
//! which tier a fresh pod lands in.
//!
//! Assignment priority:
//!
//! 1. An existing binding to a still-configured tier is sticky.
//! 2. Merchant pools fill first, in order, until each hits its capacity.
//! 3. Then the default chain fills, in order, until each tier hits its
//!    target.
//! 4. When everything is full, the last tier of the chain is the overflow
//!    sink.

use crate::metrics;
use crate::pools::SourcePool;
use crate::tiers::{self, TierTable};
use error::*;
use fleet::PodExt;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use result::Result;
use store::{Store, StoreKey};
use term_colors::*;

/// Whether the store already knows this pod: it has a tier binding AND sits
/// in that tier's assigned roster.
pub async fn is_registered(store: &Store, pod_name: &str) -> Result<bool> {
    let binding = match store.get(&store.key(StoreKey::PodTier(pod_name))).await? {
        Some(binding) => binding,
        None => return Ok(false),
    };
    let table = tiers::snapshot().await;
    let pool = SourcePool::from_binding(&binding, &table);
    store.sismember(&pool.assigned_key(store), pod_name).await
}

async fn assign_tier(store: &Store, pod_name: &str, table: &TierTable) -> Result<String> {
    if let Some(existing) = store.get(&store.key(StoreKey::PodTier(pod_name))).await? {
        let known = if existing.starts_with("merchant:") {
            table.merchant_tiers.contains_key(&existing)
        } else {
            table.tiers.contains_key(&existing)
        };
        if known {
            return Ok(existing);
        }
        // The tier this pod remembers has left the configuration. Scrub the
        // stale memberships, then assign fresh.
        let stale = SourcePool::from_binding(&existing, table);
        let _ = stale.remove_available(store, pod_name).await;
        let _ = store.srem(&stale.assigned_key(store), pod_name).await;
        debug!(
            "Pod {} had a stale binding to {}, re-assigning",
            cyan(pod_name),
            purple(&existing)
        );
    }
    for (name, target) in &table.merchant_tiers {
        let id = name.strip_prefix("merchant:").unwrap_or(name);
        let bound = store
            .scard(&store.key(StoreKey::MerchantAssigned(id)))
            .await?;
        if bound < u64::from(*target) {
            return Ok(name.clone());
        }
    }
    for tier in &table.default_chain {
        let target = table.tiers.get(tier).map(|t| t.target).unwrap_or(0);
        let bound = store.scard(&store.key(StoreKey::PoolAssigned(tier))).await?;
        if bound < u64::from(target) {
            return Ok(tier.clone());
        }
    }
    match table.default_chain.last() {
        Some(tier) => Ok(tier.clone()),
        None => Err(NoTiersConfigured {}.into()),
    }
}

/// Binds a pod: pick (or keep) its tier, enroll it in the assigned roster,
/// and — only if it holds no lease and no draining flag — make it
/// available. Safe to call repeatedly; every write is idempotent.
pub async fn bind_pod(store: &Store, pod: &Pod) -> Result<()> {
    let pod_name = pod.name();
    let table = tiers::snapshot().await;
    let binding = assign_tier(store, &pod_name, &table).await?;
    let pool = SourcePool::from_binding(&binding, &table);

    store
        .set(&store.key(StoreKey::PodTier(&pod_name)), &binding)
        .await?;
    store.sadd(&pool.assigned_key(store), &pod_name).await?;

    let pod_key = store.key(StoreKey::Pod(&pod_name));
    store.hsetnx(&pod_key, "status", "available").await?;
    if let Some(ip) = pod.ip() {
        if let Err(err) = store.hset(&pod_key, &[("ip", ip.as_str())]).await {
            debug!("Could not record the IP of {}: {}", cyan(&pod_name), err);
        }
    }

    // Fail-closed: a store error during the eligibility probe keeps the pod
    // out of the pool. Zombie recovery re-examines it within its interval.
    let eligible = store.pod_eligible(&pod_name).await.unwrap_or(false);
    if eligible {
        pool.add_available(store, &pod_name).await?;
        debug!(
            "Pod {} is bound and available in {}",
            cyan(&pod_name),
            purple(&binding)
        );
    } else {
        debug!(
            "Pod {} is bound to {} but not currently eligible",
            cyan(&pod_name),
            purple(&binding)
        );
    }
    Ok(())
}

/// Unbinds a pod from every configured pool, cleaning up the orphaned call
/// record if the pod died mid-call. `purge` additionally deletes the pod's
/// scalar keys; a pod that is merely unready keeps its tier binding so that
/// its eventual re-bind is sticky.
///
/// Removal iterates every tier and picks SREM or ZREM by kind — a
/// hard-coded SREM would raise a wrong-type error against shared pools.
pub async fn unbind_pod(store: &Store, pod_name: &str, purge: bool) -> Result<()> {
    let table = tiers::snapshot().await;
    for tier in table.tiers.keys() {
        let pool = SourcePool::from_binding(tier, &table);
        pool.remove_available(store, pod_name).await?;
        store
            .srem(&store.key(StoreKey::PoolAssigned(tier)), pod_name)
            .await?;
    }
    for name in table.merchant_tiers.keys() {
        let id = name.strip_prefix("merchant:").unwrap_or(name);
        store
            .srem(&store.key(StoreKey::MerchantAvailable(id)), pod_name)
            .await?;
        store
            .srem(&store.key(StoreKey::MerchantAssigned(id)), pod_name)
            .await?;
    }

    // This is the only path that catches a call whose pod died without a
    // proper release.
    let pod_key = store.key(StoreKey::Pod(pod_name));
    if let Some(call_sid) = store.hget(&pod_key, "allocated_call_sid").await? {
        if !call_sid.is_empty() {
            store.del(&store.key(StoreKey::Call(&call_sid))).await?;
            store.hset(&pod_key, &[("allocated_call_sid", "")]).await?;
            metrics::ACTIVE_CALLS.dec();
            metrics::ORPHAN_CALLS_CLEANED_TOTAL.inc();
            info!(
                "Cleaned the orphaned record of call {}; its pod {} is gone",
                cyan(&call_sid),
                cyan(pod_name)
            );
        }
    }

    if purge {
        store.del(&pod_key).await?;
        store.del(&store.key(StoreKey::PodTier(pod_name))).await?;
        store.del(&store.key(StoreKey::Draining(pod_name))).await?;
        store.del(&store.key(StoreKey::Lease(pod_name))).await?;
        info!("Pod {} fully unbound", cyan(pod_name));
    } else {
        let _ = store.hset(&pod_key, &[("status", "unready")]).await;
        debug!("Pod {} pulled from its pools while unready", cyan(pod_name));
    }
    Ok(())
}

#[derive(Error, VcrError, HttpCode, Kind, Debug)]
#[code(Status::InternalServerError)]
#[error(
    "A pod needed a tier assignment but the tier table is empty. This should \
be impossible — the registry always falls back to a hard-coded table — so \
please report it."
)]
pub struct NoTiersConfigured {}
