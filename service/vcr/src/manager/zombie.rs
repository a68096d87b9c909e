//! The leader's zombie sweep. A zombie is a pod that is in a tier's
//! assigned roster but missing from its available pool with no live lease —
//! typically the residue of a crashed allocator, an expired lease, or a
//! partially failed release. The sweep runs entirely inside the store and
//! never consults the fleet API.

use crate::tiers::{self, TierKind};
use crate::metrics;
use store::{Store, StoreKey};
use term_colors::*;
use tokio_util::sync::CancellationToken;

pub async fn run(store: Store, token: CancellationToken) {
    let mut tick = tokio::time::interval(crate::env::zombie_interval());
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tick.tick() => sweep(&store).await,
        }
    }
}

async fn sweep(store: &Store) {
    let table = tiers::snapshot().await;
    for (tier, spec) in &table.tiers {
        let assigned_key = store.key(StoreKey::PoolAssigned(tier));
        let available_key = store.key(StoreKey::PoolAvailable(tier));
        let assigned = match store.smembers(&assigned_key).await {
            Ok(members) => members,
            Err(err) => {
                warn!("Zombie sweep skipped tier {}: {}", purple(tier), err);
                continue;
            }
        };
        for pod in &assigned {
            match spec.kind {
                TierKind::Exclusive => {
                    recover_exclusive(store, &available_key, tier, pod).await
                }
                TierKind::Shared => recover_shared(store, &available_key, tier, pod).await,
            }
        }
        update_gauges(store, tier, spec.kind, &available_key, &assigned_key).await;
    }
    for name in table.merchant_tiers.keys() {
        let id = name.strip_prefix("merchant:").unwrap_or(name);
        let assigned_key = store.key(StoreKey::MerchantAssigned(id));
        let available_key = store.key(StoreKey::MerchantAvailable(id));
        let assigned = match store.smembers(&assigned_key).await {
            Ok(members) => members,
            Err(err) => {
                warn!("Zombie sweep skipped pool {}: {}", purple(name), err);
                continue;
            }
        };
        for pod in &assigned {
            recover_exclusive(store, &available_key, name, pod).await;
        }
        update_gauges(store, name, TierKind::Exclusive, &available_key, &assigned_key).await;
    }
}

async fn recover_exclusive(store: &Store, available_key: &str, tier: &str, pod: &str) {
    // Any probe error skips the pod; the next sweep gets another shot.
    match store.exists(&store.key(StoreKey::Draining(pod))).await {
        Ok(false) => {}
        _ => return,
    }
    match store.exists(&store.key(StoreKey::Lease(pod))).await {
        Ok(false) => {}
        _ => return, // a live lease means a live call
    }
    match store.sismember(available_key, pod).await {
        Ok(false) => {}
        _ => return, // already available is healthy
    }
    // Re-check both flags atomically at the moment of recovery, fail-closed.
    if store.pod_eligible(pod).await.unwrap_or(false) {
        if let Err(err) = store.sadd(available_key, pod).await {
            warn!("Could not recover zombie {}: {}", cyan(pod), err);
            return;
        }
        metrics::ZOMBIES_RECOVERED_TOTAL.inc();
        info!(
            "Recovered zombie {} back into {}",
            cyan(pod),
            purple(tier)
        );
    }
}

async fn recover_shared(store: &Store, available_key: &str, tier: &str, pod: &str) {
    match store.exists(&store.key(StoreKey::Draining(pod))).await {
        Ok(false) => {}
        _ => return,
    }
    match store.zscore(available_key, pod).await {
        // A present member — at any score — is healthy.
        Ok(Some(_)) => return,
        // A probe error MUST NOT be read as "missing". Re-adding at score 0
        // while calls are in flight resets the count and invites a storm of
        // over-allocation. Only the distinguished nil reply recovers.
        Err(err) => {
            warn!(
                "Zombie probe for {} in {} failed, skipping: {}",
                cyan(pod),
                purple(tier),
                err
            );
            return;
        }
        Ok(None) => {}
    }
    if store.pod_eligible(pod).await.unwrap_or(false) {
        if let Err(err) = store.zadd_nx(available_key, pod, 0.0).await {
            warn!("Could not recover zombie {}: {}", cyan(pod), err);
            return;
        }
        metrics::ZOMBIES_RECOVERED_TOTAL.inc();
        info!(
            "Recovered zombie {} back into {} at score 0",
            cyan(pod),
            purple(tier)
        );
    }
}

async fn update_gauges(
    store: &Store,
    tier: &str,
    kind: TierKind,
    available_key: &str,
    assigned_key: &str,
) {
    let available = match kind {
        TierKind::Exclusive => store.scard(available_key).await,
        TierKind::Shared => store.zcard(available_key).await,
    };
    if let Ok(count) = available {
        metrics::POOL_AVAILABLE
            .with_label_values(&[tier])
            .set(count as i64);
    }
    if let Ok(count) = store.scard(assigned_key).await {
        metrics::POOL_ASSIGNED
            .with_label_values(&[tier])
            .set(count as i64);
    }
}
