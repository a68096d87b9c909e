//! The leader's reconciler: a periodic full diff between what the fleet
//! says exists and what the store believes. Events can be missed — a watch
//! can drop mid-rotation, a leader can die between two events — and this
//! loop is what makes those misses temporary.

use super::binding;
use crate::{env, metrics, tiers};
use fleet::PodExt;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, ResourceExt};
use std::collections::HashSet;
use store::{Store, StoreKey};
use term_colors::*;
use tokio_util::sync::CancellationToken;

pub async fn run(store: Store, api: Api<Pod>, selector: String, token: CancellationToken) {
    // The first tick of an interval fires immediately, which doubles as the
    // mandated at-leader-gain pass.
    let mut tick = tokio::time::interval(env::reconcile_interval());
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tick.tick() => reconcile(&store, &api, &selector).await,
        }
    }
}

async fn reconcile(store: &Store, api: &Api<Pod>, selector: &str) {
    let fleet_pods = match fleet::list(api, selector).await {
        Ok(pods) => pods,
        Err(err) => {
            warn!("Reconcile pass skipped, fleet listing failed: {}", err);
            return;
        }
    };
    let fleet_names: HashSet<String> = fleet_pods.iter().map(|pod| pod.name()).collect();

    let table = tiers::snapshot().await;
    let mut store_pods: HashSet<String> = HashSet::new();
    for tier in table.tiers.keys() {
        match store.smembers(&store.key(StoreKey::PoolAssigned(tier))).await {
            Ok(members) => store_pods.extend(members),
            Err(err) => {
                warn!("Reconcile pass skipped, roster read failed for {}: {}", purple(tier), err);
                return;
            }
        }
    }
    for name in table.merchant_tiers.keys() {
        let id = name.strip_prefix("merchant:").unwrap_or(name);
        match store
            .smembers(&store.key(StoreKey::MerchantAssigned(id)))
            .await
        {
            Ok(members) => store_pods.extend(members),
            Err(err) => {
                warn!("Reconcile pass skipped, roster read failed for {}: {}", purple(name), err);
                return;
            }
        }
    }

    for pod in &fleet_pods {
        if pod.ready() && pod.ip().is_some() {
            if let Err(err) = binding::bind_pod(store, pod).await {
                warn!("Reconcile could not bind {}: {}", cyan(pod.name()), err);
            }
        } else if let Err(err) = binding::unbind_pod(store, &pod.name(), false).await {
            warn!("Reconcile could not unbind {}: {}", cyan(pod.name()), err);
        }
    }

    for ghost in store_pods.difference(&fleet_names) {
        info!(
            "Pod {} exists in the store but not in the fleet, removing the ghost",
            cyan(ghost)
        );
        if let Err(err) = binding::unbind_pod(store, ghost, true).await {
            warn!("Reconcile could not remove ghost {}: {}", cyan(ghost), err);
        }
    }

    metrics::RECONCILE_RUNS_TOTAL.inc();
}
