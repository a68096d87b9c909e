//! The pool manager: leadership and the leader-only control loops.
//!
//! Exactly one replica — the holder of the election lease — runs the fleet
//! watcher, the reconciler, and the zombie sweep. On gaining the lease the
//! supervisor starts all three under a fresh cancellation token and
//! restarts any that panic, with exponential backoff. On losing the lease
//! the token is cancelled and the whole process shuts down; the
//! orchestrator restarts it as a clean follower. Deliberately restarting
//! beats reasoning about the half-torn-down state of demoted workers.

pub mod binding;
pub mod reconciler;
pub mod watcher;
pub mod zombie;

use crate::env;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use fleet::leader::{LeaseLock, LeaseLockParams};
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use store::Store;
use term_colors::*;
use tokio_util::sync::CancellationToken;

static IS_LEADER: AtomicBool = AtomicBool::new(false);

/// Whether this replica currently believes it is the leader. Surfaced on
/// the status endpoint.
pub fn is_leader() -> bool {
    IS_LEADER.load(Ordering::Relaxed)
}

/// The election loop. Runs for the life of the process (or until the first
/// demotion, which ends the process).
pub async fn elect(client: kube::Client, store: Store, root: CancellationToken) {
    let lock = LeaseLock::new(
        client.clone(),
        &env::fleet_namespace(),
        LeaseLockParams {
            lease_name: env::leader_lease_name(),
            holder_id: env::replica_name(),
            lease_ttl: env::leader_lease_duration(),
        },
    );
    let api: Api<Pod> = fleet::client::namespaced(client, &env::fleet_namespace());
    let selector = env::fleet_label_selector();
    let mut workers: Option<CancellationToken> = None;
    let mut tick = tokio::time::interval(env::leader_retry_period());
    loop {
        tokio::select! {
            _ = root.cancelled() => {
                if let Some(token) = workers {
                    token.cancel();
                }
                return;
            }
            _ = tick.tick() => {}
        }
        match lock.try_acquire_or_renew().await {
            Ok(true) => {
                if workers.is_none() {
                    info!("{}", green("This replica is now the pool-manager leader"));
                    IS_LEADER.store(true, Ordering::Relaxed);
                    let token = root.child_token();
                    start_workers(&store, &api, &selector, token.clone());
                    workers = Some(token);
                }
            }
            Ok(false) => {
                if let Some(token) = workers.take() {
                    error!(
                        "{}",
                        red("Leadership lost; stopping workers and restarting this replica")
                    );
                    IS_LEADER.store(false, Ordering::Relaxed);
                    token.cancel();
                    // Restart-on-demotion.
                    root.cancel();
                    return;
                }
            }
            Err(err) => {
                // A transient election error is not a demotion; the lease's
                // own TTL is what decides when leadership actually lapses.
                warn!("Leader election step failed: {}", err);
            }
        }
    }
}

/// Starts the three leader-only workers under the given token. Also used
/// directly (on every replica) when leader election is disabled.
pub fn start_workers(store: &Store, api: &Api<Pod>, selector: &str, token: CancellationToken) {
    {
        let store = store.clone();
        let api = api.clone();
        let selector = selector.to_string();
        let token = token.clone();
        supervise("fleet watcher", token.clone(), move || {
            watcher::run(store.clone(), api.clone(), selector.clone(), token.clone())
        });
    }
    {
        let store = store.clone();
        let api = api.clone();
        let selector = selector.to_string();
        let token = token.clone();
        supervise("reconciler", token.clone(), move || {
            reconciler::run(store.clone(), api.clone(), selector.clone(), token.clone())
        });
    }
    {
        let store = store.clone();
        let token = token.clone();
        supervise("zombie recovery", token.clone(), move || {
            zombie::run(store.clone(), token.clone())
        });
    }
}

/// Runs one worker forever, restarting it on panic (or on an unexpected
/// clean return) with exponential backoff from one second up to thirty. A
/// worker that stayed up for a while earns its backoff back.
fn supervise<F, Fut>(name: &'static str, token: CancellationToken, factory: F)
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };
        loop {
            if token.is_cancelled() {
                return;
            }
            let started = tokio::time::Instant::now();
            let outcome = tokio::spawn(factory()).await;
            if token.is_cancelled() {
                debug!("The {} worker shut down cleanly", name);
                return;
            }
            match outcome {
                Ok(()) => warn!("The {} worker exited unexpectedly", name),
                Err(err) => error!("The {} worker panicked: {:?}", name, err),
            }
            if started.elapsed() > Duration::from_secs(60) {
                backoff.reset();
            }
            let pause = backoff
                .next_backoff()
                .unwrap_or_else(|| Duration::from_secs(30));
            warn!("Restarting the {} worker in {:?}", name, pause);
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(pause) => {}
            }
        }
    });
}
