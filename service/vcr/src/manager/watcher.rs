//! The leader's fleet watcher: consumes pod events and keeps pool
//! membership in step with pod readiness.
//!
//! The transitions, spelled out:
//!
//! | event    | readiness      | registered | action       |
//! |----------|----------------|------------|--------------|
//! | Added    | ready, has IP  | —          | bind         |
//! | Added    | anything else  | —          | nothing      |
//! | Modified | ready, has IP  | no         | bind         |
//! | Modified | not ready      | yes        | unbind       |
//! | Deleted  | —              | —          | unbind+purge |
//! | Error    | —              | —          | log          |

use super::binding;
use fleet::{FleetEvent, PodExt};
use futures_util::{pin_mut, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, ResourceExt};
use std::time::Duration;
use store::Store;
use term_colors::*;
use tokio_util::sync::CancellationToken;

pub async fn run(store: Store, api: Api<Pod>, selector: String, token: CancellationToken) {
    loop {
        if token.is_cancelled() {
            return;
        }
        let stream = fleet::watcher::events(api.clone(), &selector);
        pin_mut!(stream);
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                event = stream.next() => match event {
                    None => break,
                    Some(Err(err)) => warn!("Fleet watch delivered an error: {:?}", err),
                    Some(Ok(event)) => handle(&store, event).await,
                }
            }
        }
        // The watch machinery retries transient API failures internally, so
        // a closed stream is rare. Pause briefly and re-establish.
        debug!("The fleet watch stream closed, reconnecting");
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
    }
}

async fn handle(store: &Store, event: FleetEvent) {
    match event {
        FleetEvent::Added(pod) => {
            if pod.ready() && pod.ip().is_some() {
                if let Err(err) = binding::bind_pod(store, &pod).await {
                    warn!("Failed to bind {}: {}", cyan(pod.name()), err);
                }
            }
        }
        FleetEvent::Modified(pod) => {
            let pod_name = pod.name();
            let registered = match binding::is_registered(store, &pod_name).await {
                Ok(registered) => registered,
                Err(err) => {
                    warn!(
                        "Could not determine whether {} is registered: {}",
                        cyan(&pod_name),
                        err
                    );
                    return;
                }
            };
            if pod.ready() && pod.ip().is_some() && !registered {
                info!("Pod {} became {}", cyan(&pod_name), green("Ready"));
                if let Err(err) = binding::bind_pod(store, &pod).await {
                    warn!("Failed to bind {}: {}", cyan(&pod_name), err);
                }
            } else if !pod.ready() && registered {
                info!("Pod {} is no longer {}", cyan(&pod_name), green("Ready"));
                if let Err(err) = binding::unbind_pod(store, &pod_name, false).await {
                    warn!("Failed to unbind {}: {}", cyan(&pod_name), err);
                }
            }
        }
        FleetEvent::Deleted(pod) => {
            let pod_name = pod.name();
            info!("Pod {} was {}", cyan(&pod_name), red("deleted"));
            if let Err(err) = binding::unbind_pod(store, &pod_name, true).await {
                warn!("Failed to unbind deleted pod {}: {}", cyan(&pod_name), err);
            }
        }
    }
}
