use futures::stream::{self, Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::Api;
use kube_runtime::watcher::{watcher, Error, Event};

/// A FleetEvent is the router's view of one change to one pod in the fleet.
///
/// The underlying watch machinery batches the initial listing (and every
/// relist after a dropped watch) into a single restart event; this wrapper
/// unrolls those batches into per-pod [Added](FleetEvent::Added) events so
/// that consumers only ever deal in single-pod transitions.
#[derive(Debug)]
pub enum FleetEvent {
    /// The pod appeared in a fresh listing of the fleet.
    Added(Pod),
    /// The pod changed while the watch was established.
    Modified(Pod),
    /// The pod is gone from the fleet.
    Deleted(Pod),
}

impl FleetEvent {
    /// The pod this event is about, whichever shape the event takes.
    pub fn pod(&self) -> &Pod {
        match self {
            FleetEvent::Added(pod) => pod,
            FleetEvent::Modified(pod) => pod,
            FleetEvent::Deleted(pod) => pod,
        }
    }
}

/// Opens a watch over every fleet pod matching the label selector and
/// flattens it into a stream of [FleetEvent](FleetEvent)s.
///
/// Errors are passed through verbatim; the consumer owns the retry policy
/// because only the consumer knows whether a broken watch is worth a crash
/// or just a pause-and-reconnect.
pub fn events(
    api: Api<Pod>,
    selector: &str,
) -> impl Stream<Item = std::result::Result<FleetEvent, Error>> {
    let params = ListParams::default().labels(selector);
    watcher(api, params).flat_map(|step| {
        let unrolled: Vec<std::result::Result<FleetEvent, Error>> = match step {
            Ok(Event::Restarted(pods)) => {
                pods.into_iter().map(|pod| Ok(FleetEvent::Added(pod))).collect()
            }
            Ok(Event::Applied(pod)) => vec![Ok(FleetEvent::Modified(pod))],
            Ok(Event::Deleted(pod)) => vec![Ok(FleetEvent::Deleted(pod))],
            Err(err) => vec![Err(err)],
        };
        stream::iter(unrolled)
    })
}
