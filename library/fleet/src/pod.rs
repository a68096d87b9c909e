use k8s_openapi::api::core::v1::Pod;

/// PodExt is an extension trait used to answer the questions the router
/// actually asks of a fleet pod object.
///
/// The one that matters is [ready](PodExt::ready): a pod is only handed to
/// the pool manager once its phase is `Running` AND its `Ready` condition
/// reports `True`. Phase alone is not enough — a pod whose readiness probe
/// is failing still reports `Running` while being unable to take a call.
pub trait PodExt {
    fn phase_running(&self) -> bool;
    fn condition_ready(&self) -> bool;
    fn ready(&self) -> bool;
    fn ip(&self) -> Option<String>;
}

impl PodExt for Pod {
    fn phase_running(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|status| status.phase.as_deref())
            == Some("Running")
    }

    fn condition_ready(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|status| status.conditions.as_ref())
            .map(|conditions| {
                conditions
                    .iter()
                    .any(|condition| condition.type_ == "Ready" && condition.status == "True")
            })
            .unwrap_or(false)
    }

    fn ready(&self) -> bool {
        self.phase_running() && self.condition_ready()
    }

    fn ip(&self) -> Option<String> {
        self.status.as_ref().and_then(|status| status.pod_ip.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(phase: &str, ready: &str, ip: Option<&str>) -> Pod {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": "voice-agent-0" },
            "status": {
                "phase": phase,
                "podIP": ip,
                "conditions": [
                    { "type": "Ready", "status": ready }
                ]
            }
        }))
        .unwrap()
    }

    #[test]
    fn running_and_ready() {
        let p = pod("Running", "True", Some("10.0.0.7"));
        assert!(p.ready());
        assert_eq!(p.ip(), Some("10.0.0.7".to_string()));
    }

    #[test]
    fn running_but_probe_failing() {
        let p = pod("Running", "False", Some("10.0.0.7"));
        assert!(p.phase_running());
        assert!(!p.ready());
    }

    #[test]
    fn pending_is_not_ready() {
        let p = pod("Pending", "True", None);
        assert!(!p.ready());
        assert_eq!(p.ip(), None);
    }

    #[test]
    fn statusless_pod() {
        let p = Pod::default();
        assert!(!p.ready());
        assert_eq!(p.ip(), None);
    }
}
