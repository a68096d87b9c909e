//! Deterministic construction of the per-pod WebSocket URL handed back to
//! telephony providers. The URL is rebuilt from scratch on every request —
//! including idempotent replays — and is never persisted anywhere.

/// Used when a caller names no provider.
pub const DEFAULT_PROVIDER: &str = "twilio";
/// Used when a caller names no flow. The `v2` flow appends a `/v2` suffix.
pub const DEFAULT_FLOW: &str = "v2";
/// Used when a caller names no template.
pub const DEFAULT_TEMPLATE: &str = "order-confirmation";
/// Exotel requests default to a different template than everybody else.
pub const EXOTEL_DEFAULT_TEMPLATE: &str = "template";

/// Builds the WebSocket URL for one pod:
///
/// ```text
/// {base}/ws/pod/{pod}/agent/voice/breeze-buddy/{provider}/callback/{template}[/v2]
/// ```
///
/// A trailing slash on the base is trimmed so that operators may configure
/// the base either way.
pub fn build(base: &str, pod: &str, provider: &str, flow: &str, template: &str) -> String {
    let base = base.trim_end_matches('/');
    let mut url = format!(
        "{}/ws/pod/{}/agent/voice/breeze-buddy/{}/callback/{}",
        base, pod, provider, template
    );
    if flow == "v2" {
        url.push_str("/v2");
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_shape() {
        assert_eq!(
            build(
                "wss://voice.example.com",
                "voice-agent-0",
                DEFAULT_PROVIDER,
                DEFAULT_FLOW,
                DEFAULT_TEMPLATE
            ),
            "wss://voice.example.com/ws/pod/voice-agent-0/agent/voice/breeze-buddy\
/twilio/callback/order-confirmation/v2"
        );
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        assert_eq!(
            build("wss://voice.example.com/", "v-1", "plivo", "v2", "support"),
            "wss://voice.example.com/ws/pod/v-1/agent/voice/breeze-buddy/plivo/callback/support/v2"
        );
    }

    #[test]
    fn non_v2_flow_has_no_suffix() {
        assert_eq!(
            build("wss://voice.example.com", "v-1", "twilio", "v1", "support"),
            "wss://voice.example.com/ws/pod/v-1/agent/voice/breeze-buddy/twilio/callback/support"
        );
    }

    #[test]
    fn deterministic() {
        let a = build("wss://b", "p", "exotel", "v2", EXOTEL_DEFAULT_TEMPLATE);
        let b = build("wss://b", "p", "exotel", "v2", EXOTEL_DEFAULT_TEMPLATE);
        assert_eq!(a, b);
    }
}
