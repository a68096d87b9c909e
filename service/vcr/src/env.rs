//! Every environment knob the router reads, in one place. All knobs carry a
//! default so that a bare `cargo run` against a local store and cluster does
//! something sensible. Values that fail to parse silently fall back to their
//! default; a typo in a TTL should never keep a replica from booting.

use std::time::Duration;

fn var_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn secs_or(name: &str, default: u64) -> Duration {
    Duration::from_secs(var_or(name, default))
}

/// The URL of the backing key-value store, configured under `REDIS_URL`.
/// Defaults to a store running on localhost, which is what local
/// development looks like.
pub fn store_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// The size of the shared store connection pool, configured under
/// `STORE_POOL_SIZE`. Every request handler and background worker checks
/// connections out of this one pool per-operation.
pub fn store_pool_size() -> usize {
    var_or("STORE_POOL_SIZE", 16)
}

/// How long a single connection dial (or pool checkout) may take before it
/// is abandoned, configured under `STORE_DIAL_TIMEOUT_SECS`.
pub fn store_dial_timeout() -> Duration {
    secs_or("STORE_DIAL_TIMEOUT_SECS", 5)
}

/// How many times boot will retry the initial store ping before declaring
/// the store unreachable and aborting, configured under `STORE_BOOT_RETRIES`.
pub fn store_boot_retries() -> u32 {
    var_or("STORE_BOOT_RETRIES", 3)
}

/// The port the HTTP (and metrics) surface listens on, configured under
/// `HTTP_PORT`.
pub fn http_port() -> u16 {
    var_or("HTTP_PORT", 8080)
}

/// The deadline applied to each store-touching request handler, configured
/// under `REQUEST_TIMEOUT_SECS`.
pub fn request_timeout() -> Duration {
    secs_or("REQUEST_TIMEOUT_SECS", 60)
}

/// The namespace the worker fleet lives in, configured under
/// `FLEET_NAMESPACE`.
pub fn fleet_namespace() -> String {
    std::env::var("FLEET_NAMESPACE").unwrap_or_else(|_| "voice".to_string())
}

/// The label selector identifying worker pods within the fleet namespace,
/// configured under `FLEET_LABEL_SELECTOR`.
pub fn fleet_label_selector() -> String {
    std::env::var("FLEET_LABEL_SELECTOR").unwrap_or_else(|_| "app=voice-agent".to_string())
}

/// This replica's own name, configured under `HOSTNAME` (which the
/// orchestrator sets for free inside a pod). Used as the holder identity in
/// leader election.
pub fn replica_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "vcr-unknown".to_string())
}

/// How often the zombie recovery sweep runs on the leader, configured under
/// `ZOMBIE_INTERVAL_SECS`.
pub fn zombie_interval() -> Duration {
    secs_or("ZOMBIE_INTERVAL_SECS", 30)
}

/// The TTL on a pod's lease, configured under `LEASE_TTL_SECS`.
///
/// This MUST outlive the longest call you ever expect to serve. If a lease
/// expires mid-call, zombie recovery will consider the pod abandoned and
/// hand it to a second caller.
pub fn lease_ttl() -> Duration {
    secs_or("LEASE_TTL_SECS", 900)
}

/// The TTL on a pod's draining flag, configured under `DRAINING_TTL_SECS`.
/// Sized at roughly three times the fleet's termination grace period so the
/// flag comfortably outlives the pod it marks.
pub fn draining_ttl() -> Duration {
    secs_or("DRAINING_TTL_SECS", 360)
}

/// How often the reconciler performs its full fleet-versus-store diff on the
/// leader, configured under `RECONCILE_INTERVAL_SECS`.
pub fn reconcile_interval() -> Duration {
    secs_or("RECONCILE_INTERVAL_SECS", 60)
}

/// The TTL on a completed call record, configured under
/// `CALL_INFO_TTL_SECS`. Also the idempotency window for repeated allocate
/// calls carrying the same call identifier.
pub fn call_info_ttl() -> Duration {
    secs_or("CALL_INFO_TTL_SECS", 3600)
}

/// The TTL on the `_lock` placeholder written while an allocation is in
/// flight, configured under `CALL_LOCK_TTL_SECS`. This is the reclamation
/// path for allocations whose caller died mid-request.
pub fn call_lock_ttl() -> Duration {
    secs_or("CALL_LOCK_TTL_SECS", 30)
}

/// How often every replica re-reads the tier table from the store,
/// configured under `TIER_REFRESH_INTERVAL_SECS`.
pub fn tier_refresh_interval() -> Duration {
    secs_or("TIER_REFRESH_INTERVAL_SECS", 30)
}

/// The bootstrap tier table as a JSON blob, configured under
/// `TIER_CONFIG_JSON`. Three formats are accepted; see the tiers module.
/// Only consulted until the store copy exists — after first boot the store
/// wins.
pub fn tier_config_json() -> String {
    std::env::var("TIER_CONFIG_JSON").unwrap_or_default()
}

/// Whether this deployment runs leader election, configured under
/// `LEADER_ELECTION_ENABLED`. Disable only in single-replica development
/// setups; with multiple replicas and no election every replica runs the
/// control loops and they will fight.
pub fn leader_election_enabled() -> bool {
    var_or("LEADER_ELECTION_ENABLED", true)
}

/// The name of the election lease object, configured under
/// `LEADER_LEASE_NAME`.
pub fn leader_lease_name() -> String {
    std::env::var("LEADER_LEASE_NAME").unwrap_or_else(|_| "vcr-pool-manager".to_string())
}

/// How long a leadership lease lasts without renewal, configured under
/// `LEADER_LEASE_DURATION_SECS`.
pub fn leader_lease_duration() -> Duration {
    secs_or("LEADER_LEASE_DURATION_SECS", 15)
}

/// How often a replica attempts to acquire or renew the leadership lease,
/// configured under `LEADER_RETRY_PERIOD_SECS`.
pub fn leader_retry_period() -> Duration {
    secs_or("LEADER_RETRY_PERIOD_SECS", 5)
}

/// The externally visible base URL that per-pod WebSocket URLs are built
/// from, configured under `WS_BASE_URL`. A trailing slash is tolerated and
/// trimmed.
pub fn ws_base_url() -> String {
    std::env::var("WS_BASE_URL").unwrap_or_else(|_| "wss://voice.example.com".to_string())
}

/// How long shutdown waits for background workers to wind down before
/// giving up, configured under `SHUTDOWN_DEADLINE_SECS`.
pub fn shutdown_deadline() -> Duration {
    secs_or("SHUTDOWN_DEADLINE_SECS", 30)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        // None of these are set in the test environment, so every accessor
        // exercises its default path.
        assert_eq!(store_pool_size(), 16);
        assert_eq!(http_port(), 8080);
        assert_eq!(zombie_interval(), Duration::from_secs(30));
        assert_eq!(lease_ttl(), Duration::from_secs(900));
        assert_eq!(draining_ttl(), Duration::from_secs(360));
        assert_eq!(reconcile_interval(), Duration::from_secs(60));
        assert_eq!(call_info_ttl(), Duration::from_secs(3600));
        assert_eq!(call_lock_ttl(), Duration::from_secs(30));
        assert!(leader_election_enabled());
    }

    #[test]
    fn garbage_falls_back() {
        std::env::set_var("STORE_BOOT_RETRIES", "a grand plenty");
        assert_eq!(store_boot_retries(), 3);
        std::env::remove_var("STORE_BOOT_RETRIES");
    }
}
