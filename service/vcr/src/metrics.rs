//! The router's Prometheus metric registry. Everything is registered
//! against the default registry so the exposition endpoint is a plain
//! `prometheus::gather()`.

use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, register_int_gauge_vec,
    IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};

lazy_static! {
    pub static ref ALLOCATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "vcr_allocations_total",
        "Calls successfully allocated to a pod, by source pool",
        &["source_pool"]
    )
    .unwrap();
    pub static ref NO_PODS_AVAILABLE_TOTAL: IntCounter = register_int_counter!(
        "vcr_no_pods_available_total",
        "Allocations that exhausted the entire fallback chain"
    )
    .unwrap();
    pub static ref RELEASES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "vcr_releases_total",
        "Call releases, by source pool and outcome",
        &["source_pool", "status"]
    )
    .unwrap();
    pub static ref ACTIVE_CALLS: IntGauge = register_int_gauge!(
        "vcr_active_calls",
        "Calls currently assigned to a pod by this replica's accounting"
    )
    .unwrap();
    pub static ref POOL_AVAILABLE: IntGaugeVec = register_int_gauge_vec!(
        "vcr_pool_available",
        "Pods currently available for allocation, by tier",
        &["tier"]
    )
    .unwrap();
    pub static ref POOL_ASSIGNED: IntGaugeVec = register_int_gauge_vec!(
        "vcr_pool_assigned",
        "Pods bound to each tier, available or not",
        &["tier"]
    )
    .unwrap();
    pub static ref ZOMBIES_RECOVERED_TOTAL: IntCounter = register_int_counter!(
        "vcr_zombies_recovered_total",
        "Pods re-added to an available pool by zombie recovery"
    )
    .unwrap();
    pub static ref RECONCILE_RUNS_TOTAL: IntCounter = register_int_counter!(
        "vcr_reconcile_runs_total",
        "Completed reconciler passes"
    )
    .unwrap();
    pub static ref ORPHAN_CALLS_CLEANED_TOTAL: IntCounter = register_int_counter!(
        "vcr_orphan_calls_cleaned_total",
        "Call records torn down because their pod vanished mid-call"
    )
    .unwrap();
    pub static ref STORE_UP: IntGauge = register_int_gauge!(
        "vcr_store_up",
        "Whether the most recent store health probe succeeded"
    )
    .unwrap();
}
