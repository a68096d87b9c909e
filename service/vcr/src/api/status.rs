//! The observability surface: pool status, per-pod inspection, liveness,
//! readiness, and the Prometheus exposition.

use crate::tiers::{self, TierKind};
use crate::{manager, metrics};
use error::*;
use prometheus::{Encoder, TextEncoder};
use response::Response;
use result::Result;
use rocket::http::ContentType;
use serde::Serialize;
use std::collections::BTreeMap;
use store::StoreKey;

#[derive(Serialize)]
pub struct PoolStatus {
    kind: &'static str,
    available: u64,
    assigned: u64,
}

#[derive(Serialize)]
pub struct StatusReply {
    pools: BTreeMap<String, PoolStatus>,
    active_calls: i64,
    is_leader: bool,
    status: &'static str,
}

/// `GET /api/v1/status` — one pool-by-pool snapshot of the router's world.
#[get("/status")]
pub async fn status() -> Result<Response<StatusReply>> {
    let store = crate::store();
    let table = tiers::snapshot().await;
    let mut pools = BTreeMap::new();
    for (tier, spec) in &table.tiers {
        let available_key = store.key(StoreKey::PoolAvailable(tier));
        let available = match spec.kind {
            TierKind::Exclusive => store.scard(&available_key).await?,
            TierKind::Shared => store.zcard(&available_key).await?,
        };
        let assigned = store.scard(&store.key(StoreKey::PoolAssigned(tier))).await?;
        pools.insert(
            tier.clone(),
            PoolStatus {
                kind: spec.kind.as_str(),
                available,
                assigned,
            },
        );
    }
    for name in table.merchant_tiers.keys() {
        let id = name.strip_prefix("merchant:").unwrap_or(name);
        pools.insert(
            name.clone(),
            PoolStatus {
                kind: TierKind::Exclusive.as_str(),
                available: store
                    .scard(&store.key(StoreKey::MerchantAvailable(id)))
                    .await?,
                assigned: store
                    .scard(&store.key(StoreKey::MerchantAssigned(id)))
                    .await?,
            },
        );
    }
    Ok(StatusReply {
        pools,
        active_calls: metrics::ACTIVE_CALLS.get(),
        is_leader: manager::is_leader(),
        status: "ok",
    }
    .into())
}

#[derive(Serialize)]
pub struct PodReply {
    pod_name: String,
    tier: String,
    is_draining: bool,
    has_active_lease: bool,
    lease_call_sid: Option<String>,
}

/// `GET /api/v1/pod/<pod_name>` — everything the store knows about one pod.
#[get("/pod/<pod_name>")]
pub async fn pod(pod_name: String) -> Result<Response<PodReply>> {
    let store = crate::store();
    let tier = match store.get(&store.key(StoreKey::PodTier(&pod_name))).await? {
        Some(tier) => tier,
        None => {
            return Err(PodNotFound {
                pod_name: pod_name.clone(),
            }
            .into())
        }
    };
    let is_draining = store.exists(&store.key(StoreKey::Draining(&pod_name))).await?;
    let lease_call_sid = store.get(&store.key(StoreKey::Lease(&pod_name))).await?;
    Ok(PodReply {
        pod_name,
        tier,
        is_draining,
        has_active_lease: lease_call_sid.is_some(),
        lease_call_sid,
    }
    .into())
}

#[derive(Serialize)]
pub struct HealthReply {
    status: &'static str,
}

/// `GET /api/v1/health` — liveness. Always ok: a replica that can answer at
/// all is alive.
#[get("/health")]
pub async fn health() -> Response<HealthReply> {
    HealthReply { status: "ok" }.into()
}

/// `GET /api/v1/ready` — readiness. A replica that cannot reach the store
/// cannot route calls and must be taken out of the load balancer.
#[get("/ready")]
pub async fn ready() -> Result<Response<HealthReply>> {
    if let Err(err) = crate::store().ping().await {
        return Err(StoreNotReady {
            cause: format!("{}", err).into(),
        }
        .into());
    }
    Ok(HealthReply { status: "ready" }.into())
}

/// `GET /api/v1/metrics` — Prometheus text exposition.
#[get("/metrics")]
pub fn metrics_exposition() -> (ContentType, String) {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buffer) {
        warn!("Metric encoding failed: {}", err);
    }
    (
        ContentType::Plain,
        String::from_utf8(buffer).unwrap_or_default(),
    )
}

#[derive(Error, VcrError, HttpCode, Kind, Debug)]
#[code(Status::NotFound)]
#[error("The store has no tier binding for pod {pod_name}; it is not (or no longer) managed by this router.")]
pub struct PodNotFound {
    pod_name: String,
}

#[derive(Error, VcrError, HttpCode, Kind, Debug)]
#[code(Status::ServiceUnavailable)]
#[error("The backing store did not answer a ping; this replica cannot route calls right now.")]
pub struct StoreNotReady {
    #[source]
    cause: StringError,
}
