use crate::allocator::{self, AllocateRequest};
use crate::{api, wsurl};
use response::Response;
use result::Result;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};

/// Unknown fields are ignored, and everything except the call identifier is
/// optional.
#[derive(Deserialize)]
pub struct AllocateBody {
    #[serde(default)]
    call_sid: String,
    #[serde(default)]
    merchant_id: Option<String>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    flow: Option<String>,
    #[serde(default)]
    template: Option<String>,
}

#[derive(Serialize)]
pub struct AllocateReply {
    success: bool,
    pod_name: String,
    ws_url: String,
    source_pool: String,
    was_existing: bool,
}

/// `POST /api/v1/allocate` — assign a pod to a call and return its
/// WebSocket URL. Idempotent by `call_sid` for as long as the call record
/// lives.
///
/// ```text
/// curl -X POST http://vcr.voice/api/v1/allocate \
///     -H 'Content-Type: application/json' \
///     -d '{"call_sid": "CA123", "merchant_id": "acme"}'
/// ```
#[post("/allocate", data = "<body>")]
pub async fn allocate(body: Json<AllocateBody>) -> Result<Response<AllocateReply>> {
    let body = body.into_inner();
    let store = crate::store();
    let allocation = api::with_deadline(allocator::allocate(
        &store,
        AllocateRequest {
            call_sid: &body.call_sid,
            merchant_id: body.merchant_id.as_deref(),
            provider: body.provider.as_deref().unwrap_or(wsurl::DEFAULT_PROVIDER),
            flow: body.flow.as_deref().unwrap_or(wsurl::DEFAULT_FLOW),
            template: body.template.as_deref().unwrap_or(wsurl::DEFAULT_TEMPLATE),
        },
    ))
    .await?;
    Ok(AllocateReply {
        success: true,
        pod_name: allocation.pod_name,
        ws_url: allocation.ws_url,
        source_pool: allocation.source_pool,
        was_existing: allocation.was_existing,
    }
    .into())
}
