use crate::{api, releaser};
use response::Response;
use result::Result;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct ReleaseBody {
    #[serde(default)]
    call_sid: String,
}

#[derive(Serialize)]
pub struct ReleaseReply {
    success: bool,
    pod_name: String,
    released_to_pool: String,
    was_draining: bool,
}

/// `POST /api/v1/release` — return a call's capacity to its pool and tear
/// down the call record. Releasing a call that is already gone returns 404,
/// which clients treat as success.
///
/// ```text
/// curl -X POST http://vcr.voice/api/v1/release \
///     -H 'Content-Type: application/json' \
///     -d '{"call_sid": "CA123"}'
/// ```
#[post("/release", data = "<body>")]
pub async fn release(body: Json<ReleaseBody>) -> Result<Response<ReleaseReply>> {
    let body = body.into_inner();
    let store = crate::store();
    let released = api::with_deadline(releaser::release(&store, &body.call_sid)).await?;
    Ok(ReleaseReply {
        success: true,
        pod_name: released.pod_name,
        released_to_pool: released.released_to_pool,
        was_draining: released.was_draining,
    }
    .into())
}
