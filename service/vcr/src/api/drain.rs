use crate::{api, drainer};
use response::Response;
use result::Result;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct DrainBody {
    #[serde(default)]
    pod_name: String,
}

#[derive(Serialize)]
pub struct DrainReply {
    success: bool,
    pod_name: String,
    has_active_call: bool,
    message: String,
}

/// `POST /api/v1/drain` — stop routing new calls to a pod while letting its
/// in-flight work finish. The flag self-expires, so a drained pod that is
/// never deleted eventually rejoins its pool.
///
/// ```text
/// curl -X POST http://vcr.voice/api/v1/drain \
///     -H 'Content-Type: application/json' \
///     -d '{"pod_name": "voice-agent-3"}'
/// ```
#[post("/drain", data = "<body>")]
pub async fn drain(body: Json<DrainBody>) -> Result<Response<DrainReply>> {
    let body = body.into_inner();
    let store = crate::store();
    let drained = api::with_deadline(drainer::drain(&store, &body.pod_name)).await?;
    Ok(DrainReply {
        success: true,
        pod_name: drained.pod_name,
        has_active_call: drained.has_active_call,
        message: drained.message,
    }
    .into())
}
