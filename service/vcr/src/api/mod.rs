//! The HTTP plumbing shared by every endpoint: request ids, access logging,
//! the per-request deadline, and the catchers that keep error bodies in the
//! standard envelope no matter how a request dies.

pub mod allocate;
pub mod drain;
pub mod release;
pub mod status;
pub mod telephony;

use crate::env;
use error::{Error, HttpCode, Kind, Status, VcrError};
use result::Result;
use rocket::fairing::{Fairing, Info, Kind as FairingKind};
use rocket::http::Header;
use rocket::{Data, Request, Response};
use std::future::Future;
use std::time::Instant;

struct Stamp {
    id: String,
    started: Instant,
}

/// Stamps every request with a UUID (surfaced as `X-Request-Id`) and writes
/// one access log line per response.
pub struct RequestStamp;

#[rocket::async_trait]
impl Fairing for RequestStamp {
    fn info(&self) -> Info {
        Info {
            name: "Request ids and access logging",
            kind: FairingKind::Request | FairingKind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        request.local_cache(|| Stamp {
            id: uuid::Uuid::new_v4().to_string(),
            started: Instant::now(),
        });
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let stamp = request.local_cache(|| Stamp {
            id: "unstamped".to_string(),
            started: Instant::now(),
        });
        response.set_header(Header::new("X-Request-Id", stamp.id.clone()));
        info!(
            "{} {} {} -> {} in {:?}",
            stamp.id,
            request.method(),
            request.uri(),
            response.status(),
            stamp.started.elapsed()
        );
    }
}

/// Applies the uniform request deadline to a store-touching handler body. A
/// request that outlives the deadline may still have mutated the store; the
/// placeholder lock's TTL is the reclamation path for that.
pub async fn with_deadline<T, W>(work: W) -> Result<T>
where
    W: Future<Output = Result<T>>,
{
    match tokio::time::timeout(env::request_timeout(), work).await {
        Ok(outcome) => outcome,
        Err(_) => Err(RequestTimedOut {}.into()),
    }
}

#[derive(Error, VcrError, HttpCode, Kind, Debug)]
#[code(Status::InternalServerError)]
#[error(
    "The request exceeded its deadline while waiting on the store. Any \
partial state it left behind will be reclaimed by TTL within seconds."
)]
pub struct RequestTimedOut {}

#[derive(Error, VcrError, HttpCode, Kind, Debug)]
#[code(Status::BadRequest)]
#[error(
    "The request body could not be parsed. Endpoints under /api/v1 take \
JSON bodies (or provider form payloads on the telephony webhooks); please \
check the request against the API documentation."
)]
pub struct BadBody {}

#[derive(Error, VcrError, HttpCode, Kind, Debug)]
#[code(Status::NotFound)]
#[error("There is no such route. All endpoints live under /api/v1.")]
pub struct NoSuchRoute {}

#[derive(Error, VcrError, HttpCode, Kind, Debug)]
#[code(Status::InternalServerError)]
#[error(
    "The router hit an unexpected internal error while serving this \
request. The failure has been logged with a stack trace; please report it \
along with your X-Request-Id."
)]
pub struct Internal {}

#[catch(400)]
pub fn bad_request() -> Box<dyn VcrError> {
    BadBody {}.into()
}

#[catch(422)]
pub fn unprocessable() -> Box<dyn VcrError> {
    BadBody {}.into()
}

#[catch(404)]
pub fn not_found() -> Box<dyn VcrError> {
    NoSuchRoute {}.into()
}

#[catch(500)]
pub fn internal() -> Box<dyn VcrError> {
    Internal {}.into()
}
