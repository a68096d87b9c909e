use rocket::request::Request;
use rocket::response::Responder;
use serde::Serialize;
use serde_json::to_string_pretty;

/// A Response may be constructed from any type that implements
/// [Serialize](serde::Serialize).
///
/// Once constructed, the resulting Response may be returned to the HTTP
/// framework where it will handle tasks such as setting content headers,
/// serializing your data, and setting the HTTP response code.
///
/// Telephony providers and the router's own clients all expect flat JSON
/// bodies, so the payload is serialized as-is with no enclosing envelope.
/// Payload types are expected to carry their own `success` field where the
/// API schema calls for one.
///
/// The following is an example usage.
///
/// ```
/// use serde::Serialize;
/// use response::Response;
/// use result::Result;
/// use rocket::get;
///
/// #[derive(Serialize)]
/// struct Checked {
///     success: bool,
/// }
///
/// #[get("/")]
/// async fn check() -> Result<Response<Checked>> {
///     Ok(Checked { success: true }.into())
/// }
/// ```
pub struct Response<T> {
    payload: T,
}

/// A Response may be constructed from any type that implements
/// [Serialize](serde::Serialize) due to this blanket implementation.
impl<T: Serialize> From<T> for Response<T> {
    fn from(payload: T) -> Self {
        Self { payload }
    }
}

/// The [Responder](rocket::response::Responder) implementation for a
/// [Response](crate::Response) does three things:
///
/// 1. Sets the content type to JSON.
/// 2. Sets the HTTP status to 200 (OK).
/// 3. Serializes the aggregated data and sends the resulting bytes over
///    the wire.
impl<'r, 'o: 'r, T: Serialize> Responder<'r, 'o> for Response<T> {
    fn respond_to(self, _: &'r Request<'_>) -> rocket::response::Result<'o> {
        let mut response = rocket::Response::build();
        response.header(rocket::http::ContentType::JSON);
        response.status(rocket::http::Status::Ok);
        let json = match to_string_pretty(&self.payload) {
            Ok(json) => json,
            Err(_) => return Err(rocket::http::Status::InternalServerError),
        };
        response.sized_body(json.len(), std::io::Cursor::new(json));
        Ok(response.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use result::Result;
    use rocket::get;
    use rocket::local::blocking::Client;
    use rocket::routes;

    #[derive(Serialize)]
    struct Allocation {
        success: bool,
        pod_name: String,
        source_pool: String,
    }

    #[get("/")]
    async fn allocate() -> Result<Response<Allocation>> {
        Ok(Allocation {
            success: true,
            pod_name: "voice-agent-0".to_string(),
            source_pool: "pool:gold".to_string(),
        }
        .into())
    }

    #[test]
    fn flat_body() {
        let client = Client::tracked(rocket::build().mount("/", routes![allocate])).unwrap();
        let response = client.get("/").dispatch();
        assert_eq!(response.status(), rocket::http::Status::Ok);
        let got: serde_json::Value = response.into_json().unwrap();
        let want = serde_json::json!({
            "success": true,
            "pod_name": "voice-agent-0",
            "source_pool": "pool:gold"
        });
        assert_eq!(got, want)
    }
}
