pub use error_derive::VcrError;
pub use httpcode;
pub use httpcode::{HttpCode, Status};
pub use kind::Kind;
use rocket::request::Request;
use rocket::response::Responder;
use serde::{Serialize, Serializer};
use serde_json::{json, to_string_pretty};
pub use thiserror;
pub use thiserror::Error;

/// A VcrError is the trait to which every error returned by any VCR (Voice
/// Call Router) component MUST adhere.
///
/// The easiest way to implement this error type is to use the derive macros
/// re-exported by this library. Notably, [Error](thiserror::Error),
/// [VcrError](error-derive::VcrError), [HttpCode](httpcode::HttpCode), and
/// [Kind](kind::Kind). [Debug](std::fmt::Debug) is required to fulfill the
/// standard library [Error](std::error::Error).
///
/// ```
/// use error::*;
///
/// #[derive(Error, VcrError, HttpCode, Kind, Debug)]
/// #[error(
/// "This is the string that will show up in the 'message' key of the \
/// resulting JSON. You can also (and should) interpolate data members into \
/// this string. For example, here is some {info} about this {action}!"
/// )]
/// #[code(Status::BadRequest)]
/// struct MyError {
///     action: String,
///     info: String,
///     // Any aggregated error type that is annotated as a source will be
///     // formatted and serialized into the 'cause' key of the resulting JSON.
///     #[source]
///     cause: std::io::Error,
/// }
/// ```
pub trait VcrError: std::error::Error + HttpCode + Kind + Send + Sync {}

/// This conversion supports the automatic boxing of any type that
/// implements [VcrError](crate::VcrError).
///
/// Note that this conversion results in a heap allocated error type with
/// dynamic dispatch (that is, it behaves more like an interface
/// object would in Java or Go).
impl<T: 'static + VcrError> From<T> for Box<dyn VcrError> {
    fn from(err: T) -> Self {
        Box::new(err)
    }
}

/// The [Serialize](serde::Serialize) trait implementation for a
/// [VcrError](crate::VcrError) is a JSON object of the following shape.
///
/// ```ignore
/// {
///     "kind": "MyError",
///     "message": "The human readable rendering of the error.",
///     "cause": "The rendering of the #[source] error, if any."
/// }
/// ```
impl Serialize for Box<dyn VcrError> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        json!({
            "kind": self.kind(),
            "message": format!("{}", self),
            "cause": self.source().map(|cause| format!("{}", cause)),
        })
        .serialize(serializer)
    }
}

/// The [Responder](rocket::response::Responder) implementation for a
/// [VcrError](crate::VcrError) does three things:
///
/// 1. Sets the content type to JSON.
/// 2. Sets the HTTP status to the status declared in the error's
///    `#[code(..)]` annotation.
/// 3. Serializes the error and sends the resulting bytes over the wire.
///
/// The resulting serialization is the following schema.
///
/// ```ignore
/// {
///     "success": false,
///     "error": <See [VcrError::serialize](crate::VcrError::serialize)>
/// }
/// ```
impl<'r, 'o: 'r> Responder<'r, 'o> for Box<dyn VcrError> {
    fn respond_to(self, _: &'r Request<'_>) -> rocket::response::Result<'o> {
        let mut response = rocket::Response::build();
        response.header(rocket::http::ContentType::JSON);
        response.status(self.http_code());
        let json = json!({
            "success": false,
            "error": self,
        });
        // @TODO it MIGHT be possible to fail here? No idea how. If so, can
        // read the error here and return that instead. I just have no idea
        // what could ever cause it.
        let json =
            to_string_pretty(&json).unwrap_or_else(|_| panic!("failed to pretty print {}", json));
        response.sized_body(json.len(), std::io::Cursor::new(json));
        Ok(response.finalize())
    }
}

/// A `StringError` is a convenient way to convert a raw String type into a
/// first class VcrError. This is especially useful when you would like to
/// embed a raw string as the [source](std::error::Error::source) for a
/// higher VcrError.
///
/// The raw string, as is, is used as the [display](std::fmt::Display) for
/// this type.
///
/// ```
/// use error::*;
///
/// #[derive(Error, VcrError, Kind, HttpCode, Debug)]
/// #[code(Status::InternalServerError)]
/// #[error("Something rather bad happened, and this is the gentle explanation.")]
/// struct HigherError {
///     #[source]
///     cause: StringError
/// }
///
/// fn do_work() -> Result<(), HigherError> {
///     Err(HigherError{cause: "and this is the gnarly explanation".into()})
/// }
/// ```
#[derive(Error, VcrError, Kind, HttpCode, Debug)]
#[code(Status::InternalServerError)]
#[error("{inner}")]
pub struct StringError {
    inner: String,
}

impl<T: AsRef<str>> From<T> for StringError {
    fn from(inner: T) -> Self {
        Self {
            inner: inner.as_ref().to_string(),
        }
    }
}

impl From<Box<dyn VcrError>> for StringError {
    fn from(inner: Box<dyn VcrError>) -> Self {
        Self {
            inner: format!("{:?}", inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::get;
    use rocket::local::blocking::Client;
    use rocket::routes;

    #[derive(VcrError, Error, Kind, HttpCode, Debug)]
    #[error("Nice catch Blanco Niño")]
    #[code(rocket::http::Status::BadGateway)]
    struct TooBad {}

    #[get("/")]
    async fn fail_without_cause() -> std::result::Result<(), Box<dyn VcrError>> {
        Err(TooBad {}.into())
    }

    #[test]
    fn without_cause() {
        let client =
            Client::tracked(rocket::build().mount("/", routes![fail_without_cause])).unwrap();
        let response = client.get("/").dispatch();
        assert_eq!(response.status(), rocket::http::Status::BadGateway);
        let got: serde_json::Value = response.into_json().unwrap();
        let want = serde_json::json!({
            "success": false,
            "error": {
                "kind": "TooBad",
                "message": "Nice catch Blanco Niño",
                "cause": null
            }
        });
        assert_eq!(got, want)
    }

    #[derive(VcrError, Error, Kind, HttpCode, Debug)]
    #[error("You got sacked")]
    #[code(rocket::http::Status::NotFound)]
    struct TooBadWithCause {
        #[from]
        bad_guy: TooBad,
    }

    #[get("/")]
    async fn fail_with_cause() -> std::result::Result<(), Box<dyn VcrError>> {
        Err(TooBadWithCause::from(TooBad {}).into())
    }

    #[test]
    fn with_cause() {
        let client = Client::tracked(rocket::build().mount("/", routes![fail_with_cause])).unwrap();
        let response = client.get("/").dispatch();
        assert_eq!(response.status(), rocket::http::Status::NotFound);
        let got: serde_json::Value = response.into_json().unwrap();
        let want = serde_json::json!({
            "success": false,
            "error": {
                "kind": "TooBadWithCause",
                "message": "You got sacked",
                "cause": "Nice catch Blanco Niño"
            }
        });
        assert_eq!(got, want)
    }
}
