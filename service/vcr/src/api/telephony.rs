//! The provider webhook endpoints. Telephony platforms POST their own form
//! or JSON envelopes at call setup and expect an XML (or minimal JSON)
//! document back — ALWAYS with a 200, even on failure, because a non-2xx
//! response makes the platform retry or play its own error tone. Failures
//! are therefore expressed in-band as a spoken apology plus hangup.

use crate::allocator::{self, AllocateRequest};
use crate::{api, wsurl};
use response::Response;
use result::Result;
use rocket::form::Form;
use rocket::http::ContentType;
use rocket::request::Request;
use rocket::response::Responder;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use term_colors::*;

/// A raw XML document responder: content type XML, status 200.
pub struct Xml(pub String);

impl<'r, 'o: 'r> Responder<'r, 'o> for Xml {
    fn respond_to(self, _: &'r Request<'_>) -> rocket::response::Result<'o> {
        let mut response = rocket::Response::build();
        response.header(ContentType::XML);
        response.status(rocket::http::Status::Ok);
        response.sized_body(self.0.len(), std::io::Cursor::new(self.0));
        Ok(response.finalize())
    }
}

/// Minimal XML escaping for text nodes and attribute values.
fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn twiml_stream(ws_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response><Connect><Stream url="{}"/></Connect></Response>"#,
        escape(ws_url)
    )
}

fn twiml_reject() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<Response><Say>We are unable to connect your call right now. Please try again in a few minutes.</Say><Hangup/></Response>"#
        .to_string()
}

fn plivo_stream(ws_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response><Stream bidirectional="true" keepCallAlive="true" contentType="audio/x-mulaw;rate=8000">{}</Stream></Response>"#,
        escape(ws_url)
    )
}

fn plivo_reject() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<Response><Speak>We are unable to connect your call right now. Please try again in a few minutes.</Speak><Hangup/></Response>"#
        .to_string()
}

#[derive(FromForm)]
pub struct TwilioForm {
    #[field(name = "CallSid")]
    call_sid: String,
}

/// `POST /api/v1/twilio/allocate` — Twilio's voice webhook. Returns TwiML
/// connecting the call to the allocated pod's stream, or a spoken rejection
/// when no pod could be found.
#[post("/twilio/allocate?<merchant_id>&<flow>&<template>", data = "<form>")]
pub async fn twilio(
    merchant_id: Option<String>,
    flow: Option<String>,
    template: Option<String>,
    form: Form<TwilioForm>,
) -> Xml {
    let store = crate::store();
    let outcome = api::with_deadline(allocator::allocate(
        &store,
        AllocateRequest {
            call_sid: &form.call_sid,
            merchant_id: merchant_id.as_deref(),
            provider: "twilio",
            flow: flow.as_deref().unwrap_or(wsurl::DEFAULT_FLOW),
            template: template.as_deref().unwrap_or(wsurl::DEFAULT_TEMPLATE),
        },
    ))
    .await;
    match outcome {
        Ok(allocation) => Xml(twiml_stream(&allocation.ws_url)),
        Err(err) => {
            warn!("Rejecting Twilio call {}: {}", cyan(&form.call_sid), err);
            Xml(twiml_reject())
        }
    }
}

#[derive(FromForm)]
pub struct PlivoForm {
    #[field(name = "CallUUID")]
    call_uuid: String,
}

/// `POST /api/v1/plivo/allocate` — Plivo's answer webhook. Same contract as
/// the Twilio endpoint, in Plivo's XML dialect.
#[post("/plivo/allocate?<merchant_id>&<flow>&<template>", data = "<form>")]
pub async fn plivo(
    merchant_id: Option<String>,
    flow: Option<String>,
    template: Option<String>,
    form: Form<PlivoForm>,
) -> Xml {
    let store = crate::store();
    let outcome = api::with_deadline(allocator::allocate(
        &store,
        AllocateRequest {
            call_sid: &form.call_uuid,
            merchant_id: merchant_id.as_deref(),
            provider: "plivo",
            flow: flow.as_deref().unwrap_or(wsurl::DEFAULT_FLOW),
            template: template.as_deref().unwrap_or(wsurl::DEFAULT_TEMPLATE),
        },
    ))
    .await;
    match outcome {
        Ok(allocation) => Xml(plivo_stream(&allocation.ws_url)),
        Err(err) => {
            warn!("Rejecting Plivo call {}: {}", cyan(&form.call_uuid), err);
            Xml(plivo_reject())
        }
    }
}

#[derive(Deserialize)]
pub struct ExotelBody {
    #[serde(default, rename = "CallSid")]
    call_sid: String,
    #[serde(default)]
    merchant_id: Option<String>,
    #[serde(default)]
    flow: Option<String>,
    #[serde(default)]
    template: Option<String>,
}

#[derive(Serialize)]
pub struct ExotelReply {
    url: String,
}

/// `POST /api/v1/exotel/allocate` — Exotel's Voicebot applet asks for a
/// bare `{url}` JSON document rather than an XML verb tree. Failures here
/// DO use HTTP status codes, because the applet honors them.
#[post("/exotel/allocate", data = "<body>")]
pub async fn exotel(body: Json<ExotelBody>) -> Result<Response<ExotelReply>> {
    let body = body.into_inner();
    let store = crate::store();
    let allocation = api::with_deadline(allocator::allocate(
        &store,
        AllocateRequest {
            call_sid: &body.call_sid,
            merchant_id: body.merchant_id.as_deref(),
            provider: "exotel",
            flow: body.flow.as_deref().unwrap_or(wsurl::DEFAULT_FLOW),
            template: body
                .template
                .as_deref()
                .unwrap_or(wsurl::EXOTEL_DEFAULT_TEMPLATE),
        },
    ))
    .await?;
    Ok(ExotelReply {
        url: allocation.ws_url,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twiml_wraps_the_url() {
        let xml = twiml_stream("wss://b/ws/pod/v-0/agent/voice/breeze-buddy/twilio/callback/t/v2");
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(
            r#"<Connect><Stream url="wss://b/ws/pod/v-0/agent/voice/breeze-buddy/twilio/callback/t/v2"/></Connect>"#
        ));
    }

    #[test]
    fn twiml_rejection_hangs_up() {
        let xml = twiml_reject();
        assert!(xml.contains("<Say>"));
        assert!(xml.contains("<Hangup/>"));
    }

    #[test]
    fn plivo_stream_attributes() {
        let xml = plivo_stream("wss://b/ws");
        assert!(xml.contains(r#"bidirectional="true""#));
        assert!(xml.contains(r#"keepCallAlive="true""#));
        assert!(xml.contains(r#"contentType="audio/x-mulaw;rate=8000""#));
        assert!(xml.contains(">wss://b/ws</Stream>"));
    }

    #[test]
    fn plivo_rejection_hangs_up() {
        let xml = plivo_reject();
        assert!(xml.contains("<Speak>"));
        assert!(xml.contains("<Hangup/>"));
    }

    #[test]
    fn escaping() {
        assert_eq!(
            escape(r#"wss://b/ws?a=1&b="two"<three>"#),
            "wss://b/ws?a=1&amp;b=&quot;two&quot;&lt;three&gt;"
        );
    }
}
