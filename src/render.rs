//! Content-negotiated result rendering.
//!
//! A [`Render`] pairs a result with the status code to send. Writing it picks
//! a wire format from the request's `Accept` header, serializes, and commits
//! the response. It is a [`Handler`], so it can be returned from a
//! [`Decide`](crate::Decide) as the effect of an action:
//!
//! ```rust
//! use braid::{Action, Context, Endpoint, Render};
//! use http::StatusCode;
//!
//! let hello = Endpoint::action(|_ctx: &mut Context| {
//!     Action::new(Render::new("Hello world", StatusCode::OK))
//! });
//! ```
//!
//! | Negotiated | Body |
//! |---|---|
//! | `application/json` | compact JSON |
//! | `text/json` | JSON, 4-space indent |
//! | `application/xml` | compact XML |
//! | `text/xml` | XML, 4-space indent |
//!
//! Anything else, or no `Accept` header at all, gets compact JSON.

use http::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use http::StatusCode;
use serde::Serialize;

use crate::context::Context;
use crate::error::{Fault, Outcome};
use crate::handler::Handler;
use crate::negotiate::negotiate;

/// Media types offered during negotiation, most preferred first.
pub const SUPPORTED: [&str; 4] = ["application/json", "text/json", "application/xml", "text/xml"];

/// Returned when nothing in `Accept` matches.
pub const DEFAULT_MEDIA_TYPE: &str = "application/json";

// ── Format ────────────────────────────────────────────────────────────────────

/// A supported wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,       // application/json
    PrettyJson, // text/json
    Xml,        // application/xml
    PrettyXml,  // text/xml
}

impl Format {
    pub fn media_type(self) -> &'static str {
        match self {
            Self::Json       => "application/json",
            Self::PrettyJson => "text/json",
            Self::Xml        => "application/xml",
            Self::PrettyXml  => "text/xml",
        }
    }

    /// The `Content-Type` sent with a body in this format.
    pub fn content_type(self) -> HeaderValue {
        HeaderValue::from_static(match self {
            Self::Json       => "application/json;charset=utf-8",
            Self::PrettyJson => "text/json;charset=utf-8",
            Self::Xml        => "application/xml;charset=utf-8",
            Self::PrettyXml  => "text/xml;charset=utf-8",
        })
    }

    pub fn from_media_type(media: &str) -> Option<Self> {
        match media {
            "application/json" => Some(Self::Json),
            "text/json"        => Some(Self::PrettyJson),
            "application/xml"  => Some(Self::Xml),
            "text/xml"         => Some(Self::PrettyXml),
            _                  => None,
        }
    }

    /// Negotiates a format for a request with these headers.
    pub fn negotiate(headers: &HeaderMap) -> Self {
        Self::from_media_type(negotiate(headers, &SUPPORTED, DEFAULT_MEDIA_TYPE)).unwrap_or(Self::Json)
    }

    /// Serializes `value`. `root` names the XML document element and is
    /// ignored for JSON.
    pub fn encode<T: Serialize + ?Sized>(self, value: &T, root: &str) -> Result<Vec<u8>, Fault> {
        let fail = |e: &dyn std::fmt::Display| Fault::encode(self.media_type(), e);
        match self {
            Self::Json => serde_json::to_vec(value).map_err(|e| fail(&e)),
            Self::PrettyJson => {
                let mut out = Vec::new();
                let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
                let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
                value.serialize(&mut ser).map_err(|e| fail(&e))?;
                Ok(out)
            }
            Self::Xml | Self::PrettyXml => {
                let mut out = String::new();
                let mut ser = quick_xml::se::Serializer::with_root(&mut out, Some(root)).map_err(|e| fail(&e))?;
                if self == Self::PrettyXml {
                    ser.indent(' ', 4);
                }
                value.serialize(ser).map_err(|e| fail(&e))?;
                Ok(out.into_bytes())
            }
        }
    }
}

/// Derives an XML element name from a Rust type name: `my::Greeting<u8>`
/// becomes `Greeting`; `&str` and `String` become `string`. Falls back to
/// `value`.
fn xml_root<T: ?Sized>() -> &'static str {
    let name = std::any::type_name::<T>();
    let name = name.split('<').next().unwrap_or(name);
    let name = name.rsplit("::").next().unwrap_or(name);
    let name = name.trim_start_matches('&').trim_start_matches("mut ");
    if matches!(name, "str" | "String") {
        return "string";
    }

    let valid = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid { name } else { "value" }
}

// ── Render ────────────────────────────────────────────────────────────────────

/// What a [`Render`] holds.
#[derive(Debug, Clone)]
pub enum Payload<T> {
    /// No body: only the status is written.
    Absent,
    Value(T),
    /// Escalated instead of rendered.
    Failure(Fault),
}

/// A result value plus the status code to send with it.
#[derive(Debug, Clone)]
pub struct Render<T> {
    payload: Payload<T>,
    status: StatusCode,
    root: Option<&'static str>,
}

impl<T> Render<T> {
    pub fn new(value: T, status: StatusCode) -> Self {
        Self { payload: Payload::Value(value), status, root: None }
    }

    pub fn from_option(value: Option<T>, status: StatusCode) -> Self {
        let payload = value.map_or(Payload::Absent, Payload::Value);
        Self { payload, status, root: None }
    }

    /// `Err` values are escalated rather than rendered.
    pub fn from_result<E>(value: Result<T, E>, status: StatusCode) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match value {
            Ok(value) => Self::new(value, status),
            Err(err) => Self::failure(Fault::escalate(err)),
        }
    }

    pub fn failure(fault: Fault) -> Self {
        Self { payload: Payload::Failure(fault), status: StatusCode::INTERNAL_SERVER_ERROR, root: None }
    }

    /// Overrides the XML document element name.
    pub fn root(mut self, name: &'static str) -> Self {
        self.root = Some(name);
        self
    }

    pub fn payload(&self) -> &Payload<T> { &self.payload }
    pub fn status(&self) -> StatusCode { self.status }
}

impl Render<()> {
    /// Status only, no body.
    pub fn empty(status: StatusCode) -> Self {
        Self { payload: Payload::Absent, status, root: None }
    }
}

impl<T: Serialize> Render<T> {
    /// Writes the result into `ctx.response`.
    ///
    /// On success exactly one status write and one body write happen. On
    /// failure, whether an escalated value or an encoding error, the response
    /// is left untouched and the fault is returned.
    pub fn write(&self, ctx: &mut Context) -> Outcome {
        let value = match &self.payload {
            Payload::Absent => {
                ctx.response.write_status(self.status);
                return Ok(());
            }
            Payload::Failure(fault) => return Err(fault.clone()),
            Payload::Value(value) => value,
        };

        let format = Format::negotiate(ctx.request.headers());
        let root = self.root.unwrap_or_else(xml_root::<T>);
        let body = format.encode(value, root)?;

        ctx.response.set_header(CONTENT_TYPE, format.content_type());
        ctx.response.write_status(self.status);
        ctx.response.write(&body);
        Ok(())
    }
}

impl<T> Handler for Render<T>
where
    T: Serialize + Send + Sync + 'static,
{
    fn handle(&self, ctx: &mut Context) -> Outcome {
        self.write(ctx)
    }
}
