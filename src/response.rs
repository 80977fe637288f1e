//! The response sink handlers write into.
//!
//! [`ResponseWriter`] follows the familiar writer discipline: the first status
//! write commits the status, and writing body bytes before any status commits
//! `200 OK`. Nothing reaches the wire until the server glue converts the
//! writer into an `http::Response` after the whole chain has returned.

use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use tracing::warn;

/// Per-request response sink: status, headers and a buffered body.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
    body_writes: usize,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }

    /// Replaces any existing values of `name`.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Commits the status code. Only the first call has an effect.
    pub fn write_status(&mut self, status: StatusCode) {
        match self.status {
            None => self.status = Some(status),
            Some(committed) => {
                warn!(%committed, ignored = %status, "superfluous write_status call");
            }
        }
    }

    /// Appends body bytes, committing `200 OK` first if no status was written.
    pub fn write(&mut self, bytes: &[u8]) {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.put_slice(bytes);
        self.body_writes += 1;
    }

    /// The committed status, if any.
    pub fn status(&self) -> Option<StatusCode> { self.status }

    /// `true` once a status has been committed.
    pub fn is_committed(&self) -> bool { self.status.is_some() }

    pub fn body(&self) -> &[u8] { &self.body }

    /// Number of [`write`](Self::write) calls so far.
    pub fn body_writes(&self) -> usize { self.body_writes }

    /// Converts the sink into an HTTP response. An uncommitted writer becomes
    /// `200 OK` with an empty body.
    pub fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body.freeze()));
        *res.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *res.headers_mut() = self.headers;
        res
    }
}

/// Lets serializers and `write!` stream straight into the body.
impl io::Write for ResponseWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ResponseWriter::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
