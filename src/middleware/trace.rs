//! Access logging.
//!
//! One `info` event per request with method, URI, status and latency,
//! emitted after the downstream chain returns. Escalated faults are logged at
//! `warn` and passed on untouched; deciding the final response is the
//! recovery boundary's job.

use std::sync::Arc;
use std::time::Instant;

use http::StatusCode;
use tracing::{info, warn};

use super::Middleware;
use super::request_id::REQUEST_ID_HEADER;
use crate::context::Context;
use crate::error::Outcome;
use crate::handler::{BoxedHandler, Handler};

/// Per-request access log middleware.
#[derive(Debug, Clone, Copy, Default)]
pub struct Trace;

impl Middleware for Trace {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Traced(next))
    }
}

struct Traced(BoxedHandler);

impl Handler for Traced {
    fn handle(&self, ctx: &mut Context) -> Outcome {
        let start = Instant::now();
        let method = ctx.request.method().clone();
        let uri = ctx.request.uri().clone();

        let outcome = self.0.handle(ctx);

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        let request_id = ctx.request.header(REQUEST_ID_HEADER);
        match &outcome {
            Ok(()) => {
                let status = ctx.response.status().unwrap_or(StatusCode::OK);
                info!(%method, %uri, status = status.as_u16(), elapsed_ms, request_id, "request");
            }
            Err(fault) => {
                warn!(%method, %uri, elapsed_ms, request_id, %fault, "request escalated");
            }
        }
        outcome
    }
}
