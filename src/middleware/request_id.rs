//! Request ID middleware.
//!
//! Makes sure every request carries an `x-request-id` header before the rest
//! of the chain runs, and mirrors it on the response so clients can correlate
//! their calls with server logs. New IDs are UUID v7: time-ordered and
//! globally unique without coordination.

use std::sync::Arc;

use http::header::{HeaderName, HeaderValue};
use tracing::warn;
use uuid::Uuid;

use super::Middleware;
use crate::context::Context;
use crate::error::Outcome;
use crate::handler::{BoxedHandler, Handler};

/// The header used for request ID propagation.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Assigns request IDs.
///
/// By default an ID supplied by the caller is kept. Use
/// [`RequestId::always_generate`] at a trust boundary where incoming IDs must
/// not be reused.
#[derive(Debug, Clone, Copy)]
pub struct RequestId {
    trust_incoming: bool,
}

impl RequestId {
    pub fn new() -> Self {
        Self { trust_incoming: true }
    }

    pub fn always_generate() -> Self {
        Self { trust_incoming: false }
    }
}

impl Default for RequestId {
    fn default() -> Self { Self::new() }
}

impl Middleware for RequestId {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Assign { trust_incoming: self.trust_incoming, next })
    }
}

struct Assign {
    trust_incoming: bool,
    next: BoxedHandler,
}

impl Handler for Assign {
    fn handle(&self, ctx: &mut Context) -> Outcome {
        let name = HeaderName::from_static(REQUEST_ID_HEADER);
        let incoming = ctx
            .request
            .headers()
            .get(&name)
            .filter(|v| self.trust_incoming && !v.is_empty())
            .cloned();

        let id = match incoming {
            Some(id) => id,
            None => match HeaderValue::try_from(Uuid::now_v7().to_string()) {
                Ok(id) => id,
                Err(e) => {
                    warn!("could not encode request id: {e}");
                    return self.next.handle(ctx);
                }
            },
        };

        ctx.request.headers_mut().insert(name.clone(), id.clone());
        ctx.response.set_header(name, id);
        self.next.handle(ctx)
    }
}
