//! The recovery boundary.
//!
//! Faults escalate out of the composed pipeline instead of being rendered.
//! [`recover`] is the place they land: it runs a handler, catches both
//! escalated faults and panics, logs them, and turns them into a
//! `500 Internal Server Error` unless a status is already committed.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use http::StatusCode;
use tracing::error;

use crate::context::Context;
use crate::handler::Handler;

/// Runs `handler` and absorbs anything it escalates.
pub fn recover(handler: &dyn Handler, ctx: &mut Context) {
    match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(ctx))) {
        Ok(Ok(())) => return,
        Ok(Err(fault)) => {
            error!(method = %ctx.request.method(), uri = %ctx.request.uri(), %fault, "request fault");
        }
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            error!(method = %ctx.request.method(), uri = %ctx.request.uri(), reason, "handler panicked");
        }
    }

    if !ctx.response.is_committed() {
        ctx.response.write_status(StatusCode::INTERNAL_SERVER_ERROR);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
