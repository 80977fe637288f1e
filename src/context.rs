//! Per-request context.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::request::Request;
use crate::response::ResponseWriter;

/// Execution scope inherited from the caller: cancellation and an optional
/// deadline.
///
/// braid only threads the scope through the chain. Whoever builds the
/// [`Context`] decides what the token and deadline mean; handlers that do long
/// work are expected to check them.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope that is cancelled whenever `token` is.
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self { cancellation: token, deadline: None }
    }

    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline_at(Instant::now() + timeout)
    }

    /// A child scope: cancelled with its parent, but cancelling it does not
    /// touch the parent. The deadline is inherited.
    pub fn child(&self) -> Self {
        Self { cancellation: self.cancellation.child_token(), deadline: self.deadline }
    }

    pub fn cancellation(&self) -> &CancellationToken { &self.cancellation }
    pub fn deadline(&self) -> Option<Instant> { self.deadline }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Time left before the deadline. `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// `true` once cancelled or past the deadline.
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Everything a handler sees for one request.
///
/// Built once per request by the transport glue and passed by `&mut` through
/// the whole chain. Fields are public so split-shape handlers can borrow the
/// pieces independently.
#[derive(Debug, Default)]
pub struct Context {
    pub scope: Scope,
    pub request: Request,
    pub response: ResponseWriter,
}

impl Context {
    pub fn new(scope: Scope, request: Request) -> Self {
        Self { scope, request, response: ResponseWriter::new() }
    }
}
