//! The canonical handler contract and the handler adapter registry.
//!
//! # One contract, several shapes
//!
//! Every piece of request-handling behaviour ends up behind one trait:
//!
//! ```text
//! Handler::handle(&self, ctx: &mut Context) -> Outcome
//! ```
//!
//! Callers rarely want to write that directly, so registration accepts an
//! [`Endpoint`], a closed set of shapes. Each variant is built through a named
//! constructor and adapted once, at registration time:
//!
//! ```text
//! Endpoint::handler(h)        ← already canonical
//! Endpoint::func(|ctx| …)     ← takes the bundled Context
//! Endpoint::split(|s, w, r| …)← takes scope, response sink and request apart
//! Endpoint::native(|w, r| …)  ← transport-native: no scope, no fault channel
//! Endpoint::action(|ctx| …)   ← decides an Action, which is then applied
//! Endpoint::opaque(value)     ← resolved by an ordered series of downcasts
//!        ↓ adapt_handler
//! Arc<dyn Handler>            ← BoxedHandler, shared by every request
//! ```
//!
//! The only runtime cost per request is one virtual call per adapter layer.
//!
//! # The action-result pattern
//!
//! A [`Decide`] computes *what* to do and returns an [`Action`]; applying the
//! action performs the response write. The adapter applies the action with the
//! same [`Context`] straight away, so the two phases stay visible in the types
//! without ever leaving a request half-finished.

use std::any::Any;
use std::sync::Arc;

use crate::context::{Context, Scope};
use crate::error::{ConfigError, Fault, Outcome};
use crate::request::Request;
use crate::response::ResponseWriter;

// ── Canonical contract ────────────────────────────────────────────────────────

/// The canonical handler contract.
///
/// A handler's only observable effect is mutating `ctx.response` (or running
/// a further handler). Returning `Err` escalates a [`Fault`] to the recovery
/// boundary instead of rendering it.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, ctx: &mut Context) -> Outcome;
}

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn Handler>;

/// Return types accepted from function-shaped handlers.
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Outcome { Ok(()) }
}

impl IntoOutcome for Outcome {
    fn into_outcome(self) -> Outcome { self }
}

// ── Transport-native contract ─────────────────────────────────────────────────

/// The raw contract of the underlying transport: a response sink and a
/// request, nothing else. Native handlers cannot escalate faults.
pub trait NativeHandler: Send + Sync + 'static {
    fn serve(&self, w: &mut ResponseWriter, req: &mut Request);
}

impl<F> NativeHandler for F
where
    F: Fn(&mut ResponseWriter, &mut Request) + Send + Sync + 'static,
{
    fn serve(&self, w: &mut ResponseWriter, req: &mut Request) {
        self(w, req)
    }
}

pub type BoxedNative = Arc<dyn NativeHandler>;

// ── Action results ────────────────────────────────────────────────────────────

/// The decision half of the action-result pattern.
pub trait Decide: Send + Sync + 'static {
    fn decide(&self, ctx: &mut Context) -> Action;
}

impl<F> Decide for F
where
    F: Fn(&mut Context) -> Action + Send + Sync + 'static,
{
    fn decide(&self, ctx: &mut Context) -> Action {
        self(ctx)
    }
}

pub type BoxedDecide = Arc<dyn Decide>;

/// The effect half of the action-result pattern: a one-shot handler produced
/// per request by a [`Decide`].
pub struct Action(Effect);

enum Effect {
    Apply(Box<dyn Handler>),
    Fail(Fault),
}

impl Action {
    pub fn new(handler: impl Handler) -> Self {
        Self(Effect::Apply(Box::new(handler)))
    }

    /// An action that escalates `fault` without touching the response.
    pub fn fail(fault: Fault) -> Self {
        Self(Effect::Fail(fault))
    }

    pub fn apply(self, ctx: &mut Context) -> Outcome {
        match self.0 {
            Effect::Apply(handler) => handler.handle(ctx),
            Effect::Fail(fault) => Err(fault),
        }
    }
}

impl<H: Handler> From<H> for Action {
    fn from(handler: H) -> Self {
        Self::new(handler)
    }
}

// ── Opaque values ─────────────────────────────────────────────────────────────

/// A value whose shape is only known at runtime, tagged with its type name so
/// a failed registration can say what it was given.
///
/// Function items must be cast to the matching `fn` pointer type before being
/// wrapped; each function item has its own unnameable type.
pub struct Opaque {
    type_name: &'static str,
    value: Box<dyn Any + Send + Sync>,
}

impl Opaque {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self { type_name: std::any::type_name::<T>(), value: Box::new(value) }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Moves the value out if it is a `T`, otherwise hands `self` back.
    pub(crate) fn take<T: Any>(self) -> Result<T, Self> {
        let type_name = self.type_name;
        match self.value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Self { type_name, value }),
        }
    }
}

impl std::fmt::Debug for Opaque {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Opaque").field(&self.type_name).finish()
    }
}

// ── Endpoint shapes ───────────────────────────────────────────────────────────

type ContextFn = Arc<dyn Fn(&mut Context) -> Outcome + Send + Sync>;
type SplitFn = Arc<dyn Fn(&Scope, &mut ResponseWriter, &Request) -> Outcome + Send + Sync>;

/// Every handler shape the registry recognizes.
pub enum Endpoint {
    Handler(BoxedHandler),
    Contextual(ContextFn),
    Split(SplitFn),
    Native(BoxedNative),
    Action(BoxedDecide),
    Opaque(Opaque),
}

impl Endpoint {
    pub fn handler(handler: impl Handler) -> Self {
        Self::Handler(Arc::new(handler))
    }

    pub fn func<F, R>(f: F) -> Self
    where
        F: Fn(&mut Context) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        Self::Contextual(Arc::new(move |ctx: &mut Context| f(ctx).into_outcome()))
    }

    pub fn split<F, R>(f: F) -> Self
    where
        F: Fn(&Scope, &mut ResponseWriter, &Request) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        Self::Split(Arc::new(move |scope: &Scope, w: &mut ResponseWriter, req: &Request| {
            f(scope, w, req).into_outcome()
        }))
    }

    pub fn native<F>(f: F) -> Self
    where
        F: Fn(&mut ResponseWriter, &mut Request) + Send + Sync + 'static,
    {
        Self::Native(Arc::new(f))
    }

    pub fn action<F>(f: F) -> Self
    where
        F: Fn(&mut Context) -> Action + Send + Sync + 'static,
    {
        Self::Action(Arc::new(f))
    }

    pub fn split_action<F>(f: F) -> Self
    where
        F: Fn(&Scope, &mut ResponseWriter, &Request) -> Action + Send + Sync + 'static,
    {
        Self::Action(Arc::new(SplitDecide(f)))
    }

    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Self::Opaque(Opaque::new(value))
    }
}

impl From<BoxedHandler> for Endpoint {
    fn from(handler: BoxedHandler) -> Self {
        Self::Handler(handler)
    }
}

impl From<Opaque> for Endpoint {
    fn from(value: Opaque) -> Self {
        Self::Opaque(value)
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Adapts any recognized shape to the canonical contract.
///
/// `None` fails with [`ConfigError::NilHandler`]; an [`Opaque`] value matching
/// no shape fails with [`ConfigError::UnsupportedHandler`].
pub fn adapt_handler(endpoint: impl Into<Option<Endpoint>>) -> Result<BoxedHandler, ConfigError> {
    let Some(endpoint) = endpoint.into() else {
        return Err(ConfigError::NilHandler);
    };
    let handler: BoxedHandler = match endpoint {
        Endpoint::Handler(handler) => handler,
        Endpoint::Contextual(f) => Arc::new(FnHandler(f)),
        Endpoint::Split(f) => Arc::new(SplitHandler(f)),
        Endpoint::Native(native) => Arc::new(NativeAdapter(native)),
        Endpoint::Action(decide) => Arc::new(ActionHandler(decide)),
        Endpoint::Opaque(value) => {
            return match recognize(value) {
                Ok(endpoint) => adapt_handler(endpoint),
                Err(value) => Err(ConfigError::UnsupportedHandler { shape: value.type_name() }),
            };
        }
    };
    Ok(handler)
}

/// Moves `$value` out as `$ty` and returns `Ok($build(v))`, or rebinds
/// `$value` to the unmatched remainder.
macro_rules! try_shape {
    ($value:ident, $ty:ty, $build:expr) => {
        let $value = match $value.take::<$ty>() {
            Ok(v) => return Ok($build(v)),
            Err(rest) => rest,
        };
    };
}

pub(crate) use try_shape;

/// Downcasts an opaque value against the known shapes, in priority order.
/// Never returns `Endpoint::Opaque`.
pub(crate) fn recognize(value: Opaque) -> Result<Endpoint, Opaque> {
    try_shape!(value, BoxedHandler, Endpoint::Handler);

    try_shape!(value, fn(&mut Context) -> Outcome, Endpoint::func);
    try_shape!(value, fn(&mut Context), Endpoint::func);

    try_shape!(value, fn(&Scope, &mut ResponseWriter, &Request) -> Outcome, Endpoint::split);
    try_shape!(value, fn(&Scope, &mut ResponseWriter, &Request), Endpoint::split);

    try_shape!(value, BoxedNative, Endpoint::Native);
    try_shape!(value, fn(&mut ResponseWriter, &mut Request), Endpoint::native);

    try_shape!(value, BoxedDecide, Endpoint::Action);
    try_shape!(value, fn(&mut Context) -> Action, Endpoint::action);
    try_shape!(value, fn(&Scope, &mut ResponseWriter, &Request) -> Action, Endpoint::split_action);

    Err(value)
}

// ── Adapters ──────────────────────────────────────────────────────────────────

struct FnHandler(ContextFn);

impl Handler for FnHandler {
    fn handle(&self, ctx: &mut Context) -> Outcome {
        (self.0)(ctx)
    }
}

struct SplitHandler(SplitFn);

impl Handler for SplitHandler {
    fn handle(&self, ctx: &mut Context) -> Outcome {
        (self.0)(&ctx.scope, &mut ctx.response, &ctx.request)
    }
}

/// The scope is dropped on the floor: native handlers never see it.
struct NativeAdapter(BoxedNative);

impl Handler for NativeAdapter {
    fn handle(&self, ctx: &mut Context) -> Outcome {
        self.0.serve(&mut ctx.response, &mut ctx.request);
        Ok(())
    }
}

struct ActionHandler(BoxedDecide);

impl Handler for ActionHandler {
    fn handle(&self, ctx: &mut Context) -> Outcome {
        self.0.decide(ctx).apply(ctx)
    }
}

struct SplitDecide<F>(F);

impl<F> Decide for SplitDecide<F>
where
    F: Fn(&Scope, &mut ResponseWriter, &Request) -> Action + Send + Sync + 'static,
{
    fn decide(&self, ctx: &mut Context) -> Action {
        (self.0)(&ctx.scope, &mut ctx.response, &ctx.request)
    }
}
