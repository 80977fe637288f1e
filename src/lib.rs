//! # braid
//!
//! One canonical request pipeline built out of handlers and middleware of
//! whatever shape they were written in.
//!
//! ## The contract
//!
//! Every endpoint, whether a closure over the whole [`Context`], a
//! writer-and-request function, or a two-phase [`Decide`] returning an
//! [`Action`], is adapted once into a [`Handler`]. Every middleware, be it
//! a handler-to-handler wrapper, a nested [`Chain`], a native wrapper, or a plain
//! handler that runs first, is adapted into a [`Middleware`]. [`compose`]
//! folds them into a single [`BoxedHandler`].
//!
//! Composition either succeeds completely or fails before anything runs:
//!
//! - a missing handler or middleware is a [`ConfigError`];
//! - an unrecognized shape is a [`ConfigError`] naming the type and index.
//!
//! At request time, faults are never rendered. They escalate out of the
//! pipeline as a [`Fault`] and land in [`recover`], which logs them and
//! answers `500` if nothing was committed yet.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use braid::middleware::{request_id::RequestId, trace::Trace};
//! use braid::{Action, Context, Endpoint, Layer, Render, Server, compose};
//! use http::StatusCode;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), braid::Error> {
//!     let hello = Endpoint::action(|_ctx: &mut Context| {
//!         Action::new(Render::new("Hello world", StatusCode::OK))
//!     });
//!
//!     let app = compose(
//!         [Layer::middleware(RequestId::new()), Layer::middleware(Trace)],
//!         hello,
//!     )?;
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//! ```

mod context;
mod error;
mod handler;
mod negotiate;
mod recover;
mod render;
mod request;
mod response;
mod server;

pub mod middleware;

pub use context::{Context, Scope};
pub use error::{ConfigError, Error, Fault, Outcome};
pub use handler::{
    Action, BoxedDecide, BoxedHandler, BoxedNative, Decide, Endpoint, Handler, IntoOutcome,
    NativeHandler, Opaque, adapt_handler,
};
pub use middleware::{
    BoxedMiddleware, Chain, Layer, Middleware, NativeMiddleware, adapt_middleware, compose,
};
pub use negotiate::{AcceptRange, negotiate, parse_accept};
pub use recover::recover;
pub use render::{DEFAULT_MEDIA_TYPE, Format, Payload, Render, SUPPORTED};
pub use request::Request;
pub use response::ResponseWriter;
pub use server::Server;
