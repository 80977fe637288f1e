//! Minimal braid example: one action endpoint behind request IDs and access
//! logging, rendered in whatever format the client asks for.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/
//!   curl -i http://localhost:3000/ -H 'accept: text/xml'
//!   curl -i http://localhost:3000/ -H 'accept: text/json'
//!   curl -i http://localhost:3000/ -H 'x-request-id: my-trace-id'

use std::time::Duration;

use braid::middleware::{request_id::RequestId, trace::Trace};
use braid::{Action, Context, Endpoint, Error, Layer, Render, Server, compose};
use http::StatusCode;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let app = compose(
        [Layer::middleware(RequestId::new()), Layer::middleware(Trace)],
        Endpoint::action(hello),
    )?;

    Server::bind("0.0.0.0:3000")?
        .request_timeout(Duration::from_secs(30))
        .serve(app)
        .await
}

// The decision and its effect are separate: `hello` only picks the value and
// status, rendering happens when the action is applied.
fn hello(_ctx: &mut Context) -> Action {
    Action::new(Render::new("Hello world", StatusCode::OK))
}
