//! HTTP server glue and graceful shutdown.
//!
//! The server does three things per request: collect the body, build a
//! [`Context`], and run the composed handler under [`recover`]. It only ever
//! accepts an already-composed [`BoxedHandler`], so a pipeline that failed to
//! compose can never serve traffic.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()`, so no new connections are made.
//! 2. Cancelling the scope token every in-flight request inherits, so long
//!    handlers can notice and wrap up.
//! 3. Letting every in-flight connection task run to completion.
//! 4. Returning from [`Server::serve`], which lets `main` exit cleanly.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::context::{Context, Scope};
use crate::error::Error;
use crate::handler::BoxedHandler;
use crate::recover::recover;
use crate::request::Request;
use crate::response::ResponseWriter;

/// The HTTP server.
#[derive(Debug)]
pub struct Server {
    addr: SocketAddr,
    request_timeout: Option<Duration>,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust
    /// use braid::Server;
    /// let server = Server::bind("0.0.0.0:3000").unwrap();
    /// assert!(Server::bind("not an address").is_err());
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr = addr
            .parse()
            .map_err(|source| Error::Addr { addr: addr.to_owned(), source })?;
        Ok(Self { addr, request_timeout: None })
    }

    /// Gives every request's [`Scope`] a deadline `timeout` after it arrives.
    /// The deadline is advisory: handlers decide whether to honour it.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Serves until SIGTERM or Ctrl-C, then drains in-flight requests.
    pub async fn serve(self, handler: BoxedHandler) -> Result<(), Error> {
        self.serve_with_shutdown(handler, shutdown_signal()).await
    }

    /// Serves until `signal` resolves, then drains in-flight requests.
    pub async fn serve_with_shutdown<S>(self, handler: BoxedHandler, signal: S) -> Result<(), Error>
    where
        S: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.addr).await?;
        let timeout = self.request_timeout;

        // Parent of every request scope; cancelled once shutdown starts.
        let root = CancellationToken::new();

        info!(addr = %listener.local_addr()?, "braid listening");

        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM stops accepting at once,
                // even if more connections are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    root.cancel();
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let handler = Arc::clone(&handler);
                    let root = root.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let scope = request_scope(&root, timeout);
                            dispatch(Arc::clone(&handler), scope, req)
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("braid stopped");
        Ok(())
    }
}

fn request_scope(root: &CancellationToken, timeout: Option<Duration>) -> Scope {
    let scope = Scope::with_cancellation(root.child_token());
    match timeout {
        Some(timeout) => scope.timeout(timeout),
        None => scope,
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Runs one request through the composed handler.
///
/// Infallible: faults and panics are absorbed by [`recover`], unreadable
/// bodies become `400 Bad Request`.
async fn dispatch<B>(
    handler: BoxedHandler,
    scope: Scope,
    req: http::Request<B>,
) -> Result<http::Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(method = %parts.method, uri = %parts.uri, "failed to read request body: {e}");
            let mut w = ResponseWriter::new();
            w.write_status(StatusCode::BAD_REQUEST);
            return Ok(w.into_http());
        }
    };

    let mut ctx = Context::new(scope, Request::from_parts(parts, body));
    recover(handler.as_ref(), &mut ctx);
    Ok(ctx.response.into_http())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C). On
/// Windows only Ctrl-C is available. A signal that cannot be installed is
/// logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
