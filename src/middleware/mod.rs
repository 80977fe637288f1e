//! Middleware layer.
//!
//! Middleware is a handler-to-handler transformer: it receives the next
//! handler in the chain and returns a handler that may run code before and
//! after delegating to it, or not delegate at all. It is the right place for
//! cross-cutting concerns such as [`trace`] and [`request_id`].
//!
//! Like handlers, middleware may be registered in several shapes, enumerated
//! by [`Layer`] and adapted by [`adapt_middleware`]:
//!
//! | Shape | Adapted as |
//! |---|---|
//! | [`Layer::Middleware`] | itself |
//! | [`Layer::Chain`] | a nested, already-built [`Chain`] |
//! | [`Layer::Native`] | a transport-native middleware, bridged per request |
//! | [`Layer::Handler`] | a handler that always runs before `next` |
//! | [`Layer::Opaque`] | the first of the above its type matches |
//!
//! A handler used as middleware is unconditional pre-processing: it cannot
//! skip `next` except by escalating a [`Fault`](crate::Fault).

use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use crate::context::{Context, Scope};
use crate::error::{ConfigError, Fault, Outcome};
use crate::handler::{self, BoxedHandler, BoxedNative, Endpoint, Handler, NativeHandler, Opaque, try_shape};
use crate::request::Request;
use crate::response::ResponseWriter;

mod chain;
pub mod request_id;
pub mod trace;

pub use chain::{Chain, compose};

/// Canonical middleware: wraps `next` into a new handler.
///
/// Called once per composition, never per request.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        self(next)
    }
}

pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Transport-native middleware: native handler in, native handler out.
pub type NativeMiddleware = Arc<dyn Fn(BoxedNative) -> BoxedNative + Send + Sync>;

/// Every middleware shape the registry recognizes.
pub enum Layer {
    Middleware(BoxedMiddleware),
    Chain(Chain),
    Native(NativeMiddleware),
    Handler(Endpoint),
    Opaque(Opaque),
}

impl Layer {
    pub fn middleware(middleware: impl Middleware) -> Self {
        Self::Middleware(Arc::new(middleware))
    }

    pub fn func<F>(f: F) -> Self
    where
        F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
    {
        Self::Middleware(Arc::new(f))
    }

    pub fn native<F>(f: F) -> Self
    where
        F: Fn(BoxedNative) -> BoxedNative + Send + Sync + 'static,
    {
        Self::Native(Arc::new(f))
    }

    pub fn opaque<T: std::any::Any + Send + Sync>(value: T) -> Self {
        Self::Opaque(Opaque::new(value))
    }
}

impl From<BoxedMiddleware> for Layer {
    fn from(middleware: BoxedMiddleware) -> Self {
        Self::Middleware(middleware)
    }
}

impl From<Chain> for Layer {
    fn from(chain: Chain) -> Self {
        Self::Chain(chain)
    }
}

impl From<Endpoint> for Layer {
    fn from(endpoint: Endpoint) -> Self {
        Self::Handler(endpoint)
    }
}

/// Adapts the middleware registered at `index` to the canonical form.
///
/// `None` fails with [`ConfigError::NilMiddleware`]; a shape that matches
/// neither a middleware nor a handler fails with
/// [`ConfigError::UnsupportedMiddleware`]. Both carry `index`.
pub fn adapt_middleware(
    index: usize,
    layer: impl Into<Option<Layer>>,
) -> Result<BoxedMiddleware, ConfigError> {
    let Some(layer) = layer.into() else {
        return Err(ConfigError::NilMiddleware { index });
    };
    let middleware: BoxedMiddleware = match layer {
        Layer::Middleware(middleware) => middleware,
        Layer::Chain(chain) => Arc::new(chain),
        Layer::Native(native) => Arc::new(NativeLayer(native)),
        Layer::Handler(endpoint) => {
            let first = handler::adapt_handler(endpoint).map_err(|e| e.at_index(index))?;
            Arc::new(Before(first))
        }
        Layer::Opaque(value) => {
            return match recognize(value) {
                Ok(layer) => adapt_middleware(index, layer),
                Err(value) => Err(ConfigError::UnsupportedMiddleware { index, shape: value.type_name() }),
            };
        }
    };
    Ok(middleware)
}

/// Middleware shapes first, then any handler shape. Never returns
/// `Layer::Opaque`.
fn recognize(value: Opaque) -> Result<Layer, Opaque> {
    try_shape!(value, BoxedMiddleware, Layer::Middleware);
    try_shape!(value, fn(BoxedHandler) -> BoxedHandler, Layer::func);
    try_shape!(value, Chain, Layer::Chain);
    try_shape!(value, NativeMiddleware, Layer::Native);
    try_shape!(value, fn(BoxedNative) -> BoxedNative, Layer::native);

    handler::recognize(value).map(Layer::Handler)
}

// ── Adapters ──────────────────────────────────────────────────────────────────

/// A handler registered as middleware: runs, then hands over to `next`.
struct Before(BoxedHandler);

impl Middleware for Before {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Sequence { first: Arc::clone(&self.0), next })
    }
}

struct Sequence {
    first: BoxedHandler,
    next: BoxedHandler,
}

impl Handler for Sequence {
    fn handle(&self, ctx: &mut Context) -> Outcome {
        self.first.handle(ctx)?;
        self.next.handle(ctx)
    }
}

struct NativeLayer(NativeMiddleware);

impl Middleware for NativeLayer {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(NativeWrapped { middleware: Arc::clone(&self.0), next })
    }
}

/// Runs a native middleware around a canonical `next`.
///
/// The native middleware is applied per request to a shim that carries this
/// request's scope, so `next` sees the same scope, request and response sink
/// the chain was entered with.
struct NativeWrapped {
    middleware: NativeMiddleware,
    next: BoxedHandler,
}

impl Handler for NativeWrapped {
    fn handle(&self, ctx: &mut Context) -> Outcome {
        let escalated = Arc::new(Mutex::new(None));
        let shim: BoxedNative = Arc::new(Forward {
            scope: ctx.scope.clone(),
            next: Arc::clone(&self.next),
            escalated: Arc::clone(&escalated),
        });

        (self.middleware)(shim).serve(&mut ctx.response, &mut ctx.request);

        let fault = escalated.lock().unwrap_or_else(PoisonError::into_inner).take();
        match fault {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }
}

/// Native-shaped shim forwarding to a canonical handler.
///
/// Native handlers have no fault channel, so a fault raised by `next` is
/// parked in `escalated` and re-raised once the native middleware returns.
/// The request and response are put back before a panic from `next` is
/// resumed, so the recovery boundary still sees them.
struct Forward {
    scope: Scope,
    next: BoxedHandler,
    escalated: Arc<Mutex<Option<Fault>>>,
}

impl NativeHandler for Forward {
    fn serve(&self, w: &mut ResponseWriter, req: &mut Request) {
        let mut ctx = Context {
            scope: self.scope.clone(),
            request: mem::take(req),
            response: mem::take(w),
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.next.handle(&mut ctx)));
        *req = ctx.request;
        *w = ctx.response;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(fault)) => {
                *self.escalated.lock().unwrap_or_else(PoisonError::into_inner) = Some(fault);
            }
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Endpoint;
    use http::header::{HeaderName, HeaderValue};
    use http::StatusCode;

    fn tag(ctx: &mut Context, label: &str) {
        ctx.response.write(label.as_bytes());
    }

    fn terminal() -> Endpoint {
        Endpoint::func(|ctx: &mut Context| tag(ctx, "[end]"))
    }

    fn run(layer: Layer) -> Context {
        let handler = adapt_middleware(0, layer).unwrap().wrap(handler::adapt_handler(terminal()).unwrap());
        let mut ctx = Context::default();
        handler.handle(&mut ctx).unwrap();
        ctx
    }

    #[test]
    fn canonical_middleware_wraps_before_and_after() {
        let ctx = run(Layer::func(|next: BoxedHandler| -> BoxedHandler {
            handler::adapt_handler(Endpoint::func(move |ctx: &mut Context| -> Outcome {
                tag(ctx, "<");
                next.handle(ctx)?;
                tag(ctx, ">");
                Ok(())
            }))
            .unwrap()
        }));
        assert_eq!(ctx.response.body(), b"<[end]>");
    }

    #[test]
    fn handler_layer_runs_first_then_next() {
        let ctx = run(Layer::Handler(Endpoint::func(|ctx: &mut Context| tag(ctx, "pre;"))));
        assert_eq!(ctx.response.body(), b"pre;[end]");
    }

    #[test]
    fn native_layer_sees_same_sink_and_request() {
        let ctx = run(Layer::native(|next: BoxedNative| -> BoxedNative {
            Arc::new(move |w: &mut ResponseWriter, r: &mut Request| {
                r.headers_mut().insert(
                    HeaderName::from_static("x-seen"),
                    HeaderValue::from_static("native"),
                );
                w.write_status(StatusCode::ACCEPTED);
                next.serve(w, r);
                w.write(b"(native)");
            })
        }));

        assert_eq!(ctx.response.status(), Some(StatusCode::ACCEPTED));
        assert_eq!(ctx.response.body(), b"[end](native)");
        assert_eq!(ctx.request.header("x-seen"), Some("native"));
    }

    #[test]
    fn native_layer_reraises_downstream_fault() {
        let failing = handler::adapt_handler(Endpoint::func(|_ctx: &mut Context| -> Outcome {
            Err(Fault::encode("text/xml", "bad"))
        }))
        .unwrap();
        let wrapped = adapt_middleware(0, Layer::native(|next: BoxedNative| next)).unwrap().wrap(failing);

        let mut ctx = Context::default();
        assert!(matches!(wrapped.handle(&mut ctx), Err(Fault::Encode { .. })));
    }

    #[test]
    fn native_layer_may_short_circuit() {
        let ctx = run(Layer::native(|_next: BoxedNative| -> BoxedNative {
            Arc::new(|w: &mut ResponseWriter, _r: &mut Request| w.write_status(StatusCode::FORBIDDEN))
        }));
        assert_eq!(ctx.response.status(), Some(StatusCode::FORBIDDEN));
        assert!(ctx.response.body().is_empty());
    }

    #[test]
    fn opaque_handler_shape_becomes_pre_processing() {
        fn pre(ctx: &mut Context) {
            tag(ctx, "opaque;");
        }
        let ctx = run(Layer::opaque(pre as fn(&mut Context)));
        assert_eq!(ctx.response.body(), b"opaque;[end]");
    }

    #[test]
    fn nil_and_unsupported_layers_report_index() {
        assert_eq!(adapt_middleware(4, None::<Layer>).err(), Some(ConfigError::NilMiddleware { index: 4 }));
        assert_eq!(
            adapt_middleware(2, Layer::opaque("not callable")).err(),
            Some(ConfigError::UnsupportedMiddleware { index: 2, shape: "&str" }),
        );
        assert_eq!(
            adapt_middleware(1, Layer::Handler(Endpoint::opaque(3_i64))).err(),
            Some(ConfigError::UnsupportedMiddleware { index: 1, shape: "i64" }),
        );
    }

    struct Tag {
        label: &'static str,
        next: BoxedHandler,
    }

    impl Handler for Tag {
        fn handle(&self, ctx: &mut Context) -> Outcome {
            tag(ctx, self.label);
            self.next.handle(ctx)
        }
    }

    fn tag_fn(next: BoxedHandler) -> BoxedHandler {
        Arc::new(Tag { label: "fn;", next })
    }

    fn native_fn(next: BoxedNative) -> BoxedNative {
        Arc::new(move |w: &mut ResponseWriter, r: &mut Request| {
            w.write(b"native-fn;");
            next.serve(w, r);
        })
    }

    fn pre(ctx: &mut Context) {
        tag(ctx, "pre;");
    }

    #[test]
    fn every_opaque_layer_shape_runs_once() {
        let boxed: BoxedMiddleware = Arc::new(|next: BoxedHandler| -> BoxedHandler {
            Arc::new(Tag { label: "boxed;", next })
        });
        let chain = Chain::new([Layer::func(|next: BoxedHandler| -> BoxedHandler {
            Arc::new(Tag { label: "chain;", next })
        })])
        .unwrap();
        let native: NativeMiddleware = Arc::new(|next: BoxedNative| -> BoxedNative {
            Arc::new(move |w: &mut ResponseWriter, r: &mut Request| {
                w.write(b"native;");
                next.serve(w, r);
            })
        });

        let shapes = vec![
            ("boxed;", Opaque::new(boxed)),
            ("fn;", Opaque::new(tag_fn as fn(BoxedHandler) -> BoxedHandler)),
            ("chain;", Opaque::new(chain)),
            ("native;", Opaque::new(native)),
            ("native-fn;", Opaque::new(native_fn as fn(BoxedNative) -> BoxedNative)),
            ("pre;", Opaque::new(pre as fn(&mut Context))),
        ];

        for (label, value) in shapes {
            let ctx = run(Layer::Opaque(value));
            assert_eq!(ctx.response.body(), format!("{label}[end]").as_bytes(), "shape {label}");
            assert_eq!(ctx.response.body_writes(), 2, "shape {label}");
        }
    }

    #[test]
    fn panic_below_native_layer_keeps_request_and_response() {
        use crate::middleware::request_id::{REQUEST_ID_HEADER, RequestId};
        use crate::recover::recover;
        use http::{Method, Uri};

        let handler = compose(
            [
                Layer::middleware(RequestId::new()),
                Layer::native(|next: BoxedNative| -> BoxedNative {
                    Arc::new(move |w: &mut ResponseWriter, r: &mut Request| next.serve(w, r))
                }),
            ],
            Endpoint::func(|_ctx: &mut Context| -> Outcome { panic!("terminal bug") }),
        )
        .unwrap();

        let request = Request::new(Method::POST, Uri::from_static("/orders"));
        let mut ctx = Context::new(Scope::new(), request);
        recover(handler.as_ref(), &mut ctx);

        assert_eq!(ctx.response.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(ctx.request.method(), Method::POST);
        assert_eq!(ctx.request.path(), "/orders");
        assert!(ctx.response.headers().contains_key(REQUEST_ID_HEADER));
        assert_eq!(
            ctx.response.headers()[REQUEST_ID_HEADER],
            ctx.request.headers()[REQUEST_ID_HEADER],
        );
    }
}
