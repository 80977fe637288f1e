//! End-to-end pipeline behaviour through the public API only.

use std::sync::{Arc, Mutex};

use braid::{
    Action, BoxedHandler, BoxedNative, Chain, ConfigError, Context, Endpoint, Fault, Handler,
    Layer, Outcome, Render, Request, ResponseWriter, Scope, adapt_handler, compose, recover,
};
use http::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use http::{Method, StatusCode, Uri};
use serde::Serialize;

type Log = Arc<Mutex<Vec<&'static str>>>;

#[derive(Serialize)]
struct Greeting {
    message: &'static str,
}

#[derive(Debug, thiserror::Error)]
#[error("store unavailable")]
struct StoreUnavailable;

fn request(accept: Option<&'static str>) -> Context {
    let mut req = Request::new(Method::GET, Uri::from_static("/greeting"));
    if let Some(accept) = accept {
        req = req.with_header(ACCEPT, HeaderValue::from_static(accept));
    }
    Context::new(Scope::new(), req)
}

fn body(ctx: &Context) -> &str {
    std::str::from_utf8(ctx.response.body()).unwrap()
}

fn push(log: &Log, entry: &'static str) {
    log.lock().unwrap().push(entry);
}

/// One layer of each middleware shape, each logging `name` before `next`.
fn layer_of_every_shape(log: &Log) -> Vec<Layer> {
    let canonical = {
        let log = Arc::clone(log);
        Layer::func(move |next: BoxedHandler| -> BoxedHandler {
            let log = Arc::clone(&log);
            adapt_handler(Endpoint::func(move |ctx: &mut Context| -> Outcome {
                push(&log, "canonical");
                next.handle(ctx)
            }))
            .unwrap()
        })
    };
    let native = {
        let log = Arc::clone(log);
        Layer::native(move |next: BoxedNative| -> BoxedNative {
            let log = Arc::clone(&log);
            Arc::new(move |w: &mut ResponseWriter, r: &mut Request| {
                push(&log, "native");
                next.serve(w, r);
            })
        })
    };
    let handler = {
        let log = Arc::clone(log);
        Layer::from(Endpoint::func(move |_ctx: &mut Context| push(&log, "handler")))
    };
    let nested = {
        let log = Arc::clone(log);
        let inner = Layer::from(Endpoint::func(move |_ctx: &mut Context| push(&log, "nested")));
        Layer::from(Chain::new([inner]).unwrap())
    };
    vec![canonical, native, handler, nested]
}

#[test]
fn middleware_of_every_shape_runs_in_declaration_order() {
    let log = Log::default();
    let terminal = {
        let log = Arc::clone(&log);
        Endpoint::func(move |_ctx: &mut Context| push(&log, "terminal"))
    };

    let app = compose(layer_of_every_shape(&log), terminal).unwrap();
    assert!(log.lock().unwrap().is_empty());

    app.handle(&mut request(None)).unwrap();
    assert_eq!(*log.lock().unwrap(), ["canonical", "native", "handler", "nested", "terminal"]);
}

#[test]
fn empty_chain_behaves_like_the_adapted_terminal() {
    let terminal = || Endpoint::func(|ctx: &mut Context| ctx.response.write(b"direct"));

    let composed = compose(Vec::<Layer>::new(), terminal()).unwrap();
    let direct = adapt_handler(terminal()).unwrap();

    let (mut a, mut b) = (request(None), request(None));
    composed.handle(&mut a).unwrap();
    direct.handle(&mut b).unwrap();

    assert_eq!(a.response.status(), b.response.status());
    assert_eq!(a.response.body(), b.response.body());
}

#[test]
fn configuration_errors_surface_before_any_request() {
    let log = Log::default();
    let mut layers: Vec<Option<Layer>> = layer_of_every_shape(&log).into_iter().map(Some).collect();
    layers.insert(2, None);

    let err = compose(layers, Endpoint::func(|_ctx: &mut Context| {})).err();
    assert_eq!(err, Some(ConfigError::NilMiddleware { index: 2 }));

    let err = compose([Layer::opaque(42_u16)], Endpoint::func(|_ctx: &mut Context| {})).err();
    let err = err.unwrap();
    assert_eq!(err.to_string(), "unsupported middleware type `u16` at index 0");

    assert_eq!(adapt_handler(Endpoint::opaque("hello")).err(), Some(ConfigError::UnsupportedHandler { shape: "&str" }));
    assert_eq!(compose([None::<Layer>], None::<Endpoint>).err(), Some(ConfigError::NilHandler));

    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn opaque_function_pointers_are_recognized() {
    fn plain(ctx: &mut Context) {
        ctx.response.write(b"plain");
    }
    fn decide(_ctx: &mut Context) -> Action {
        Action::new(Render::new("decided", StatusCode::OK))
    }

    let mut ctx = request(None);
    adapt_handler(Endpoint::opaque(plain as fn(&mut Context))).unwrap().handle(&mut ctx).unwrap();
    assert_eq!(body(&ctx), "plain");

    let mut ctx = request(None);
    adapt_handler(Endpoint::opaque(decide as fn(&mut Context) -> Action))
        .unwrap()
        .handle(&mut ctx)
        .unwrap();
    assert_eq!(body(&ctx), "\"decided\"");
}

#[test]
fn action_renders_negotiated_format_through_the_chain() {
    let app = compose(
        [Layer::middleware(braid::middleware::trace::Trace)],
        Endpoint::action(|_ctx: &mut Context| Action::new(Render::new(Greeting { message: "hi" }, StatusCode::OK))),
    )
    .unwrap();

    let mut ctx = request(Some("text/xml"));
    app.handle(&mut ctx).unwrap();
    assert_eq!(ctx.response.headers()[CONTENT_TYPE], "text/xml;charset=utf-8");
    assert!(body(&ctx).contains("\n    <message>hi</message>"));

    let mut ctx = request(None);
    app.handle(&mut ctx).unwrap();
    assert_eq!(ctx.response.status(), Some(StatusCode::OK));
    assert_eq!(ctx.response.headers()[CONTENT_TYPE], "application/json;charset=utf-8");
    assert_eq!(body(&ctx), r#"{"message":"hi"}"#);
}

#[test]
fn absent_result_writes_status_only() {
    let app = adapt_handler(Endpoint::action(|_ctx: &mut Context| {
        Action::new(Render::<Greeting>::from_option(None, StatusCode::NOT_FOUND))
    }))
    .unwrap();

    let mut ctx = request(Some("application/xml"));
    app.handle(&mut ctx).unwrap();
    assert_eq!(ctx.response.status(), Some(StatusCode::NOT_FOUND));
    assert!(ctx.response.body().is_empty());
}

#[test]
fn errors_escalate_to_the_recovery_boundary() {
    let app = compose(
        [Layer::middleware(braid::middleware::trace::Trace)],
        Endpoint::action(|_ctx: &mut Context| {
            Action::new(Render::<Greeting>::from_result(Err(StoreUnavailable), StatusCode::OK))
        }),
    )
    .unwrap();

    let mut ctx = request(None);
    let fault = app.handle(&mut ctx).unwrap_err();
    assert_eq!(fault.to_string(), "store unavailable");
    assert!(!ctx.response.is_committed());

    let mut ctx = request(None);
    recover(app.as_ref(), &mut ctx);
    assert_eq!(ctx.response.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert!(ctx.response.body().is_empty());
}

#[test]
fn failing_action_skips_its_effect() {
    let app = adapt_handler(Endpoint::action(|_ctx: &mut Context| {
        Action::fail(Fault::escalate(StoreUnavailable))
    }))
    .unwrap();

    let mut ctx = request(None);
    assert!(app.handle(&mut ctx).is_err());
    assert_eq!(ctx.response.body_writes(), 0);
}

#[test]
fn composition_is_idempotent() {
    let log = Log::default();
    let build = || {
        let log = Arc::clone(&log);
        compose(layer_of_every_shape(&log), Endpoint::func(move |_ctx: &mut Context| push(&log, "terminal")))
            .unwrap()
    };

    build().handle(&mut request(None)).unwrap();
    let first = std::mem::take(&mut *log.lock().unwrap());
    build().handle(&mut request(None)).unwrap();

    assert_eq!(*log.lock().unwrap(), first);
}

#[test]
fn composed_handler_is_shared_across_threads() {
    let app = compose(
        [Layer::middleware(braid::middleware::request_id::RequestId::new())],
        Endpoint::func(|ctx: &mut Context| ctx.response.write(b"ok")),
    )
    .unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let app = Arc::clone(&app);
            std::thread::spawn(move || {
                let mut ctx = request(None);
                app.handle(&mut ctx).unwrap();
                ctx.response.headers().contains_key("x-request-id")
            })
        })
        .collect();

    for worker in workers {
        assert!(worker.join().unwrap());
    }
}
