//! The application: route registration, middleware and the request pipeline.
//!
//! Routers are not shared between requests. An [`App`] keeps an ordered list
//! of registration callbacks and replays them into a fresh [`Router`] at the
//! start of every request; only endpoints (and their compiled dispatch
//! tables) are shared.
//!
//! ```rust
//! use ferrule::{App, Call, Candidate, Endpoint, Method, Request, Text};
//!
//! async fn hello(call: Call) -> String {
//!     format!("hello, {}", call.param("name").unwrap_or("world"))
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let greet = Endpoint::builder("greet")
//!     .candidate(Candidate::new(Method::Get, "hello", hello).returns(Text))
//!     .build();
//! let app = App::new().routes(move |r| { r.route("/hello/{name}", &greet); });
//!
//! let res = app.handle(Request::new(Method::Get, "/hello/ada")).await.unwrap();
//! assert_eq!(res.status_code(), 200);
//! # }
//! ```

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use http::header::{ALLOW, HeaderValue};
use serde_json::Value;
use tracing::{Instrument, error, info_span};

use crate::container::Container;
use crate::context::Context;
use crate::error::Error;
use crate::middleware::{Dispatch, MiddlewareFactory, MiddlewareStack};
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::router::{Router, Settings};

type RouteCallback = Arc<dyn Fn(&mut Router) + Send + Sync>;

/// Turns an error that escaped the pipeline into a response.
pub type ErrorRenderer = Arc<dyn Fn(&Error) -> Response + Send + Sync>;

#[derive(Clone)]
pub struct App {
    routes: Vec<RouteCallback>,
    stack: MiddlewareStack,
    container: Arc<Container>,
    settings: Settings,
    renderer: ErrorRenderer,
}

impl Default for App {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            stack: MiddlewareStack::new(),
            container: Arc::new(Container::new()),
            settings: Settings::new(),
            renderer: Arc::new(render_plain),
        }
    }
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Registration ──────────────────────────────────────────────────────────

    /// Adds a registration callback. Callbacks run in order against the root
    /// router of every request.
    pub fn routes(mut self, register: impl Fn(&mut Router) + Send + Sync + 'static) -> Self {
        self.routes.push(Arc::new(register));
        self
    }

    /// Appends a middleware factory. The first registered is the outermost.
    pub fn middleware(mut self, factory: impl MiddlewareFactory) -> Self {
        self.stack.push(factory);
        self
    }

    pub fn before_dispatch(mut self, hook: impl Fn(&mut Context) + Send + Sync + 'static) -> Self {
        self.stack.before_dispatch(hook);
        self
    }

    pub fn after_dispatch(mut self, hook: impl Fn(&mut Context, Option<&Error>) + Send + Sync + 'static) -> Self {
        self.stack.after_dispatch(hook);
        self
    }

    /// Registers a service in the root container.
    pub fn provide<T: Any + Send + Sync>(mut self, service: T) -> Self {
        Arc::make_mut(&mut self.container).insert(service);
        self
    }

    /// Sets an application-wide route setting; routers and routes override it.
    pub fn setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Replaces the default plain-text error renderer.
    pub fn error_renderer(mut self, render: impl Fn(&Error) -> Response + Send + Sync + 'static) -> Self {
        self.renderer = Arc::new(render);
        self
    }

    // ── Pipeline ──────────────────────────────────────────────────────────────

    /// Assembles a fresh router from the registration callbacks.
    pub fn router(&self) -> Router {
        let mut router = Router::with_settings(self.settings.clone());
        for register in &self.routes {
            register(&mut router);
        }
        router
    }

    /// Runs `request` through middleware, routing and dispatch.
    ///
    /// A request whose error was suppressed by middleware, and that no
    /// middleware gave a response, answers `204 No Content`.
    pub async fn handle(&self, request: Request) -> Result<Response, Error> {
        self.handle_with_cancel(request, std::future::pending()).await
    }

    /// Like [`handle`](Self::handle); `cancel` resolving abandons the work
    /// in flight and tears the middleware stack down with
    /// [`Error::Cancelled`].
    pub async fn handle_with_cancel(
        &self,
        request: Request,
        cancel: impl Future<Output = ()> + Send,
    ) -> Result<Response, Error> {
        let span = info_span!("request", method = %request.method(), path = request.path());
        async move {
            let router = self.router();
            let mut cx = Context::new(request, router, Container::branch(&self.container));
            self.stack.run(&mut cx, &Dispatcher, cancel).await?;
            Ok(cx.take_response().unwrap_or_else(|| Response::status(StatusCode::NO_CONTENT)))
        }
        .instrument(span)
        .await
    }

    /// Like [`handle`](Self::handle), rendering errors into responses.
    pub async fn respond(&self, request: Request) -> Response {
        self.respond_with_cancel(request, std::future::pending()).await
    }

    pub(crate) async fn respond_with_cancel(
        &self,
        request: Request,
        cancel: impl Future<Output = ()> + Send,
    ) -> Response {
        match self.handle_with_cancel(request, cancel).await {
            Ok(res) => res,
            Err(err) => {
                if err.status().is_server_error() {
                    error!(error = %err, cause = ?err.cause().map(ToString::to_string), "request failed");
                }
                self.render_error(&err)
            }
        }
    }

    pub fn render_error(&self, err: &Error) -> Response {
        (self.renderer)(err)
    }
}

/// Routing and handler dispatch: the innermost layer of the onion.
struct Dispatcher;

#[async_trait]
impl Dispatch for Dispatcher {
    async fn dispatch(&self, cx: &mut Context) -> Result<(), Error> {
        let resolved = cx.router().resolve(cx.request().path(), cx.request().method())?;
        cx.request_mut().params = resolved.params;
        cx.set_route(Arc::clone(&resolved.endpoint), resolved.settings);
        let response = resolved.endpoint
            .dispatch(cx.request(), cx.shared_settings(), cx.container())
            .await?;
        cx.set_response(response);
        Ok(())
    }
}

/// The default renderer: the status line's reason for server errors, the
/// error's message otherwise, plus `Allow` on 405s.
pub fn render_plain(err: &Error) -> Response {
    let status = err.status();
    let body = if status.is_server_error() {
        status.canonical_reason().unwrap_or("Internal Server Error").to_owned()
    } else {
        err.to_string()
    };
    let mut res = (status, Response::text(body)).into_response();
    if let Some(allow) = err.allow_header().and_then(|a| HeaderValue::from_str(&a).ok()) {
        res.headers_mut().insert(ALLOW, allow);
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::method::Method;

    #[test]
    fn plain_renderer_hides_server_error_details() {
        let res = render_plain(&Error::msg("db password is hunter2"));
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(res.body(), Body::Text(s) if s == "Internal Server Error"));

        let res = render_plain(&Error::MethodNotAllowed { allowed: [Method::Get].into() });
        assert_eq!(res.headers()[ALLOW], "GET");
    }

    #[test]
    fn router_is_rebuilt_from_callbacks_in_order() {
        let app = App::new()
            .setting("tier", "app")
            .routes(|r| { r.set("first", true); })
            .routes(|r| { r.set("first", false); });
        let router = app.router();
        assert_eq!(router.settings()["tier"], "app");
        assert_eq!(router.settings()["first"], false);
    }
}
