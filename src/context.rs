//! Per-request state shared by middleware, hooks and dispatch.

use std::sync::Arc;

use http::Extensions;

use crate::container::Container;
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::router::{Router, Settings};

/// Everything one request owns while it moves through the pipeline.
///
/// Created by [`App`](crate::App) after the router has been assembled.
/// Middleware may read and modify the request on the way in and the
/// response on the way out; route information is filled in once the router
/// has resolved the request.
pub struct Context {
    request: Request,
    router: Router,
    container: Container,
    endpoint: Option<Arc<Endpoint>>,
    settings: Arc<Settings>,
    response: Option<Response>,
    extensions: Extensions,
}

impl Context {
    pub(crate) fn new(request: Request, router: Router, container: Container) -> Self {
        Self {
            request,
            router,
            container,
            endpoint: None,
            settings: Arc::new(Settings::new()),
            response: None,
            extensions: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request { &self.request }
    pub fn request_mut(&mut self) -> &mut Request { &mut self.request }

    /// The router assembled for this request.
    pub fn router(&self) -> &Router { &self.router }

    /// This request's container branch. Inserts stay local to the request.
    pub fn container(&self) -> &Container { &self.container }
    pub fn container_mut(&mut self) -> &mut Container { &mut self.container }

    /// The resolved endpoint; `None` before resolution or after a miss.
    pub fn endpoint(&self) -> Option<&Arc<Endpoint>> { self.endpoint.as_ref() }

    /// Route settings merged along the resolution path.
    pub fn settings(&self) -> &Settings { &self.settings }

    pub fn response(&self) -> Option<&Response> { self.response.as_ref() }
    pub fn response_mut(&mut self) -> Option<&mut Response> { self.response.as_mut() }

    /// Replaces the response. Middleware may use this to short-circuit
    /// after suppressing an error.
    pub fn set_response(&mut self, response: Response) {
        self.response = Some(response);
    }

    pub fn take_response(&mut self) -> Option<Response> { self.response.take() }

    /// Typed per-request scratch space for middleware.
    pub fn extensions(&self) -> &Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }

    /// Builds a URL for `endpoint` against this request's router.
    pub fn url_for(&self, endpoint: &Endpoint, params: &[(&str, &str)]) -> Result<String, Error> {
        self.router.url_for(endpoint, params)
    }

    pub(crate) fn set_route(&mut self, endpoint: Arc<Endpoint>, settings: Settings) {
        self.endpoint = Some(endpoint);
        self.settings = Arc::new(settings);
    }

    pub(crate) fn shared_settings(&self) -> Arc<Settings> {
        Arc::clone(&self.settings)
    }
}
