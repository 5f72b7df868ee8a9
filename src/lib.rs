//! # ferrule
//!
//! The request-dispatch core of an HTTP framework.
//!
//! Given a request, ferrule finds the endpoint for its path and method
//! across a tree of nested and mounted routers, runs an onion of
//! middleware around it, and, when an endpoint offers several handlers for
//! one method, picks the one whose declared parameters the request
//! satisfies best.
//!
//! ## The pieces
//!
//! - [`Router`]: routes, sub-routers and mounts; `404` vs `405` across all
//!   levels; [`Router::url_for`] for reverse routing
//! - [`Endpoint`]: named groups of [`Candidate`] and [`Form`] handlers with
//!   declared [`Param`]s, compiled once into a dispatch table
//! - [`middleware`]: two-phase units with error injection on the way out
//! - [`App`]: registration callbacks, middleware, services and the pipeline
//! - [`Server`]: hyper, HTTP/1 and HTTP/2, graceful shutdown
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use ferrule::{App, Call, Candidate, Endpoint, Json, Method, Param, Server, ServerConfig};
//! use ferrule::middleware::Trace;
//! use serde_json::{Value, json};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ferrule::Error> {
//!     let users = Endpoint::builder("users")
//!         .candidate(Candidate::new(Method::Get, "show", show).param(Param::path("id")).returns(Json))
//!         .build();
//!
//!     let app = App::new()
//!         .middleware(Trace::new)
//!         .routes(move |r| { r.route("/users/{id}", &users); });
//!
//!     Server::with_config(ServerConfig::from_env()?).serve(app).await
//! }
//!
//! async fn show(call: Call) -> Value {
//!     json!({"id": call.args().str("id")})
//! }
//! ```

mod app;
mod body;
mod config;
mod container;
mod context;
mod endpoint;
mod error;
mod handler;
mod method;
mod output;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;

pub use app::{App, ErrorRenderer, render_plain};
pub use body::Body;
pub use config::ServerConfig;
pub use container::{Container, ServiceKey};
pub use context::Context;
pub use endpoint::{Args, Candidate, Endpoint, EndpointBuilder, Form, Kind, Model, Param, ParamType, Source};
pub use error::{BoxError, Error, InvalidOutput};
pub use handler::{Call, Handler};
pub use method::{Method, MethodSet, UnknownMethod};
pub use output::{IntoOutput, Json, Output, ResponseWrapper, Text};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::{Resolved, RoutePattern, Router, Settings};
pub use server::Server;
