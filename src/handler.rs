//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! An endpoint holds candidate handlers of *different* types in one list,
//! so each handler is hidden behind a trait object (`dyn ErasedHandler`):
//!
//! ```text
//! async fn show(call: Call) -> Response { … }      ← user writes this
//!        ↓ Candidate::new(Method::Get, "show", show)
//! show.into_boxed_handler()                        ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(show))                        ← stored as BoxedHandler
//!        ↓
//! handler.call(call)  at request time              ← one vtable dispatch
//!        ↓
//! Box::pin(async { show(call).await.into_output() })
//! ```
//!
//! Handlers receive a [`Call`]: the request, the arguments the resolver
//! bound for this candidate, and the merged route settings.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::endpoint::Args;
use crate::error::Error;
use crate::output::{IntoOutput, Output};
use crate::request::Request;
use crate::router::Settings;

/// A heap-allocated, type-erased future resolving to a handler's output.
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Result<Output, Error>> + Send + 'static>>;

/// Internal dispatch interface.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, call: Call) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Everything a handler is invoked with.
#[derive(Debug)]
pub struct Call {
    pub(crate) request: Arc<Request>,
    pub(crate) args: Args,
    pub(crate) settings: Arc<Settings>,
}

impl Call {
    pub fn request(&self) -> &Request { &self.request }
    pub fn args(&self) -> &Args { &self.args }

    /// Route settings merged along the resolution path.
    pub fn settings(&self) -> &Settings { &self.settings }

    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// Shorthand for a path parameter on the request.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.request.param(key)
    }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid handler.
///
/// Automatically satisfied by any function with the shape
///
/// ```text
/// async fn name(call: Call) -> impl IntoOutput
/// ```
///
/// The trait is sealed; only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Call) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutput + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Call) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutput + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Bridges a concrete handler `F` to [`ErasedHandler`].
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Call) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutput + Send + 'static,
{
    fn call(&self, call: Call) -> BoxFuture {
        let fut = (self.0)(call);
        Box::pin(async move { fut.await.into_output() })
    }
}
