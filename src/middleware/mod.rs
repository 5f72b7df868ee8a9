//! Onion middleware.
//!
//! A middleware unit has two phases. [`enter`](Middleware::enter) runs on
//! the way in, in registration order; [`leave`](Middleware::leave) runs on
//! the way out, in reverse. Between the two sits everything registered
//! after the unit, down to the handler.
//!
//! ```text
//!   enter A → enter B → before hooks → dispatch → after hooks → leave B → leave A
//! ```
//!
//! # Errors on the way out
//!
//! `leave` sees the error raised further in, if any, and decides what
//! happens to it:
//!
//! | `leave` returns       | with an error in flight          | without one           |
//! |-----------------------|----------------------------------|-----------------------|
//! | `Ok(Flow::Pass)`      | error keeps propagating          | nothing changes       |
//! | `Ok(Flow::Handled)`   | error is suppressed              | nothing changes       |
//! | `Err(new)`            | `new` replaces it, old is cause  | `new` becomes current |
//!
//! A unit whose `enter` fails never gets a `leave`; units entered before it
//! still tear down, with that error injected.
//!
//! Units are created fresh per request by a [`MiddlewareFactory`]; any
//! `Fn() -> impl Middleware` is one:
//!
//! ```rust
//! use ferrule::App;
//! use ferrule::middleware::Trace;
//!
//! let app = App::new().middleware(Trace::new);
//! ```

mod trace;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::Error;

pub use trace::Trace;

/// What a unit decided about the error it was handed in `leave`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Let the current error, if any, keep propagating.
    Pass,
    /// The current error has been dealt with; drop it.
    Handled,
}

/// A two-phase middleware unit. Single use: one `enter`, at most one `leave`.
#[async_trait]
pub trait Middleware: Send {
    async fn enter(&mut self, _cx: &mut Context) -> Result<(), Error> {
        Ok(())
    }

    async fn leave(&mut self, _cx: &mut Context, _error: Option<&Error>) -> Result<Flow, Error> {
        Ok(Flow::Pass)
    }
}

/// Produces one middleware unit per request.
pub trait MiddlewareFactory: Send + Sync + 'static {
    fn create(&self) -> Box<dyn Middleware>;
}

impl<F, M> MiddlewareFactory for F
where
    F: Fn() -> M + Send + Sync + 'static,
    M: Middleware + 'static,
{
    fn create(&self) -> Box<dyn Middleware> {
        Box::new(self())
    }
}

/// The unit of work at the centre of the onion.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, cx: &mut Context) -> Result<(), Error>;
}

pub type BeforeHook = Arc<dyn Fn(&mut Context) + Send + Sync>;
pub type AfterHook = Arc<dyn Fn(&mut Context, Option<&Error>) + Send + Sync>;

// ── Stack ─────────────────────────────────────────────────────────────────────

/// Ordered middleware factories and dispatch hooks.
#[derive(Clone, Default)]
pub struct MiddlewareStack {
    factories: Vec<Arc<dyn MiddlewareFactory>>,
    before: Vec<BeforeHook>,
    after: Vec<AfterHook>,
}

impl MiddlewareStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, factory: impl MiddlewareFactory) {
        self.factories.push(Arc::new(factory));
    }

    /// Runs after setup, right before dispatch.
    pub fn before_dispatch(&mut self, hook: impl Fn(&mut Context) + Send + Sync + 'static) {
        self.before.push(Arc::new(hook));
    }

    /// Runs right after dispatch, seeing its error if it failed.
    pub fn after_dispatch(&mut self, hook: impl Fn(&mut Context, Option<&Error>) + Send + Sync + 'static) {
        self.after.push(Arc::new(hook));
    }

    pub fn len(&self) -> usize { self.factories.len() }
    pub fn is_empty(&self) -> bool { self.factories.is_empty() }

    /// Drives one request through the stack.
    ///
    /// If `cancel` resolves during setup or dispatch, the step in flight is
    /// dropped and [`Error::Cancelled`] becomes the current error. Teardown
    /// always runs to completion for every unit that entered.
    pub async fn run<C>(&self, cx: &mut Context, work: &dyn Dispatch, cancel: C) -> Result<(), Error>
    where
        C: Future<Output = ()> + Send,
    {
        tokio::pin!(cancel);
        let mut entered: Vec<Box<dyn Middleware>> = Vec::with_capacity(self.factories.len());
        let mut current = None;

        for (index, factory) in self.factories.iter().enumerate() {
            let mut unit = factory.create();
            let step = tokio::select! {
                biased;
                () = &mut cancel => Err(Error::Cancelled),
                res = unit.enter(cx) => res,
            };
            match step {
                Ok(()) => {
                    debug!(index, "middleware entered");
                    entered.push(unit);
                }
                Err(e) => {
                    debug!(index, error = %e, "middleware setup failed");
                    current = Some(e);
                    break;
                }
            }
        }

        if current.is_none() {
            for hook in &self.before {
                hook(cx);
            }
            let res = tokio::select! {
                biased;
                () = &mut cancel => Err(Error::Cancelled),
                res = work.dispatch(cx) => res,
            };
            current = res.err();
            for hook in &self.after {
                hook(cx, current.as_ref());
            }
        }

        while let Some(mut unit) = entered.pop() {
            let index = entered.len();
            let outcome = unit.leave(cx, current.as_ref()).await;
            current = match (outcome, current.take()) {
                (Ok(Flow::Pass), err) => err,
                (Ok(Flow::Handled), Some(err)) => {
                    warn!(index, error = %err, "middleware suppressed error");
                    None
                }
                (Ok(Flow::Handled), None) => None,
                (Err(new), Some(old)) => {
                    warn!(index, error = %new, replaced = %old, "middleware replaced error");
                    Some(new.caused_by(old))
                }
                (Err(new), None) => {
                    debug!(index, error = %new, "middleware teardown failed");
                    Some(new)
                }
            };
        }

        current.map_or(Ok(()), Err)
    }
}
