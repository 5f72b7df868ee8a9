//! Endpoints: named groups of candidate handlers.
//!
//! An endpoint answers one route. For each HTTP method it may hold several
//! candidate handlers, disambiguated per request by scoring how well each
//! one's declared parameters are satisfied, and any number of form handlers
//! that take precedence when the body matches their model exactly.
//!
//! ```rust
//! use ferrule::{Call, Candidate, Endpoint, Form, Json, Kind, Method, Model, Param};
//!
//! async fn by_token(call: Call) -> serde_json::Value {
//!     serde_json::json!({"token": call.args().str("x-token")})
//! }
//! async fn anonymous(_: Call) -> &'static str { "hello, stranger" }
//! async fn signup(call: Call) -> serde_json::Value {
//!     call.args().value("form").cloned().unwrap_or_default()
//! }
//!
//! let greet = Endpoint::builder("greet")
//!     .model("Signup", Model::new().field("email", Kind::Str))
//!     .candidate(Candidate::new(Method::Get, "by_token", by_token).param(Param::header("x-token")).returns(Json))
//!     .candidate(Candidate::new(Method::Get, "anonymous", anonymous).returns(ferrule::Text))
//!     .form(Form::new(Method::Post, "signup", "Signup", signup).returns(Json))
//!     .build();
//! assert!(greet.validate().is_ok());
//! ```

mod args;
mod param;
mod resolve;
mod table;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::container::Container;
use crate::error::Error;
use crate::handler::{BoxedHandler, Call, Handler};
use crate::method::Method;
use crate::output::{ResponseWrapper, assemble};
use crate::request::Request;
use crate::response::Response;
use crate::router::Settings;

pub use args::Args;
pub use param::{Kind, Model, Param, ParamType, Source};

use table::{DispatchTable, Fault};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

// ── Candidate ─────────────────────────────────────────────────────────────────

/// One handler bound to a method, with its declared parameters.
pub struct Candidate {
    method: Method,
    name: String,
    qualified: String,
    params: Vec<Param>,
    wrapper: Option<Arc<dyn ResponseWrapper>>,
    handler: BoxedHandler,
    location: &'static Location<'static>,
}

impl Candidate {
    /// Records the caller's source location for error reports.
    #[track_caller]
    pub fn new(method: Method, name: &str, handler: impl Handler) -> Self {
        Self {
            method,
            name: name.to_owned(),
            qualified: name.to_owned(),
            params: Vec::new(),
            wrapper: None,
            handler: handler.into_boxed_handler(),
            location: Location::caller(),
        }
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Declares the wrapper that turns this handler's plain values into a
    /// response.
    pub fn returns(mut self, wrapper: impl ResponseWrapper) -> Self {
        self.wrapper = Some(Arc::new(wrapper));
        self
    }

    pub fn method(&self) -> Method { self.method }
    pub fn name(&self) -> &str { &self.name }
    pub fn params(&self) -> &[Param] { &self.params }

    /// `endpoint.candidate` once the candidate belongs to an endpoint.
    pub fn qualified_name(&self) -> &str { &self.qualified }

    pub fn location(&self) -> &'static Location<'static> { self.location }

    pub(crate) fn wrapper(&self) -> Option<&dyn ResponseWrapper> {
        self.wrapper.as_deref()
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("method", &self.method)
            .field("name", &self.qualified)
            .field("params", &self.params)
            .field("wrapper", &self.wrapper.as_ref().map(|w| w.name()))
            .field("location", &format_args!("{}", self.location))
            .finish()
    }
}

// ── Form ──────────────────────────────────────────────────────────────────────

/// A handler for bodies that match a model exactly.
///
/// The validated body is bound as the `form` argument.
#[derive(Debug)]
pub struct Form {
    model: String,
    candidate: Candidate,
}

impl Form {
    #[track_caller]
    pub fn new(method: Method, name: &str, model: &str, handler: impl Handler) -> Self {
        Self { model: model.to_owned(), candidate: Candidate::new(method, name, handler) }
    }

    pub fn returns(mut self, wrapper: impl ResponseWrapper) -> Self {
        self.candidate = self.candidate.returns(wrapper);
        self
    }
}

// ── Endpoint ──────────────────────────────────────────────────────────────────

/// A named set of candidate and form handlers, shared across requests.
pub struct Endpoint {
    id: u64,
    name: String,
    candidates: Vec<Candidate>,
    forms: Vec<Form>,
    models: HashMap<String, Model>,
    table: OnceLock<Result<DispatchTable, Fault>>,
}

impl Endpoint {
    pub fn builder(name: &str) -> EndpointBuilder {
        EndpointBuilder {
            name: name.to_owned(),
            candidates: Vec::new(),
            forms: Vec::new(),
            models: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str { &self.name }

    pub(crate) fn id(&self) -> u64 { self.id }

    /// Every method with at least one candidate or form handler.
    pub fn methods(&self) -> BTreeSet<Method> {
        self.candidates.iter()
            .chain(self.forms.iter().map(|f| &f.candidate))
            .map(|c| c.method)
            .collect()
    }

    /// Compiles the dispatch table now instead of on the first request.
    ///
    /// # Errors
    ///
    /// [`Error::Annotation`] when a parameter names an unknown model or
    /// uses a model on a source that cannot carry one.
    pub fn validate(&self) -> Result<(), Error> {
        self.table().map(|_| ())
    }

    /// The compiled table. Compilation happens once; a failure is cached
    /// and reported on every call.
    fn table(&self) -> Result<&DispatchTable, Error> {
        self.table
            .get_or_init(|| table::compile(self))
            .as_ref()
            .map_err(Error::from)
    }

    fn candidate(&self, index: usize) -> &Candidate {
        &self.candidates[index]
    }

    fn form(&self, index: usize) -> &Candidate {
        &self.forms[index].candidate
    }

    /// Selects a handler for `request`, invokes it and assembles its output.
    pub(crate) async fn dispatch(
        &self,
        request: &Request,
        settings: Arc<Settings>,
        container: &Container,
    ) -> Result<Response, Error> {
        let selection = resolve::select(self, request, &settings, container)?;
        debug!(
            endpoint = %self.name,
            handler = selection.candidate.qualified_name(),
            score = selection.score,
            "handler selected",
        );
        let call = Call {
            request: Arc::new(request.clone()),
            args: selection.args,
            settings,
        };
        let output = selection.candidate.handler.call(call).await?;
        assemble(output, selection.candidate, request)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("candidates", &self.candidates.len())
            .field("forms", &self.forms.len())
            .finish()
    }
}

/// Collects candidates, forms and models for an [`Endpoint`].
pub struct EndpointBuilder {
    name: String,
    candidates: Vec<Candidate>,
    forms: Vec<Form>,
    models: HashMap<String, Model>,
}

impl EndpointBuilder {
    /// Declares a model that body and form parameters may name.
    pub fn model(mut self, name: &str, model: Model) -> Self {
        self.models.insert(name.to_owned(), model);
        self
    }

    /// Adds a candidate. Registration order breaks score ties.
    pub fn candidate(mut self, candidate: Candidate) -> Self {
        self.candidates.push(candidate);
        self
    }

    /// Adds a form handler. Forms are tried in registration order.
    pub fn form(mut self, form: Form) -> Self {
        self.forms.push(form);
        self
    }

    pub fn build(self) -> Arc<Endpoint> {
        let qualify = |c: &mut Candidate| c.qualified = format!("{}.{}", self.name, c.name);
        let mut candidates = self.candidates;
        candidates.iter_mut().for_each(qualify);
        let mut forms = self.forms;
        forms.iter_mut().for_each(|f| qualify(&mut f.candidate));

        Arc::new(Endpoint {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            name: self.name,
            candidates,
            forms,
            models: self.models,
            table: OnceLock::new(),
        })
    }
}
