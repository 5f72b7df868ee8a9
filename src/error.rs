//! Unified error type.
//!
//! Every failure the dispatch core can produce is a variant of [`Error`].
//! The core never renders these; a renderer (see
//! [`App::error_renderer`](crate::App::error_renderer)) turns them into
//! wire responses.

use std::collections::BTreeSet;
use std::fmt;

use http::StatusCode;
use thiserror::Error;

use crate::method::Method;

/// A boxed application error, as raised by handlers and middleware.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by ferrule's fallible operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No pattern/method combination matched anywhere in the router tree.
    #[error("no route for {method} {path}")]
    NotFound { method: Method, path: String },

    /// At least one pattern matched the path, none matched the method.
    #[error("method not allowed, allowed: {}", AllowList(.allowed))]
    MethodNotAllowed { allowed: BTreeSet<Method> },

    /// A lone handler's required parameters could not be satisfied.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A handler's declared parameter or return types cannot be resolved.
    /// Always fatal; never treated as a routing miss.
    #[error("cannot evaluate annotations of `{handler}`: {detail}")]
    Annotation { handler: String, detail: String },

    /// Reverse routing could not build a URL.
    #[error("cannot build url for `{endpoint}`: {detail}")]
    Reverse { endpoint: String, detail: String },

    /// A handler returned something that is not a response.
    #[error("{0}")]
    InvalidOutput(Box<InvalidOutput>),

    /// The request task was cancelled while the pipeline was running.
    #[error("request cancelled")]
    Cancelled,

    /// Opaque application error raised by a handler or middleware.
    #[error(transparent)]
    Application(BoxError),

    /// An error raised while another was being torn down.
    #[error("{error}")]
    Chained {
        error: Box<Error>,
        #[source]
        cause: Box<Error>,
    },

    /// Server configuration could not be read.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wraps any application error.
    pub fn app(err: impl Into<BoxError>) -> Self {
        Self::Application(err.into())
    }

    /// Shorthand for an application error built from a message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::Application(message.to_string().into())
    }

    /// Records `cause` as the error this one replaced.
    pub fn caused_by(self, cause: Error) -> Self {
        Self::Chained { error: Box::new(self), cause: Box::new(cause) }
    }

    /// The outermost error, looking through cause chains.
    pub fn kind(&self) -> &Error {
        match self {
            Self::Chained { error, .. } => error.kind(),
            other => other,
        }
    }

    /// The error this one replaced during teardown, if any.
    pub fn cause(&self) -> Option<&Error> {
        match self {
            Self::Chained { cause, .. } => Some(cause),
            _ => None,
        }
    }

    /// The HTTP status a renderer should use for this error.
    pub fn status(&self) -> StatusCode {
        match self.kind() {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Value for an `Allow` header, present only for 405s.
    pub fn allow_header(&self) -> Option<String> {
        match self.kind() {
            Self::MethodNotAllowed { allowed } => Some(AllowList(allowed).to_string()),
            _ => None,
        }
    }
}

/// Details of a handler output that could not become a response.
#[derive(Debug)]
pub struct InvalidOutput {
    pub handler: String,
    pub location: String,
    pub method: Method,
    pub path: String,
    pub received: &'static str,
    /// Set when a response wrapper was declared but did not produce a
    /// response; that is a fault in the framework, not the handler.
    pub framework_defect: bool,
}

impl fmt::Display for InvalidOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.framework_defect {
            write!(
                f,
                "internal error: the response wrapper declared on `{}` ({}) did not build a response \
                 for {} {} (received {}); this is a framework defect",
                self.handler, self.location, self.method, self.path, self.received,
            )
        } else {
            write!(
                f,
                "handler `{}` ({}) returned {} for {} {}; return a Response or declare a response wrapper",
                self.handler, self.location, self.received, self.method, self.path,
            )
        }
    }
}

struct AllowList<'a>(&'a BTreeSet<Method>);

impl fmt::Display for AllowList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, method) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(method.as_str())?;
        }
        Ok(())
    }
}
