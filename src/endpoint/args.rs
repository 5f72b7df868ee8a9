//! Arguments bound for one handler invocation.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Error;

#[derive(Clone)]
pub(crate) enum Arg {
    /// Data taken from the request.
    Real(Value),
    /// The declared default; the request had nothing for it.
    Default(Value),
    Service(Arc<dyn Any + Send + Sync>),
    /// A required injectable the request did not carry.
    Missing,
}

/// Named arguments for a handler, as bound by the resolver.
#[derive(Clone, Default)]
pub struct Args {
    values: HashMap<String, Arg>,
}

impl Args {
    pub(crate) fn bind(&mut self, name: &str, arg: Arg) {
        self.values.insert(name.to_owned(), arg);
    }

    /// The bound value, or `None` for missing and service arguments.
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.values.get(name)? {
            Arg::Real(v) | Arg::Default(v) => Some(v),
            Arg::Service(_) | Arg::Missing => None,
        }
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.value(name)?.as_str()
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.value(name)?.as_i64()
    }

    /// Deserializes a bound value.
    ///
    /// # Errors
    ///
    /// [`Error::BadRequest`] when the argument is missing or does not
    /// deserialize into `T`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, Error> {
        let value = self.value(name)
            .ok_or_else(|| Error::BadRequest(format!("missing argument `{name}`")))?;
        T::deserialize(value)
            .map_err(|e| Error::BadRequest(format!("argument `{name}`: {e}")))
    }

    /// A service argument.
    pub fn service<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        match self.values.get(name)? {
            Arg::Service(s) => Arc::clone(s).downcast::<T>().ok(),
            _ => None,
        }
    }

    /// Whether the argument was filled from the request rather than a default.
    pub fn is_from_request(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(Arg::Real(_)))
    }

    pub fn is_missing(&self, name: &str) -> bool {
        matches!(self.values.get(name), None | Some(Arg::Missing))
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, arg) in &self.values {
            match arg {
                Arg::Real(v) => map.entry(name, v),
                Arg::Default(v) => map.entry(name, &format_args!("{v} (default)")),
                Arg::Service(_) => map.entry(name, &format_args!("<service>")),
                Arg::Missing => map.entry(name, &format_args!("<missing>")),
            };
        }
        map.finish()
    }
}
