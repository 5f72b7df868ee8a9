//! HTTP method as a typed enum, and the method sets routes are bound to.
//!
//! Covers the RFC 9110 methods plus `PURGE` (nginx / Varnish cache
//! invalidation). Variants are ordered alphabetically so method sets
//! render deterministically in `Allow` headers.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A known HTTP method.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Method {
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Purge,
    Put,
    Trace,
}

impl Method {
    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Delete  => "DELETE",
            Self::Get     => "GET",
            Self::Head    => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch   => "PATCH",
            Self::Post    => "POST",
            Self::Purge   => "PURGE",
            Self::Put     => "PUT",
            Self::Trace   => "TRACE",
        }
    }
}

/// Parses an uppercase method string (e.g. `"GET"`). Case-sensitive per RFC 9110 §9.1.
impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" => Ok(Self::Connect),
            "DELETE"  => Ok(Self::Delete),
            "GET"     => Ok(Self::Get),
            "HEAD"    => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "PATCH"   => Ok(Self::Patch),
            "POST"    => Ok(Self::Post),
            "PURGE"   => Ok(Self::Purge),
            "PUT"     => Ok(Self::Put),
            "TRACE"   => Ok(Self::Trace),
            other     => Err(UnknownMethod(other.to_owned())),
        }
    }
}

impl TryFrom<&http::Method> for Method {
    type Error = UnknownMethod;

    fn try_from(m: &http::Method) -> Result<Self, Self::Error> {
        m.as_str().parse()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A method string the server does not route.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown http method `{0}`")]
pub struct UnknownMethod(pub String);

// ── MethodSet ─────────────────────────────────────────────────────────────────

/// The methods a route answers to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum MethodSet {
    /// Every method reaches the route; the endpoint decides.
    #[default]
    Any,
    Only(BTreeSet<Method>),
}

impl MethodSet {
    pub fn contains(&self, method: Method) -> bool {
        match self {
            Self::Any => true,
            Self::Only(set) => set.contains(&method),
        }
    }

    /// The explicit methods, empty for [`MethodSet::Any`].
    pub fn methods(&self) -> impl Iterator<Item = Method> + '_ {
        let set = match self {
            Self::Any => None,
            Self::Only(set) => Some(set),
        };
        set.into_iter().flatten().copied()
    }
}

impl From<Method> for MethodSet {
    fn from(m: Method) -> Self {
        Self::Only(BTreeSet::from([m]))
    }
}

impl<const N: usize> From<[Method; N]> for MethodSet {
    fn from(ms: [Method; N]) -> Self {
        Self::Only(ms.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_names_case_sensitively() {
        assert_eq!("PATCH".parse::<Method>(), Ok(Method::Patch));
        assert!("get".parse::<Method>().is_err());
        assert_eq!(Method::try_from(&http::Method::DELETE), Ok(Method::Delete));
    }

    #[test]
    fn any_contains_everything_but_lists_nothing() {
        assert!(MethodSet::Any.contains(Method::Trace));
        assert_eq!(MethodSet::Any.methods().count(), 0);

        let only = MethodSet::from([Method::Get, Method::Head]);
        assert!(only.contains(Method::Head));
        assert!(!only.contains(Method::Post));
        assert_eq!(only.methods().collect::<Vec<_>>(), vec![Method::Get, Method::Head]);
    }
}
