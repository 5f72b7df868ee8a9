//! Segment-wise path patterns.
//!
//! A pattern such as `/users/{id}/posts` is split on `/` into literal and
//! parameter segments. A path matches when it has exactly as many segments
//! and every literal segment is equal; each `{name}` segment binds exactly
//! one path segment. There are no wildcards.
//!
//! Comparison happens on percent-decoded segments: `/caf%C3%A9` on the wire
//! matches a `/café` literal, and [`RoutePattern::fill`] encodes literals
//! and values alike.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A compiled route pattern.
#[derive(Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    pub fn parse(raw: &str) -> Self {
        let segments = split(raw)
            .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) if !name.is_empty() => Segment::Param(name.to_owned()),
                _ => Segment::Literal(decode(s).into_owned()),
            })
            .collect();
        Self { raw: raw.to_owned(), segments }
    }

    pub fn as_str(&self) -> &str { &self.raw }

    /// Names of the `{param}` segments, in order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Matches `path`, returning the bound (percent-decoded) parameters.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let mut parts = split(path);
        let mut params = HashMap::new();
        for segment in &self.segments {
            let part = decode(parts.next()?);
            match segment {
                Segment::Literal(lit) => {
                    if *lit != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), part.into_owned());
                }
            }
        }
        if parts.next().is_some() {
            return None;
        }
        Some(params)
    }

    /// Fills every parameter from `lookup`, percent-encoding literals and
    /// values.
    ///
    /// Returns the names that `lookup` could not provide on failure.
    pub fn fill<'a, F>(&'a self, lookup: F) -> Result<String, Vec<&'a str>>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let mut missing = Vec::new();
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Literal(lit) => out.push_str(&urlencoding::encode(lit)),
                Segment::Param(name) => match lookup(name) {
                    Some(value) => out.push_str(&urlencoding::encode(value)),
                    None => missing.push(name.as_str()),
                },
            }
        }
        if !missing.is_empty() {
            return Err(missing);
        }
        if out.is_empty() {
            out.push('/');
        }
        Ok(out)
    }
}

impl fmt::Debug for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoutePattern({})", self.raw)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Percent-decodes one path segment. Malformed escapes are kept verbatim.
pub(crate) fn decode(segment: &str) -> Cow<'_, str> {
    urlencoding::decode(segment).unwrap_or(Cow::Borrowed(segment))
}

/// Path segments; leading and trailing slashes carry no segment.
fn split(path: &str) -> impl Iterator<Item = &str> {
    let trimmed = path.trim_matches('/');
    trimmed.split('/').filter(move |_| !trimmed.is_empty())
}
