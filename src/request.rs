//! Incoming HTTP request type.

use std::collections::{BTreeSet, HashMap};

use bytes::Bytes;
use http::HeaderMap;
use http::header::{CONTENT_TYPE, COOKIE, HeaderName, HeaderValue};
use serde_json::{Map, Value};
use url::form_urlencoded;

use crate::error::Error;
use crate::method::Method;

/// An incoming HTTP request with its body already collected.
#[derive(Clone, Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
}

impl Request {
    /// Builds a request for `target` (path plus optional `?query`).
    ///
    /// ```rust
    /// use ferrule::{Method, Request};
    ///
    /// let req = Request::new(Method::Get, "/users/42?expand=posts")
    ///     .with_header("x-request-id", "abc");
    /// assert_eq!(req.path(), "/users/42");
    /// assert_eq!(req.query("expand"), Some("posts"));
    /// ```
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p, parse_pairs(q.as_bytes())),
            None => (target, Vec::new()),
        };
        let path = if path.is_empty() { "/" } else { path };
        Self {
            method,
            path: path.to_owned(),
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
        }
    }

    /// Converts hyper's request head and a collected body.
    ///
    /// A method ferrule does not know cannot be routed anywhere, so it is
    /// reported as a 405 with an empty allowed set.
    pub(crate) fn from_parts(parts: http::request::Parts, body: Bytes) -> Result<Self, Error> {
        let method = Method::try_from(&parts.method)
            .map_err(|_| Error::MethodNotAllowed { allowed: BTreeSet::new() })?;
        let query = parts.uri.query().map(|q| parse_pairs(q.as_bytes())).unwrap_or_default();
        Ok(Self {
            method,
            path: parts.uri.path().to_owned(),
            query,
            headers: parts.headers,
            body,
            params: HashMap::new(),
        })
    }

    /// Adds a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body and its content type.
    pub fn with_json(self, value: &Value) -> Self {
        self.with_header("content-type", "application/json")
            .with_body(value.to_string())
    }

    /// Sets an urlencoded form body and its content type.
    pub fn with_form(self, pairs: &[(&str, &str)]) -> Self {
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        self.with_header("content-type", "application/x-www-form-urlencoded")
            .with_body(encoded)
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// First value of a query-string parameter.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn query_pairs(&self) -> &[(String, String)] { &self.query }

    /// A cookie from the `Cookie` header(s).
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers.get_all(COOKIE).iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> { &self.params }

    /// The body's field set, for JSON-object and urlencoded bodies.
    ///
    /// Urlencoded values are strings; repeated keys keep the last value.
    /// Returns `None` for empty, malformed or non-form bodies.
    pub fn fields(&self) -> Option<Map<String, Value>> {
        if self.body.is_empty() {
            return None;
        }
        let content_type = self.header(CONTENT_TYPE.as_str()).unwrap_or_default();
        let mime = content_type.split(';').next().unwrap_or_default().trim();
        match mime {
            "application/json" => match serde_json::from_slice(&self.body) {
                Ok(Value::Object(map)) => Some(map),
                _ => None,
            },
            "application/x-www-form-urlencoded" => Some(
                form_urlencoded::parse(&self.body)
                    .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                    .collect(),
            ),
            _ => None,
        }
    }
}

fn parse_pairs(raw: &[u8]) -> Vec<(String, String)> {
    form_urlencoded::parse(raw).into_owned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cookies_are_split_across_headers() {
        let req = Request::new(Method::Get, "/")
            .with_header("cookie", "a=1; session=xyz")
            .with_header("cookie", "theme=dark");
        assert_eq!(req.cookie("session"), Some("xyz"));
        assert_eq!(req.cookie("theme"), Some("dark"));
        assert_eq!(req.cookie("missing"), None);
    }

    #[test]
    fn fields_from_json_and_urlencoded_bodies() {
        let json_req = Request::new(Method::Post, "/").with_json(&json!({"name": "ada", "age": 36}));
        let fields = json_req.fields().unwrap_or_default();
        assert_eq!(fields.get("age"), Some(&json!(36)));

        let form_req = Request::new(Method::Post, "/").with_form(&[("name", "ada lovelace")]);
        let fields = form_req.fields().unwrap_or_default();
        assert_eq!(fields.get("name"), Some(&json!("ada lovelace")));

        let text_req = Request::new(Method::Post, "/").with_body("plain");
        assert!(text_req.fields().is_none());
    }

    #[test]
    fn from_parts_maps_unknown_methods_to_405() {
        let head = |method: &str| {
            http::Request::builder().method(method).uri("/pot?size=2").body(()).unwrap().into_parts().0
        };
        let err = Request::from_parts(head("BREW"), Bytes::new()).unwrap_err();
        assert!(matches!(err, Error::MethodNotAllowed { ref allowed } if allowed.is_empty()));

        let req = Request::from_parts(head("PUT"), Bytes::from_static(b"x")).unwrap();
        assert_eq!(req.method(), Method::Put);
        assert_eq!(req.query("size"), Some("2"));
        assert_eq!(req.body(), b"x");
    }

    #[test]
    fn empty_target_is_root() {
        let req = Request::new(Method::Get, "?q=1");
        assert_eq!(req.path(), "/");
        assert_eq!(req.query("q"), Some("1"));
    }
}
