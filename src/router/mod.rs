//! Request router.
//!
//! A [`Router`] owns three ordered lists: its own routes, nested sub-routers
//! and mounted (prefixed) routers. Resolution walks them in a fixed order:
//!
//! 1. mounts, in registration order, with the prefix stripped;
//! 2. sub-routers, **last added first**;
//! 3. own routes, in registration order.
//!
//! The first full `(path, method)` match wins. Routes whose path matched but
//! whose methods did not contribute to the allowed-method set, so a miss can
//! be reported as `405 Method Not Allowed` rather than `404 Not Found` even
//! when the path matched several levels down.
//!
//! Routers are cheap builders: an [`App`](crate::App) assembles a fresh one
//! for every request from its registration callbacks. Endpoints, the heavy
//! part, are shared behind `Arc`.

mod pattern;
mod reverse;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::method::{Method, MethodSet};

pub use pattern::RoutePattern;

/// Free-form settings attached to routers and routes, merged along the
/// resolution path. The dispatch core never interprets them.
pub type Settings = Map<String, Value>;

/// One registered route. Immutable once added.
pub struct RouteEntry {
    pattern: RoutePattern,
    methods: MethodSet,
    endpoint: Arc<Endpoint>,
    settings: Settings,
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("pattern", &self.pattern)
            .field("methods", &self.methods)
            .field("endpoint", &self.endpoint.name())
            .finish()
    }
}

struct Mount {
    prefix: String,
    router: Router,
}

impl Mount {
    /// The remainder of `path` below the prefix. The prefix must end on a
    /// segment boundary: `/api` owns `/api` and `/api/x`, never `/apix`.
    /// Segments are compared percent-decoded, as route patterns are.
    fn strip<'p>(&self, path: &'p str) -> Option<&'p str> {
        let mut rest = path;
        for expected in self.prefix.split('/').skip(1) {
            let tail = rest.strip_prefix('/')?;
            let end = tail.find('/').unwrap_or(tail.len());
            if pattern::decode(&tail[..end]) != pattern::decode(expected) {
                return None;
            }
            rest = &tail[end..];
        }
        if rest.is_empty() { Some("/") } else { Some(rest) }
    }
}

/// The outcome of a successful resolution.
#[derive(Debug)]
pub struct Resolved {
    pub endpoint: Arc<Endpoint>,
    pub params: HashMap<String, String>,
    pub settings: Settings,
}

/// Path-matched-but-wrong-method bookkeeping for one resolution.
#[derive(Default)]
struct Misses {
    path_matched: bool,
    allowed: BTreeSet<Method>,
}

/// The application router.
#[derive(Default)]
pub struct Router {
    routes: Vec<RouteEntry>,
    routers: Vec<Router>,
    mounts: Vec<Mount>,
    settings: Settings,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self { settings, ..Self::default() }
    }

    /// Sets one router-level setting.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn settings(&self) -> &Settings { &self.settings }

    /// Routes every method on `pattern` to `endpoint`.
    ///
    /// Path parameters use `{name}` syntax:
    ///
    /// ```rust
    /// # use ferrule::{Endpoint, Router};
    /// # let users = Endpoint::builder("users").build();
    /// let mut router = Router::new();
    /// router.route("/users/{id}", &users);
    /// ```
    pub fn route(&mut self, pattern: &str, endpoint: &Arc<Endpoint>) -> &mut Self {
        self.route_with(pattern, endpoint, MethodSet::Any, Settings::new())
    }

    /// Routes `methods` on `pattern` to `endpoint`, with per-route settings.
    pub fn route_with(
        &mut self,
        pattern: &str,
        endpoint: &Arc<Endpoint>,
        methods: impl Into<MethodSet>,
        settings: Settings,
    ) -> &mut Self {
        self.routes.push(RouteEntry {
            pattern: RoutePattern::parse(pattern),
            methods: methods.into(),
            endpoint: Arc::clone(endpoint),
            settings,
        });
        self
    }

    /// Nests `router` without a prefix. Later additions take precedence.
    pub fn add_router(&mut self, router: Router) -> &mut Self {
        self.routers.push(router);
        self
    }

    /// Mounts `router` under `prefix`; the prefix is stripped before the
    /// mounted router sees the path.
    pub fn mount(&mut self, prefix: &str, router: Router) -> &mut Self {
        let trimmed = prefix.trim_end_matches('/');
        let prefix = if trimmed.is_empty() || trimmed.starts_with('/') {
            trimmed.to_owned()
        } else {
            format!("/{trimmed}")
        };
        self.mounts.push(Mount { prefix, router });
        self
    }

    /// Resolves `(path, method)` to an endpoint.
    ///
    /// # Errors
    ///
    /// [`Error::MethodNotAllowed`] when some route at any level matched the
    /// path but none matched the method; the allowed set is the union across
    /// all of them. [`Error::NotFound`] when nothing matched the path.
    pub fn resolve(&self, path: &str, method: Method) -> Result<Resolved, Error> {
        let mut misses = Misses::default();
        if let Some(found) = self.lookup(path, method, &mut misses) {
            debug!(%method, path, endpoint = found.endpoint.name(), "route resolved");
            return Ok(found);
        }
        if misses.path_matched {
            debug!(%method, path, allowed = ?misses.allowed, "method not allowed");
            return Err(Error::MethodNotAllowed { allowed: misses.allowed });
        }
        debug!(%method, path, "no route");
        Err(Error::NotFound { method, path: path.to_owned() })
    }

    fn lookup(&self, path: &str, method: Method, misses: &mut Misses) -> Option<Resolved> {
        for mount in &self.mounts {
            let Some(rest) = mount.strip(path) else { continue };
            if let Some(found) = mount.router.lookup(rest, method, misses) {
                return Some(self.inherit(found));
            }
        }

        for router in self.routers.iter().rev() {
            if let Some(found) = router.lookup(path, method, misses) {
                return Some(self.inherit(found));
            }
        }

        for entry in &self.routes {
            let Some(params) = entry.pattern.matches(path) else { continue };
            if entry.methods.contains(method) {
                return Some(Resolved {
                    endpoint: Arc::clone(&entry.endpoint),
                    params,
                    settings: merge(&self.settings, &entry.settings),
                });
            }
            misses.path_matched = true;
            misses.allowed.extend(entry.methods.methods());
        }

        None
    }

    /// Layers this router's settings under a deeper match.
    fn inherit(&self, mut found: Resolved) -> Resolved {
        found.settings = merge(&self.settings, &found.settings);
        found
    }
}

/// Shallow merge; `top` wins on conflicts.
fn merge(base: &Settings, top: &Settings) -> Settings {
    let mut merged = base.clone();
    merged.extend(top.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}
