//! Reverse routing: building a URL for an endpoint from parameters.

use super::{RoutePattern, Router};
use crate::endpoint::Endpoint;
use crate::error::Error;

impl Router {
    /// Builds the path of `endpoint` from `params`.
    ///
    /// When the endpoint is reachable through several patterns, the one whose
    /// parameters are all provided and that consumes the most of `params`
    /// wins; on a tie the pattern registered last is used. Parameters that no
    /// pattern uses are ignored.
    ///
    /// ```rust
    /// # use ferrule::{Endpoint, Router};
    /// let user = Endpoint::builder("user").build();
    /// let mut router = Router::new();
    /// router.route("/users/{id}", &user);
    /// assert_eq!(router.url_for(&user, &[("id", "42")]).unwrap(), "/users/42");
    /// assert!(router.url_for(&user, &[]).is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// [`Error::Reverse`] if the endpoint is not routed here, or if no
    /// pattern can be filled from `params`.
    pub fn url_for(&self, endpoint: &Endpoint, params: &[(&str, &str)]) -> Result<String, Error> {
        self.reverse(endpoint.name(), &|e| e.id() == endpoint.id(), params)
    }

    /// Like [`url_for`](Self::url_for), locating the endpoint by name.
    pub fn url_for_name(&self, name: &str, params: &[(&str, &str)]) -> Result<String, Error> {
        self.reverse(name, &|e| e.name() == name, params)
    }

    fn reverse(
        &self,
        label: &str,
        wanted: &dyn Fn(&Endpoint) -> bool,
        params: &[(&str, &str)],
    ) -> Result<String, Error> {
        let mut patterns = Vec::new();
        self.collect_patterns("", wanted, &mut patterns);

        let lookup = |name: &str| params.iter().find(|(k, _)| *k == name).map(|(_, v)| *v);

        // Registration order is the index; `max_by_key` keeps the last maximum.
        let best = patterns.iter()
            .filter(|p| p.param_names().all(|n| lookup(n).is_some()))
            .max_by_key(|p| p.param_names().count());

        let Some(chosen) = best.or(patterns.last()) else {
            return Err(Error::Reverse {
                endpoint: label.to_owned(),
                detail: "endpoint is not routed".to_owned(),
            });
        };

        chosen.fill(lookup).map_err(|missing| Error::Reverse {
            endpoint: label.to_owned(),
            detail: format!("missing parameter(s) {} for pattern `{chosen}`", missing.join(", ")),
        })
    }

    /// Every full pattern routed to a wanted endpoint: own routes, then
    /// sub-routers, then mounts, each in registration order.
    fn collect_patterns(
        &self,
        prefix: &str,
        wanted: &dyn Fn(&Endpoint) -> bool,
        out: &mut Vec<RoutePattern>,
    ) {
        for entry in &self.routes {
            if wanted(entry.endpoint.as_ref()) {
                out.push(RoutePattern::parse(&format!("{prefix}{}", entry.pattern.as_str())));
            }
        }
        for router in &self.routers {
            router.collect_patterns(prefix, wanted, out);
        }
        for mount in &self.mounts {
            let joined = format!("{prefix}{}", mount.prefix);
            mount.router.collect_patterns(&joined, wanted, out);
        }
    }
}
