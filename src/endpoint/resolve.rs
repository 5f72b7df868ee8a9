//! Per-request handler selection.
//!
//! Every candidate for the request's method is extracted against the
//! request and scored. Injectable parameters (path, header, cookie, query)
//! reward real request data; generic ones (body, services, settings) only
//! need to be resolvable. Candidates that cannot be satisfied drop out;
//! the highest score wins and registration order breaks ties.

use std::cell::OnceCell;
use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tracing::debug;

use super::args::{Arg, Args};
use super::table::{Fetch, Generic, Inject, MethodTable, Plan, Slot};
use super::{Candidate, Endpoint};
use crate::container::Container;
use crate::error::Error;
use crate::request::Request;
use crate::router::Settings;

const PRESENT: i32 = 10;
const DEFAULTED: i32 = 5;
const ABSENT: i32 = -5;
const RESOLVED: i32 = 5;
const GENERIC_DEFAULT: i32 = 1;
const REAL_BONUS: i32 = 5;

/// The winning handler and the arguments bound for it.
#[derive(Debug)]
pub(crate) struct Selection<'e> {
    pub(crate) candidate: &'e Candidate,
    pub(crate) args: Args,
    pub(crate) score: i32,
}

/// Why a candidate could not be used for this request.
#[derive(Debug)]
struct Unsatisfiable {
    arg: String,
    reason: &'static str,
}

/// Request-side data shared by every candidate's extraction.
struct Sources<'r> {
    request: &'r Request,
    settings: &'r Settings,
    container: &'r Container,
    fields: OnceCell<Option<Map<String, Value>>>,
}

impl<'r> Sources<'r> {
    fn new(request: &'r Request, settings: &'r Settings, container: &'r Container) -> Self {
        Self { request, settings, container, fields: OnceCell::new() }
    }

    /// The body's field set, parsed at most once.
    fn fields(&self) -> Option<&Map<String, Value>> {
        self.fields.get_or_init(|| self.request.fields()).as_ref()
    }

    fn inject(&self, from: Inject, key: &str) -> Option<&'r str> {
        match from {
            Inject::Path   => self.request.param(key),
            Inject::Header => self.request.header(key),
            Inject::Cookie => self.request.cookie(key),
            Inject::Query  => self.request.query(key),
        }
    }

    fn generic(&self, generic: &Generic) -> Option<Arg> {
        match generic {
            Generic::Model(model) => {
                let fields = self.fields()?;
                model.check(fields, false).ok().map(Arg::Real)
            }
            Generic::Json => {
                let body = self.request.body();
                if body.is_empty() {
                    return None;
                }
                serde_json::from_slice(body).ok().map(Arg::Real)
            }
            Generic::Text => {
                let body = self.request.body();
                if body.is_empty() {
                    return None;
                }
                std::str::from_utf8(body).ok().map(|s| Arg::Real(Value::String(s.to_owned())))
            }
            Generic::Service(key) => self.container.get_key(key).map(Arg::Service),
            Generic::Settings => Some(Arg::Real(Value::Object(self.settings.clone()))),
        }
    }
}

// ── Selection ─────────────────────────────────────────────────────────────────

pub(crate) fn select<'e>(
    endpoint: &'e Endpoint,
    request: &Request,
    settings: &Settings,
    container: &Container,
) -> Result<Selection<'e>, Error> {
    let table = endpoint.table()?;
    let method = request.method();
    let Some(methods) = table.get(method) else {
        return Err(Error::MethodNotAllowed { allowed: endpoint.methods() });
    };
    let sources = Sources::new(request, settings, container);

    if let Some(selection) = match_form(endpoint, methods, &sources) {
        return Ok(selection);
    }

    let unsatisfied = |why: Unsatisfiable| -> Error {
        if methods.forms.is_empty() {
            Error::BadRequest(format!("argument `{}` {}", why.arg, why.reason))
        } else {
            let mut allowed: BTreeSet<_> = endpoint.methods();
            allowed.remove(&method);
            Error::MethodNotAllowed { allowed }
        }
    };

    match methods.candidates.as_slice() {
        [] => Err(unsatisfied(Unsatisfiable { arg: "form".into(), reason: "does not match any form" })),
        [only] => {
            let (args, score) = extract(only, &sources).map_err(unsatisfied)?;
            Ok(Selection { candidate: endpoint.candidate(only.index), args, score })
        }
        many => {
            let mut scored = Vec::with_capacity(many.len());
            let mut last = None;
            for plan in many {
                let candidate = endpoint.candidate(plan.index);
                match extract(plan, &sources) {
                    Ok((args, score)) => {
                        debug!(handler = candidate.qualified_name(), score, "candidate scored");
                        scored.push(Selection { candidate, args, score });
                    }
                    Err(why) => {
                        debug!(handler = candidate.qualified_name(), arg = %why.arg, reason = why.reason, "candidate disqualified");
                        last = Some(why);
                    }
                }
            }
            // stable: equal scores keep registration order
            scored.sort_by(|a, b| b.score.cmp(&a.score));
            match scored.into_iter().next() {
                Some(best) => Ok(best),
                None => Err(unsatisfied(last.unwrap_or(Unsatisfiable {
                    arg: String::new(),
                    reason: "no candidate matched",
                }))),
            }
        }
    }
}

fn match_form<'e>(endpoint: &'e Endpoint, methods: &MethodTable, sources: &Sources<'_>) -> Option<Selection<'e>> {
    if methods.forms.is_empty() {
        return None;
    }
    let fields = sources.fields()?;
    methods.forms.iter().find_map(|form| {
        let value = form.model.check(fields, true).ok()?;
        let candidate = endpoint.form(form.index);
        debug!(handler = candidate.qualified_name(), "form matched");
        let mut args = Args::default();
        args.bind("form", Arg::Real(value));
        Some(Selection { candidate, args, score: 0 })
    })
}

/// Binds every slot of `plan`, returning the arguments and the score.
fn extract(plan: &Plan, sources: &Sources<'_>) -> Result<(Args, i32), Unsatisfiable> {
    let mut args = Args::default();
    let mut fitness = 0;
    let mut real = 0;

    for slot in &plan.slots {
        let (arg, fit) = match &slot.fetch {
            Fetch::Inject { from, key, kind } => match sources.inject(*from, key) {
                Some(raw) => {
                    let value = kind.parse(raw).ok_or_else(|| unsatisfiable(slot, "cannot be converted"))?;
                    real += 1;
                    (Arg::Real(value), PRESENT)
                }
                None => match &slot.default {
                    Some(default) => (Arg::Default(default.clone()), DEFAULTED),
                    None => (Arg::Missing, ABSENT),
                },
            },
            Fetch::Generic(generic) => match sources.generic(generic) {
                Some(arg) => (arg, RESOLVED),
                None => match &slot.default {
                    Some(default) => (Arg::Default(default.clone()), GENERIC_DEFAULT),
                    None => return Err(unsatisfiable(slot, "cannot be resolved")),
                },
            },
        };
        fitness += fit;
        args.bind(&slot.arg, arg);
    }

    Ok((args, fitness + REAL_BONUS * real))
}

fn unsatisfiable(slot: &Slot, reason: &'static str) -> Unsatisfiable {
    Unsatisfiable { arg: slot.arg.clone(), reason }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::endpoint::{Form, Kind, Model, Param};
    use crate::handler::Call;
    use crate::method::Method;

    async fn noop(_: Call) {}

    struct Db;

    fn pick(endpoint: &Endpoint, request: &Request) -> Result<String, Error> {
        pick_in(endpoint, request, &Container::new())
    }

    fn pick_in(endpoint: &Endpoint, request: &Request, container: &Container) -> Result<String, Error> {
        select(endpoint, request, &Settings::new(), container)
            .map(|s| s.candidate.qualified_name().to_owned())
    }

    fn greet() -> Arc<Endpoint> {
        Endpoint::builder("greet")
            .candidate(Candidate::new(Method::Get, "anonymous", noop))
            .candidate(Candidate::new(Method::Get, "by_token", noop).param(Param::header("X-Foo")))
            .build()
    }

    #[test]
    fn header_requiring_candidate_wins_only_when_header_present() {
        let endpoint = greet();
        let with = Request::new(Method::Get, "/").with_header("x-foo", "1");
        assert_eq!(pick(&endpoint, &with).unwrap(), "greet.by_token");
        assert_eq!(pick(&endpoint, &Request::new(Method::Get, "/")).unwrap(), "greet.anonymous");
    }

    #[test]
    fn equal_scores_keep_registration_order() {
        let endpoint = Endpoint::builder("e")
            .candidate(Candidate::new(Method::Get, "first", noop).param(Param::query("q")))
            .candidate(Candidate::new(Method::Get, "second", noop).param(Param::query("q")))
            .build();
        assert_eq!(pick(&endpoint, &Request::new(Method::Get, "/?q=1")).unwrap(), "e.first");
    }

    #[test]
    fn defaults_bind_and_outscore_missing() {
        let endpoint = Endpoint::builder("list")
            .candidate(Candidate::new(Method::Get, "strict", noop).param(Param::query("page").ty(Kind::Int)))
            .candidate(Candidate::new(Method::Get, "paged", noop).param(Param::query("page").ty(Kind::Int).default(1)))
            .build();
        let request = Request::new(Method::Get, "/");
        let selection = select(&endpoint, &request, &Settings::new(), &Container::new()).unwrap();
        assert_eq!(selection.candidate.qualified_name(), "list.paged");
        assert_eq!(selection.score, DEFAULTED);
        assert_eq!(selection.args.i64("page"), Some(1));
    }

    #[test]
    fn unconvertible_value_disqualifies() {
        let endpoint = Endpoint::builder("item")
            .candidate(Candidate::new(Method::Get, "by_id", noop).param(Param::path("id").ty(Kind::Int)))
            .candidate(Candidate::new(Method::Get, "by_slug", noop).param(Param::path("id")))
            .build();
        let mut request = Request::new(Method::Get, "/items/abc");
        request.params.insert("id".into(), "abc".into());
        assert_eq!(pick(&endpoint, &request).unwrap(), "item.by_slug");

        request.params.insert("id".into(), "7".into());
        assert_eq!(pick(&endpoint, &request).unwrap(), "item.by_id");
    }

    #[test]
    fn services_resolve_from_the_container() {
        let endpoint = Endpoint::builder("report")
            .candidate(Candidate::new(Method::Get, "cached", noop).param(Param::service::<Db>("db")))
            .candidate(Candidate::new(Method::Get, "plain", noop))
            .build();
        let request = Request::new(Method::Get, "/");
        assert_eq!(pick(&endpoint, &request).unwrap(), "report.plain");

        let mut container = Container::new();
        container.insert(Db);
        assert_eq!(pick_in(&endpoint, &request, &container).unwrap(), "report.cached");
    }

    #[test]
    fn single_candidate_failure_is_bad_request() {
        let endpoint = Endpoint::builder("upload")
            .candidate(Candidate::new(Method::Post, "raw", noop).param(Param::body("data", "Upload")))
            .model("Upload", Model::new().field("name", Kind::Str))
            .build();
        let err = pick(&endpoint, &Request::new(Method::Post, "/")).unwrap_err();
        assert!(matches!(err, Error::BadRequest(ref d) if d.contains("data")));
    }

    #[test]
    fn forms_win_first_and_failures_become_405() {
        let endpoint = Endpoint::builder("users")
            .model("Signup", Model::new().field("email", Kind::Str))
            .candidate(Candidate::new(Method::Get, "list", noop))
            .candidate(Candidate::new(Method::Post, "import", noop).param(Param::body("doc", "Signup")).param(Param::header("x-import")))
            .form(Form::new(Method::Post, "signup", "Signup", noop))
            .build();

        let exact = Request::new(Method::Post, "/").with_form(&[("email", "a@b.c")]);
        assert_eq!(pick(&endpoint, &exact).unwrap(), "users.signup");

        let extra = Request::new(Method::Post, "/").with_json(&json!({"email": "a@b.c", "admin": true}));
        assert_eq!(pick(&endpoint, &extra).unwrap(), "users.import");

        let err = pick(&endpoint, &Request::new(Method::Post, "/")).unwrap_err();
        let Error::MethodNotAllowed { allowed } = err else { panic!("expected 405, got {err:?}") };
        assert_eq!(allowed.into_iter().collect::<Vec<_>>(), [Method::Get]);
    }

    fn numbered(forms: bool) -> Arc<Endpoint> {
        let builder = Endpoint::builder("numbered")
            .model("Note", Model::new().field("text", Kind::Str))
            .candidate(Candidate::new(Method::Get, "read", noop))
            .candidate(Candidate::new(Method::Post, "by_id", noop).param(Param::query("n").ty(Kind::Int)))
            .candidate(Candidate::new(Method::Post, "by_rank", noop).param(Param::query("n").ty(Kind::Float)));
        if forms {
            builder.form(Form::new(Method::Post, "annotate", "Note", noop)).build()
        } else {
            builder.build()
        }
    }

    #[test]
    fn every_candidate_disqualified_is_bad_request() {
        let err = pick(&numbered(false), &Request::new(Method::Post, "/?n=seven")).unwrap_err();
        assert!(matches!(err, Error::BadRequest(ref d) if d.contains("`n`")), "got {err:?}");
    }

    #[test]
    fn every_candidate_disqualified_with_forms_is_405() {
        let err = pick(&numbered(true), &Request::new(Method::Post, "/?n=seven")).unwrap_err();
        let Error::MethodNotAllowed { allowed } = err else { panic!("expected 405, got {err:?}") };
        assert_eq!(allowed.into_iter().collect::<Vec<_>>(), [Method::Get]);
    }

    #[test]
    fn method_without_handlers_lists_endpoint_methods() {
        let err = pick(&greet(), &Request::new(Method::Delete, "/")).unwrap_err();
        let Error::MethodNotAllowed { allowed } = err else { panic!("expected 405") };
        assert!(allowed.contains(&Method::Get));
        assert_eq!(allowed.len(), 1);
    }

    #[test]
    fn annotation_errors_are_fatal_on_every_dispatch() {
        let endpoint = Endpoint::builder("broken")
            .candidate(Candidate::new(Method::Get, "ok", noop))
            .candidate(Candidate::new(Method::Get, "bad", noop).param(Param::body("x", "Nope")))
            .build();
        for _ in 0..2 {
            let err = pick(&endpoint, &Request::new(Method::Get, "/")).unwrap_err();
            assert!(matches!(err, Error::Annotation { ref handler, .. } if handler == "broken.bad"));
        }
        assert!(endpoint.validate().is_err());
    }
}
