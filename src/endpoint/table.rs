//! The per-endpoint dispatch table.
//!
//! Compiling an endpoint turns every candidate's declared parameters into
//! slots that say exactly how to fetch each argument, resolving model names
//! along the way. Requests then only score against this table; nothing is
//! re-derived per request.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use super::param::{Kind, Model, Param, ParamType, Source};
use super::{Candidate, Endpoint};
use crate::container::ServiceKey;
use crate::error::Error;
use crate::method::Method;

/// Request data scored by presence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Inject {
    Path,
    Header,
    Cookie,
    Query,
}

impl Inject {
    fn label(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Header => "header",
            Self::Cookie => "cookie",
            Self::Query => "query string",
        }
    }
}

/// Values resolved from the body, the container or the route.
#[derive(Clone, Debug)]
pub(crate) enum Generic {
    Model(Model),
    Json,
    Text,
    Service(ServiceKey),
    Settings,
}

#[derive(Clone, Debug)]
pub(crate) enum Fetch {
    Inject { from: Inject, key: String, kind: Kind },
    Generic(Generic),
}

#[derive(Clone, Debug)]
pub(crate) struct Slot {
    pub(crate) arg: String,
    pub(crate) fetch: Fetch,
    pub(crate) default: Option<Value>,
}

/// A compiled method handler: its index in the endpoint and its slots.
#[derive(Debug)]
pub(crate) struct Plan {
    pub(crate) index: usize,
    pub(crate) slots: Vec<Slot>,
}

/// A compiled form handler.
#[derive(Debug)]
pub(crate) struct FormPlan {
    pub(crate) index: usize,
    pub(crate) model: Model,
}

#[derive(Debug, Default)]
pub(crate) struct MethodTable {
    pub(crate) candidates: Vec<Plan>,
    pub(crate) forms: Vec<FormPlan>,
}

#[derive(Debug, Default)]
pub(crate) struct DispatchTable {
    methods: HashMap<Method, MethodTable>,
}

impl DispatchTable {
    pub(crate) fn get(&self, method: Method) -> Option<&MethodTable> {
        self.methods.get(&method)
    }
}

/// A compile failure, kept so every later dispatch can report it again.
#[derive(Clone, Debug)]
pub(crate) struct Fault {
    handler: String,
    detail: String,
}

impl From<&Fault> for Error {
    fn from(f: &Fault) -> Self {
        Error::Annotation { handler: f.handler.clone(), detail: f.detail.clone() }
    }
}

pub(crate) fn compile(endpoint: &Endpoint) -> Result<DispatchTable, Fault> {
    let mut table = DispatchTable::default();

    for (index, candidate) in endpoint.candidates.iter().enumerate() {
        let slots = compile_params(endpoint, candidate)?;
        table.methods.entry(candidate.method).or_default()
            .candidates.push(Plan { index, slots });
    }

    for (index, form) in endpoint.forms.iter().enumerate() {
        let model = lookup_model(endpoint, &form.candidate, "form", &form.model)?;
        table.methods.entry(form.candidate.method).or_default()
            .forms.push(FormPlan { index, model });
    }

    Ok(table)
}

fn compile_params(endpoint: &Endpoint, candidate: &Candidate) -> Result<Vec<Slot>, Fault> {
    let mut seen = HashSet::new();
    candidate.params.iter()
        .map(|param| {
            if !seen.insert(param.name.as_str()) {
                return Err(fault(candidate, format!("duplicate parameter `{}`", param.name)));
            }
            Ok(Slot {
                arg: param.name.clone(),
                fetch: compile_fetch(endpoint, candidate, param)?,
                default: param.default.clone(),
            })
        })
        .collect()
}

fn compile_fetch(endpoint: &Endpoint, candidate: &Candidate, param: &Param) -> Result<Fetch, Fault> {
    let inject = |from: Inject, key: &str| match &param.ty {
        ParamType::Kind(kind) => Ok(Fetch::Inject { from, key: key.to_owned(), kind: *kind }),
        ParamType::Model(model) => Err(fault(
            candidate,
            format!(
                "parameter `{}` is read from the {} but declared as model `{model}`",
                param.name,
                from.label(),
            ),
        )),
    };

    match &param.source {
        Source::Path(key) => inject(Inject::Path, key),
        Source::Header(key) => inject(Inject::Header, key),
        Source::Cookie(key) => inject(Inject::Cookie, key),
        Source::Query(key) => inject(Inject::Query, key),
        Source::Body => match &param.ty {
            ParamType::Model(name) => {
                lookup_model(endpoint, candidate, &param.name, name).map(|m| Fetch::Generic(Generic::Model(m)))
            }
            ParamType::Kind(Kind::Json) => Ok(Fetch::Generic(Generic::Json)),
            ParamType::Kind(Kind::Str) => Ok(Fetch::Generic(Generic::Text)),
            ParamType::Kind(kind) => Err(fault(
                candidate,
                format!("body parameter `{}` must be a model, Json or Str, not {kind:?}", param.name),
            )),
        },
        Source::Service(key) => Ok(Fetch::Generic(Generic::Service(*key))),
        Source::Settings => Ok(Fetch::Generic(Generic::Settings)),
    }
}

fn lookup_model(endpoint: &Endpoint, candidate: &Candidate, param: &str, name: &str) -> Result<Model, Fault> {
    endpoint.models.get(name).cloned().ok_or_else(|| {
        fault(candidate, format!("parameter `{param}` names unknown model `{name}`"))
    })
}

fn fault(candidate: &Candidate, detail: String) -> Fault {
    Fault { handler: candidate.qualified_name().to_owned(), detail }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Form;
    use crate::handler::Call;

    async fn noop(_: Call) {}

    #[test]
    fn groups_candidates_and_forms_by_method() {
        let endpoint = Endpoint::builder("things")
            .model("Thing", Model::new().field("name", Kind::Str))
            .candidate(Candidate::new(Method::Get, "list", noop).param(Param::query("page").ty(Kind::Int)))
            .candidate(Candidate::new(Method::Get, "one", noop).param(Param::path("id")))
            .form(Form::new(Method::Post, "create", "Thing", noop))
            .build();

        let table = compile(&endpoint).unwrap();
        let get = table.get(Method::Get).unwrap();
        assert_eq!(get.candidates.iter().map(|p| p.index).collect::<Vec<_>>(), [0, 1]);
        assert!(matches!(
            get.candidates[0].slots[0].fetch,
            Fetch::Inject { from: Inject::Query, kind: Kind::Int, .. }
        ));
        assert_eq!(table.get(Method::Post).unwrap().forms.len(), 1);
        assert!(table.get(Method::Put).is_none());
    }

    #[test]
    fn unknown_model_is_a_fault() {
        let endpoint = Endpoint::builder("things")
            .candidate(Candidate::new(Method::Post, "create", noop).param(Param::body("payload", "Missing")))
            .build();
        let fault = compile(&endpoint).unwrap_err();
        assert_eq!(fault.handler, "things.create");
        assert!(fault.detail.contains("unknown model `Missing`"));
    }

    #[test]
    fn model_on_injectable_and_duplicates_are_faults() {
        let endpoint = Endpoint::builder("e")
            .model("M", Model::new())
            .candidate(Candidate::new(Method::Get, "h", noop).param(Param::header("x-m").ty(ParamType::Model("M".into()))))
            .build();
        assert!(compile(&endpoint).unwrap_err().detail.contains("header"));

        let endpoint = Endpoint::builder("e")
            .candidate(Candidate::new(Method::Get, "h", noop).param(Param::query("a")).param(Param::path("a")))
            .build();
        assert!(compile(&endpoint).unwrap_err().detail.contains("duplicate"));
    }
}
