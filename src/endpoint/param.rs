//! Declared handler parameters.
//!
//! Rust handlers cannot be introspected, so each candidate declares its
//! parameters explicitly: where the value comes from, what type it must
//! convert to and whether it has a default. The declarations are compiled
//! into a dispatch table once per endpoint.

use std::any::Any;

use serde_json::{Map, Number, Value};

use crate::container::ServiceKey;

/// Scalar value types parameters and model fields convert to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Str,
    Int,
    Float,
    Bool,
    /// Any JSON value; strings that do not parse as JSON stay strings.
    Json,
}

impl Kind {
    /// Converts a raw string (path segment, header, cookie, query value).
    pub fn parse(self, raw: &str) -> Option<Value> {
        match self {
            Self::Str => Some(Value::String(raw.to_owned())),
            Self::Int => raw.trim().parse::<i64>().ok().map(Value::from),
            Self::Float => raw.trim().parse::<f64>().ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            Self::Bool => parse_bool(raw).map(Value::Bool),
            Self::Json => Some(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))),
        }
    }

    /// Converts a body value; strings are accepted for every kind so that
    /// urlencoded forms validate against the same models as JSON bodies.
    pub fn coerce(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (Self::Json, v) => Some(v.clone()),
            (_, Value::String(s)) => self.parse(s),
            (Self::Int, Value::Number(n)) if n.is_i64() || n.is_u64() => Some(value.clone()),
            (Self::Float, Value::Number(_)) => Some(value.clone()),
            (Self::Bool, Value::Bool(_)) => Some(value.clone()),
            _ => None,
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// A parameter's declared type: a scalar kind, or a model by name.
///
/// Model names are resolved when the endpoint's dispatch table is compiled;
/// an unknown name is an annotation error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamType {
    Kind(Kind),
    Model(String),
}

impl From<Kind> for ParamType {
    fn from(k: Kind) -> Self { Self::Kind(k) }
}

/// Where a parameter's value comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    Path(String),
    Header(String),
    Cookie(String),
    Query(String),
    /// The request body, as a model, JSON value or text.
    Body,
    /// A service from the injection container.
    Service(ServiceKey),
    /// The merged route settings.
    Settings,
}

impl Source {
    /// Path, header, cookie and query parameters are scored by presence.
    pub fn is_injectable(&self) -> bool {
        matches!(self, Self::Path(_) | Self::Header(_) | Self::Cookie(_) | Self::Query(_))
    }
}

/// One declared handler parameter.
#[derive(Clone, Debug)]
pub struct Param {
    pub(crate) name: String,
    pub(crate) source: Source,
    pub(crate) ty: ParamType,
    pub(crate) default: Option<Value>,
}

impl Param {
    fn new(name: &str, source: Source, ty: ParamType) -> Self {
        Self { name: name.to_owned(), source, ty, default: None }
    }

    pub fn path(name: &str) -> Self {
        Self::new(name, Source::Path(name.to_owned()), Kind::Str.into())
    }

    /// A header; lookup is case-insensitive.
    pub fn header(name: &str) -> Self {
        Self::new(name, Source::Header(name.to_ascii_lowercase()), Kind::Str.into())
    }

    pub fn cookie(name: &str) -> Self {
        Self::new(name, Source::Cookie(name.to_owned()), Kind::Str.into())
    }

    pub fn query(name: &str) -> Self {
        Self::new(name, Source::Query(name.to_owned()), Kind::Str.into())
    }

    /// The body validated against the named model.
    pub fn body(name: &str, model: &str) -> Self {
        Self::new(name, Source::Body, ParamType::Model(model.to_owned()))
    }

    /// A service of type `T` from the injection container.
    pub fn service<T: Any + Send + Sync>(name: &str) -> Self {
        Self::new(name, Source::Service(ServiceKey::of::<T>()), Kind::Json.into())
    }

    /// The merged route settings, as a JSON object.
    pub fn settings(name: &str) -> Self {
        Self::new(name, Source::Settings, Kind::Json.into())
    }

    /// Binds the argument under `name` instead of the source key.
    pub fn rename(mut self, name: &str) -> Self {
        self.name = name.to_owned();
        self
    }

    pub fn ty(mut self, ty: impl Into<ParamType>) -> Self {
        self.ty = ty.into();
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn source(&self) -> &Source { &self.source }
}

// ── Models ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
struct Field {
    name: String,
    kind: Kind,
    required: bool,
    default: Option<Value>,
}

/// The declared shape of a body: named, typed fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Model {
    fields: Vec<Field>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// A required field.
    pub fn field(mut self, name: &str, kind: Kind) -> Self {
        self.fields.push(Field { name: name.to_owned(), kind, required: true, default: None });
        self
    }

    /// An optional field, filled with `default` when absent (or omitted
    /// when `default` is `Value::Null`).
    pub fn optional(mut self, name: &str, kind: Kind, default: impl Into<Value>) -> Self {
        let default = Some(default.into()).filter(|v| !v.is_null());
        self.fields.push(Field { name: name.to_owned(), kind, required: false, default });
        self
    }

    /// Validates a body field set.
    ///
    /// Required fields must be present and every present declared field must
    /// convert to its kind. With `strict`, undeclared keys are rejected too.
    /// Returns the converted object, or a description of the first problem.
    pub fn check(&self, fields: &Map<String, Value>, strict: bool) -> Result<Value, String> {
        if strict {
            if let Some(extra) = fields.keys().find(|k| !self.fields.iter().any(|f| &f.name == *k)) {
                return Err(format!("unexpected field `{extra}`"));
            }
        }
        let mut out = Map::new();
        for field in &self.fields {
            match fields.get(&field.name) {
                Some(raw) => {
                    let value = field.kind.coerce(raw)
                        .ok_or_else(|| format!("field `{}` is not a valid {:?}", field.name, field.kind))?;
                    out.insert(field.name.clone(), value);
                }
                None if field.required => return Err(format!("missing field `{}`", field.name)),
                None => {
                    if let Some(default) = &field.default {
                        out.insert(field.name.clone(), default.clone());
                    }
                }
            }
        }
        Ok(Value::Object(out))
    }
}
