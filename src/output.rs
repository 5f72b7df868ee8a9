//! Handler outputs and their assembly into responses.
//!
//! Handlers may return a finished [`Response`] or a plain value. Plain
//! values only become responses through a [`ResponseWrapper`] the handler
//! declared at registration (`Candidate::returns`). Anything else is an
//! authoring error, reported with enough context to find the handler.

use http::StatusCode;
use serde_json::Value;

use crate::endpoint::Candidate;
use crate::error::{Error, InvalidOutput};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// What a handler produced.
#[derive(Debug)]
pub enum Output {
    Response(Response),
    Value(Value),
    /// A tuple of values; primitives are unpacked positionally into a wrapper.
    Tuple(Vec<Value>),
    Empty,
}

impl Output {
    fn kind(&self) -> &'static str {
        match self {
            Self::Response(_) => "a response",
            Self::Value(Value::Null) => "null",
            Self::Value(Value::Bool(_)) => "a bool",
            Self::Value(Value::Number(_)) => "a number",
            Self::Value(Value::String(_)) => "a string",
            Self::Value(Value::Array(_)) => "an array",
            Self::Value(Value::Object(_)) => "an object",
            Self::Tuple(_) => "a tuple",
            Self::Empty => "nothing",
        }
    }
}

// ── IntoOutput ────────────────────────────────────────────────────────────────

/// Conversion of a handler's return value into an [`Output`].
pub trait IntoOutput {
    fn into_output(self) -> Result<Output, Error>;
}

impl IntoOutput for Output {
    fn into_output(self) -> Result<Output, Error> { Ok(self) }
}

impl IntoOutput for Response {
    fn into_output(self) -> Result<Output, Error> { Ok(Output::Response(self)) }
}

impl IntoOutput for StatusCode {
    fn into_output(self) -> Result<Output, Error> { Ok(Output::Response(self.into_response())) }
}

impl IntoOutput for () {
    fn into_output(self) -> Result<Output, Error> { Ok(Output::Empty) }
}

impl IntoOutput for Value {
    fn into_output(self) -> Result<Output, Error> { Ok(Output::Value(self)) }
}

macro_rules! value_output {
    ($($ty:ty),*) => {
        $(impl IntoOutput for $ty {
            fn into_output(self) -> Result<Output, Error> { Ok(Output::Value(Value::from(self))) }
        })*
    };
}

value_output!(String, &'static str, bool, i32, i64, u32, u64, f64);

macro_rules! tuple_output {
    ($($name:ident),+) => {
        impl<$($name: Into<Value>),+> IntoOutput for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_output(self) -> Result<Output, Error> {
                let ($($name,)+) = self;
                Ok(Output::Tuple(vec![$($name.into()),+]))
            }
        }
    };
}

tuple_output!(A, B);
tuple_output!(A, B, C);

impl<T: IntoOutput, E: Into<Error>> IntoOutput for Result<T, E> {
    fn into_output(self) -> Result<Output, Error> {
        self.map_err(Into::into)?.into_output()
    }
}

// ── Response wrappers ─────────────────────────────────────────────────────────

/// Builds a response from positional arguments.
///
/// Returning `None` means the arguments did not fit; the assembler reports
/// that as a framework defect, since the wrapper was declared for exactly
/// this handler's output.
pub trait ResponseWrapper: Send + Sync + 'static {
    fn name(&self) -> &'static str;
    fn wrap(&self, args: Vec<Value>) -> Option<Response>;
}

/// `application/json` from `(value)` or `(value, status)`.
///
/// Only tuples of primitives are unpacked, so the status form works for
/// scalar bodies. `(json!({..}), 201)` arrives as one array and is sent as
/// `200` with that array as the body; build a [`Response`] to send an
/// object with another status.
#[derive(Clone, Copy, Debug)]
pub struct Json;

impl ResponseWrapper for Json {
    fn name(&self) -> &'static str { "Json" }

    fn wrap(&self, args: Vec<Value>) -> Option<Response> {
        let mut args = args.into_iter();
        let body = args.next()?;
        let status = status_arg(args.next())?;
        if args.next().is_some() {
            return None;
        }
        Some((status, Response::json(body.to_string())).into_response())
    }
}

/// `text/plain` from `(text)` or `(text, status)`.
#[derive(Clone, Copy, Debug)]
pub struct Text;

impl ResponseWrapper for Text {
    fn name(&self) -> &'static str { "Text" }

    fn wrap(&self, args: Vec<Value>) -> Option<Response> {
        let mut args = args.into_iter();
        let body = match args.next()? {
            Value::String(s) => s,
            Value::Null => String::new(),
            v @ (Value::Bool(_) | Value::Number(_)) => v.to_string(),
            Value::Array(_) | Value::Object(_) => return None,
        };
        let status = status_arg(args.next())?;
        if args.next().is_some() {
            return None;
        }
        Some((status, Response::text(body)).into_response())
    }
}

/// A missing status means 200; a present one must be a valid code.
fn status_arg(arg: Option<Value>) -> Option<StatusCode> {
    match arg {
        None => Some(StatusCode::OK),
        Some(v) => v.as_u64()
            .and_then(|code| u16::try_from(code).ok())
            .and_then(|code| StatusCode::from_u16(code).ok()),
    }
}

fn is_primitive(v: &Value) -> bool {
    !matches!(v, Value::Array(_) | Value::Object(_))
}

// ── Assembly ──────────────────────────────────────────────────────────────────

/// Normalizes a handler's output into a response.
pub(crate) fn assemble(output: Output, candidate: &Candidate, req: &Request) -> Result<Response, Error> {
    let output = match output {
        Output::Response(res) => return Ok(res),
        other => other,
    };
    let received = output.kind();

    let Some(wrapper) = candidate.wrapper() else {
        return Err(invalid(candidate, req, received, false));
    };

    let args = match output {
        Output::Tuple(items) if items.iter().all(is_primitive) => items,
        Output::Tuple(items) => vec![Value::Array(items)],
        Output::Value(v) => vec![v],
        Output::Empty => vec![Value::Null],
        Output::Response(_) => Vec::new(),
    };

    wrapper.wrap(args).ok_or_else(|| {
        tracing::error!(
            handler = candidate.qualified_name(),
            wrapper = wrapper.name(),
            received,
            "response wrapper rejected handler output",
        );
        invalid(candidate, req, received, true)
    })
}

fn invalid(candidate: &Candidate, req: &Request, received: &'static str, framework_defect: bool) -> Error {
    Error::InvalidOutput(Box::new(InvalidOutput {
        handler: candidate.qualified_name().to_owned(),
        location: candidate.location().to_string(),
        method: req.method(),
        path: req.path().to_owned(),
        received,
        framework_defect,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::endpoint::Candidate;
    use crate::handler::Call;
    use crate::method::Method;
    use serde_json::json;

    async fn noop(_: Call) {}

    fn request() -> Request {
        Request::new(Method::Get, "/things")
    }

    fn text_of(res: &Response) -> String {
        match res.body() {
            Body::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Body::Text(s) => s.clone(),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn response_passes_through_unchanged() {
        let candidate = Candidate::new(Method::Get, "plain", noop);
        let res = assemble(Output::Response(Response::status(StatusCode::IM_A_TEAPOT)), &candidate, &request()).unwrap();
        assert_eq!(res.status_code(), StatusCode::IM_A_TEAPOT);
    }

    #[test]
    fn tuple_of_primitives_is_unpacked_positionally() {
        let candidate = Candidate::new(Method::Get, "made", noop).returns(Text);
        let output = ("created", 201).into_output().unwrap();
        let res = assemble(output, &candidate, &request()).unwrap();
        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(text_of(&res), "created");
    }

    #[test]
    fn tuple_holding_an_object_is_passed_as_one_array() {
        let candidate = Candidate::new(Method::Get, "made", noop).returns(Json);
        let output = Output::Tuple(vec![json!({"id": 1}), json!(201)]);
        let res = assemble(output, &candidate, &request()).unwrap();
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(text_of(&res), r#"[{"id":1},201]"#);
    }

    #[test]
    fn single_value_is_passed_whole() {
        let candidate = Candidate::new(Method::Get, "list", noop).returns(Json);
        let res = assemble(Output::Value(json!([1, 2, 3])), &candidate, &request()).unwrap();
        assert_eq!(text_of(&res), "[1,2,3]");
    }

    #[test]
    fn missing_wrapper_is_an_authoring_error() {
        let candidate = Candidate::new(Method::Get, "oops", noop);
        let err = assemble(Output::Value(json!("hi")), &candidate, &request()).unwrap_err();
        let Error::InvalidOutput(details) = err else { panic!("wrong error") };
        assert!(!details.framework_defect);
        assert_eq!(details.received, "a string");
        assert_eq!(details.path, "/things");
        assert!(details.location.contains("output.rs"));
    }

    #[test]
    fn rejected_wrapper_args_flag_a_framework_defect() {
        let candidate = Candidate::new(Method::Get, "odd", noop).returns(Text);
        let err = assemble(Output::Value(json!({"a": 1})), &candidate, &request()).unwrap_err();
        let Error::InvalidOutput(details) = err else { panic!("wrong error") };
        assert!(details.framework_defect);
        assert!(details.to_string().contains("framework defect"));
    }
}
