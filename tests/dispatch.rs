//! End-to-end behaviour of the request pipeline through `App`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ferrule::middleware::{Flow, Middleware};
use ferrule::{
    App, Body, Call, Candidate, Context, Endpoint, Error, Form, Json, Kind, Method, MethodSet, Model, Param,
    Request, Response, Router, Settings, Text,
};
use http::StatusCode;
use http::header::ALLOW;
use rstest::rstest;
use serde_json::{Value, json};

fn body_text(res: &Response) -> String {
    match res.body() {
        Body::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        Body::Text(s) => s.clone(),
        other => panic!("unexpected body {other:?}"),
    }
}

fn settings(value: Value) -> Settings {
    match value {
        Value::Object(map) => map,
        _ => Settings::new(),
    }
}

async fn show_user(call: Call) -> Value {
    json!({"id": call.args().i64("id")})
}

async fn anonymous(_: Call) -> &'static str {
    "anonymous"
}

async fn with_foo(call: Call) -> String {
    format!("foo={}", call.args().str("foo").unwrap_or_default())
}

fn users() -> Arc<Endpoint> {
    Endpoint::builder("users")
        .candidate(Candidate::new(Method::Get, "show", show_user).param(Param::path("id").ty(Kind::Int)).returns(Json))
        .build()
}

fn users_app() -> App {
    let users = users();
    App::new().routes(move |r| {
        r.route_with("/users/{id}", &users, Method::Get, Settings::new());
    })
}

// ── Routing ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn path_params_reach_the_handler() {
    let res = users_app().respond(Request::new(Method::Get, "/users/42")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(body_text(&res), r#"{"id":42}"#);
}

#[rstest]
#[case(Method::Post, "/users/42", StatusCode::METHOD_NOT_ALLOWED)]
#[case(Method::Get, "/users", StatusCode::NOT_FOUND)]
#[case(Method::Get, "/users/42/posts", StatusCode::NOT_FOUND)]
#[tokio::test]
async fn misses_render_404_or_405(#[case] method: Method, #[case] path: &str, #[case] status: StatusCode) {
    let res = users_app().respond(Request::new(method, path)).await;
    assert_eq!(res.status_code(), status);
    if status == StatusCode::METHOD_NOT_ALLOWED {
        assert_eq!(res.headers()[ALLOW], "GET");
    }
}

#[tokio::test]
async fn mounted_router_sees_the_stripped_path() {
    let users = users();
    let app = App::new().routes(move |r| {
        let mut api = Router::new();
        api.route("/users/{id}", &users);
        r.mount("/api", api);
    });

    let res = app.respond(Request::new(Method::Get, "/api/users/7")).await;
    assert_eq!(body_text(&res), r#"{"id":7}"#);
    let res = app.respond(Request::new(Method::Get, "/apiother/users/7")).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn settings_merge_into_the_call() {
    async fn report(call: Call) -> Value {
        json!({
            "theme": call.setting("theme"),
            "injected": call.args().value("cfg").and_then(|c| c.get("auth")).cloned(),
        })
    }
    let endpoint = Endpoint::builder("report")
        .candidate(Candidate::new(Method::Get, "show", report).param(Param::settings("cfg")).returns(Json))
        .build();
    let app = App::new()
        .setting("theme", "light")
        .setting("auth", false)
        .routes(move |r| {
            let mut admin = Router::with_settings(settings(json!({"auth": true})));
            admin.route_with("/report", &endpoint, MethodSet::Any, settings(json!({"theme": "dark"})));
            r.mount("/admin", admin);
        });

    let res = app.respond(Request::new(Method::Get, "/admin/report")).await;
    assert_eq!(body_text(&res), r#"{"injected":true,"theme":"dark"}"#);
}

#[test]
fn url_for_round_trips_through_resolve() {
    let users = users();
    let mut api = Router::new();
    api.route("/users/{id}", &users);
    let mut root = Router::new();
    root.mount("/api", api);

    let url = root.url_for(&users, &[("id", "5")]).unwrap();
    assert_eq!(url, "/api/users/5");
    let found = root.resolve(&url, Method::Get).unwrap();
    assert!(Arc::ptr_eq(&found.endpoint, &users));
    assert_eq!(found.params["id"], "5");

    let err = root.url_for(&users, &[]).unwrap_err();
    assert!(matches!(err, Error::Reverse { ref detail, .. } if detail.contains("id")));
}

#[rstest]
#[case("/caf%C3%A9/menu")]
#[case("/caf\u{e9}/menu")]
#[tokio::test]
async fn encoded_literals_route_like_their_decoded_form(#[case] path: &str) {
    let menu = Endpoint::builder("menu")
        .candidate(Candidate::new(Method::Get, "show", anonymous).returns(Text))
        .build();
    let registered = Arc::clone(&menu);
    let app = App::new().routes(move |r| {
        r.route("/caf\u{e9}/menu", &registered);
    });

    let res = app.respond(Request::new(Method::Get, path)).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(app.router().url_for(&menu, &[]).unwrap(), "/caf%C3%A9/menu");
}

// ── Handler selection ─────────────────────────────────────────────────────────

fn greeting_app() -> App {
    let greet = Endpoint::builder("greet")
        .candidate(Candidate::new(Method::Get, "anonymous", anonymous).returns(Text))
        .candidate(Candidate::new(Method::Get, "with_foo", with_foo).param(Param::header("X-Foo").rename("foo")).returns(Text))
        .build();
    App::new().routes(move |r| {
        r.route("/greet", &greet);
    })
}

#[rstest]
#[case(Some("bar"), "foo=bar")]
#[case(None, "anonymous")]
#[tokio::test]
async fn header_requirement_decides_the_candidate(#[case] header: Option<&str>, #[case] expected: &str) {
    let mut request = Request::new(Method::Get, "/greet");
    if let Some(value) = header {
        request = request.with_header("x-foo", value);
    }
    let res = greeting_app().respond(request).await;
    assert_eq!(body_text(&res), expected);
}

#[tokio::test]
async fn forms_and_services() {
    struct Mailer(&'static str);

    async fn signup(call: Call) -> (String, u16) {
        let email = call.args().value("form").and_then(|f| f.get("email")).and_then(Value::as_str);
        (format!("welcome {}", email.unwrap_or_default()), 201)
    }
    async fn resend(call: Call) -> String {
        let mailer = call.args().service::<Mailer>("mailer");
        format!("resent via {}", mailer.map(|m| m.0).unwrap_or("nobody"))
    }

    let account = Endpoint::builder("account")
        .model("Signup", Model::new().field("email", Kind::Str))
        .form(Form::new(Method::Post, "signup", "Signup", signup).returns(Text))
        .candidate(Candidate::new(Method::Post, "resend", resend).param(Param::service::<Mailer>("mailer")).returns(Text))
        .build();
    let app = App::new()
        .provide(Mailer("smtp"))
        .routes(move |r| {
            r.route("/account", &account);
        });

    let res = app.respond(Request::new(Method::Post, "/account").with_form(&[("email", "a@b.c")])).await;
    assert_eq!(res.status_code(), StatusCode::CREATED);
    assert_eq!(body_text(&res), "welcome a@b.c");

    let res = app.respond(Request::new(Method::Post, "/account").with_json(&json!({"other": 1}))).await;
    assert_eq!(body_text(&res), "resent via smtp");
}

#[tokio::test]
async fn bad_request_and_authoring_errors_render() {
    async fn untyped(_: Call) -> &'static str {
        "no wrapper"
    }
    let strict = Endpoint::builder("strict")
        .candidate(Candidate::new(Method::Get, "only", anonymous).param(Param::query("page").ty(Kind::Int)).returns(Text))
        .build();
    let sloppy = Endpoint::builder("sloppy")
        .candidate(Candidate::new(Method::Get, "untyped", untyped))
        .build();
    let app = App::new().routes(move |r| {
        r.route("/strict", &strict).route("/sloppy", &sloppy);
    });

    let res = app.respond(Request::new(Method::Get, "/strict?page=two")).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);

    let err = app.handle(Request::new(Method::Get, "/sloppy")).await.unwrap_err();
    let Error::InvalidOutput(details) = &err else { panic!("expected invalid output, got {err:?}") };
    assert_eq!(details.handler, "sloppy.untyped");
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// ── Middleware ────────────────────────────────────────────────────────────────

type Log = Arc<Mutex<Vec<String>>>;

struct Recorder {
    name: &'static str,
    log: Log,
    suppress: bool,
}

#[async_trait]
impl Middleware for Recorder {
    async fn enter(&mut self, _cx: &mut Context) -> Result<(), Error> {
        self.log.lock().unwrap().push(format!("enter {}", self.name));
        Ok(())
    }

    async fn leave(&mut self, cx: &mut Context, error: Option<&Error>) -> Result<Flow, Error> {
        let status = match error {
            Some(err) => err.status(),
            None => cx.response().map_or(StatusCode::NO_CONTENT, Response::status_code),
        };
        self.log.lock().unwrap().push(format!("leave {} {}", self.name, status.as_u16()));
        Ok(if self.suppress { Flow::Handled } else { Flow::Pass })
    }
}

fn recorded(log: &Log, outer_suppresses: bool, inner_suppresses: bool) -> App {
    let (outer, inner) = (Arc::clone(log), Arc::clone(log));
    users_app()
        .middleware(move || Recorder { name: "A", log: Arc::clone(&outer), suppress: outer_suppresses })
        .middleware(move || Recorder { name: "B", log: Arc::clone(&inner), suppress: inner_suppresses })
}

#[tokio::test]
async fn middleware_wraps_dispatch_in_onion_order() {
    let log = Log::default();
    let res = recorded(&log, false, false).respond(Request::new(Method::Get, "/users/1")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(*log.lock().unwrap(), ["enter A", "enter B", "leave B 200", "leave A 200"]);
}

#[tokio::test]
async fn inner_suppression_hides_the_error_from_outer_units() {
    let log = Log::default();
    let res = recorded(&log, false, true).handle(Request::new(Method::Get, "/missing")).await.unwrap();
    assert_eq!(res.status_code(), StatusCode::NO_CONTENT);
    assert_eq!(*log.lock().unwrap(), ["enter A", "enter B", "leave B 404", "leave A 204"]);
}

#[tokio::test]
async fn cancellation_abandons_the_handler_and_tears_down() {
    async fn slow(_: Call) -> &'static str {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        "never"
    }
    let log = Log::default();
    let endpoint = Endpoint::builder("slow")
        .candidate(Candidate::new(Method::Get, "wait", slow).returns(Text))
        .build();
    let recorder = Arc::clone(&log);
    let app = App::new()
        .middleware(move || Recorder { name: "A", log: Arc::clone(&recorder), suppress: false })
        .routes(move |r| {
            r.route("/slow", &endpoint);
        });

    let cancel = tokio::time::sleep(Duration::from_millis(10));
    let err = app.handle_with_cancel(Request::new(Method::Get, "/slow"), cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(*log.lock().unwrap(), ["enter A", "leave A 500"]);
}

#[tokio::test]
async fn custom_error_renderer_is_used() {
    let app = users_app().error_renderer(|err| {
        Response::builder()
            .status(err.status())
            .body(ferrule::ContentType::Json, json!({"error": err.status().as_u16()}).to_string())
    });
    let res = app.respond(Request::new(Method::Delete, "/users/1")).await;
    assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body_text(&res), r#"{"error":405}"#);
}
