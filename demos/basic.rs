//! Minimal ferrule example: a versioned JSON API with scored handlers,
//! a form endpoint and tracing middleware.
//!
//! Run with:
//!   RUST_LOG=info,ferrule=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/api/v1/users/42
//!   curl -H 'x-api-key: s3cret' http://localhost:3000/api/v1/users/42
//!   curl -X POST http://localhost:3000/api/v1/users -d 'name=ada&age=36'
//!   curl -X DELETE http://localhost:3000/api/v1/users/42     # 405, Allow: GET
//!   curl http://localhost:3000/healthz

use ferrule::middleware::Trace;
use ferrule::{
    App, Call, Candidate, ContentType, Endpoint, Form, Json, Kind, Method, Model, Param, Response, Router, Server,
    ServerConfig, Text,
};
use http::StatusCode;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

struct Directory {
    org: &'static str,
}

#[tokio::main]
async fn main() -> Result<(), ferrule::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let users = Endpoint::builder("users")
        .model("NewUser", Model::new().field("name", Kind::Str).optional("age", Kind::Int, Value::Null))
        // Without an API key both GET candidates tie and the first registered
        // wins; with one, the private view scores higher.
        .candidate(Candidate::new(Method::Get, "public", public_user).param(Param::path("id").ty(Kind::Int)).returns(Json))
        .candidate(
            Candidate::new(Method::Get, "private", private_user)
                .param(Param::path("id").ty(Kind::Int))
                .param(Param::header("x-api-key").rename("key"))
                .param(Param::service::<Directory>("directory"))
                .returns(Json),
        )
        .form(Form::new(Method::Post, "create", "NewUser", create_user).returns(Json))
        .build();
    users.validate()?;

    let health = Endpoint::builder("health")
        .candidate(Candidate::new(Method::Get, "liveness", liveness).returns(Text))
        .build();

    let app = App::new()
        .provide(Directory { org: "example" })
        .middleware(Trace::new)
        .routes(move |root| {
            let mut v1 = Router::new();
            v1.route_with("/users/{id}", &users, Method::Get, Default::default())
                .route_with("/users", &users, Method::Post, Default::default());
            root.mount("/api/v1", v1);
            root.route("/healthz", &health);
        });

    Server::with_config(ServerConfig::from_env()?).serve(app).await
}

// GET /api/v1/users/{id} with x-api-key
async fn private_user(call: Call) -> Value {
    let org = call.args().service::<Directory>("directory").map(|d| d.org);
    json!({"id": call.args().i64("id"), "name": "alice", "org": org, "email": "alice@example.com"})
}

// GET /api/v1/users/{id}
async fn public_user(call: Call) -> Value {
    json!({"id": call.args().i64("id"), "name": "alice"})
}

// POST /api/v1/users, urlencoded or JSON body matching `NewUser` exactly
async fn create_user(call: Call) -> Response {
    let mut user = call.args().value("form").cloned().unwrap_or_default();
    if let Some(fields) = user.as_object_mut() {
        fields.insert("id".into(), json!(99));
    }
    Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/api/v1/users/99")
        .body(ContentType::Json, user.to_string())
}

async fn liveness(_: Call) -> &'static str {
    "ok"
}
