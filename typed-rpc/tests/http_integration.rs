//! End-to-end calls over a real socket
//!
//! A compiled router is served on an ephemeral port and driven only through
//! the call-dispatch client.

use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use typed_rpc::prelude::*;
use typed_rpc::{CompiledRouter, ErrorType, OperationKind, bearer_token};

const API_KEY: &str = "key-123";

#[derive(Default)]
struct Counters {
    usage_handled: AtomicUsize,
}

#[derive(Clone, Debug)]
struct User {
    id: String,
}

struct ApiKeys;

#[async_trait]
impl IdentityResolver for ApiKeys {
    type Principal = User;

    async fn resolve(&self, request: &RequestInfo) -> RpcResult<Option<User>> {
        Ok(bearer_token(request)
            .filter(|key| *key == API_KEY)
            .map(|_| User { id: "user_1".into() }))
    }
}

#[derive(Debug, Deserialize)]
struct SetDiscordId {
    #[serde(rename = "discordId")]
    discord_id: String,
}

impl Validate for SetDiscordId {
    fn validate(&self) -> ValidationResult {
        ValidationRules::new()
            .max_chars("discordId", &self.discord_id, 20)
            .build()
    }
}

fn compile() -> (CompiledRouter, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let public = Procedure::<Counters>::new().use_middleware(logging_middleware(LogConfig::default()));
    let private = public.use_middleware(auth_middleware(ApiKeys));

    let project = Router::new()
        .operation(
            "getUsage",
            private.query(|args: HandlerArgs<Counters, ()>| async move {
                args.ctx.usage_handled.fetch_add(1, Ordering::SeqCst);
                let user = args.ctx.require::<User>(USER_KEY)?;
                args.structured(RichValue::object([
                    ("userId", RichValue::from(user.id.as_str())),
                    ("categoriesUsed", RichValue::from(2)),
                    ("categoriesLimit", RichValue::from(3)),
                    ("eventsUsed", RichValue::from(10)),
                    ("eventsLimit", RichValue::from(1000)),
                    (
                        "resetDate",
                        RichValue::from(Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap()),
                    ),
                ]))
            }),
        )
        .operation(
            "setDiscordID",
            private
                .input::<SetDiscordId>()
                .mutation(|args: HandlerArgs<Counters, SetDiscordId>| async move {
                    args.json(&json!({ "success": true, "discordId": &args.input.discord_id }))
                }),
        );

    let compiled = Router::new()
        .operation(
            "health",
            public.query(|args: HandlerArgs<Counters, ()>| async move { args.json(&json!({ "status": "ok" })) }),
        )
        .merge("project", project)
        .compile(Arc::clone(&counters), RpcConfig::default())
        .unwrap();
    (compiled, counters)
}

/// Serve the router on 127.0.0.1:0 and return its base URL.
async fn serve(compiled: CompiledRouter) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, compiled.into_axum()).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_usage_reset_date_arrives_as_a_date() {
    let (compiled, _) = compile();
    let client = Client::new(&serve(compiled).await).unwrap().with_bearer_token(API_KEY);

    let usage = client.at("project").at("getUsage").fetch(()).await.unwrap();

    assert_eq!(usage.get("categoriesUsed"), Some(&RichValue::from(2)));
    assert_eq!(usage.get("eventsLimit"), Some(&RichValue::from(1000)));
    assert_eq!(usage.get("userId").and_then(RichValue::as_str), Some("user_1"));
    assert_eq!(
        usage.get("resetDate").and_then(RichValue::as_date),
        Some(&Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn test_long_discord_id_is_rejected() {
    let (compiled, _) = compile();
    let client = Client::new(&serve(compiled).await).unwrap().with_bearer_token(API_KEY);

    let err = client
        .at("project.setDiscordID")
        .send(RichValue::object([("discordId", "123456789012345678901")]))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    let body = err.body().unwrap();
    assert_eq!(body.kind, ErrorType::ValidationError);
    assert_eq!(body.issues[0].field, "discordId");

    let ok = client
        .at("project.setDiscordID")
        .send(RichValue::object([("discordId", "12345678901234567890")]))
        .await
        .unwrap();
    assert_eq!(ok.get("success"), Some(&RichValue::Bool(true)));
}

#[tokio::test]
async fn test_missing_identity_stops_before_the_handler() {
    let (compiled, counters) = compile();
    let base = serve(compiled).await;

    let anonymous = Client::new(&base).unwrap();
    let err = anonymous.at("project.getUsage").fetch(()).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    assert_eq!(err.body().unwrap().kind, ErrorType::HttpException);

    let wrong_key = Client::new(&base).unwrap().with_bearer_token("nope");
    let err = wrong_key.at("project.getUsage").fetch(()).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));

    assert_eq!(counters.usage_handled.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_every_route_is_callable_by_name() {
    let (compiled, _) = compile();
    let routes = compiled.routes().to_vec();
    let client = Client::new(&serve(compiled).await).unwrap().with_bearer_token(API_KEY);

    for entry in &routes {
        let route = client.at(&entry.name);
        assert_eq!(route.path(), entry.path, "path of {}", entry.name);
        assert_eq!(entry.method, entry.kind.method());

        let result = match entry.kind {
            OperationKind::Query => route.fetch(()).await,
            OperationKind::Mutation => {
                route
                    .send(RichValue::object([("discordId", "42")]))
                    .await
            }
        };
        assert!(result.is_ok(), "{} failed: {:?}", entry.name, result.err());
    }
}

#[tokio::test]
async fn test_unknown_operation_is_not_found() {
    let (compiled, _) = compile();
    let client = Client::new(&serve(compiled).await).unwrap();

    let err = client.at("project.deleteEverything").fetch(()).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(err.body().unwrap().kind, ErrorType::HttpException);
}

#[tokio::test]
async fn test_wrong_verb_is_method_not_allowed() {
    let (compiled, _) = compile();
    let client = Client::new(&serve(compiled).await).unwrap();

    let err = client.at("health").send(()).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::METHOD_NOT_ALLOWED));
}
