use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth, listings, state::AppState, users};

pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(state.config.cors_origin.as_deref());
    Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .merge(auth::router())
                .merge(users::router())
                .merge(listings::router())
                .route("/health", get(|| async { Json(json!({ "status": "ok" })) })),
        )
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let Some(origin) = origin.and_then(|o| HeaderValue::from_str(o).ok()) else {
        return CorsLayer::permissive();
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Serves `app` until Ctrl-C or SIGTERM.
pub async fn serve(app: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid bind address {host}:{port}"))?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to listen for SIGTERM"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::users::services::ensure_admin;

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        let req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    async fn register(app: &Router, email: &str, role: &str) -> Value {
        let (status, body) = send(
            app,
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({
                "email": email,
                "password": "Abcdefg1",
                "first_name": "Test",
                "last_name": "User",
                "role": role,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    async fn login(app: &Router, email: &str, password: &str) -> (StatusCode, Value) {
        send(
            app,
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    async fn token(app: &Router, email: &str, password: &str) -> String {
        let (status, body) = login(app, email, password).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    async fn test_app() -> Router {
        let state = AppState::fake();
        ensure_admin(state.store.as_ref(), "admin@example.com", "Adminpass1")
            .await
            .unwrap();
        build_app(state)
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = build_app(AppState::fake());
        let (status, body) = send(&app, "GET", "/api/v1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn registration_validation_and_privacy() {
        let app = test_app().await;
        let user = register(&app, "seller@example.com", "SELLER").await;
        assert_eq!(user["role"], "SELLER");
        assert!(user.get("password_hash").is_none());

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({ "email": "x@example.com", "password": "abcdefg1", "first_name": "X", "last_name": "Y" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["fields"][0]["field"], "password");

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({ "email": "Seller@Example.com", "password": "Abcdefg1", "first_name": "X", "last_name": "Y" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn login_errors_are_uniform() {
        let app = test_app().await;
        register(&app, "jane@example.com", "CONSUMER").await;
        let wrong = login(&app, "jane@example.com", "Nope12345").await;
        let unknown = login(&app, "ghost@example.com", "Abcdefg1").await;
        assert_eq!(wrong.0, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong, unknown);
    }

    #[tokio::test]
    async fn me_requires_a_valid_token() {
        let app = test_app().await;
        register(&app, "jane@example.com", "CONSUMER").await;
        let t = token(&app, "jane@example.com", "Abcdefg1").await;

        let (status, me) = send(&app, "GET", "/api/v1/me", Some(&t), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["email"], "jane@example.com");

        let (status, _) = send(&app, "GET", "/api/v1/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, "GET", "/api/v1/me", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_token_is_rejected_on_public_routes() {
        let app = test_app().await;
        let (status, _) = send(&app, "GET", "/api/v1/listings", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, "GET", "/api/v1/listings", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn listing_workflow_over_http() {
        let app = test_app().await;
        register(&app, "seller@example.com", "SELLER").await;
        register(&app, "buyer@example.com", "CONSUMER").await;
        let seller = token(&app, "seller@example.com", "Abcdefg1").await;
        let buyer = token(&app, "buyer@example.com", "Abcdefg1").await;
        let admin = token(&app, "admin@example.com", "Adminpass1").await;

        let item = json!({ "title": "Oak dresser", "description": "Six drawers", "price": 310.0 });
        let (status, _) = send(&app, "POST", "/api/v1/listings", Some(&buyer), Some(item.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, bad) = send(
            &app,
            "POST",
            "/api/v1/listings",
            Some(&seller),
            Some(json!({ "title": "Oak dresser", "description": "Six drawers", "price": -1 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(bad["fields"][0]["field"], "price");

        let (status, listing) = send(&app, "POST", "/api/v1/listings", Some(&seller), Some(item)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(listing["status"], "DRAFT");
        let id = listing["id"].as_i64().unwrap();
        let path = format!("/api/v1/listings/{id}");

        assert_eq!(send(&app, "GET", &path, None, None).await.0, StatusCode::FORBIDDEN);
        assert_eq!(send(&app, "GET", &path, Some(&buyer), None).await.0, StatusCode::FORBIDDEN);
        assert_eq!(send(&app, "GET", &path, Some(&seller), None).await.0, StatusCode::OK);
        assert_eq!(
            send(&app, "GET", "/api/v1/listings/999", None, None).await.0,
            StatusCode::NOT_FOUND
        );

        let (status, edited) = send(&app, "PATCH", &path, Some(&seller), Some(json!({ "price": 295.0 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(edited["price"], 295.0);

        let submit = format!("{path}/submit");
        let (status, pending) = send(&app, "POST", &submit, Some(&seller), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pending["status"], "PENDING");
        assert_eq!(send(&app, "POST", &submit, Some(&seller), None).await.0, StatusCode::CONFLICT);
        assert_eq!(
            send(&app, "PATCH", &path, Some(&seller), Some(json!({ "price": 1.0 }))).await.0,
            StatusCode::CONFLICT
        );

        let validate = format!("{path}/validate");
        assert_eq!(send(&app, "POST", &validate, Some(&seller), None).await.0, StatusCode::FORBIDDEN);
        let (status, approved) = send(
            &app,
            "POST",
            &validate,
            Some(&admin),
            Some(json!({ "admin_notes": "authentic" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approved["status"], "APPROVED");
        assert_eq!(approved["admin_notes"], "authentic");

        let (status, public) = send(&app, "GET", "/api/v1/listings", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(public.as_array().unwrap().len(), 1);
        assert_eq!(send(&app, "GET", &path, None, None).await.0, StatusCode::OK);

        assert_eq!(send(&app, "DELETE", &path, Some(&buyer), None).await.0, StatusCode::FORBIDDEN);
        assert_eq!(send(&app, "DELETE", &path, Some(&seller), None).await.0, StatusCode::NO_CONTENT);
        assert_eq!(send(&app, "GET", &path, Some(&admin), None).await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_manages_users() {
        let app = test_app().await;
        let jane = register(&app, "jane@example.com", "CONSUMER").await;
        let jane_token = token(&app, "jane@example.com", "Abcdefg1").await;
        let admin = token(&app, "admin@example.com", "Adminpass1").await;
        let jane_path = format!("/api/v1/users/{}", jane["id"]);

        assert_eq!(send(&app, "GET", "/api/v1/users", Some(&jane_token), None).await.0, StatusCode::FORBIDDEN);
        let (status, all) = send(&app, "GET", "/api/v1/users?role=CONSUMER", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(all.as_array().unwrap().len(), 1);

        let (status, updated) = send(
            &app,
            "PATCH",
            &jane_path,
            Some(&jane_token),
            Some(json!({ "last_name": "Smith" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["last_name"], "Smith");

        assert_eq!(send(&app, "DELETE", &jane_path, Some(&jane_token), None).await.0, StatusCode::FORBIDDEN);
        assert_eq!(send(&app, "DELETE", &jane_path, Some(&admin), None).await.0, StatusCode::NO_CONTENT);
        assert_eq!(send(&app, "GET", &jane_path, Some(&admin), None).await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn self_registration_cannot_claim_admin() {
        let app = test_app().await;
        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({ "email": "x@example.com", "password": "Abcdefg1", "first_name": "X", "last_name": "Y", "role": "ADMIN" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    async fn send_raw(app: &Router, method: &str, uri: &str, token: Option<&str>, body: &str) -> (StatusCode, String, Value) {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        let resp = app
            .clone()
            .oneshot(req.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, content_type, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn assert_validation(resp: &(StatusCode, String, Value), field: &str) {
        let (status, content_type, body) = resp;
        assert_eq!(*status, StatusCode::BAD_REQUEST, "{body}");
        assert!(content_type.starts_with("application/json"), "{content_type}");
        assert_eq!(body["error"], "validation failed");
        assert_eq!(body["fields"][0]["field"], field, "{body}");
        let text = body.to_string();
        for leak in ["f64", "i64", "variant", "deserialize"] {
            assert!(!text.contains(leak), "{text}");
        }
    }

    #[tokio::test]
    async fn malformed_requests_are_validation_errors() {
        let app = test_app().await;
        register(&app, "seller@example.com", "SELLER").await;
        let seller = token(&app, "seller@example.com", "Abcdefg1").await;

        let string_price = r#"{"title":"Chair","description":"Oak","price":"12"}"#;
        assert_validation(
            &send_raw(&app, "POST", "/api/v1/listings", Some(&seller), string_price).await,
            "price",
        );

        assert_validation(
            &send_raw(&app, "POST", "/api/v1/listings", Some(&seller), r#"{"title": "#).await,
            "body",
        );

        assert_validation(
            &send_raw(&app, "PATCH", "/api/v1/listings/1", Some(&seller), r#"{"status":"APPROVED"}"#).await,
            "body",
        );

        let owner = r#"{"email":"o@example.com","password":"Abcdefg1","first_name":"O","last_name":"W","role":"OWNER"}"#;
        assert_validation(
            &send_raw(&app, "POST", "/api/v1/auth/register", None, owner).await,
            "role",
        );

        let (status, body) = send(&app, "GET", "/api/v1/listings/abc", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["fields"][0]["field"], "id");

        let (status, body) = send(&app, "GET", "/api/v1/listings?status=BOGUS", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["fields"][0]["field"], "query");
    }

    #[test]
    fn cors_falls_back_to_permissive_on_bad_origin() {
        // must not panic for either branch
        let _ = cors_layer(Some("http://localhost:3001"));
        let _ = cors_layer(Some("bad\norigin"));
        let _ = cors_layer(None);
    }
}
