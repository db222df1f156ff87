// routes.rs
use std::sync::Arc;

use axum::{middleware, routing::get, Extension, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
    handler::{
        agreements::agreement_handler, chat::chat_handler, quotes::quote_handler,
        requests::request_handler, workflow::workflow_handler,
    },
    middleware::auth,
    AppState,
};

// Health check handler
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running"
    }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let request_routes = request_handler()
        .merge(workflow_handler())
        .merge(chat_handler());

    let api_route = Router::new()
        .nest("/requests", request_routes)
        .nest("/quotes", quote_handler())
        .nest("/agreements", agreement_handler())
        .layer(middleware::from_fn(auth))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_route)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, db::memorydb::MemoryStore, utils::token::create_token};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    const SECRET: &str = "router-test-secret";

    fn app() -> Router {
        let config = Config {
            database_url: None,
            jwt_secret: SECRET.to_string(),
            port: 0,
            quote_sweep_interval_secs: 60,
            event_channel_capacity: 16,
            db_max_connections: 1,
        };
        create_router(Arc::new(AppState::new(config, Arc::new(MemoryStore::new()))))
    }

    fn bearer(user_id: Uuid) -> String {
        format!("Bearer {}", create_token(&user_id.to_string(), SECRET.as_bytes(), 600))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn post_json(uri: &str, user_id: Uuid, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::AUTHORIZATION, bearer(user_id))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let (status, body) = send(&app(), Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn api_requires_a_token() {
        let (status, body) = send(
            &app(),
            Request::get("/api/requests/mine").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], "fail");
    }

    #[tokio::test]
    async fn create_then_quote_twice_conflicts() {
        let app = app();
        let (requester, provider) = (Uuid::new_v4(), Uuid::new_v4());

        let (status, body) = send(
            &app,
            post_json(
                "/api/requests",
                requester,
                json!({
                    "booking_mode": "quote-only",
                    "category": "cleaning",
                    "subcategory": "deep-clean",
                    "location": "12 Marina Road"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let request_id = body["data"]["id"].as_str().unwrap().to_string();

        let uri = format!("/api/requests/{}/quotes", request_id);
        let (status, _) = send(&app, post_json(&uri, provider, json!({ "price": 150.0 }))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = send(&app, post_json(&uri, provider, json!({ "price": 140.0 }))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(&app, post_json(&uri, requester, json!({ "price": 10.0 }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn schedule_violations_are_bad_requests() {
        let (status, _) = send(
            &app(),
            post_json(
                "/api/requests",
                Uuid::new_v4(),
                json!({
                    "booking_mode": "scheduled",
                    "category": "cleaning",
                    "subcategory": "deep-clean",
                    "location": "12 Marina Road"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cancelling_twice_is_unprocessable() {
        let app = app();
        let requester = Uuid::new_v4();
        let (_, body) = send(
            &app,
            post_json(
                "/api/requests",
                requester,
                json!({
                    "booking_mode": "quote-only",
                    "category": "cleaning",
                    "subcategory": "deep-clean",
                    "location": "12 Marina Road"
                }),
            ),
        )
        .await;
        let request_id = body["data"]["id"].as_str().unwrap().to_string();

        let request = Request::put(format!("/api/requests/{}/cancel", request_id))
            .header(header::AUTHORIZATION, bearer(requester))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "Cancelled");

        let request = Request::put(format!("/api/requests/{}/cancel", request_id))
            .header(header::AUTHORIZATION, bearer(requester))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
