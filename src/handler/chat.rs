// handler/chat.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::marketdtos::{ApiResponse, PostMessageDto, ThreadQuery},
    error::HttpError,
    middleware::JWTAuthMiddeware,
    AppState,
};

/// Mounted under `/requests`. `?quote_id=` selects a negotiation thread.
pub fn chat_handler() -> Router {
    Router::new()
        .route("/:request_id/messages", get(get_thread).post(post_message))
        .route("/:request_id/messages/read", put(mark_thread_read))
}

pub async fn post_message(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(request_id): Path<Uuid>,
    Json(body): Json<PostMessageDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let message = app_state
        .chat_service
        .post(auth.user_id, body.receiver_id, request_id, body.quote_id, body.content)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Message sent", message)),
    ))
}

pub async fn get_thread(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(request_id): Path<Uuid>,
    Query(params): Query<ThreadQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let messages = app_state
        .chat_service
        .thread(request_id, params.quote_id, auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Messages retrieved successfully", messages)))
}

pub async fn mark_thread_read(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(request_id): Path<Uuid>,
    Query(params): Query<ThreadQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let updated = app_state
        .chat_service
        .mark_read(request_id, params.quote_id, auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Messages marked as read", updated)))
}
