// handler/quotes.rs
use std::sync::Arc;

use axum::{
    extract::Path,
    response::IntoResponse,
    routing::{get, put},
    Extension, Json, Router,
};
use uuid::Uuid;

use crate::{
    dtos::marketdtos::{AcceptQuoteDto, ApiResponse},
    error::HttpError,
    middleware::JWTAuthMiddeware,
    models::quotemodel::ActorRole,
    AppState,
};

pub fn quote_handler() -> Router {
    Router::new()
        .route("/:quote_id", get(get_quote))
        .route("/:quote_id/accept", put(accept_quote))
        .route("/:quote_id/expire", put(expire_quote))
}

pub async fn get_quote(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(quote_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let quote = app_state.quote_service.get(quote_id, auth.user_id).await?;

    Ok(Json(ApiResponse::success("Quote retrieved successfully", quote)))
}

pub async fn accept_quote(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(quote_id): Path<Uuid>,
    Json(body): Json<AcceptQuoteDto>,
) -> Result<impl IntoResponse, HttpError> {
    let quote = match body.role {
        ActorRole::Requester => {
            app_state
                .quote_service
                .accept_by_requester(quote_id, auth.user_id)
                .await?
        }
        ActorRole::Provider => {
            app_state
                .quote_service
                .accept_by_provider(quote_id, auth.user_id)
                .await?
        }
    };

    Ok(Json(ApiResponse::success("Quote accepted", quote)))
}

pub async fn expire_quote(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(_auth): Extension<JWTAuthMiddeware>,
    Path(quote_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let quote = app_state.quote_service.expire(quote_id).await?;

    Ok(Json(ApiResponse::success("Quote expired", quote)))
}
