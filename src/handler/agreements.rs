// handler/agreements.rs
use std::sync::Arc;

use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use uuid::Uuid;

use crate::{
    dtos::marketdtos::{ApiResponse, OpenAgreementDto},
    error::HttpError,
    middleware::JWTAuthMiddeware,
    AppState,
};

pub fn agreement_handler() -> Router {
    Router::new()
        .route("/", post(open_agreement))
        .route("/:agreement_id", get(get_agreement))
        .route("/:agreement_id/accept", put(accept_agreement))
        .route("/:agreement_id/reject", put(reject_agreement))
}

pub async fn open_agreement(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<OpenAgreementDto>,
) -> Result<impl IntoResponse, HttpError> {
    let agreement = app_state
        .agreement_service
        .open(body.quote_id, body.provider_id, auth.user_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Agreement opened", agreement)),
    ))
}

pub async fn get_agreement(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(agreement_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let agreement = app_state
        .agreement_service
        .get(agreement_id, auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Agreement retrieved successfully", agreement)))
}

pub async fn accept_agreement(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(agreement_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let agreement = app_state
        .agreement_service
        .accept(agreement_id, auth.user_id)
        .await?;

    let message = if agreement.finalized_at.is_some() {
        "Agreement finalized"
    } else {
        "Acceptance recorded"
    };

    Ok(Json(ApiResponse::success(message, agreement)))
}

pub async fn reject_agreement(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(agreement_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let agreement = app_state
        .agreement_service
        .reject(agreement_id, auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Agreement rejected", agreement)))
}
