// handler/requests.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::marketdtos::*,
    error::HttpError,
    middleware::JWTAuthMiddeware,
    utils::decimal::money_from_f64,
    AppState,
};

pub fn request_handler() -> Router {
    Router::new()
        .route("/", post(create_request))
        .route("/mine", get(get_my_requests))
        .route("/feed", get(get_feed))
        .route("/statuses/mine", get(get_my_provider_statuses))
        .route("/:request_id", get(view_request))
        .route("/:request_id/cancel", put(cancel_request))
        .route(
            "/:request_id/hide",
            get(get_hidden_state).post(hide_request).delete(unhide_request),
        )
        .route("/:request_id/provider-statuses", get(get_provider_statuses))
        .route("/:request_id/quotes", get(get_request_quotes).post(submit_quote))
        .route("/:request_id/agreements", get(get_request_agreements))
}

pub async fn create_request(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateServiceRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let request = app_state.request_service.create(auth.user_id, body).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Service request created successfully", request)),
    ))
}

pub async fn get_my_requests(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let requests = app_state.request_service.list_mine(auth.user_id).await?;

    Ok(Json(ApiResponse::success("Service requests retrieved successfully", requests)))
}

pub async fn get_feed(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(params): Query<FeedQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let page = params.page.unwrap_or(1);
    let limit = params.limit.unwrap_or(20);

    let requests = app_state
        .request_service
        .feed(auth.user_id, page, limit)
        .await?;

    Ok(Json(ApiResponse::success("Open requests retrieved successfully", requests)))
}

pub async fn view_request(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let request = app_state.request_service.view(request_id, auth.user_id).await?;

    Ok(Json(ApiResponse::success("Service request retrieved successfully", request)))
}

pub async fn cancel_request(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let request = app_state.request_service.cancel(request_id, auth.user_id).await?;

    Ok(Json(ApiResponse::success("Service request cancelled", request)))
}

pub async fn hide_request(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let hidden = app_state.request_service.hide(request_id, auth.user_id).await?;

    Ok(Json(ApiResponse::success("Service request hidden", hidden)))
}

pub async fn unhide_request(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let removed = app_state.request_service.unhide(request_id, auth.user_id).await?;

    Ok(Json(ApiResponse::success("Service request unhidden", removed)))
}

pub async fn get_hidden_state(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let hidden = app_state.request_service.is_hidden(request_id, auth.user_id).await?;

    Ok(Json(ApiResponse::success("Visibility retrieved successfully", hidden)))
}

pub async fn get_provider_statuses(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let statuses = app_state
        .provider_status_service
        .for_request(request_id, auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Provider statuses retrieved successfully", statuses)))
}

pub async fn get_my_provider_statuses(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let statuses = app_state
        .provider_status_service
        .for_provider(auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Provider statuses retrieved successfully", statuses)))
}

pub async fn submit_quote(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(request_id): Path<Uuid>,
    Json(body): Json<SubmitQuoteDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let price = money_from_f64(body.price)
        .ok_or_else(|| HttpError::bad_request("Price must be a finite number"))?;

    let quote = app_state
        .quote_service
        .submit(request_id, auth.user_id, price, body.message, body.expires_at)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Quote submitted successfully", quote)),
    ))
}

pub async fn get_request_quotes(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let quotes = app_state
        .quote_service
        .list_for_request(request_id, auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Quotes retrieved successfully", quotes)))
}

pub async fn get_request_agreements(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let agreements = app_state
        .agreement_service
        .list_for_request(request_id, auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Agreements retrieved successfully", agreements)))
}
