// handler/workflow.rs
use std::sync::Arc;

use axum::{extract::Path, response::IntoResponse, routing::get, Extension, Json, Router};
use uuid::Uuid;

use crate::{
    dtos::marketdtos::{AdvanceWorkflowDto, ApiResponse},
    error::HttpError,
    middleware::JWTAuthMiddeware,
    AppState,
};

/// Mounted under `/requests`.
pub fn workflow_handler() -> Router {
    Router::new().route(
        "/:request_id/workflow/:provider_id",
        get(get_workflow).put(advance_workflow),
    )
}

pub async fn get_workflow(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path((request_id, provider_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, HttpError> {
    let workflow = app_state
        .workflow_service
        .get(request_id, provider_id, auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Workflow retrieved successfully", workflow)))
}

pub async fn advance_workflow(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path((request_id, provider_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<AdvanceWorkflowDto>,
) -> Result<impl IntoResponse, HttpError> {
    let workflow = app_state
        .workflow_service
        .advance(request_id, provider_id, auth.user_id, body.milestone)
        .await?;

    Ok(Json(ApiResponse::success(
        &format!("Workflow moved to {}", body.milestone.to_str()),
        workflow,
    )))
}
