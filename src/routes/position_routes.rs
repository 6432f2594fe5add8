use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde_json::json;
use validator::Validate;

use crate::dto::position_dto::PositionCreate;
use crate::middleware::auth::AuthUser;
use crate::AppState;

pub async fn create_position(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<PositionCreate>,
) -> crate::error::Result<Response> {
    payload.validate()?;
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    let position = state.position_service.create_position(admin.id, payload).await?;
    Ok((StatusCode::CREATED, Json(position)).into_response())
}

pub async fn get_positions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    let positions = state.position_service.get_positions(admin.id).await?;
    Ok(Json(positions).into_response())
}

pub async fn get_position(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(position_id): Path<i64>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    let position = state.position_service.get_position(admin.id, position_id).await?;
    Ok(Json(position).into_response())
}

pub async fn update_position(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(position_id): Path<i64>,
    Json(payload): Json<PositionCreate>,
) -> crate::error::Result<Response> {
    payload.validate()?;
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    let position = state
        .position_service
        .update_position(admin.id, position_id, payload)
        .await?;
    Ok(Json(position).into_response())
}

pub async fn delete_position(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(position_id): Path<i64>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    state.position_service.delete_position(admin.id, position_id).await?;
    Ok(Json(json!({ "message": "Position deleted" })).into_response())
}
