use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde_json::json;
use validator::Validate;

use crate::dto::belbin_dto::{BelbinRequirementsRequest, BelbinRoleCreate};
use crate::middleware::auth::AuthUser;
use crate::AppState;

pub async fn create_role(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<BelbinRoleCreate>,
) -> crate::error::Result<Response> {
    payload.validate()?;
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    let role = state.belbin_service.create_role(admin.id, payload).await?;
    Ok((StatusCode::CREATED, Json(role)).into_response())
}

pub async fn get_roles(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    let roles = state.belbin_service.get_roles(admin.id).await?;
    Ok(Json(roles).into_response())
}

pub async fn get_role(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(role_id): Path<i64>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    let role = state.belbin_service.get_role(admin.id, role_id).await?;
    Ok(Json(role).into_response())
}

pub async fn update_role(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(role_id): Path<i64>,
    Json(payload): Json<BelbinRoleCreate>,
) -> crate::error::Result<Response> {
    payload.validate()?;
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    let role = state.belbin_service.update_role(admin.id, role_id, payload).await?;
    Ok(Json(role).into_response())
}

pub async fn delete_role(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(role_id): Path<i64>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    state.belbin_service.delete_role(admin.id, role_id).await?;
    Ok(Json(json!({ "message": "Role deleted" })).into_response())
}

pub async fn save_requirements(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<BelbinRequirementsRequest>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    let grouped = state.belbin_service.save_requirements(admin.id, payload).await?;
    Ok((StatusCode::CREATED, Json(grouped)).into_response())
}

pub async fn get_requirements(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    let grouped = state.belbin_service.get_requirements(admin.id).await?;
    Ok(Json(grouped).into_response())
}

pub async fn delete_requirement(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(requirement_id): Path<i64>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    state
        .belbin_service
        .delete_requirement(admin.id, requirement_id)
        .await?;
    Ok(Json(json!({ "message": "Requirement deleted" })).into_response())
}

pub async fn evaluate_fit(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((test_id, employee_id)): Path<(i64, i64)>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    // The attempt must belong to one of the caller's employees.
    state.employee_service.get_employee(admin.id, employee_id).await?;
    let evaluation = state.belbin_service.evaluate_fit(test_id, employee_id).await?;
    Ok(Json(evaluation).into_response())
}
