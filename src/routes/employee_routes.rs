use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde_json::json;
use validator::Validate;

use crate::dto::employee_dto::{BatchAccountRequest, EmployeeCreate, EmployeeMinimal, EmployeeUpdate};
use crate::middleware::auth::AuthUser;
use crate::AppState;

pub async fn create_employee(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<EmployeeCreate>,
) -> crate::error::Result<Response> {
    payload.validate()?;
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    let employee = state.employee_service.create_employee(admin.id, payload).await?;
    Ok((StatusCode::CREATED, Json(employee)).into_response())
}

pub async fn get_employees(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    let employees = state.employee_service.get_employees(admin.id).await?;
    Ok(Json(employees).into_response())
}

pub async fn get_employee(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(employee_id): Path<i64>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    let employee = state.employee_service.get_employee(admin.id, employee_id).await?;
    Ok(Json(employee).into_response())
}

pub async fn update_employee(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(employee_id): Path<i64>,
    Json(payload): Json<EmployeeUpdate>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    let employee = state
        .employee_service
        .update_employee(admin.id, employee_id, payload)
        .await?;
    Ok(Json(employee).into_response())
}

pub async fn delete_employee(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(employee_id): Path<i64>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    state.employee_service.delete_employee(admin.id, employee_id).await?;
    Ok(Json(json!({ "message": "Employee deleted" })).into_response())
}

pub async fn provision_accounts(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<BatchAccountRequest>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    let report = state
        .employee_service
        .provision_accounts(admin.id, payload)
        .await?;
    Ok(Json(report).into_response())
}

/// Identity-provider webhook; the only authenticated-data route outside the
/// bearer middleware.
pub async fn create_account(
    State(state): State<AppState>,
    Json(payload): Json<EmployeeMinimal>,
) -> crate::error::Result<Response> {
    let employee = state.employee_service.create_account(payload).await?;
    Ok((StatusCode::CREATED, Json(employee)).into_response())
}

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> crate::error::Result<Response> {
    let employee = state.employee_service.get_by_clerk_id(&user.clerk_id).await?;
    Ok(Json(employee).into_response())
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<EmployeeUpdate>,
) -> crate::error::Result<Response> {
    let employee = state
        .employee_service
        .update_profile(&user.clerk_id, payload)
        .await?;
    Ok(Json(employee).into_response())
}

pub async fn delete_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> crate::error::Result<Response> {
    state.employee_service.delete_profile(&user.clerk_id).await?;
    Ok(Json(json!({ "message": "Profile deleted" })).into_response())
}
