use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde_json::json;
use validator::Validate;

use crate::dto::test_dto::{
    SubmitAnswerRequest, TestAssignmentRequest, TestPayload, TestStatusUpdate,
};
use crate::error::Error;
use crate::middleware::auth::AuthUser;
use crate::AppState;

pub async fn create_test(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<TestPayload>,
) -> crate::error::Result<Response> {
    payload.validate()?;
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    let detail = state.test_service.create_test(admin.id, payload).await?;
    Ok((StatusCode::CREATED, Json(detail)).into_response())
}

pub async fn get_tests(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    let tests = state.test_service.get_tests(admin.id).await?;
    Ok(Json(tests).into_response())
}

pub async fn get_test(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(test_id): Path<i64>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    let detail = state.test_service.get_test(test_id, admin.id).await?;
    Ok(Json(detail).into_response())
}

pub async fn update_test(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(test_id): Path<i64>,
    Json(payload): Json<TestPayload>,
) -> crate::error::Result<Response> {
    payload.validate()?;
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    state
        .reconcile_service
        .apply_update(test_id, admin.id, payload)
        .await?;
    let detail = state.test_service.get_test(test_id, admin.id).await?;
    Ok(Json(detail).into_response())
}

pub async fn delete_test(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(test_id): Path<i64>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    state.test_service.delete_test(test_id, admin.id).await?;
    Ok(Json(json!({ "message": "Test deleted" })).into_response())
}

pub async fn change_test_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(test_id): Path<i64>,
    Json(payload): Json<TestStatusUpdate>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    let test = state
        .test_service
        .change_test_status(test_id, admin.id, payload.status)
        .await?;
    Ok(Json(test).into_response())
}

pub async fn assign_tests(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<TestAssignmentRequest>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    state.test_service.assign_tests(admin.id, payload).await?;
    Ok((StatusCode::CREATED, Json(json!({ "message": "Tests assigned" }))).into_response())
}

pub async fn unassign_tests(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<TestAssignmentRequest>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    state.test_service.unassign_tests(admin.id, payload).await?;
    Ok(Json(json!({ "message": "Tests unassigned" })).into_response())
}

pub async fn get_assigned_tests(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> crate::error::Result<Response> {
    let employee = state.employee_service.get_by_clerk_id(&user.clerk_id).await?;
    let tests = state.test_service.get_assigned_tests(employee.id).await?;
    Ok(Json(tests).into_response())
}

pub async fn get_assigned_test(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(test_id): Path<i64>,
) -> crate::error::Result<Response> {
    let employee = state.employee_service.get_by_clerk_id(&user.clerk_id).await?;
    let test = state
        .test_service
        .get_assigned_test(test_id, employee.id)
        .await?;
    Ok(Json(test).into_response())
}

pub async fn start_test(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(test_id): Path<i64>,
) -> crate::error::Result<Response> {
    let employee = state.employee_service.get_by_clerk_id(&user.clerk_id).await?;
    let status = state.lifecycle_service.start_test(test_id, employee.id).await?;
    Ok(Json(json!({ "status": status })).into_response())
}

pub async fn complete_test(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(test_id): Path<i64>,
) -> crate::error::Result<Response> {
    let employee = state.employee_service.get_by_clerk_id(&user.clerk_id).await?;
    let status = state
        .lifecycle_service
        .complete_test(test_id, employee.id)
        .await?;
    Ok(Json(json!({ "status": status })).into_response())
}

pub async fn submit_answer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> crate::error::Result<Response> {
    let employee = state.employee_service.get_by_clerk_id(&user.clerk_id).await?;
    state
        .submission_service
        .submit_answer(employee.id, payload)
        .await?;
    Ok(Json(json!({ "message": "Answer saved" })).into_response())
}

pub async fn get_test_results(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(test_id): Path<i64>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    let results = state.test_service.get_test_results(test_id, admin.id).await?;
    Ok(Json(results).into_response())
}

pub async fn reset_test(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((test_id, employee_id)): Path<(i64, i64)>,
) -> crate::error::Result<Response> {
    let admin = state.employee_service.check_permissions(&user.clerk_id).await?;
    let test = state.lifecycle_service.get_test(test_id).await?;
    if test.created_by != admin.id {
        return Err(Error::NotFound("Test not found".to_string()));
    }
    state.lifecycle_service.reset_test(test_id, employee_id).await?;
    Ok(Json(json!({ "message": "Test reset" })).into_response())
}
