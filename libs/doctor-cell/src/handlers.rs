use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::require_staff;

use crate::models::{AvailabilityQuery, CreateScheduleRequest, ScheduleQuery, UpdateScheduleRequest};
use crate::services::{availability::ScheduleService, doctor::DoctorService};

// ==============================================================================
// DOCTOR HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let doctor = DoctorService::new(&state).get_doctor(doctor_id, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "data": { "doctor": doctor }
    })))
}

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let slots = ScheduleService::new(&state)
        .available_slots(doctor_id, query.date, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "doctor_id": doctor_id,
            "date": query.date,
            "available_slots": slots,
        }
    })))
}

// ==============================================================================
// SCHEDULE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_schedules(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<ScheduleQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let schedules = ScheduleService::new(&state).list_schedules(&query, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "schedules": schedules,
            "page": query.page.unwrap_or(1),
        }
    })))
}

#[axum::debug_handler]
pub async fn get_schedule(
    State(state): State<Arc<AppConfig>>,
    Path(schedule_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let schedule = ScheduleService::new(&state).get_schedule(schedule_id, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "data": { "schedule": schedule }
    })))
}

#[axum::debug_handler]
pub async fn create_schedule(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_staff(&user)?;

    let schedule = ScheduleService::new(&state).create_schedule(request, auth.token()).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Schedule created successfully",
            "data": { "schedule": schedule }
        })),
    ))
}

#[axum::debug_handler]
pub async fn update_schedule(
    State(state): State<Arc<AppConfig>>,
    Path(schedule_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let schedule = ScheduleService::new(&state)
        .update_schedule(schedule_id, request, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Schedule updated successfully",
        "data": { "schedule": schedule }
    })))
}

#[axum::debug_handler]
pub async fn delete_schedule(
    State(state): State<Arc<AppConfig>>,
    Path(schedule_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    ScheduleService::new(&state).cancel_schedule(schedule_id, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Schedule deleted successfully"
    })))
}
