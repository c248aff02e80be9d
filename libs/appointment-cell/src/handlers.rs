// libs/appointment-cell/src/handlers.rs
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

use crate::models::{
    AppointmentQuery, BookAppointmentRequest, CancelAppointmentRequest,
    UpdateAppointmentStatusRequest,
};
use crate::services::booking::AppointmentBookingService;

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<AppointmentQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let appointments = AppointmentBookingService::new(&state)
        .list_appointments(&query, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "appointments": appointments,
            "page": query.page.unwrap_or(1),
        }
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let appointment = AppointmentBookingService::new(&state)
        .get_appointment(appointment_id, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": { "appointment": appointment }
    })))
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_staff(&user)?;

    let appointment = AppointmentBookingService::new(&state)
        .book_appointment(request, &user.id, auth.token())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Appointment booked successfully",
            "data": { "appointment": appointment }
        })),
    ))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAppointmentStatusRequest>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let appointment = AppointmentBookingService::new(&state)
        .update_status(appointment_id, request, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment status updated successfully",
        "data": { "appointment": appointment }
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let appointment = AppointmentBookingService::new(&state)
        .cancel_appointment(appointment_id, request, &user.id, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment cancelled successfully",
        "data": { "appointment": appointment }
    })))
}
