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
use shared_utils::extractor::{require_admin, require_staff};

use crate::models::{CreateFeedbackRequest, FeedbackQuery, UpdateFeedbackStatusRequest, UpdateVisibilityRequest};
use crate::services::feedback::FeedbackService;

#[axum::debug_handler]
pub async fn list_feedback(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<FeedbackQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let feedback = FeedbackService::new(&state).list_feedback(&query, auth.token()).await?;
    let with_averages: Vec<Value> = feedback
        .iter()
        .map(|f| {
            let mut entry = json!(f);
            entry["average_category_rating"] = json!(f.average_category_rating());
            entry
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "data": {
            "feedback": with_averages,
            "page": query.page.unwrap_or(1),
        }
    })))
}

#[axum::debug_handler]
pub async fn get_feedback(
    State(state): State<Arc<AppConfig>>,
    Path(feedback_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let feedback = FeedbackService::new(&state).get_feedback(feedback_id, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "feedback": feedback,
            "average_category_rating": feedback.average_category_rating(),
        }
    })))
}

#[axum::debug_handler]
pub async fn create_feedback(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateFeedbackRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_staff(&user)?;

    let feedback = FeedbackService::new(&state).create_feedback(request, auth.token()).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Feedback submitted successfully",
            "data": { "feedback": feedback }
        })),
    ))
}

#[axum::debug_handler]
pub async fn update_feedback_status(
    State(state): State<Arc<AppConfig>>,
    Path(feedback_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateFeedbackStatusRequest>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let feedback = FeedbackService::new(&state)
        .update_status(feedback_id, request, &user.id, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Feedback status updated successfully",
        "data": { "feedback": feedback }
    })))
}

#[axum::debug_handler]
pub async fn update_feedback_visibility(
    State(state): State<Arc<AppConfig>>,
    Path(feedback_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateVisibilityRequest>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let feedback = FeedbackService::new(&state)
        .update_visibility(feedback_id, request.is_public, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Feedback {} successfully", if feedback.is_public { "made public" } else { "hidden" }),
        "data": { "feedback": feedback }
    })))
}

#[axum::debug_handler]
pub async fn delete_feedback(
    State(state): State<Arc<AppConfig>>,
    Path(feedback_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    FeedbackService::new(&state)
        .delete_feedback(feedback_id, &user.id, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Feedback deleted successfully"
    })))
}
