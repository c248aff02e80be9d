use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentStatus};
use shared_config::AppConfig;
use shared_database::{DatabaseError, SupabaseClient};
use shared_utils::{Clock, SystemClock};

use crate::models::{
    AdminResponse, CreateFeedbackRequest, Feedback, FeedbackCategories, FeedbackError,
    FeedbackQuery, FeedbackRejection, FeedbackStatus, UpdateFeedbackStatusRequest,
    MAX_COMMENT_LEN, MAX_RATING, MIN_RATING, REMOVED_BY_ADMIN_MESSAGE,
};
use crate::services::rating::RatingService;

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

fn check_rating(label: &str, value: u8) -> Result<(), FeedbackError> {
    if (MIN_RATING..=MAX_RATING).contains(&value) {
        Ok(())
    } else {
        Err(FeedbackError::ValidationError(format!(
            "{} must be between {} and {}",
            label, MIN_RATING, MAX_RATING
        )))
    }
}

fn check_categories(categories: &FeedbackCategories) -> Result<(), FeedbackError> {
    categories
        .ratings()
        .try_for_each(|r| check_rating("Category rating", r))
}

pub struct FeedbackService {
    supabase: SupabaseClient,
    ratings: RatingService,
    clock: Arc<dyn Clock>,
}

impl FeedbackService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            ratings: RatingService::new(config),
            clock,
        }
    }

    /// Records feedback for a completed appointment. The doctor and patient
    /// are taken from the appointment, never from the request.
    pub async fn create_feedback(
        &self,
        request: CreateFeedbackRequest,
        auth_token: &str,
    ) -> Result<Feedback, FeedbackError> {
        let (Some(appointment_id), Some(rating), Some(would_recommend)) =
            (request.appointment_id, request.rating, request.would_recommend)
        else {
            return Err(FeedbackError::ValidationError(
                "Appointment, rating, and recommendation are required".to_string(),
            ));
        };
        let comment = request
            .comment
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| FeedbackError::ValidationError("Please provide a comment".to_string()))?;

        check_rating("Rating", rating)?;
        if comment.chars().count() > MAX_COMMENT_LEN {
            return Err(FeedbackError::ValidationError(format!(
                "Comment cannot be more than {} characters",
                MAX_COMMENT_LEN
            )));
        }
        let categories = request.categories.unwrap_or_default();
        check_categories(&categories)?;

        debug!("Creating feedback for appointment {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let appointment: Appointment = self
            .supabase
            .select_one(&path, auth_token)
            .await?
            .ok_or(FeedbackError::AppointmentNotFound)?;

        if appointment.status != AppointmentStatus::Completed {
            warn!("Appointment {} is {}, not completed", appointment_id, appointment.status);
            return Err(FeedbackRejection::AppointmentNotCompleted.into());
        }

        let existing_path = format!("/rest/v1/feedback?appointment_id=eq.{}&select=id", appointment_id);
        let existing: Vec<serde_json::Value> = self.supabase.select(&existing_path, auth_token).await?;
        if !existing.is_empty() {
            return Err(FeedbackError::AlreadyExists);
        }

        let now = self.clock.now().to_rfc3339();
        let body = json!({
            "appointment_id": appointment_id,
            "patient_id": appointment.patient_id,
            "doctor_id": appointment.doctor_id,
            "rating": rating,
            "comment": comment,
            "categories": categories,
            "would_recommend": would_recommend,
            "anonymous": request.anonymous.unwrap_or(false),
            "status": FeedbackStatus::Pending,
            "is_public": true,
            "created_at": now,
            "updated_at": now,
        });

        // the unique index on appointment_id settles two simultaneous submissions
        let created: Vec<Feedback> = self
            .supabase
            .insert("/rest/v1/feedback", body, auth_token)
            .await
            .map_err(|e| match e {
                DatabaseError::Conflict(_) => FeedbackError::AlreadyExists,
                other => other.into(),
            })?;
        let feedback = created
            .into_iter()
            .next()
            .ok_or_else(|| FeedbackError::Database(DatabaseError::NotFound("created feedback".to_string())))?;

        info!("Created feedback {} for doctor {}", feedback.id, feedback.doctor_id);
        self.ratings.refresh_doctor_rating(feedback.doctor_id, auth_token).await?;
        Ok(feedback)
    }

    pub async fn get_feedback(&self, feedback_id: Uuid, auth_token: &str) -> Result<Feedback, FeedbackError> {
        let path = format!("/rest/v1/feedback?id=eq.{}", feedback_id);
        self.supabase
            .select_one::<Feedback>(&path, auth_token)
            .await?
            .ok_or(FeedbackError::NotFound)
    }

    pub async fn list_feedback(&self, query: &FeedbackQuery, auth_token: &str) -> Result<Vec<Feedback>, FeedbackError> {
        debug!("Listing feedback with filter: {:?}", query);

        let mut filters = vec![format!("status=eq.{}", query.status.unwrap_or(FeedbackStatus::Approved))];
        if let Some(doctor_id) = query.doctor_id {
            filters.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(patient_id) = query.patient_id {
            filters.push(format!("patient_id=eq.{}", patient_id));
        }

        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let page = query.page.unwrap_or(1).max(1);
        filters.push("order=created_at.desc".to_string());
        filters.push(format!("limit={}", limit));
        filters.push(format!("offset={}", (page - 1) * limit));

        let path = format!("/rest/v1/feedback?{}", filters.join("&"));
        Ok(self.supabase.select(&path, auth_token).await?)
    }

    /// Approves or rejects feedback, optionally with a reply, then refreshes
    /// the doctor's rating.
    pub async fn update_status(
        &self,
        feedback_id: Uuid,
        request: UpdateFeedbackStatusRequest,
        responder: &str,
        auth_token: &str,
    ) -> Result<Feedback, FeedbackError> {
        debug!("Setting feedback {} to {}", feedback_id, request.status);

        let mut body = json!({
            "status": request.status,
            "updated_at": self.clock.now().to_rfc3339(),
        });
        if let Some(message) = request.admin_message.filter(|m| !m.trim().is_empty()) {
            let response = AdminResponse {
                message,
                responded_by: responder.to_string(),
                responded_at: self.clock.now(),
            };
            body["admin_response"] = json!(response);
        }

        let feedback = self.patch_feedback(feedback_id, body, auth_token).await?;
        info!("Feedback {} is now {}", feedback_id, feedback.status);

        self.ratings.refresh_doctor_rating(feedback.doctor_id, auth_token).await?;
        Ok(feedback)
    }

    pub async fn update_visibility(
        &self,
        feedback_id: Uuid,
        is_public: bool,
        auth_token: &str,
    ) -> Result<Feedback, FeedbackError> {
        debug!("Setting feedback {} public={}", feedback_id, is_public);

        let body = json!({
            "is_public": is_public,
            "updated_at": self.clock.now().to_rfc3339(),
        });
        self.patch_feedback(feedback_id, body, auth_token).await
    }

    /// Soft delete: rejected, hidden and annotated, then the rating is rebuilt.
    pub async fn delete_feedback(
        &self,
        feedback_id: Uuid,
        admin: &str,
        auth_token: &str,
    ) -> Result<Feedback, FeedbackError> {
        let now = self.clock.now();
        let response = AdminResponse {
            message: REMOVED_BY_ADMIN_MESSAGE.to_string(),
            responded_by: admin.to_string(),
            responded_at: now,
        };
        let body = json!({
            "status": FeedbackStatus::Rejected,
            "is_public": false,
            "admin_response": response,
            "updated_at": now.to_rfc3339(),
        });

        let feedback = self.patch_feedback(feedback_id, body, auth_token).await?;
        info!("Feedback {} removed by {}", feedback_id, admin);

        self.ratings.refresh_doctor_rating(feedback.doctor_id, auth_token).await?;
        Ok(feedback)
    }

    async fn patch_feedback(
        &self,
        feedback_id: Uuid,
        body: serde_json::Value,
        auth_token: &str,
    ) -> Result<Feedback, FeedbackError> {
        let path = format!("/rest/v1/feedback?id=eq.{}", feedback_id);
        let rows: Vec<Feedback> = self.supabase.update(&path, body, auth_token).await?;
        rows.into_iter().next().ok_or(FeedbackError::NotFound)
    }
}
