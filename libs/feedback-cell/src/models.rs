use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use doctor_cell::models::ScheduleError;
use shared_database::DatabaseError;
use shared_models::error::AppError;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;
pub const MAX_COMMENT_LEN: usize = 500;
pub const REMOVED_BY_ADMIN_MESSAGE: &str = "Feedback removed by administrator";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedbackStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for FeedbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackStatus::Pending => write!(f, "PENDING"),
            FeedbackStatus::Approved => write!(f, "APPROVED"),
            FeedbackStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Optional sub-ratings, each 1 to 5.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedbackCategories {
    pub doctor_professionalism: Option<u8>,
    pub wait_time: Option<u8>,
    #[serde(alias = "facility_cleaniness")]
    pub facility_cleanliness: Option<u8>,
    pub staff_friendliness: Option<u8>,
    pub overall_experience: Option<u8>,
}

impl FeedbackCategories {
    pub fn ratings(&self) -> impl Iterator<Item = u8> + '_ {
        [
            self.doctor_professionalism,
            self.wait_time,
            self.facility_cleanliness,
            self.staff_friendliness,
            self.overall_experience,
        ]
        .into_iter()
        .flatten()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminResponse {
    pub message: String,
    pub responded_by: String,
    pub responded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub rating: u8,
    pub comment: String,
    #[serde(default)]
    pub categories: FeedbackCategories,
    pub would_recommend: bool,
    #[serde(default)]
    pub anonymous: bool,
    pub status: FeedbackStatus,
    pub admin_response: Option<AdminResponse>,
    #[serde(default = "default_public")]
    pub is_public: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_public() -> bool {
    true
}

impl Feedback {
    /// Mean of the sub-ratings that were given, to one decimal place.
    pub fn average_category_rating(&self) -> Option<f64> {
        let (sum, count) = self
            .categories
            .ratings()
            .fold((0u32, 0u32), |(sum, count), r| (sum + u32::from(r), count + 1));
        (count > 0).then(|| round_tenths(sum, count))
    }
}

/// `sum / count` rounded half-up to one decimal, in integer arithmetic so
/// that values like 4.65 do not drift through binary floating point.
pub fn round_tenths(sum: u32, count: u32) -> f64 {
    let tenths = (u64::from(sum) * 20 + u64::from(count)) / (2 * u64::from(count));
    tenths as f64 / 10.0
}

/// Projection used to read a doctor's approved ratings.
#[derive(Debug, Clone, Deserialize)]
pub struct RatingRow {
    pub rating: u8,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateFeedbackRequest {
    pub appointment_id: Option<Uuid>,
    pub rating: Option<u8>,
    pub comment: Option<String>,
    pub categories: Option<FeedbackCategories>,
    pub would_recommend: Option<bool>,
    pub anonymous: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateFeedbackStatusRequest {
    pub status: FeedbackStatus,
    pub admin_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateVisibilityRequest {
    pub is_public: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackQuery {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub status: Option<FeedbackStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FeedbackRejection {
    #[error("Feedback can only be given for completed appointments")]
    AppointmentNotCompleted,
}

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("Feedback not found")]
    NotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Feedback already exists for this appointment")]
    AlreadyExists,

    #[error(transparent)]
    Rejected(#[from] FeedbackRejection),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<ScheduleError> for FeedbackError {
    fn from(e: ScheduleError) -> Self {
        match e {
            ScheduleError::DoctorNotFound => FeedbackError::DoctorNotFound,
            ScheduleError::Database(db) => FeedbackError::Database(db),
            other => FeedbackError::ValidationError(other.to_string()),
        }
    }
}

impl From<FeedbackError> for AppError {
    fn from(e: FeedbackError) -> Self {
        match e {
            FeedbackError::NotFound | FeedbackError::AppointmentNotFound | FeedbackError::DoctorNotFound => {
                AppError::NotFound(e.to_string())
            }
            FeedbackError::AlreadyExists => AppError::Conflict(e.to_string()),
            FeedbackError::Rejected(reason) => AppError::BadRequest(reason.to_string()),
            FeedbackError::ValidationError(msg) => AppError::ValidationError(msg),
            FeedbackError::Database(db) => db.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feedback(categories: serde_json::Value) -> Feedback {
        serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "appointment_id": Uuid::new_v4(),
            "patient_id": Uuid::new_v4(),
            "doctor_id": Uuid::new_v4(),
            "rating": 4,
            "comment": "Fine",
            "categories": categories,
            "would_recommend": true,
            "status": "APPROVED",
            "admin_response": null,
        }))
        .unwrap()
    }

    #[test]
    fn test_average_of_given_categories() {
        let fb = feedback(json!({ "doctor_professionalism": 5, "wait_time": 4, "overall_experience": 4 }));
        assert_eq!(fb.average_category_rating(), Some(4.3));
        assert!(fb.is_public);
    }

    #[test]
    fn test_no_categories_has_no_average() {
        assert_eq!(feedback(json!({})).average_category_rating(), None);
    }

    #[test]
    fn test_legacy_cleanliness_spelling() {
        let fb = feedback(json!({ "facility_cleaniness": 3 }));
        assert_eq!(fb.categories.facility_cleanliness, Some(3));
    }

    #[test]
    fn test_round_tenths_half_up() {
        assert_eq!(round_tenths(14, 3), 4.7);
        assert_eq!(round_tenths(93, 20), 4.7); // 4.65
        assert_eq!(round_tenths(9, 2), 4.5);
        assert_eq!(round_tenths(5, 1), 5.0);
    }
}
