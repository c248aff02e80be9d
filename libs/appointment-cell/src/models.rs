// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use thiserror::Error;

use doctor_cell::models::ScheduleError;
use shared_database::DatabaseError;
use shared_models::error::AppError;
use shared_utils::TimeOfDay;

pub const MAX_REASON_LEN: usize = 200;
pub const MAX_NOTES_LEN: usize = 500;
pub const DEFAULT_CANCELLATION_REASON: &str = "Cancelled by receptionist";

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub schedule_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: TimeOfDay,
    pub duration: u16,
    pub reason: String,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub priority: AppointmentPriority,
    #[serde(default)]
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub consultation_fee: f64,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    /// Position among the bookings sharing this doctor, date and time.
    pub seat: u8,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub cancelled_by: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "SCHEDULED"),
            AppointmentStatus::Confirmed => write!(f, "CONFIRMED"),
            AppointmentStatus::InProgress => write!(f, "IN_PROGRESS"),
            AppointmentStatus::Completed => write!(f, "COMPLETED"),
            AppointmentStatus::Cancelled => write!(f, "CANCELLED"),
            AppointmentStatus::NoShow => write!(f, "NO_SHOW"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentType {
    #[default]
    Consultation,
    FollowUp,
    Emergency,
    RoutineCheckup,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Refunded,
}

/// Seat projection used when counting a slot's occupancy.
#[derive(Debug, Clone, Deserialize)]
pub struct OccupiedSeat {
    pub seat: u8,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub schedule_id: Option<Uuid>,
    pub appointment_date: Option<NaiveDate>,
    pub appointment_time: Option<String>,
    pub reason: Option<String>,
    pub symptoms: Option<Vec<String>>,
    pub priority: Option<AppointmentPriority>,
    pub appointment_type: Option<AppointmentType>,
    pub consultation_fee: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAppointmentStatusRequest {
    pub status: AppointmentStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentQuery {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

/// Why a booking request was refused. These are normal outcomes, not faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BookingRejection {
    #[error("Schedule is not active")]
    ScheduleNotActive,

    #[error("Schedule does not belong to the requested doctor")]
    DoctorMismatch,

    #[error("Appointment date does not match schedule date")]
    DateMismatch,

    #[error("Appointment time is outside schedule hours")]
    OutsideScheduleHours,

    #[error("Time slot is fully booked")]
    SlotFullyBooked,
}

#[derive(Debug, Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Schedule not found")]
    ScheduleNotFound,

    #[error(transparent)]
    Rejected(#[from] BookingRejection),

    #[error("Appointment cannot be cancelled (less than {lead_minutes} minutes remaining or already completed/cancelled)")]
    NotCancellable { lead_minutes: i64 },

    #[error("Cannot change appointment status from {from} to {to}")]
    InvalidStatusTransition { from: AppointmentStatus, to: AppointmentStatus },

    #[error("Appointment was modified concurrently, please retry")]
    ConcurrentModification,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid appointment time: {0}")]
    InvalidTime(String),

    #[error("Invalid schedule range: {0}")]
    InvalidRange(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<ScheduleError> for AppointmentError {
    fn from(e: ScheduleError) -> Self {
        match e {
            ScheduleError::NotFound => AppointmentError::ScheduleNotFound,
            ScheduleError::DoctorNotFound => AppointmentError::DoctorNotFound,
            ScheduleError::Database(db) => AppointmentError::Database(db),
            ScheduleError::ValidationError(msg) => AppointmentError::ValidationError(msg),
            other => AppointmentError::InvalidRange(other.to_string()),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::NotFound
            | AppointmentError::PatientNotFound
            | AppointmentError::DoctorNotFound
            | AppointmentError::ScheduleNotFound => AppError::NotFound(e.to_string()),
            AppointmentError::Rejected(_)
            | AppointmentError::NotCancellable { .. }
            | AppointmentError::InvalidStatusTransition { .. } => AppError::BadRequest(e.to_string()),
            AppointmentError::ConcurrentModification => AppError::Conflict(e.to_string()),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::InvalidTime(_) | AppointmentError::InvalidRange(_) => {
                AppError::Internal(e.to_string())
            }
            AppointmentError::Database(db) => db.into(),
        }
    }
}
