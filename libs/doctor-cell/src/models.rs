use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use thiserror::Error;

use shared_database::DatabaseError;
use shared_models::error::AppError;
use shared_utils::TimeOfDay;

pub const MIN_SLOT_DURATION: u16 = 15;
pub const MAX_SLOT_DURATION: u16 = 120;
pub const DEFAULT_SLOT_DURATION: u16 = 30;
pub const MIN_PATIENTS_PER_SLOT: u8 = 1;
pub const MAX_PATIENTS_PER_SLOT: u8 = 10;
pub const DEFAULT_LOCATION: &str = "Main Clinic";
pub const MAX_SCHEDULE_NOTES_LEN: usize = 200;

/// Appointment statuses that hold a place in a slot, as a PostgREST `in.()` list.
pub const CAPACITY_STATUSES_FILTER: &str = "SCHEDULED,CONFIRMED,IN_PROGRESS";

// Messages raised by the store triggers guarding booked blocks
// (supabase/migrations/0002_schedule_booking_guards.sql). PostgREST returns
// them in the body of a 409.
pub const GUARD_LIVE_APPOINTMENTS: &str = "schedule_has_live_appointments";
pub const GUARD_BOOKED_HOURS: &str = "schedule_booked_hours_locked";
pub const GUARD_SCHEDULE_INACTIVE: &str = "schedule_not_active";

// ==============================================================================
// DOCTOR
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub specialty: Option<String>,
    #[serde(default)]
    pub consultation_fee: f64,
    #[serde(default = "default_rating")]
    pub rating: f64,
    #[serde(default)]
    pub total_reviews: u32,
    #[serde(default = "default_true")]
    pub is_available: bool,
}

fn default_rating() -> f64 {
    RatingSummary::UNRATED.rating
}

fn default_true() -> bool {
    true
}

/// The displayed aggregate of a doctor's approved feedback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    pub rating: f64,
    pub total_reviews: u32,
}

impl RatingSummary {
    /// What a doctor without reviews shows.
    pub const UNRATED: RatingSummary = RatingSummary { rating: 5.0, total_reviews: 0 };
}

// ==============================================================================
// SCHEDULE BLOCKS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleStatus {
    Active,
    Cancelled,
    Completed,
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleStatus::Active => write!(f, "ACTIVE"),
            ScheduleStatus::Cancelled => write!(f, "CANCELLED"),
            ScheduleStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurringType {
    Daily,
    Weekly,
    Monthly,
}

/// Half-open `[start, end)` range of wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl TimeRange {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Result<Self, ScheduleError> {
        if end <= start {
            return Err(ScheduleError::InvalidRange(format!(
                "end time {} must be after start time {}", end, start
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, time: TimeOfDay) -> bool {
        self.start <= time && time < self.end
    }

    /// Adjacent ranges (one ends where the other starts) do not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        other.start < self.end && other.end > self.start
    }

    pub fn span_minutes(&self) -> u32 {
        self.end.minutes() - self.start.minutes()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleBlock {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub slot_duration: u16,
    pub max_patients: u8,
    pub status: ScheduleStatus,
    #[serde(default)]
    pub is_recurring: bool,
    pub recurring_type: Option<RecurringType>,
    pub recurring_end_date: Option<NaiveDate>,
    pub day_of_week: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ScheduleBlock {
    pub fn is_active(&self) -> bool {
        self.status == ScheduleStatus::Active
    }

    /// The block's working hours. Fails for a stored block whose end does not
    /// follow its start, which creation is supposed to have prevented.
    pub fn range(&self) -> Result<TimeRange, ScheduleError> {
        TimeRange::new(self.start_time, self.end_time)
    }

    /// Number of whole slots the block offers; trailing minutes are dropped.
    pub fn total_slots(&self) -> u32 {
        match (self.range(), self.slot_duration) {
            (Ok(range), duration) if duration > 0 => range.span_minutes() / u32::from(duration),
            _ => 0,
        }
    }
}

pub fn day_of_week_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "MONDAY",
        Weekday::Tue => "TUESDAY",
        Weekday::Wed => "WEDNESDAY",
        Weekday::Thu => "THURSDAY",
        Weekday::Fri => "FRIDAY",
        Weekday::Sat => "SATURDAY",
        Weekday::Sun => "SUNDAY",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailableSlot {
    pub time: TimeOfDay,
    pub schedule_id: Uuid,
    pub available_spots: u8,
    pub max_patients: u8,
}

/// Projection of an appointment row used to count bookings per time.
#[derive(Debug, Clone, Deserialize)]
pub struct BookedTime {
    pub appointment_time: TimeOfDay,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleRequest {
    pub doctor_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub slot_duration: Option<u16>,
    pub max_patients: Option<u8>,
    pub is_recurring: Option<bool>,
    pub recurring_type: Option<RecurringType>,
    pub recurring_end_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateScheduleRequest {
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub slot_duration: Option<u16>,
    pub max_patients: Option<u8>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub status: Option<ScheduleStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleQuery {
    pub doctor_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<ScheduleStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
}

// ==============================================================================
// ERRORS
// ==============================================================================

/// Expected outcomes that refuse a schedule write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScheduleRejection {
    #[error("Schedule conflicts with existing schedule")]
    Overlap,

    #[error("Cannot delete schedule with active appointments")]
    HasActiveAppointments,

    #[error("Cannot change date or hours of a schedule with active appointments")]
    BookedHoursLocked,
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Schedule not found")]
    NotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error(transparent)]
    Rejected(#[from] ScheduleRejection),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid schedule range: {0}")]
    InvalidRange(String),

    #[error("Invalid slot configuration: {0}")]
    InvalidSlotConfig(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<ScheduleError> for AppError {
    fn from(e: ScheduleError) -> Self {
        match e {
            ScheduleError::NotFound | ScheduleError::DoctorNotFound => AppError::NotFound(e.to_string()),
            ScheduleError::Rejected(reason) => AppError::BadRequest(reason.to_string()),
            ScheduleError::ValidationError(msg) => AppError::ValidationError(msg),
            ScheduleError::InvalidRange(_) | ScheduleError::InvalidSlotConfig(_) => AppError::Internal(e.to_string()),
            ScheduleError::Database(db) => db.into(),
        }
    }
}
