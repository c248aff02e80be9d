use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{DatabaseError, SupabaseClient};
use shared_utils::{Clock, SystemClock, TimeOfDay};

use crate::models::{
    day_of_week_name, AvailableSlot, BookedTime, CreateScheduleRequest, RecurringType,
    ScheduleBlock, ScheduleError, ScheduleQuery, ScheduleRejection, ScheduleStatus, TimeRange,
    UpdateScheduleRequest, CAPACITY_STATUSES_FILTER, DEFAULT_LOCATION, GUARD_BOOKED_HOURS,
    GUARD_LIVE_APPOINTMENTS, DEFAULT_SLOT_DURATION,
    MAX_PATIENTS_PER_SLOT, MAX_SCHEDULE_NOTES_LEN, MAX_SLOT_DURATION, MIN_PATIENTS_PER_SLOT,
    MIN_SLOT_DURATION,
};
use crate::services::doctor::DoctorService;
use crate::services::slots::{compute_available_slots, count_booked_times, find_conflicting_block};

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

/// A schedule block's fields after parsing and validation, ready to store.
#[derive(Debug, Clone)]
pub struct ScheduleDraft {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub range: TimeRange,
    pub slot_duration: u16,
    pub max_patients: u8,
    pub is_recurring: bool,
    pub recurring_type: Option<RecurringType>,
    pub recurring_end_date: Option<NaiveDate>,
    pub location: String,
    pub notes: Option<String>,
}

fn parse_time(field: &str, value: &str) -> Result<TimeOfDay, ScheduleError> {
    value
        .parse()
        .map_err(|_| ScheduleError::ValidationError(format!("Invalid {} format. Use HH:MM", field)))
}

fn user_range(start: TimeOfDay, end: TimeOfDay) -> Result<TimeRange, ScheduleError> {
    TimeRange::new(start, end)
        .map_err(|_| ScheduleError::ValidationError("End time must be after start time".to_string()))
}

fn check_draft(draft: &ScheduleDraft) -> Result<(), ScheduleError> {
    if !(MIN_SLOT_DURATION..=MAX_SLOT_DURATION).contains(&draft.slot_duration) {
        return Err(ScheduleError::ValidationError(format!(
            "Slot duration must be between {} and {} minutes",
            MIN_SLOT_DURATION, MAX_SLOT_DURATION
        )));
    }
    if !(MIN_PATIENTS_PER_SLOT..=MAX_PATIENTS_PER_SLOT).contains(&draft.max_patients) {
        return Err(ScheduleError::ValidationError(format!(
            "Max patients must be between {} and {}",
            MIN_PATIENTS_PER_SLOT, MAX_PATIENTS_PER_SLOT
        )));
    }
    if draft.notes.as_ref().is_some_and(|n| n.chars().count() > MAX_SCHEDULE_NOTES_LEN) {
        return Err(ScheduleError::ValidationError(format!(
            "Notes cannot exceed {} characters",
            MAX_SCHEDULE_NOTES_LEN
        )));
    }
    if draft.is_recurring {
        match (draft.recurring_type, draft.recurring_end_date) {
            (Some(_), Some(end)) if end < draft.date => {
                return Err(ScheduleError::ValidationError(
                    "Recurring end date cannot be before the schedule date".to_string(),
                ));
            }
            (Some(_), Some(_)) => {}
            _ => {
                return Err(ScheduleError::ValidationError(
                    "Recurring type and end date are required for recurring schedules".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Turns a create request into a draft, applying defaults.
pub fn draft_from_request(request: CreateScheduleRequest) -> Result<ScheduleDraft, ScheduleError> {
    let (Some(doctor_id), Some(date), Some(start), Some(end)) =
        (request.doctor_id, request.date, request.start_time, request.end_time)
    else {
        return Err(ScheduleError::ValidationError(
            "Doctor, date, start time, and end time are required".to_string(),
        ));
    };

    let range = user_range(parse_time("start time", &start)?, parse_time("end time", &end)?)?;
    let is_recurring = request.is_recurring.unwrap_or(false);

    let draft = ScheduleDraft {
        doctor_id,
        date,
        range,
        slot_duration: request.slot_duration.unwrap_or(DEFAULT_SLOT_DURATION),
        max_patients: request.max_patients.unwrap_or(MIN_PATIENTS_PER_SLOT),
        is_recurring,
        recurring_type: request.recurring_type.filter(|_| is_recurring),
        recurring_end_date: request.recurring_end_date.filter(|_| is_recurring),
        location: request
            .location
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
        notes: request.notes,
    };
    check_draft(&draft)?;
    Ok(draft)
}

/// Applies a partial update on top of a stored block.
pub fn draft_from_update(
    existing: &ScheduleBlock,
    patch: &UpdateScheduleRequest,
) -> Result<ScheduleDraft, ScheduleError> {
    let start = match &patch.start_time {
        Some(s) => parse_time("start time", s)?,
        None => existing.start_time,
    };
    let end = match &patch.end_time {
        Some(s) => parse_time("end time", s)?,
        None => existing.end_time,
    };

    let draft = ScheduleDraft {
        doctor_id: existing.doctor_id,
        date: patch.date.unwrap_or(existing.date),
        range: user_range(start, end)?,
        slot_duration: patch.slot_duration.unwrap_or(existing.slot_duration),
        max_patients: patch.max_patients.unwrap_or(existing.max_patients),
        is_recurring: existing.is_recurring,
        recurring_type: existing.recurring_type,
        recurring_end_date: existing.recurring_end_date,
        location: patch
            .location
            .clone()
            .or_else(|| existing.location.clone())
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
        notes: patch.notes.clone().or_else(|| existing.notes.clone()),
    };
    check_draft(&draft)?;
    Ok(draft)
}

pub struct ScheduleService {
    supabase: SupabaseClient,
    doctors: DoctorService,
    clock: Arc<dyn Clock>,
}

impl ScheduleService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            doctors: DoctorService::new(config),
            clock,
        }
    }

    pub async fn create_schedule(
        &self,
        request: CreateScheduleRequest,
        auth_token: &str,
    ) -> Result<ScheduleBlock, ScheduleError> {
        let draft = draft_from_request(request)?;
        debug!("Creating schedule for doctor {} on {}", draft.doctor_id, draft.date);

        self.doctors.get_doctor(draft.doctor_id, auth_token).await?;

        let existing = self.get_active_blocks(draft.doctor_id, draft.date, auth_token).await?;
        if let Some(conflict) = find_conflicting_block(&existing, draft.doctor_id, draft.date, &draft.range, None) {
            warn!(
                "Schedule for doctor {} on {} overlaps block {}",
                draft.doctor_id, draft.date, conflict.id
            );
            return Err(ScheduleRejection::Overlap.into());
        }

        let now = self.clock.now().to_rfc3339();
        let body = json!({
            "doctor_id": draft.doctor_id,
            "date": draft.date,
            "start_time": draft.range.start,
            "end_time": draft.range.end,
            "slot_duration": draft.slot_duration,
            "max_patients": draft.max_patients,
            "status": ScheduleStatus::Active,
            "is_recurring": draft.is_recurring,
            "recurring_type": draft.recurring_type,
            "recurring_end_date": draft.recurring_end_date,
            "day_of_week": day_of_week_name(draft.date),
            "location": draft.location,
            "notes": draft.notes,
            "created_at": now,
            "updated_at": now,
        });

        let created: Vec<ScheduleBlock> = self
            .supabase
            .insert("/rest/v1/schedules", body, auth_token)
            .await
            .map_err(schedule_write_conflict)?;

        let block = created
            .into_iter()
            .next()
            .ok_or_else(|| ScheduleError::Database(DatabaseError::NotFound("created schedule".to_string())))?;

        info!("Created schedule {} for doctor {}", block.id, block.doctor_id);
        Ok(block)
    }

    pub async fn get_schedule(&self, schedule_id: Uuid, auth_token: &str) -> Result<ScheduleBlock, ScheduleError> {
        debug!("Fetching schedule: {}", schedule_id);

        let path = format!("/rest/v1/schedules?id=eq.{}", schedule_id);
        self.supabase
            .select_one::<ScheduleBlock>(&path, auth_token)
            .await?
            .ok_or(ScheduleError::NotFound)
    }

    pub async fn list_schedules(
        &self,
        query: &ScheduleQuery,
        auth_token: &str,
    ) -> Result<Vec<ScheduleBlock>, ScheduleError> {
        debug!("Listing schedules with filter: {:?}", query);

        let mut filters = vec![format!("status=eq.{}", query.status.unwrap_or(ScheduleStatus::Active))];
        if let Some(doctor_id) = query.doctor_id {
            filters.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(date) = query.date {
            filters.push(format!("date=eq.{}", date));
        } else {
            if let Some(start) = query.start_date {
                filters.push(format!("date=gte.{}", start));
            }
            if let Some(end) = query.end_date {
                filters.push(format!("date=lte.{}", end));
            }
        }

        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let page = query.page.unwrap_or(1).max(1);
        filters.push("order=date.asc,start_time.asc".to_string());
        filters.push(format!("limit={}", limit));
        filters.push(format!("offset={}", (page - 1) * limit));

        let path = format!("/rest/v1/schedules?{}", filters.join("&"));
        Ok(self.supabase.select(&path, auth_token).await?)
    }

    pub async fn update_schedule(
        &self,
        schedule_id: Uuid,
        patch: UpdateScheduleRequest,
        auth_token: &str,
    ) -> Result<ScheduleBlock, ScheduleError> {
        debug!("Updating schedule: {}", schedule_id);

        let existing = self.get_schedule(schedule_id, auth_token).await?;
        let draft = draft_from_update(&existing, &patch)?;
        let status = patch.status.unwrap_or(existing.status);

        let moved = draft.date != existing.date
            || draft.range.start != existing.start_time
            || draft.range.end != existing.end_time;
        let deactivated = existing.is_active() && status != ScheduleStatus::Active;

        if (moved || deactivated) && self.has_active_appointments(schedule_id, auth_token).await? {
            warn!("Schedule {} has booked appointments; refusing update", schedule_id);
            return Err(if deactivated {
                ScheduleRejection::HasActiveAppointments
            } else {
                ScheduleRejection::BookedHoursLocked
            }
            .into());
        }

        if status == ScheduleStatus::Active {
            let others = self.get_active_blocks(draft.doctor_id, draft.date, auth_token).await?;
            if find_conflicting_block(&others, draft.doctor_id, draft.date, &draft.range, Some(schedule_id)).is_some() {
                warn!("Updated schedule {} would overlap another block", schedule_id);
                return Err(ScheduleRejection::Overlap.into());
            }
        }

        let body = json!({
            "date": draft.date,
            "start_time": draft.range.start,
            "end_time": draft.range.end,
            "slot_duration": draft.slot_duration,
            "max_patients": draft.max_patients,
            "day_of_week": day_of_week_name(draft.date),
            "location": draft.location,
            "notes": draft.notes,
            "status": status,
            "updated_at": self.clock.now().to_rfc3339(),
        });

        let path = format!("/rest/v1/schedules?id=eq.{}", schedule_id);
        let updated: Vec<ScheduleBlock> = self
            .supabase
            .update(&path, body, auth_token)
            .await
            .map_err(schedule_write_conflict)?;

        let block = updated.into_iter().next().ok_or(ScheduleError::NotFound)?;
        info!("Updated schedule {}", schedule_id);
        Ok(block)
    }

    /// Soft delete: the block is marked CANCELLED and stops offering slots.
    pub async fn cancel_schedule(&self, schedule_id: Uuid, auth_token: &str) -> Result<ScheduleBlock, ScheduleError> {
        debug!("Cancelling schedule: {}", schedule_id);

        self.get_schedule(schedule_id, auth_token).await?;
        if self.has_active_appointments(schedule_id, auth_token).await? {
            warn!("Schedule {} still has active appointments", schedule_id);
            return Err(ScheduleRejection::HasActiveAppointments.into());
        }

        let path = format!("/rest/v1/schedules?id=eq.{}", schedule_id);
        let body = json!({
            "status": ScheduleStatus::Cancelled,
            "updated_at": self.clock.now().to_rfc3339(),
        });
        let updated: Vec<ScheduleBlock> = self
            .supabase
            .update(&path, body, auth_token)
            .await
            .map_err(schedule_write_conflict)?;
        let block = updated.into_iter().next().ok_or(ScheduleError::NotFound)?;

        info!("Cancelled schedule {}", schedule_id);
        Ok(block)
    }

    /// Active blocks of a doctor on a date, earliest first.
    pub async fn get_active_blocks(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<ScheduleBlock>, ScheduleError> {
        let path = format!(
            "/rest/v1/schedules?doctor_id=eq.{}&date=eq.{}&status=eq.ACTIVE&order=start_time.asc",
            doctor_id, date
        );
        Ok(self.supabase.select(&path, auth_token).await?)
    }

    async fn booked_times(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<BookedTime>, ScheduleError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&appointment_date=eq.{}&status=in.({})&select=appointment_time",
            doctor_id, date, CAPACITY_STATUSES_FILTER
        );
        Ok(self.supabase.select(&path, auth_token).await?)
    }

    async fn has_active_appointments(&self, schedule_id: Uuid, auth_token: &str) -> Result<bool, ScheduleError> {
        let path = format!(
            "/rest/v1/appointments?schedule_id=eq.{}&status=in.({})&select=id&limit=1",
            schedule_id, CAPACITY_STATUSES_FILTER
        );
        let rows: Vec<serde_json::Value> = self.supabase.select(&path, auth_token).await?;
        Ok(!rows.is_empty())
    }

    /// Bookable slots of a doctor on a date.
    pub async fn available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<AvailableSlot>, ScheduleError> {
        debug!("Computing available slots for doctor {} on {}", doctor_id, date);

        let (blocks, booked) = futures::try_join!(
            self.get_active_blocks(doctor_id, date, auth_token),
            self.booked_times(doctor_id, date, auth_token),
        )?;

        if blocks.is_empty() {
            debug!("Doctor {} has no active schedule on {}", doctor_id, date);
            return Ok(Vec::new());
        }

        let booked = count_booked_times(booked.into_iter().map(|b| b.appointment_time));
        compute_available_slots(&blocks, &booked)
    }
}

/// A 409 on a schedule write comes either from the booking guard triggers,
/// which a booking committed between our check and the write can trip, or
/// from the exclusion constraint on overlapping active blocks.
fn schedule_write_conflict(e: DatabaseError) -> ScheduleError {
    match e {
        DatabaseError::Conflict(msg) if msg.contains(GUARD_LIVE_APPOINTMENTS) => {
            ScheduleRejection::HasActiveAppointments.into()
        }
        DatabaseError::Conflict(msg) if msg.contains(GUARD_BOOKED_HOURS) => {
            ScheduleRejection::BookedHoursLocked.into()
        }
        DatabaseError::Conflict(_) => ScheduleRejection::Overlap.into(),
        other => other.into(),
    }
}
