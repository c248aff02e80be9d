// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{Duration, FixedOffset, NaiveDate};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use doctor_cell::models::{CAPACITY_STATUSES_FILTER, GUARD_SCHEDULE_INACTIVE};
use doctor_cell::services::{availability::ScheduleService, doctor::DoctorService};
use shared_config::AppConfig;
use shared_database::{DatabaseError, SupabaseClient};
use shared_utils::{Clock, SystemClock, TimeOfDay};

use crate::models::{
    Appointment, AppointmentError, AppointmentQuery, AppointmentStatus, BookAppointmentRequest,
    BookingRejection, CancelAppointmentRequest, OccupiedSeat, UpdateAppointmentStatusRequest,
    DEFAULT_CANCELLATION_REASON, MAX_NOTES_LEN, MAX_REASON_LEN,
};
use crate::services::cancellation::{can_cancel, cancellation_lead};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::validation::{lowest_free_seat, validate_booking};

/// Attempts before a contended seat or status write gives up.
const MAX_WRITE_ATTEMPTS: u32 = 3;
const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

/// A booking request with every required field present and parsed.
#[derive(Debug, Clone)]
struct BookingDraft {
    patient_id: Uuid,
    doctor_id: Uuid,
    schedule_id: Uuid,
    date: NaiveDate,
    time: TimeOfDay,
    reason: String,
}

fn draft_booking(request: &BookAppointmentRequest) -> Result<BookingDraft, AppointmentError> {
    let (Some(patient_id), Some(doctor_id), Some(schedule_id), Some(date), Some(time), Some(reason)) = (
        request.patient_id,
        request.doctor_id,
        request.schedule_id,
        request.appointment_date,
        request.appointment_time.as_deref(),
        request.reason.as_deref().map(str::trim).filter(|r| !r.is_empty()),
    ) else {
        return Err(AppointmentError::ValidationError(
            "Patient, doctor, schedule, date, time, and reason are required".to_string(),
        ));
    };

    let time: TimeOfDay = time
        .parse()
        .map_err(|_| AppointmentError::ValidationError("Please use HH:MM format for appointment time".to_string()))?;

    if reason.chars().count() > MAX_REASON_LEN {
        return Err(AppointmentError::ValidationError(format!(
            "Reason cannot be more than {} characters",
            MAX_REASON_LEN
        )));
    }
    if request.notes.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTES_LEN) {
        return Err(AppointmentError::ValidationError(format!(
            "Notes cannot be more than {} characters",
            MAX_NOTES_LEN
        )));
    }
    if request.consultation_fee.is_some_and(|fee| fee < 0.0) {
        return Err(AppointmentError::ValidationError("Fee cannot be negative".to_string()));
    }

    Ok(BookingDraft {
        patient_id,
        doctor_id,
        schedule_id,
        date,
        time,
        reason: reason.to_string(),
    })
}

pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    doctors: DoctorService,
    schedules: ScheduleService,
    lifecycle_service: AppointmentLifecycleService,
    clock: Arc<dyn Clock>,
    clinic_offset: FixedOffset,
    cancellation_lead: Duration,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            doctors: DoctorService::new(config),
            schedules: ScheduleService::with_clock(config, Arc::clone(&clock)),
            lifecycle_service: AppointmentLifecycleService::new(),
            clock,
            clinic_offset: config.clinic_offset(),
            cancellation_lead: cancellation_lead(config.cancellation_lead_minutes),
        }
    }

    /// Books an appointment if its slot still has room.
    ///
    /// Every live appointment holds a seat numbered below the block's
    /// `max_patients`, and the store keeps (doctor, date, time, seat) unique
    /// among live appointments. Two bookers racing for the last seat cannot
    /// both insert it; the loser gets a conflict, re-reads and is refused
    /// once the slot is full. A store trigger also refuses the insert once
    /// the block has left ACTIVE, so a concurrent schedule cancel cannot
    /// leave this booking behind on a dead block.
    #[instrument(skip(self, request, auth_token))]
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        created_by: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let draft = draft_booking(&request)?;
        debug!(
            "Booking patient {} with doctor {} at {} {}",
            draft.patient_id, draft.doctor_id, draft.date, draft.time
        );

        let (_, doctor, schedule) = futures::try_join!(
            self.ensure_patient_exists(draft.patient_id, auth_token),
            async { Ok::<_, AppointmentError>(self.doctors.get_doctor(draft.doctor_id, auth_token).await?) },
            async { Ok::<_, AppointmentError>(self.schedules.get_schedule(draft.schedule_id, auth_token).await?) },
        )?;

        if schedule.doctor_id != draft.doctor_id {
            warn!("Schedule {} belongs to doctor {}", schedule.id, schedule.doctor_id);
            return Err(BookingRejection::DoctorMismatch.into());
        }

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let occupied = self
                .occupied_seats(draft.doctor_id, draft.date, draft.time, auth_token)
                .await?;

            if let Err(e) = validate_booking(&schedule, draft.date, draft.time, occupied.len() as u32) {
                warn!("Booking refused: {}", e);
                return Err(e);
            }

            let seat = lowest_free_seat(&occupied, schedule.max_patients)
                .ok_or(AppointmentError::Rejected(BookingRejection::SlotFullyBooked))?;

            let now = self.clock.now().to_rfc3339();
            let body = json!({
                "patient_id": draft.patient_id,
                "doctor_id": draft.doctor_id,
                "schedule_id": draft.schedule_id,
                "appointment_date": draft.date,
                "appointment_time": draft.time,
                "duration": schedule.slot_duration,
                "reason": draft.reason,
                "symptoms": request.symptoms.clone().unwrap_or_default(),
                "priority": request.priority.unwrap_or_default(),
                "appointment_type": request.appointment_type.unwrap_or_default(),
                "status": AppointmentStatus::Scheduled,
                "consultation_fee": request.consultation_fee.unwrap_or(doctor.consultation_fee),
                "payment_status": "PENDING",
                "seat": seat,
                "notes": request.notes,
                "created_by": created_by,
                "created_at": now,
                "updated_at": now,
            });

            match self.supabase.insert::<Appointment>("/rest/v1/appointments", body, auth_token).await {
                Ok(rows) => {
                    let appointment = rows.into_iter().next().ok_or_else(|| {
                        AppointmentError::Database(DatabaseError::NotFound("created appointment".to_string()))
                    })?;
                    info!(
                        "Booked appointment {} (seat {}) for doctor {} at {} {}",
                        appointment.id, seat, draft.doctor_id, draft.date, draft.time
                    );
                    return Ok(appointment);
                }
                Err(DatabaseError::Conflict(msg)) if msg.contains(GUARD_SCHEDULE_INACTIVE) => {
                    warn!("Schedule {} was deactivated before the booking landed", draft.schedule_id);
                    return Err(BookingRejection::ScheduleNotActive.into());
                }
                Err(DatabaseError::Conflict(msg)) => {
                    warn!("Seat {} taken concurrently (attempt {}): {}", seat, attempt, msg);
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!("Giving up on booking after {} contended attempts", MAX_WRITE_ATTEMPTS);
        Err(AppointmentError::ConcurrentModification)
    }

    pub async fn get_appointment(&self, appointment_id: Uuid, auth_token: &str) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        self.supabase
            .select_one::<Appointment>(&path, auth_token)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    pub async fn list_appointments(
        &self,
        query: &AppointmentQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Listing appointments with filter: {:?}", query);

        let mut filters = Vec::new();
        if let Some(patient_id) = query.patient_id {
            filters.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(doctor_id) = query.doctor_id {
            filters.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(status) = query.status {
            filters.push(format!("status=eq.{}", status));
        }
        if let Some(date) = query.date {
            filters.push(format!("appointment_date=eq.{}", date));
        } else {
            if let Some(start) = query.start_date {
                filters.push(format!("appointment_date=gte.{}", start));
            }
            if let Some(end) = query.end_date {
                filters.push(format!("appointment_date=lte.{}", end));
            }
        }

        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let page = query.page.unwrap_or(1).max(1);
        filters.push("order=appointment_date.asc,appointment_time.asc".to_string());
        filters.push(format!("limit={}", limit));
        filters.push(format!("offset={}", (page - 1) * limit));

        let path = format!("/rest/v1/appointments?{}", filters.join("&"));
        Ok(self.supabase.select(&path, auth_token).await?)
    }

    /// Advances the status along the lifecycle. The write only applies if the
    /// status is still the one that was validated.
    #[instrument(skip(self, request, auth_token))]
    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentStatusRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if request.notes.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTES_LEN) {
            return Err(AppointmentError::ValidationError(format!(
                "Notes cannot be more than {} characters",
                MAX_NOTES_LEN
            )));
        }

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let current = self.get_appointment(appointment_id, auth_token).await?;
            self.lifecycle_service
                .validate_status_transition(current.status, request.status)?;

            let mut body = json!({
                "status": request.status,
                "updated_at": self.clock.now().to_rfc3339(),
            });
            if let Some(notes) = &request.notes {
                body["notes"] = Value::String(notes.clone());
            }

            if let Some(updated) = self
                .conditional_update(appointment_id, current.status, body, auth_token)
                .await?
            {
                info!("Appointment {} moved from {} to {}", appointment_id, current.status, request.status);
                return Ok(updated);
            }
            warn!("Appointment {} changed during status update (attempt {})", appointment_id, attempt);
        }

        Err(AppointmentError::ConcurrentModification)
    }

    /// Cancels an appointment if the cancellation window is still open.
    ///
    /// The write is conditional on the status read before the policy check,
    /// so of two concurrent cancellations only one matches a row. The other
    /// re-reads, finds CANCELLED and is refused by the policy.
    #[instrument(skip(self, request, auth_token))]
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
        cancelled_by: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let reason = request
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_CANCELLATION_REASON.to_string());
        if reason.chars().count() > MAX_REASON_LEN {
            return Err(AppointmentError::ValidationError(format!(
                "Cancellation reason cannot be more than {} characters",
                MAX_REASON_LEN
            )));
        }

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let current = self.get_appointment(appointment_id, auth_token).await?;
            let now = self.clock.now();

            if !can_cancel(
                current.status,
                current.appointment_date,
                current.appointment_time,
                self.clinic_offset,
                self.cancellation_lead,
                now,
            ) {
                warn!("Appointment {} ({}) is not cancellable at {}", appointment_id, current.status, now);
                return Err(AppointmentError::NotCancellable {
                    lead_minutes: self.cancellation_lead.num_minutes(),
                });
            }

            let body = json!({
                "status": AppointmentStatus::Cancelled,
                "cancelled_by": cancelled_by,
                "cancellation_reason": reason,
                "cancelled_at": now.to_rfc3339(),
                "updated_at": now.to_rfc3339(),
            });

            if let Some(cancelled) = self
                .conditional_update(appointment_id, current.status, body, auth_token)
                .await?
            {
                info!("Cancelled appointment {} by {}", appointment_id, cancelled_by);
                return Ok(cancelled);
            }
            warn!("Appointment {} changed during cancellation (attempt {})", appointment_id, attempt);
        }

        Err(AppointmentError::ConcurrentModification)
    }

    /// PATCH that only matches while the row still has `expected` status.
    /// `None` means another writer got there first.
    async fn conditional_update(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        body: Value,
        auth_token: &str,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}&status=eq.{}", appointment_id, expected);
        let rows: Vec<Appointment> = self.supabase.update(&path, body, auth_token).await?;
        Ok(rows.into_iter().next())
    }

    async fn occupied_seats(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: TimeOfDay,
        auth_token: &str,
    ) -> Result<Vec<u8>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&appointment_date=eq.{}&appointment_time=eq.{}&status=in.({})&select=seat",
            doctor_id, date, time, CAPACITY_STATUSES_FILTER
        );
        let rows: Vec<OccupiedSeat> = self.supabase.select(&path, auth_token).await?;
        Ok(rows.into_iter().map(|r| r.seat).collect())
    }

    async fn ensure_patient_exists(&self, patient_id: Uuid, auth_token: &str) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/patients?id=eq.{}&select=id", patient_id);
        let patient: Option<Value> = self.supabase.select_one(&path, auth_token).await?;
        patient.map(|_| ()).ok_or(AppointmentError::PatientNotFound)
    }
}
