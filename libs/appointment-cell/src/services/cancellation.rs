use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

use shared_utils::TimeOfDay;

use crate::models::AppointmentStatus;

pub fn cancellation_lead(minutes: i64) -> Duration {
    Duration::minutes(minutes)
}

/// The instant an appointment starts, reading its date and time as wall-clock
/// values at the clinic's fixed offset.
pub fn appointment_instant(date: NaiveDate, time: TimeOfDay, offset: FixedOffset) -> DateTime<Utc> {
    let local = NaiveDateTime::new(date, time.to_naive_time());
    let utc = local - Duration::seconds(i64::from(offset.local_minus_utc()));
    Utc.from_utc_datetime(&utc)
}

/// Cancellation is allowed while the appointment is not terminal and starts
/// at least `lead` after `now`. Exactly `lead` away still counts.
pub fn can_cancel(
    status: AppointmentStatus,
    date: NaiveDate,
    time: TimeOfDay,
    offset: FixedOffset,
    lead: Duration,
    now: DateTime<Utc>,
) -> bool {
    if status.is_terminal() {
        return false;
    }
    appointment_instant(date, time, offset) - now >= lead
}
