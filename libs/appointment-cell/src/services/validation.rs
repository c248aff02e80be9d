use chrono::NaiveDate;

use doctor_cell::models::ScheduleBlock;
use shared_utils::TimeOfDay;

use crate::models::{AppointmentError, BookingRejection};

/// Decides whether a booking at `time` on `date` fits `block`, given how many
/// capacity-holding appointments already exist at that doctor, date and time.
///
/// Checks run in a fixed order and stop at the first failure: the block must
/// be active, on the same calendar day, cover the time, and still have room.
/// A refusal comes back as `AppointmentError::Rejected`. A block whose end
/// does not follow its start is a data fault and yields `InvalidRange`.
pub fn validate_booking(
    block: &ScheduleBlock,
    date: NaiveDate,
    time: TimeOfDay,
    current_count: u32,
) -> Result<(), AppointmentError> {
    if !block.is_active() {
        return Err(BookingRejection::ScheduleNotActive.into());
    }

    if block.date != date {
        return Err(BookingRejection::DateMismatch.into());
    }

    let range = block
        .range()
        .map_err(|e| AppointmentError::InvalidRange(e.to_string()))?;
    if !range.contains(time) {
        return Err(BookingRejection::OutsideScheduleHours.into());
    }

    if current_count >= u32::from(block.max_patients) {
        return Err(BookingRejection::SlotFullyBooked.into());
    }

    Ok(())
}

/// Lowest seat in `0..max_patients` not in `occupied`.
pub fn lowest_free_seat(occupied: &[u8], max_patients: u8) -> Option<u8> {
    (0..max_patients).find(|seat| !occupied.contains(seat))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use doctor_cell::models::ScheduleStatus;
    use uuid::Uuid;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    fn block(max_patients: u8) -> ScheduleBlock {
        ScheduleBlock {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            date: date(),
            start_time: t("08:00"),
            end_time: t("12:00"),
            slot_duration: 30,
            max_patients,
            status: ScheduleStatus::Active,
            is_recurring: false,
            recurring_type: None,
            recurring_end_date: None,
            day_of_week: None,
            location: None,
            notes: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_admissible_booking() {
        assert!(validate_booking(&block(1), date(), t("08:00"), 0).is_ok());
        assert!(validate_booking(&block(1), date(), t("11:59"), 0).is_ok());
    }

    #[test]
    fn test_inactive_block_checked_first() {
        let mut b = block(1);
        b.status = ScheduleStatus::Cancelled;
        // wrong date and full as well, but the status wins
        let other_day = NaiveDate::from_ymd_opt(2024, 6, 11).unwrap();
        assert_matches!(
            validate_booking(&b, other_day, t("07:00"), 5),
            Err(AppointmentError::Rejected(BookingRejection::ScheduleNotActive))
        );
    }

    #[test]
    fn test_date_mismatch() {
        let other_day = NaiveDate::from_ymd_opt(2024, 6, 11).unwrap();
        assert_matches!(
            validate_booking(&block(1), other_day, t("09:00"), 0),
            Err(AppointmentError::Rejected(BookingRejection::DateMismatch))
        );
    }

    #[test]
    fn test_end_time_is_exclusive() {
        assert_matches!(
            validate_booking(&block(1), date(), t("12:00"), 0),
            Err(AppointmentError::Rejected(BookingRejection::OutsideScheduleHours))
        );
        assert_matches!(
            validate_booking(&block(1), date(), t("07:59"), 0),
            Err(AppointmentError::Rejected(BookingRejection::OutsideScheduleHours))
        );
    }

    #[test]
    fn test_capacity_counts_only_live_bookings() {
        // two live bookings fill a two-patient slot
        assert_matches!(
            validate_booking(&block(2), date(), t("09:00"), 2),
            Err(AppointmentError::Rejected(BookingRejection::SlotFullyBooked))
        );
        // one of them cancelled leaves one live booking
        assert!(validate_booking(&block(2), date(), t("09:00"), 1).is_ok());
    }

    #[test]
    fn test_inverted_block_is_a_fault() {
        let mut b = block(1);
        std::mem::swap(&mut b.start_time, &mut b.end_time);
        assert_matches!(
            validate_booking(&b, date(), t("09:00"), 0),
            Err(AppointmentError::InvalidRange(_))
        );
    }

    #[test]
    fn test_lowest_free_seat() {
        assert_eq!(lowest_free_seat(&[], 3), Some(0));
        assert_eq!(lowest_free_seat(&[0, 2], 3), Some(1));
        assert_eq!(lowest_free_seat(&[1, 0, 2], 3), None);
    }
}
