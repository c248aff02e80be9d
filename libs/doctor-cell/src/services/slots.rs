use std::collections::HashMap;

use chrono::NaiveDate;
use uuid::Uuid;

use shared_utils::TimeOfDay;

use crate::models::{AvailableSlot, ScheduleBlock, ScheduleError, TimeRange};

/// Count of capacity-holding appointments per start time, for one doctor and date.
pub type BookedTimes = HashMap<TimeOfDay, u32>;

pub fn count_booked_times<I>(times: I) -> BookedTimes
where
    I: IntoIterator<Item = TimeOfDay>,
{
    let mut booked = BookedTimes::new();
    for time in times {
        *booked.entry(time).or_insert(0) += 1;
    }
    booked
}

/// Lists every bookable slot across the given blocks, in block order and then
/// ascending time within each block.
///
/// A block advertises one slot every `slot_duration` minutes starting at its
/// start time, as long as the slot starts before the end time. A slot is only
/// listed while it still has room, with `available_spots` being what is left.
/// Blocks that are not active contribute nothing.
///
/// Blocks whose capacity or duration is zero, or whose end does not follow the
/// start, are rejected instead of silently producing no slots.
pub fn compute_available_slots(
    blocks: &[ScheduleBlock],
    booked: &BookedTimes,
) -> Result<Vec<AvailableSlot>, ScheduleError> {
    let mut slots = Vec::new();

    for block in blocks.iter().filter(|b| b.is_active()) {
        let range = block.range()?;
        if block.slot_duration == 0 {
            return Err(ScheduleError::InvalidSlotConfig(format!(
                "schedule {} has a zero slot duration", block.id
            )));
        }
        if block.max_patients == 0 {
            return Err(ScheduleError::InvalidSlotConfig(format!(
                "schedule {} has zero capacity per slot", block.id
            )));
        }

        let step = u32::from(block.slot_duration);
        let mut minute = range.start.minutes();
        while minute < range.end.minutes() {
            let time = TimeOfDay::from_minutes(minute)
                .map_err(|e| ScheduleError::InvalidRange(e.to_string()))?;
            let taken = booked.get(&time).copied().unwrap_or(0);
            let capacity = u32::from(block.max_patients);

            if taken < capacity {
                slots.push(AvailableSlot {
                    time,
                    schedule_id: block.id,
                    // taken < capacity <= u8::MAX
                    available_spots: (capacity - taken) as u8,
                    max_patients: block.max_patients,
                });
            }
            minute += step;
        }
    }

    Ok(slots)
}

/// First active block of the same doctor and date whose hours overlap `range`.
pub fn find_conflicting_block<'a>(
    existing: &'a [ScheduleBlock],
    doctor_id: Uuid,
    date: NaiveDate,
    range: &TimeRange,
    exclude_id: Option<Uuid>,
) -> Option<&'a ScheduleBlock> {
    existing.iter().find(|block| {
        block.is_active()
            && block.doctor_id == doctor_id
            && block.date == date
            && Some(block.id) != exclude_id
            && block.range().map(|r| r.overlaps(range)).unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScheduleStatus;
    use assert_matches::assert_matches;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn block(start: &str, end: &str, duration: u16, max_patients: u8) -> ScheduleBlock {
        ScheduleBlock {
            id: Uuid::new_v4(),
            doctor_id: Uuid::nil(),
            date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            start_time: t(start),
            end_time: t(end),
            slot_duration: duration,
            max_patients,
            status: ScheduleStatus::Active,
            is_recurring: false,
            recurring_type: None,
            recurring_end_date: None,
            day_of_week: Some("MONDAY".to_string()),
            location: None,
            notes: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn times(slots: &[AvailableSlot]) -> Vec<String> {
        slots.iter().map(|s| s.time.to_string()).collect()
    }

    #[test]
    fn test_morning_block_lists_every_half_hour() {
        let blocks = vec![block("09:00", "11:00", 30, 1)];
        let slots = compute_available_slots(&blocks, &BookedTimes::new()).unwrap();

        assert_eq!(times(&slots), vec!["09:00", "09:30", "10:00", "10:30"]);
        assert!(slots.iter().all(|s| s.available_spots == 1 && s.max_patients == 1));
        assert!(slots.iter().all(|s| s.schedule_id == blocks[0].id));
    }

    #[test]
    fn test_full_slot_is_hidden() {
        let blocks = vec![block("09:00", "11:00", 30, 1)];
        let booked = count_booked_times([t("09:30")]);
        let slots = compute_available_slots(&blocks, &booked).unwrap();

        assert_eq!(times(&slots), vec!["09:00", "10:00", "10:30"]);
    }

    #[test]
    fn test_partial_booking_reduces_spots() {
        let blocks = vec![block("14:00", "15:00", 60, 3)];
        let booked = count_booked_times([t("14:00"), t("14:00")]);
        let slots = compute_available_slots(&blocks, &booked).unwrap();

        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].available_spots, 1);
        assert_eq!(slots[0].max_patients, 3);
    }

    #[test]
    fn test_uneven_span_drops_trailing_minutes() {
        let blocks = vec![block("09:00", "10:00", 45, 1)];
        let slots = compute_available_slots(&blocks, &BookedTimes::new()).unwrap();

        // 09:45 still starts before 10:00, so it is listed
        assert_eq!(times(&slots), vec!["09:00", "09:45"]);
        assert_eq!(blocks[0].total_slots(), 1);
    }

    #[test]
    fn test_multiple_blocks_keep_block_order() {
        let blocks = vec![block("14:00", "15:00", 30, 1), block("09:00", "10:00", 30, 1)];
        let slots = compute_available_slots(&blocks, &BookedTimes::new()).unwrap();

        assert_eq!(times(&slots), vec!["14:00", "14:30", "09:00", "09:30"]);
    }

    #[test]
    fn test_slots_never_reach_end_time_and_stay_in_bounds() {
        let blocks = vec![block("08:15", "12:40", 20, 4)];
        let booked = count_booked_times([t("08:35"), t("10:15"), t("10:15")]);
        let slots = compute_available_slots(&blocks, &booked).unwrap();

        for slot in &slots {
            assert!(slot.time >= blocks[0].start_time && slot.time < blocks[0].end_time);
            assert!(slot.available_spots >= 1 && slot.available_spots <= slot.max_patients);
            let offset = slot.time.minutes() - blocks[0].start_time.minutes();
            assert_eq!(offset % 20, 0);
        }
        let mut sorted = slots.clone();
        sorted.sort_by_key(|s| s.time);
        assert_eq!(sorted, slots);
    }

    #[test]
    fn test_inactive_block_contributes_nothing() {
        let mut cancelled = block("09:00", "10:00", 30, 1);
        cancelled.status = ScheduleStatus::Cancelled;
        let slots = compute_available_slots(&[cancelled], &BookedTimes::new()).unwrap();
        assert!(slots.is_empty());
    }

    #[test]
    fn test_broken_blocks_are_rejected() {
        let inverted = block("11:00", "09:00", 30, 1);
        assert_matches!(
            compute_available_slots(&[inverted], &BookedTimes::new()),
            Err(ScheduleError::InvalidRange(_))
        );

        let zero_capacity = block("09:00", "10:00", 30, 0);
        assert_matches!(
            compute_available_slots(&[zero_capacity], &BookedTimes::new()),
            Err(ScheduleError::InvalidSlotConfig(_))
        );

        let zero_duration = block("09:00", "10:00", 0, 1);
        assert_matches!(
            compute_available_slots(&[zero_duration], &BookedTimes::new()),
            Err(ScheduleError::InvalidSlotConfig(_))
        );
    }

    #[test]
    fn test_adjacent_blocks_do_not_conflict() {
        let existing = vec![block("09:00", "12:00", 30, 1)];
        let date = existing[0].date;

        let adjacent = TimeRange::new(t("12:00"), t("14:00")).unwrap();
        assert!(find_conflicting_block(&existing, Uuid::nil(), date, &adjacent, None).is_none());

        let overlapping = TimeRange::new(t("11:30"), t("13:00")).unwrap();
        let hit = find_conflicting_block(&existing, Uuid::nil(), date, &overlapping, None);
        assert_eq!(hit.map(|b| b.id), Some(existing[0].id));
    }

    #[test]
    fn test_conflict_ignores_self_and_other_doctors() {
        let existing = vec![block("09:00", "12:00", 30, 1)];
        let date = existing[0].date;
        let range = TimeRange::new(t("10:00"), t("11:00")).unwrap();

        assert!(find_conflicting_block(&existing, Uuid::nil(), date, &range, Some(existing[0].id)).is_none());
        assert!(find_conflicting_block(&existing, Uuid::new_v4(), date, &range, None).is_none());
    }
}
