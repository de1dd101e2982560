// libs/appointment-cell/src/services/slots.rs
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use provider_cell::models::{AvailabilityBlock, Modality};
use provider_cell::store::AvailabilityStore;

use crate::models::{Appointment, AppointmentError, TimeSlot};
use crate::services::conflict::overlaps;
use crate::store::AppointmentStore;

/// Weekday index used across the schedule tables (0 = Sunday, 1 = Monday, etc.)
pub fn day_of_week_index(date: NaiveDate) -> i32 {
    match date.weekday() {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}

/// Projects a provider's weekly availability onto a concrete date range.
///
/// Reads stored state, never mutates it: calling twice with no intervening
/// writes yields identical slot lists.
pub struct SlotProjectionService {
    availability: Arc<dyn AvailabilityStore>,
    appointments: Arc<dyn AppointmentStore>,
}

impl SlotProjectionService {
    pub fn new(
        availability: Arc<dyn AvailabilityStore>,
        appointments: Arc<dyn AppointmentStore>,
    ) -> Self {
        Self {
            availability,
            appointments,
        }
    }

    /// Candidate slots for every date in `[range_start, range_end]`
    /// (inclusive), ordered by start time. Slots overlapping a booked
    /// appointment are emitted with `is_available = false`; slots that have
    /// already started are omitted entirely.
    pub async fn project(
        &self,
        provider_id: Uuid,
        range_start: NaiveDate,
        range_end: NaiveDate,
        modality: Option<Modality>,
        slot_duration_minutes: i32,
        now: DateTime<Utc>,
    ) -> Result<Vec<TimeSlot>, AppointmentError> {
        debug!(
            "Projecting slots for provider {} from {} to {}",
            provider_id, range_start, range_end
        );

        let blocks = self.availability.active_blocks_for(provider_id).await?;
        if blocks.is_empty() {
            return Ok(vec![]);
        }

        let window_start = range_start.and_time(NaiveTime::MIN).and_utc();
        let window_end = (range_end + Duration::days(1)).and_time(NaiveTime::MIN).and_utc();
        let booked = self
            .appointments
            .for_provider_in_range(provider_id, window_start, window_end)
            .await?;

        let mut slots = Vec::new();
        let mut date = range_start;
        while date <= range_end {
            slots.extend(project_day_slots(
                &blocks,
                &booked,
                date,
                modality,
                slot_duration_minutes,
                now,
            ));
            date += Duration::days(1);
        }

        slots.sort_by_key(|slot| slot.start_time);
        debug!("Projected {} slots", slots.len());
        Ok(slots)
    }
}

/// Slot projection for a single calendar date over pre-fetched state.
///
/// Walks each matching block from its start in steps of the slot duration,
/// emitting a slot only while the full window fits inside the block.
pub fn project_day_slots(
    blocks: &[AvailabilityBlock],
    booked: &[Appointment],
    date: NaiveDate,
    modality: Option<Modality>,
    slot_duration_minutes: i32,
    now: DateTime<Utc>,
) -> Vec<TimeSlot> {
    let day_of_week = day_of_week_index(date);
    let step = Duration::minutes(slot_duration_minutes as i64);
    let mut slots = Vec::new();

    let matching = blocks.iter().filter(|block| {
        block.is_active
            && block.day_of_week == day_of_week
            && modality.map_or(true, |m| block.modality == m)
    });

    for block in matching {
        let block_end = date.and_time(block.end_time).and_utc();
        let mut slot_start = date.and_time(block.start_time).and_utc();

        while slot_start + step <= block_end {
            let slot_end = slot_start + step;

            if slot_start > now {
                let is_available = !booked.iter().any(|apt| {
                    overlaps(
                        slot_start,
                        slot_end,
                        apt.scheduled_start_time,
                        apt.scheduled_end_time(),
                    )
                });

                slots.push(TimeSlot {
                    start_time: slot_start,
                    end_time: slot_end,
                    modality: block.modality,
                    is_available,
                });
            }

            slot_start = slot_end;
        }
    }

    slots
}
