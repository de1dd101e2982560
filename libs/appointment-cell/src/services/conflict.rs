// libs/appointment-cell/src/services/conflict.rs
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError};
use crate::store::AppointmentStore;

/// Half-open interval intersection: [a_start, a_end) and [b_start, b_end)
/// share at least one instant. Back-to-back intervals do not overlap.
pub fn overlaps<T: PartialOrd>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start < b_end && b_start < a_end
}

pub struct ConflictDetectionService {
    store: Arc<dyn AppointmentStore>,
}

impl ConflictDetectionService {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    /// Calendar-blocking appointments of the provider that overlap the
    /// window. Each candidate is compared using its own stored duration.
    pub async fn conflicting_appointments(
        &self,
        provider_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!(
            "Checking conflicts for provider {} from {} to {}",
            provider_id, start_time, end_time
        );

        let candidates = self
            .store
            .for_provider_in_range(provider_id, start_time, end_time)
            .await?;

        let conflicting: Vec<Appointment> = candidates
            .into_iter()
            .filter(|apt| Some(apt.id) != exclude_appointment_id)
            .filter(|apt| {
                overlaps(
                    start_time,
                    end_time,
                    apt.scheduled_start_time,
                    apt.scheduled_end_time(),
                )
            })
            .collect();

        if !conflicting.is_empty() {
            warn!(
                "Conflict detected for provider {} - {} conflicting appointments",
                provider_id,
                conflicting.len()
            );
        }

        Ok(conflicting)
    }

    pub async fn has_conflict(
        &self,
        provider_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<bool, AppointmentError> {
        let conflicting = self
            .conflicting_appointments(provider_id, start_time, end_time, exclude_appointment_id)
            .await?;
        Ok(!conflicting.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_intersecting_intervals_overlap() {
        assert!(overlaps(at(9, 0), at(10, 0), at(9, 30), at(10, 30)));
        assert!(overlaps(at(9, 30), at(10, 30), at(9, 0), at(10, 0)));
    }

    #[test]
    fn test_contained_interval_overlaps() {
        assert!(overlaps(at(9, 0), at(12, 0), at(10, 0), at(10, 30)));
        assert!(overlaps(at(10, 0), at(10, 30), at(9, 0), at(12, 0)));
    }

    #[test]
    fn test_identical_intervals_overlap() {
        assert!(overlaps(at(9, 0), at(9, 30), at(9, 0), at(9, 30)));
    }

    #[test]
    fn test_back_to_back_intervals_do_not_overlap() {
        assert!(!overlaps(at(9, 0), at(9, 30), at(9, 30), at(10, 0)));
        assert!(!overlaps(at(9, 30), at(10, 0), at(9, 0), at(9, 30)));
    }

    #[test]
    fn test_disjoint_intervals_do_not_overlap() {
        assert!(!overlaps(at(9, 0), at(9, 30), at(11, 0), at(11, 30)));
    }
}
