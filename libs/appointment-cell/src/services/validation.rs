// libs/appointment-cell/src/services/validation.rs
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use provider_cell::models::Modality;
use provider_cell::store::AvailabilityStore;

use crate::models::{AppointmentError, BookingPolicy};
use crate::services::conflict::ConflictDetectionService;
use crate::services::slots::day_of_week_index;
use crate::store::AppointmentStore;

/// Which check a requested slot failed. Ordered exactly as the checks run;
/// the first failure wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRejection {
    StartNotInFuture,
    DurationOutOfRange,
    OutsideAvailability,
    Conflict,
}

impl SlotRejection {
    pub fn into_error(self, policy: &BookingPolicy) -> AppointmentError {
        match self {
            SlotRejection::StartNotInFuture => AppointmentError::InvalidTime(
                "Appointment must be scheduled for a future time".to_string(),
            ),
            SlotRejection::DurationOutOfRange => AppointmentError::ValidationError(format!(
                "Duration must be between {} and {} minutes",
                policy.min_duration_minutes, policy.max_duration_minutes
            )),
            SlotRejection::OutsideAvailability => AppointmentError::ValidationError(
                "Requested time is outside the provider's availability".to_string(),
            ),
            SlotRejection::Conflict => AppointmentError::ConflictDetected,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SlotValidation {
    pub eligible: bool,
    pub rejection: Option<SlotRejection>,
    /// Modality of the matched availability block, reported when the caller
    /// did not filter by modality so it can confirm consistency.
    pub matched_modality: Option<Modality>,
}

impl SlotValidation {
    fn rejected(rejection: SlotRejection) -> Self {
        Self {
            eligible: false,
            rejection: Some(rejection),
            matched_modality: None,
        }
    }

    fn eligible(matched_modality: Modality) -> Self {
        Self {
            eligible: true,
            rejection: None,
            matched_modality: Some(matched_modality),
        }
    }
}

/// Pre-flight checks for one requested (provider, start, duration,
/// modality). Checks run in a fixed order and short-circuit on the first
/// failure: future start, duration bounds, availability containment,
/// booking conflicts.
pub struct BookingValidator {
    availability: Arc<dyn AvailabilityStore>,
    conflicts: ConflictDetectionService,
    policy: BookingPolicy,
}

impl BookingValidator {
    pub fn new(
        availability: Arc<dyn AvailabilityStore>,
        appointments: Arc<dyn AppointmentStore>,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            availability,
            conflicts: ConflictDetectionService::new(appointments),
            policy,
        }
    }

    pub async fn validate(
        &self,
        provider_id: Uuid,
        start_time: DateTime<Utc>,
        duration_minutes: i32,
        modality: Option<Modality>,
        now: DateTime<Utc>,
    ) -> Result<SlotValidation, AppointmentError> {
        debug!(
            "Validating slot for provider {} at {} ({} min)",
            provider_id, start_time, duration_minutes
        );

        if start_time <= now {
            return Ok(SlotValidation::rejected(SlotRejection::StartNotInFuture));
        }

        if duration_minutes < self.policy.min_duration_minutes
            || duration_minutes > self.policy.max_duration_minutes
        {
            return Ok(SlotValidation::rejected(SlotRejection::DurationOutOfRange));
        }

        let end_time = start_time + Duration::minutes(duration_minutes as i64);

        // Blocks are time-of-day windows within one calendar day, so a
        // window crossing midnight can never be contained in one.
        let matched = if end_time.date_naive() == start_time.date_naive() {
            let day_of_week = day_of_week_index(start_time.date_naive());
            let blocks = self.availability.active_blocks_for(provider_id).await?;
            blocks.into_iter().find(|block| {
                block.day_of_week == day_of_week
                    && modality.map_or(true, |m| block.modality == m)
                    && block.contains_window(start_time.time(), end_time.time())
            })
        } else {
            None
        };

        let matched = match matched {
            Some(block) => block,
            None => return Ok(SlotValidation::rejected(SlotRejection::OutsideAvailability)),
        };

        if self
            .conflicts
            .has_conflict(provider_id, start_time, end_time, None)
            .await?
        {
            return Ok(SlotValidation::rejected(SlotRejection::Conflict));
        }

        Ok(SlotValidation::eligible(matched.modality))
    }
}
