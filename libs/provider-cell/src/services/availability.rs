// libs/provider-cell/src/services/availability.rs
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{AvailabilityBlock, AvailabilityError, WeeklyBlockSpec};
use crate::store::{AvailabilityStore, ProviderDirectory};

pub struct AvailabilityService {
    store: Arc<dyn AvailabilityStore>,
    directory: Arc<dyn ProviderDirectory>,
}

impl AvailabilityService {
    pub fn new(store: Arc<dyn AvailabilityStore>, directory: Arc<dyn ProviderDirectory>) -> Self {
        Self { store, directory }
    }

    /// Replace a provider's weekly schedule with the submitted block set.
    ///
    /// The previous set is discarded in the same store operation; an empty
    /// set is a valid schedule (the provider stops accepting bookings).
    pub async fn set_availability(
        &self,
        provider_id: Uuid,
        specs: Vec<WeeklyBlockSpec>,
    ) -> Result<Vec<AvailabilityBlock>, AvailabilityError> {
        debug!(
            "Configuring availability for provider {}: {} blocks",
            provider_id,
            specs.len()
        );

        if !self.directory.exists(provider_id).await? {
            return Err(AvailabilityError::ProviderNotFound);
        }

        validate_block_specs(&specs)?;

        let blocks: Vec<AvailabilityBlock> = specs
            .into_iter()
            .map(|spec| AvailabilityBlock {
                id: Uuid::new_v4(),
                provider_id,
                day_of_week: spec.day_of_week,
                start_time: spec.start_time,
                end_time: spec.end_time,
                modality: spec.modality,
                is_active: true,
            })
            .collect();

        let stored = self.store.replace_for_provider(provider_id, blocks).await?;

        info!(
            "Availability for provider {} replaced with {} blocks",
            provider_id,
            stored.len()
        );
        Ok(stored)
    }

    /// Active blocks for a provider, ordered by weekday then start time.
    pub async fn get_availability(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<AvailabilityBlock>, AvailabilityError> {
        if !self.directory.exists(provider_id).await? {
            return Err(AvailabilityError::ProviderNotFound);
        }

        self.store.active_blocks_for(provider_id).await
    }
}

fn validate_block_specs(specs: &[WeeklyBlockSpec]) -> Result<(), AvailabilityError> {
    for spec in specs {
        if spec.day_of_week < 0 || spec.day_of_week > 6 {
            return Err(AvailabilityError::ValidationError(
                "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ));
        }
        if spec.start_time >= spec.end_time {
            return Err(AvailabilityError::ValidationError(
                "Start time must be before end time".to_string(),
            ));
        }
    }

    // Blocks of the same weekday and modality must not overlap; a window
    // falling inside two of them would make slot projection ambiguous.
    for (i, a) in specs.iter().enumerate() {
        for b in specs.iter().skip(i + 1) {
            if a.day_of_week == b.day_of_week
                && a.modality == b.modality
                && a.start_time < b.end_time
                && b.start_time < a.end_time
            {
                return Err(AvailabilityError::ValidationError(format!(
                    "Overlapping blocks on day {}: {}-{} and {}-{}",
                    a.day_of_week, a.start_time, a.end_time, b.start_time, b.end_time
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Modality;
    use chrono::NaiveTime;

    fn spec(day: i32, start: &str, end: &str, modality: Modality) -> WeeklyBlockSpec {
        WeeklyBlockSpec {
            day_of_week: day,
            start_time: NaiveTime::parse_from_str(start, "%H:%M").unwrap(),
            end_time: NaiveTime::parse_from_str(end, "%H:%M").unwrap(),
            modality,
        }
    }

    #[test]
    fn test_valid_specs_pass() {
        let specs = vec![
            spec(1, "09:00", "12:00", Modality::Presencial),
            spec(1, "14:00", "18:00", Modality::Presencial),
            spec(2, "09:00", "12:00", Modality::Virtual),
        ];
        assert!(validate_block_specs(&specs).is_ok());
    }

    #[test]
    fn test_inverted_time_range_rejected() {
        let specs = vec![spec(1, "12:00", "09:00", Modality::Presencial)];
        assert!(matches!(
            validate_block_specs(&specs),
            Err(AvailabilityError::ValidationError(_))
        ));
    }

    #[test]
    fn test_out_of_range_weekday_rejected() {
        let specs = vec![spec(7, "09:00", "12:00", Modality::Presencial)];
        assert!(matches!(
            validate_block_specs(&specs),
            Err(AvailabilityError::ValidationError(_))
        ));
    }

    #[test]
    fn test_same_day_same_modality_overlap_rejected() {
        let specs = vec![
            spec(1, "09:00", "12:00", Modality::Presencial),
            spec(1, "11:00", "14:00", Modality::Presencial),
        ];
        assert!(matches!(
            validate_block_specs(&specs),
            Err(AvailabilityError::ValidationError(_))
        ));
    }

    #[test]
    fn test_same_window_different_modality_allowed() {
        let specs = vec![
            spec(1, "09:00", "12:00", Modality::Presencial),
            spec(1, "09:00", "12:00", Modality::Virtual),
        ];
        assert!(validate_block_specs(&specs).is_ok());
    }

    #[test]
    fn test_back_to_back_blocks_allowed() {
        let specs = vec![
            spec(1, "09:00", "12:00", Modality::Presencial),
            spec(1, "12:00", "15:00", Modality::Presencial),
        ];
        assert!(validate_block_specs(&specs).is_ok());
    }
}
