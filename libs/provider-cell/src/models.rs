// libs/provider-cell/src/models.rs
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// AVAILABILITY MODELS
// ==============================================================================

/// Delivery mode of a consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Presencial,
    Virtual,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::Presencial => write!(f, "presencial"),
            Modality::Virtual => write!(f, "virtual"),
        }
    }
}

/// A weekly recurring window in which a provider accepts appointments of a
/// given modality. Times are time-of-day in UTC; `start_time < end_time`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityBlock {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub day_of_week: i32, // 0 = Sunday, 1 = Monday, etc.
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub modality: Modality,
    pub is_active: bool,
}

impl AvailabilityBlock {
    /// Whether a same-weekday time-of-day window fits entirely inside this
    /// block. Half-open on the right: a window ending exactly at `end_time`
    /// still fits.
    pub fn contains_window(&self, start: NaiveTime, end: NaiveTime) -> bool {
        start >= self.start_time && end <= self.end_time
    }
}

/// One block of a provider's weekly schedule as submitted on
/// reconfiguration. The full set replaces whatever was stored before.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyBlockSpec {
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub modality: Modality,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum AvailabilityError {
    #[error("Provider not found")]
    ProviderNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
