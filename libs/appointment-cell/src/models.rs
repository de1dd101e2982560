// libs/appointment-cell/src/models.rs
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use provider_cell::models::{AvailabilityError, Modality};
use shared_models::ActorIdentity;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    pub scheduled_start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub modality: Modality,
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Scheduled end based on the appointment's own persisted duration.
    /// Every overlap check goes through this, never a default duration.
    pub fn scheduled_end_time(&self) -> DateTime<Utc> {
        self.scheduled_start_time + Duration::minutes(self.duration_minutes as i64)
    }

    /// Whether this appointment still holds its time window on the
    /// provider's calendar.
    pub fn blocks_calendar(&self) -> bool {
        self.status != AppointmentStatus::Cancelada
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Agendada,
    Confirmada,
    Completada,
    Cancelada,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completada | AppointmentStatus::Cancelada)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Agendada => write!(f, "agendada"),
            AppointmentStatus::Confirmada => write!(f, "confirmada"),
            AppointmentStatus::Completada => write!(f, "completada"),
            AppointmentStatus::Cancelada => write!(f, "cancelada"),
        }
    }
}

/// A candidate bookable window derived from a provider's availability.
/// Never persisted; produced only by slot projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub modality: Modality,
    pub is_available: bool,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    pub scheduled_start_time: DateTime<Utc>,
    pub modality: Modality,
    pub duration_minutes: i32,
    pub reason: Option<String>,
}

/// Booking result. `confirmation_sent` records the best-effort notification
/// outcome; a failed send never fails the booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookedAppointment {
    pub appointment: Appointment,
    pub confirmation_sent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityQuery {
    pub range_start: NaiveDate,
    pub range_end: NaiveDate,
    pub modality: Option<Modality>,
    pub slot_duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentSearchQuery {
    pub patient_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

// ==============================================================================
// AUTHORIZATION CAPABILITIES
// ==============================================================================

/// Capability set consumed by the lifecycle state machine. Resolved once per
/// operation from the acting identity and the loaded appointment, so the
/// transition rules never inspect roles or ids themselves.
#[derive(Debug, Clone, Copy)]
pub struct TransitionCapabilities {
    pub is_admin: bool,
    pub is_owning_patient: bool,
    pub is_associated_provider: bool,
}

impl TransitionCapabilities {
    pub fn resolve(actor: &ActorIdentity, appointment: &Appointment) -> Self {
        Self {
            is_admin: actor.is_admin,
            is_owning_patient: actor.user_id == appointment.patient_id,
            is_associated_provider: actor.user_id == appointment.provider_id,
        }
    }
}

// ==============================================================================
// BOOKING POLICY
// ==============================================================================

#[derive(Debug, Clone)]
pub struct BookingPolicy {
    pub min_duration_minutes: i32,
    pub max_duration_minutes: i32,
    pub default_slot_minutes: i32,
    pub max_range_days: i64,
    pub cancellation_notice_hours: i64,
    pub alternative_search_days: i64,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            min_duration_minutes: 1,
            max_duration_minutes: 240,
            default_slot_minutes: 30,
            max_range_days: 30,            // Availability queries span at most a month
            cancellation_notice_hours: 24, // Must cancel more than 24 hours ahead
            alternative_search_days: 3,
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Provider not found")]
    ProviderNotFound,

    #[error("Invalid appointment time: {0}")]
    InvalidTime(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Appointment conflicts with existing booking")]
    ConflictDetected,

    #[error("Actor is not authorized for this transition")]
    Forbidden,

    #[error("Appointment cannot be modified in current status: {0}")]
    InvalidStatusTransition(AppointmentStatus),

    #[error("Appointments must be cancelled more than {notice_hours} hours before start")]
    CancellationWindowClosed { notice_hours: i64 },

    #[error("Appointment cannot be completed before its scheduled start")]
    CompletionBeforeStart,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<AvailabilityError> for AppointmentError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::ProviderNotFound => AppointmentError::ProviderNotFound,
            AvailabilityError::ValidationError(msg) => AppointmentError::ValidationError(msg),
            AvailabilityError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
        }
    }
}
