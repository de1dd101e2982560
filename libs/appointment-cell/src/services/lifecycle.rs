// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, BookingPolicy, TransitionCapabilities,
};

/// Lifecycle rules for an appointment.
///
/// Pure: decisions depend only on the appointment, the requested target
/// status, the resolved capability set and the evaluation time. Persistence
/// of an authorized transition is the orchestrator's job.
pub struct BookingStateMachine {
    policy: BookingPolicy,
}

impl BookingStateMachine {
    pub fn new() -> Self {
        Self::with_policy(BookingPolicy::default())
    }

    pub fn with_policy(policy: BookingPolicy) -> Self {
        Self { policy }
    }

    /// All legal next statuses from a given current status. Completada and
    /// Cancelada are terminal.
    pub fn valid_transitions(&self, current: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current {
            AppointmentStatus::Agendada => vec![
                AppointmentStatus::Confirmada,
                AppointmentStatus::Completada,
                AppointmentStatus::Cancelada,
            ],
            AppointmentStatus::Confirmada => vec![
                AppointmentStatus::Completada,
                AppointmentStatus::Cancelada,
            ],
            AppointmentStatus::Completada => vec![],
            AppointmentStatus::Cancelada => vec![],
        }
    }

    /// Validate one transition: legality from the current status first, then
    /// actor capabilities, then time guards. An unauthorized actor is
    /// rejected before any time guard is evaluated.
    pub fn authorize_transition(
        &self,
        appointment: &Appointment,
        to: AppointmentStatus,
        actor: &TransitionCapabilities,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        debug!(
            "Validating transition {} -> {} for appointment {}",
            appointment.status, to, appointment.id
        );

        if !self.valid_transitions(appointment.status).contains(&to) {
            warn!(
                "Invalid status transition attempted: {} -> {}",
                appointment.status, to
            );
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }

        match to {
            AppointmentStatus::Confirmada => {
                if !(actor.is_associated_provider || actor.is_admin) {
                    return Err(AppointmentError::Forbidden);
                }
            }
            AppointmentStatus::Completada => {
                if !(actor.is_associated_provider || actor.is_admin) {
                    return Err(AppointmentError::Forbidden);
                }
                if now < appointment.scheduled_start_time {
                    return Err(AppointmentError::CompletionBeforeStart);
                }
            }
            AppointmentStatus::Cancelada => {
                if !(actor.is_owning_patient || actor.is_associated_provider || actor.is_admin) {
                    return Err(AppointmentError::Forbidden);
                }
                let notice = Duration::hours(self.policy.cancellation_notice_hours);
                if now + notice >= appointment.scheduled_start_time {
                    return Err(AppointmentError::CancellationWindowClosed {
                        notice_hours: self.policy.cancellation_notice_hours,
                    });
                }
            }
            AppointmentStatus::Agendada => {
                return Err(AppointmentError::InvalidStatusTransition(appointment.status));
            }
        }

        Ok(())
    }
}

impl Default for BookingStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
