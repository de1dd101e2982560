// libs/appointment-cell/src/services/booking.rs
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use provider_cell::models::Modality;
use provider_cell::store::{AvailabilityStore, ProviderDirectory};
use shared_models::ActorIdentity;

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus, AvailabilityQuery,
    BookAppointmentRequest, BookedAppointment, BookingPolicy, TimeSlot, TransitionCapabilities,
};
use crate::services::lifecycle::BookingStateMachine;
use crate::services::notifications::NotificationGateway;
use crate::services::slots::SlotProjectionService;
use crate::services::validation::{BookingValidator, SlotValidation};
use crate::store::{AppointmentStore, StoreError};

/// Public surface of the booking engine.
///
/// Composes the slot projector, booking validator and lifecycle state
/// machine over the store seams. All operations are synchronous
/// request/response; the only suspension points are store reads and writes.
pub struct AppointmentService {
    appointments: Arc<dyn AppointmentStore>,
    directory: Arc<dyn ProviderDirectory>,
    notifications: Arc<dyn NotificationGateway>,
    projector: SlotProjectionService,
    validator: BookingValidator,
    lifecycle: BookingStateMachine,
    policy: BookingPolicy,
}

impl AppointmentService {
    pub fn new(
        availability: Arc<dyn AvailabilityStore>,
        appointments: Arc<dyn AppointmentStore>,
        directory: Arc<dyn ProviderDirectory>,
        notifications: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self::with_policy(
            availability,
            appointments,
            directory,
            notifications,
            BookingPolicy::default(),
        )
    }

    pub fn with_policy(
        availability: Arc<dyn AvailabilityStore>,
        appointments: Arc<dyn AppointmentStore>,
        directory: Arc<dyn ProviderDirectory>,
        notifications: Arc<dyn NotificationGateway>,
        policy: BookingPolicy,
    ) -> Self {
        let projector =
            SlotProjectionService::new(Arc::clone(&availability), Arc::clone(&appointments));
        let validator = BookingValidator::new(
            Arc::clone(&availability),
            Arc::clone(&appointments),
            policy.clone(),
        );
        let lifecycle = BookingStateMachine::with_policy(policy.clone());

        Self {
            appointments,
            directory,
            notifications,
            projector,
            validator,
            lifecycle,
            policy,
        }
    }

    /// Bookable and taken slots for a provider over a date range.
    pub async fn get_availability(
        &self,
        provider_id: Uuid,
        query: AvailabilityQuery,
    ) -> Result<Vec<TimeSlot>, AppointmentError> {
        debug!(
            "Fetching availability for provider {} from {} to {}",
            provider_id, query.range_start, query.range_end
        );

        self.ensure_provider(provider_id).await?;

        if query.range_end < query.range_start {
            return Err(AppointmentError::ValidationError(
                "Range end must not precede range start".to_string(),
            ));
        }
        let span_days = (query.range_end - query.range_start).num_days() + 1;
        if span_days > self.policy.max_range_days {
            return Err(AppointmentError::ValidationError(format!(
                "Range must not span more than {} days",
                self.policy.max_range_days
            )));
        }

        let slot_minutes = query
            .slot_duration_minutes
            .unwrap_or(self.policy.default_slot_minutes);
        if slot_minutes < self.policy.min_duration_minutes
            || slot_minutes > self.policy.max_duration_minutes
        {
            return Err(AppointmentError::ValidationError(format!(
                "Slot duration must be between {} and {} minutes",
                self.policy.min_duration_minutes, self.policy.max_duration_minutes
            )));
        }

        self.projector
            .project(
                provider_id,
                query.range_start,
                query.range_end,
                query.modality,
                slot_minutes,
                Utc::now(),
            )
            .await
    }

    /// Pre-flight check for a specific slot, for callers that want to probe
    /// before booking.
    pub async fn validate_slot(
        &self,
        provider_id: Uuid,
        start_time: DateTime<Utc>,
        duration_minutes: i32,
    ) -> Result<SlotValidation, AppointmentError> {
        self.ensure_provider(provider_id).await?;
        self.validator
            .validate(provider_id, start_time, duration_minutes, None, Utc::now())
            .await
    }

    /// Book an appointment.
    ///
    /// The validator runs first so failures carry the precise error kind;
    /// the insert itself re-enforces the overlap exclusion atomically in the
    /// store, so among concurrent overlapping requests at most one succeeds
    /// and the rest surface `ConflictDetected`.
    pub async fn create_appointment(
        &self,
        request: BookAppointmentRequest,
    ) -> Result<BookedAppointment, AppointmentError> {
        info!(
            "Booking appointment for patient {} with provider {}",
            request.patient_id, request.provider_id
        );

        self.ensure_provider(request.provider_id).await?;

        let now = Utc::now();
        let validation = self
            .validator
            .validate(
                request.provider_id,
                request.scheduled_start_time,
                request.duration_minutes,
                Some(request.modality),
                now,
            )
            .await?;

        if let Some(rejection) = validation.rejection {
            debug!("Booking request rejected: {:?}", rejection);
            return Err(rejection.into_error(&self.policy));
        }

        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            provider_id: request.provider_id,
            scheduled_start_time: request.scheduled_start_time,
            duration_minutes: request.duration_minutes,
            modality: request.modality,
            status: AppointmentStatus::Agendada,
            reason: request.reason,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        };

        let stored = self.appointments.insert_exclusive(appointment).await?;

        let confirmation_sent = self.notifications.send_booking_confirmation(&stored).await;
        if !confirmation_sent {
            warn!(
                "Booking confirmation for appointment {} was not delivered",
                stored.id
            );
        }

        info!(
            "Appointment {} booked with provider {}",
            stored.id, stored.provider_id
        );
        Ok(BookedAppointment {
            appointment: stored,
            confirmation_sent,
        })
    }

    pub async fn confirm_appointment(
        &self,
        appointment_id: Uuid,
        actor: ActorIdentity,
    ) -> Result<Appointment, AppointmentError> {
        self.apply_transition(appointment_id, AppointmentStatus::Confirmada, actor, None)
            .await
    }

    pub async fn complete_appointment(
        &self,
        appointment_id: Uuid,
        actor: ActorIdentity,
    ) -> Result<Appointment, AppointmentError> {
        self.apply_transition(appointment_id, AppointmentStatus::Completada, actor, None)
            .await
    }

    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        actor: ActorIdentity,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        self.apply_transition(appointment_id, AppointmentStatus::Cancelada, actor, reason)
            .await
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment: {}", appointment_id);
        Ok(self.appointments.find(appointment_id).await?)
    }

    pub async fn search_appointments(
        &self,
        query: AppointmentSearchQuery,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Searching appointments with filters: {:?}", query);
        Ok(self.appointments.search(&query).await?)
    }

    /// Nearest available slots around a desired time, for callers whose
    /// requested slot was rejected with a conflict.
    pub async fn suggest_alternatives(
        &self,
        provider_id: Uuid,
        desired_start: DateTime<Utc>,
        duration_minutes: i32,
        modality: Option<Modality>,
        max_suggestions: usize,
    ) -> Result<Vec<TimeSlot>, AppointmentError> {
        self.ensure_provider(provider_id).await?;

        let range_start = desired_start.date_naive();
        let range_end = range_start + chrono::Duration::days(self.policy.alternative_search_days);

        let slots = self
            .projector
            .project(
                provider_id,
                range_start,
                range_end,
                modality,
                duration_minutes,
                Utc::now(),
            )
            .await?;

        Ok(slots
            .into_iter()
            .filter(|slot| slot.is_available)
            .take(max_suggestions)
            .collect())
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn ensure_provider(&self, provider_id: Uuid) -> Result<(), AppointmentError> {
        if !self.directory.exists(provider_id).await? {
            return Err(AppointmentError::ProviderNotFound);
        }
        Ok(())
    }

    /// Load, authorize, persist. The persist step is a compare-and-set on
    /// the loaded status: when two actors race, the loser observes the
    /// status the winner left behind.
    async fn apply_transition(
        &self,
        appointment_id: Uuid,
        to: AppointmentStatus,
        actor: ActorIdentity,
        cancellation_reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Transitioning appointment {} to {}", appointment_id, to);

        let appointment = self.appointments.find(appointment_id).await?;
        let capabilities = TransitionCapabilities::resolve(&actor, &appointment);

        self.lifecycle
            .authorize_transition(&appointment, to, &capabilities, Utc::now())?;

        let updated = match self
            .appointments
            .transition_status(appointment_id, appointment.status, to, cancellation_reason)
            .await
        {
            Ok(updated) => updated,
            Err(StoreError::StaleStatus { current }) => {
                warn!(
                    "Appointment {} transitioned concurrently, now {}",
                    appointment_id, current
                );
                return Err(AppointmentError::InvalidStatusTransition(current));
            }
            Err(e) => return Err(e.into()),
        };

        info!("Appointment {} is now {}", updated.id, updated.status);
        Ok(updated)
    }
}
