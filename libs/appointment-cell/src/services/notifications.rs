// libs/appointment-cell/src/services/notifications.rs
use async_trait::async_trait;
use tracing::info;

use crate::models::Appointment;

/// Delivery seam for booking confirmations. Implementations live outside
/// this cell (mail, push, messaging); the engine only cares whether the
/// send was accepted.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Best-effort. Returns false when delivery was not accepted; the
    /// booking itself is never rolled back over a failed notification.
    async fn send_booking_confirmation(&self, appointment: &Appointment) -> bool;
}

/// Gateway that only records the attempt in the log. Used where no delivery
/// channel is wired up.
#[derive(Default)]
pub struct LoggingNotificationGateway;

#[async_trait]
impl NotificationGateway for LoggingNotificationGateway {
    async fn send_booking_confirmation(&self, appointment: &Appointment) -> bool {
        info!(
            "Booking confirmation for appointment {} to patient {}",
            appointment.id, appointment.patient_id
        );
        true
    }
}
