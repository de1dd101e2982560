pub mod booking;
pub mod conflict;
pub mod lifecycle;
pub mod notifications;
pub mod slots;
pub mod validation;

pub use booking::AppointmentService;
pub use conflict::ConflictDetectionService;
pub use lifecycle::BookingStateMachine;
pub use notifications::NotificationGateway;
pub use slots::SlotProjectionService;
pub use validation::{BookingValidator, SlotRejection, SlotValidation};
