pub mod handlers;
pub mod router;
pub mod models;
pub mod services;

pub use models::*;
pub use services::booking::AppointmentBookingService;
pub use services::cancellation::{appointment_instant, can_cancel};
pub use services::lifecycle::AppointmentLifecycleService;
pub use services::validation::validate_booking;
