pub mod handlers;
pub mod router;
pub mod models;
pub mod services;

pub use models::*;
pub use services::availability::ScheduleService;
pub use services::doctor::DoctorService;
pub use services::slots::{compute_available_slots, count_booked_times, find_conflicting_block, BookedTimes};
