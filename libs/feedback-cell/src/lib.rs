pub mod handlers;
pub mod router;
pub mod models;
pub mod services;

pub use models::*;
pub use services::feedback::FeedbackService;
pub use services::rating::{recompute_doctor_rating, RatingService};
