pub mod clock;
pub mod extractor;
pub mod jwt;
pub mod test_utils;
pub mod time_of_day;

pub use clock::{Clock, FixedClock, SystemClock};
pub use time_of_day::{TimeOfDay, TimeOfDayError};
