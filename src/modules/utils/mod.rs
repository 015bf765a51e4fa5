pub mod logging;
pub mod time;

pub use logging::{format_sensitive, initialize_logging, log_data_operation, log_reset_event};
pub use time::{Clock, ManualClock, SystemClock};
