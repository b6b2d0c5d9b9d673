mod handler;
mod model;

pub use handler::{check_in, check_out, list_records, my_records};
pub use model::{AttendanceRecord, AttendanceState, CheckInOutcome};
