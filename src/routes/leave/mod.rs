mod handler;
mod model;

pub use handler::{balance, decide, my_requests, pending, submit};
pub use model::{LeaveAction, LeaveRequest, LeaveStatus, SubmitLeaveRequest};
