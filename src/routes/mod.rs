pub mod attendance;
pub mod leave;
pub mod notification;
pub mod report;
pub mod user;
