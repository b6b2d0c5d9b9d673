mod handler;
mod model;

pub use handler::{login_authorized, login_personnel, me, register};
pub use model::{CreateUserRequest, EmployeeProfile, Role, User};
