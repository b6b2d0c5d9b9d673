mod dispatcher;
mod handler;
mod model;

pub use dispatcher::{
    DispatchReport, NotificationDispatcher, NotificationStore, PgDispatcher, UserDirectory,
};
pub use handler::{list_notifications, mark_read, unread_count};
pub use model::Notification;
