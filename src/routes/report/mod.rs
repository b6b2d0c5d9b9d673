mod handler;
mod model;

pub use handler::{list_monthly, run_monthly};
pub use model::{MonthlyReport, ReportPeriod};
