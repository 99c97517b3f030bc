pub mod app;
pub mod layout;
pub mod views;

pub use app::{run_dashboard, DashboardApp};
