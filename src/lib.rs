pub mod api;
pub mod composition;
pub mod database;
pub mod models;
pub mod reference_data;
pub mod refresher;
pub mod sectors;
pub mod ui;
pub mod utils;
