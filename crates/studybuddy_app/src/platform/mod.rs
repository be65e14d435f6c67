mod app;
pub mod config;
mod effects;
pub mod logging;
mod render;

pub use app::run_app;
