//! Terminal dashboard
//!
//! Renders the seller dashboard with Ratatui and drives it from the
//! terminal's key events.

mod app;
mod log_capture;
mod ui;

pub use app::run;
pub use log_capture::LogBuffer;
