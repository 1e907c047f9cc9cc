//! Fullup Tank Monitor Library
//!
//! This library polls the Fullup cloud API for propane/fuel tank telemetry
//! (volume, temperature, battery, timestamps) and derives a daily consumption
//! estimate per tank for a home-automation frontend to render.

pub mod consumption;
pub mod error;
pub mod fullup_client;
pub mod tank;
pub mod tank_poller;

// Re-export commonly used types for easier access
pub use consumption::calculate_daily_consumption;
pub use error::FullupError;
pub use fullup_client::FullupClient;
pub use tank::{HistoryPoint, TankId, TankInfo, TankRecord};
pub use tank_poller::TankPoller;
