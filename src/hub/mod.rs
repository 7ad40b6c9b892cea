//! Harmony Hub integration module
//!
//! - `transport`: WebSocket session and exchange discipline
//! - `discovery`: Hub identity and activity list
//! - `state`: Cached current activity
//! - `switches`: Per-activity boolean switches
//! - `orchestrator`: Activity commands with busy retries
//! - `refresher`: Background refresh loop
//! - `accessory`: Get/set hooks and information block
//! - `platform`: Startup wiring

pub mod accessory;
pub mod discovery;
pub mod orchestrator;
pub mod platform;
pub mod refresher;
pub mod state;
pub mod switches;
pub mod transport;

#[cfg(test)]
pub mod testing;

pub use accessory::{HarmonyAccessory, SetOutcome};
pub use platform::HarmonyPlatform;
