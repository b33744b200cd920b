#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # RoboVac 🧹
//!
//! A Rust library for controlling Tuya-based RoboVac vacuums on the local
//! network.
//!
//! Tuya devices expose their state as numbered data points ("dps"), and every
//! hardware model assigns its own codes and string tokens to the same
//! function. This library hides those differences behind typed commands and
//! keeps a cached snapshot of the device in sync.
//!
//! ## Architecture
//!
//! - **Model registry**: one command table per hardware model, translating
//!   between data point codes and [`Command`]s in both directions
//! - **Semantic values**: model-independent values such as
//!   [`values::WorkStatus::CHARGING`], mapped to each model's tokens
//! - **State engine**: [`RoboVac`] caches the status, shares concurrent
//!   fetches and notifies observers of pushed updates
//! - **Transport seam**: the encrypted Tuya session lives behind the
//!   [`Transport`] trait
//!
//! ## Slow devices
//!
//! Devices often answer slower than a home automation UI is willing to wait.
//! Reads can be raced against a deadline with [`with_deadline`]; when the
//! deadline wins, the value is still delivered to
//! [`RoboVac::on_command_change`] observers once it arrives.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use robovac::{values::FanSpeed, RoboVac, RobovacConfig, Transport};
//!
//! async fn clean(transport: Arc<dyn Transport>) -> robovac::Result<()> {
//!     let config = RobovacConfig {
//!         model: Some("T2080".to_string()),
//!         ..Default::default()
//!     };
//!     let vac = RoboVac::new(config, transport)?;
//!
//!     vac.on_status_update(|status, updated| {
//!         println!("{updated} fields updated, battery {:?}", status.battery_level());
//!     })
//!     .await;
//!
//!     // Start cleaning at full power
//!     vac.set_fan_speed(FanSpeed::MAX).await?;
//!     vac.set_play_pause(true).await?;
//!
//!     Ok(())
//! }
//! ```

/// Device state engine
pub mod device;
/// Error types and handling
pub mod error;
/// Built-in model command tables
pub mod models;
/// Data point messages and their translation
pub mod protocol;
/// Deadline races for slow reads
pub mod race;
/// Per-model command registry
pub mod registry;
/// Transport abstraction
pub mod transport;
/// Type definitions and data structures
pub mod types;
/// Semantic value constants
pub mod values;

// Re-export the main types for convenient usage
pub use device::{CommandObserver, RoboVac, StatusObserver};
pub use error::{Result, RobovacError};
pub use models::{resolve_model, supported_model_ids, FALLBACK_MODEL_ID};
pub use protocol::{DpsMessage, SetRequest, TransportEvent};
pub use race::{with_deadline, RaceHandle};
pub use registry::{CommandSpec, ModelRegistry, StringTable};
pub use transport::{event_channel, EventReceiver, EventSender, Transport};
pub use types::{
    Command, CommandValue, ConnectionConfig, ConnectionState, RobovacConfig, RobovacStatus,
    SemanticValue, StringValue, ValueKind,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
