#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # VScale
//!
//! A Rust driver for the Exingtech Y1 body-composition scale (advertised as
//! "VScale") over Bluetooth Low Energy.
//!
//! The scale needs a short initialization handshake before it streams
//! measurements:
//!
//! 1. enable notifications on the measurement characteristic
//! 2. enable notifications on the auxiliary characteristic
//! 3. write the user profile command `[0x10, slot, gender, age, height]`
//!
//! After that, every weighing arrives as a 19-byte notification carrying
//! weight, body fat, water, bone mass, muscle, visceral muscle, calorie and
//! BMI as big-endian fixed-point values (x 10).
//!
//! The protocol core ([`HandshakeSequencer`], [`DeviceDriver`],
//! [`decode_payload`]) only talks to a [`ScaleTransport`], so it can be driven
//! by any BLE stack. [`ScaleDevice`] wires it to `btleplug`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use vscale::{Gender, ScaleDevice, UserProfile, WeightUnit};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let profile = UserProfile::new(Gender::Male, 182, 41, 1)
//!         .with_weight_unit(WeightUnit::Pounds);
//!
//!     let mut scale = ScaleDevice::connect_first(profile).await?;
//!
//!     while let Some(record) = scale.next_measurement().await {
//!         println!("{:.1} {} / fat {:.1}%", record.weight, record.weight_unit, record.fat);
//!     }
//!
//!     Ok(())
//! }
//! ```

/// Bluetooth Low Energy transport built on btleplug
pub mod ble;
/// High-level device interface
pub mod device;
/// Device driver interface and the Exingtech Y1 driver
pub mod driver;
/// Error types and handling
pub mod error;
/// Initialization handshake state machine
pub mod handshake;
/// Wire formats: user profile command and measurement payload
pub mod protocol;
/// Type definitions and data structures
pub mod types;

// Re-export the main types for convenient usage
pub use device::ScaleDevice;
pub use driver::{
    dispatch_notification, DeviceDriver, ExingtechY1, MeasurementSink, ScaleTransport,
    EXINGTECH_Y1_CHANNELS,
};
pub use error::{Result, ScaleError};
pub use handshake::{HandshakeSequencer, InitStep, StepOutcome};
pub use protocol::{decode_payload, user_profile_command, MeasurementRecord, ScalePayload, ScaleType};
pub use types::{
    ConnectionParams, DeviceChannelSet, DeviceInfo, Gender, UserProfile, WeightUnit,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exingtech Y1 weight measurement service UUID
pub const SCALE_SERVICE_UUID: &str = "f433bd80-75b8-11e2-97d9-0002a5d5c51b";

/// Measurement characteristic UUID (read, notify)
///
/// Carries the 19-byte measurement frames.
pub const SCALE_MEASUREMENT_CHAR_UUID: &str = "1a2ea400-75b9-11e2-be05-0002a5d5c51b";

/// Auxiliary characteristic UUID (read, notify)
pub const SCALE_AUX_CHAR_UUID: &str = "23b4fec0-75b9-11e2-972a-0002a5d5c51b";

/// Command characteristic UUID (write only)
///
/// Receives the user profile command during the handshake.
pub const SCALE_CMD_CHAR_UUID: &str = "29f11080-75b9-11e2-8bf6-0002a5d5c51b";

/// Client characteristic configuration descriptor UUID
pub const SCALE_CONFIG_DESCRIPTOR_UUID: &str = "00002902-0000-1000-8000-00805f9b34fb";
