#![cfg_attr(docsrs, feature(doc_cfg))]
//! # pylonbridge_lib
//!
//! This crate translates battery management telemetry into the Pylon-dialect
//! multi-frame CAN protocol consumed by solar/battery inverters, and answers
//! inverter poll frames with the requested frame group.
//!
//! The actual CAN bus is external: the library encodes into an owned frame
//! table and pushes frames through a [`dispatcher::CanTransport`]
//! implementation supplied by the host.
//!
//! ## Features
//!
//! - `default`: Enables `bin-dependencies`, which is intended for compiling
//!   the `pylonbridge` command-line tool.
//! - `protocol_serde`: Enables `serde` support for the telemetry and protocol
//!   configuration types.
//!
//! ## Example
//!
//! ```no_run
//! use pylonbridge_lib::dispatcher::{CanTransport, PylonInverter};
//! use pylonbridge_lib::protocol::{CanFrame, ProtocolConfig};
//! # use pylonbridge_lib::Error;
//! # struct Bus;
//! # impl CanTransport for Bus {
//! #     fn transmit(&mut self, _frame: &CanFrame) -> Result<(), Error> { Ok(()) }
//! # }
//! # fn read_snapshot() -> pylonbridge_lib::telemetry::TelemetrySnapshot { unimplemented!() }
//! # fn main() -> Result<(), Error> {
//! let mut inverter = PylonInverter::new(Bus, ProtocolConfig::default());
//! inverter.update_values(&read_snapshot());
//! // Frame received from the bus: the inverter asks for system data.
//! inverter.handle_frame(0x4200, &[0x00; 8])?;
//! # Ok(())
//! # }
//! ```

/// Contains error types for the library.
mod error;
/// Request driven poll dispatcher and the CAN transport abstraction.
pub mod dispatcher;
/// Frame identifiers, packing policies and the frame encoder.
pub mod protocol;
/// Telemetry snapshot types and the LFP voltage normalizer.
pub mod telemetry;

pub use error::Error;
