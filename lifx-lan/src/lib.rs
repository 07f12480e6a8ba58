//! An async client for controlling LIFX devices over the local network.
//!
//! Built on the [lifx_core] wire codec, this crate owns a UDP socket, matches replies to the
//! requests that asked for them, keeps a registry of devices found by periodic discovery, and
//! exposes typed operations for power, color, labels, version, firmware and infrared.
//!
//! All network I/O runs on tokio.  Every operation that waits for a reply gives up after
//! [ClientOptions::response_timeout] with [Error::Timeout], so an unplugged bulb can never hang
//! the caller.  Dropping an operation's future abandons it cleanly.
//!
//! # Logging
//!
//! This crate logs through the [log] facade; install any logger (e.g. `env_logger`) to see it.

mod client;
mod color;
mod config;
mod correlation;
mod device;
mod device_ops;
mod discovery;
mod error;
mod light_ops;
mod transport;

pub use client::LanClient;
pub use color::{rgb_to_hsbk, MAX_KELVIN, MIN_KELVIN};
pub use config::{ClientOptions, LIFX_PORT};
pub use correlation::ExpectedResponse;
pub use device::{Device, LightBulb};
pub use discovery::DiscoveryEvent;
pub use error::{Error, Result};

pub use lifx_core::{
    Acknowledgement, FrameHeader, InfraredState, LightState, LightStatePower, MessageType,
    Response, StateGroup, StateHostFirmware, StateLabel, StatePower, StateService, StateVersion,
    UnknownResponse, HSBK,
};
