use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use lifx_core::format_mac;
use std::fmt;

/// What every addressable LIFX device on the network has in common.
///
/// Device operations on [LanClient](crate::LanClient) accept anything implementing this trait;
/// light operations need a [LightBulb].
pub trait Device {
    /// Host name or IP address the device answered from.
    fn host_name(&self) -> &str;

    fn mac_address(&self) -> [u8; 6];

    /// Service id advertised in StateService (1 is UDP).
    fn service(&self) -> u8;

    fn port(&self) -> u32;

    /// Last time discovery heard from the device.
    fn last_seen(&self) -> DateTime<Utc>;

    /// The MAC address formatted as `D0:73:D5:00:00:01`.
    fn mac_address_name(&self) -> String {
        format_mac(&self.mac_address())
    }
}

/// A LIFX light.  Returned by discovery, or constructed directly for a known host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightBulb {
    host_name: String,
    mac_address: [u8; 6],
    service: u8,
    port: u32,
    last_seen: DateTime<Utc>,
}

impl LightBulb {
    /// Fails with [Error::InvalidArgument] if `host_name` is empty or only whitespace.
    pub fn new<S: Into<String>>(
        host_name: S,
        mac_address: [u8; 6],
        service: u8,
        port: u32,
    ) -> Result<LightBulb> {
        let host_name = host_name.into();
        if host_name.trim().is_empty() {
            return Err(Error::InvalidArgument {
                name: "host_name",
                reason: "must not be blank".to_owned(),
            });
        }
        Ok(LightBulb {
            host_name,
            mac_address,
            service,
            port,
            last_seen: Utc::now(),
        })
    }

    pub(crate) fn set_last_seen(&mut self, last_seen: DateTime<Utc>) {
        self.last_seen = last_seen;
    }

    /// A repeat sighting: the device may have moved to a new address.
    pub(crate) fn refresh(&mut self, host_name: String, seen: DateTime<Utc>) {
        if !host_name.trim().is_empty() {
            self.host_name = host_name;
        }
        self.last_seen = seen;
    }
}

impl Device for LightBulb {
    fn host_name(&self) -> &str {
        &self.host_name
    }

    fn mac_address(&self) -> [u8; 6] {
        self.mac_address
    }

    fn service(&self) -> u8 {
        self.service
    }

    fn port(&self) -> u32 {
        self.port
    }

    fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }
}

impl fmt::Display for LightBulb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.mac_address_name(), self.host_name)
    }
}
