use std::net::Ipv4Addr;
use std::time::Duration;

/// The UDP port LIFX devices listen on.
pub const LIFX_PORT: u16 = 56700;

/// Tunables for a [LanClient](crate::LanClient).
///
/// The defaults match the LIFX LAN protocol and the behavior of the official apps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Local port the client socket binds to.  Zero picks an ephemeral port.
    pub port: u16,
    /// Port that unicast requests and discovery broadcasts are sent to.
    pub device_port: u16,
    /// Destination address for discovery probes.
    pub broadcast_address: Ipv4Addr,
    /// How long to wait for a reply before failing with a timeout.
    pub response_timeout: Duration,
    /// Delay between discovery probes.
    pub discovery_interval: Duration,
    /// Devices unseen for at least this long are dropped from the registry.
    pub device_expiry: Duration,
}

impl Default for ClientOptions {
    fn default() -> ClientOptions {
        ClientOptions {
            port: LIFX_PORT,
            device_port: LIFX_PORT,
            broadcast_address: Ipv4Addr::BROADCAST,
            response_timeout: Duration::from_secs(1),
            discovery_interval: Duration::from_secs(5),
            device_expiry: Duration::from_secs(5 * 60),
        }
    }
}
