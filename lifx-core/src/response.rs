//! Typed replies decoded from packet payloads.

use crate::{Error, LifxString, LittleEndianReader, MessageType, Packet, HSBK};
use chrono::{DateTime, Utc};
use std::io::Cursor;

/// Response to any message sent with ack_required set to 1.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Acknowledgement {
    /// Sequence number of the acknowledged message.
    pub sequence: u8,
}

/// Sent in reply to a broadcast GetService message.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StateService {
    /// unreliable, the only service offered by bulbs is UDP (1)
    pub service: u8,
    /// Port number of the light.
    pub port: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLabel {
    pub label: String,
}

/// Device power level.  Zero means off, any other value means on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StatePower {
    pub level: u16,
}

impl StatePower {
    pub fn is_on(&self) -> bool {
        self.level > 0
    }
}

/// Vendor, product and hardware version of a device.
///
/// See the LIFX product list for the meaning of the product number.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StateVersion {
    pub vendor: u32,
    pub product: u32,
    pub version: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StateHostFirmware {
    /// Firmware build time.  Sent as nanoseconds since the epoch.
    pub build: DateTime<Utc>,
    pub version: u32,
}

/// The group (room) a device belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateGroup {
    pub group: [u8; 16],
    pub label: String,
    pub updated_at: u64,
}

/// Sent by a device to provide the current light state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightState {
    pub color: HSBK,
    pub power: u16,
    pub label: String,
}

impl LightState {
    pub fn is_on(&self) -> bool {
        self.power > 0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LightStatePower {
    pub level: u16,
}

impl LightStatePower {
    pub fn is_on(&self) -> bool {
        self.level > 0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InfraredState {
    pub brightness: u16,
}

/// Any message type without a dedicated decoder.  The payload is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownResponse {
    pub typ: u16,
    pub payload: Vec<u8>,
}

/// A reply from a device, decoded according to its message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Acknowledgement(Acknowledgement),
    StateService(StateService),
    StateLabel(StateLabel),
    StatePower(StatePower),
    StateVersion(StateVersion),
    StateHostFirmware(StateHostFirmware),
    StateGroup(StateGroup),
    LightState(LightState),
    LightStatePower(LightStatePower),
    InfraredState(InfraredState),
    Unknown(UnknownResponse),
}

fn require(packet: &Packet, expected: usize) -> Result<(), Error> {
    if packet.payload.len() < expected {
        Err(Error::TruncatedPayload {
            typ: packet.typ.code(),
            expected,
            actual: packet.payload.len(),
        })
    } else {
        Ok(())
    }
}

macro_rules! unpack {
    ($packet:expr, $len:expr, $typ:ident, $( $n:ident: $t:ty ),*) => {{
        require($packet, $len)?;
        let mut c = Cursor::new(&$packet.payload);
        $(
            let $n: $t = c.read_val()?;
        )*
        Response::$typ($typ { $( $n, )* })
    }};
}

impl Response {
    /// Decodes the payload of `packet` according to its message type.
    ///
    /// Known types with a payload shorter than their layout fail with
    /// [Error::TruncatedPayload].  Extra trailing bytes are ignored.
    pub fn from_packet(packet: &Packet) -> Result<Response, Error> {
        let resp = match packet.typ {
            MessageType::DeviceAcknowledgement => Response::Acknowledgement(Acknowledgement {
                sequence: packet.header.sequence,
            }),
            MessageType::DeviceStateService => {
                unpack!(packet, 5, StateService, service: u8, port: u32)
            }
            MessageType::DeviceStateLabel => {
                require(packet, 32)?;
                let mut c = Cursor::new(&packet.payload);
                let label: LifxString = c.read_val()?;
                Response::StateLabel(StateLabel {
                    label: label.into_string(),
                })
            }
            MessageType::DeviceStatePower => unpack!(packet, 2, StatePower, level: u16),
            MessageType::DeviceStateVersion => {
                unpack!(packet, 12, StateVersion, vendor: u32, product: u32, version: u32)
            }
            MessageType::DeviceStateHostFirmware => {
                require(packet, 20)?;
                let mut c = Cursor::new(&packet.payload);
                let build: u64 = c.read_val()?;
                let _reserved: u64 = c.read_val()?;
                let version: u32 = c.read_val()?;
                Response::StateHostFirmware(StateHostFirmware {
                    build: DateTime::from_timestamp_millis((build / 1_000_000) as i64)
                        .unwrap_or_default(),
                    version,
                })
            }
            MessageType::DeviceStateGroup => {
                require(packet, 56)?;
                let mut c = Cursor::new(&packet.payload);
                let group: [u8; 16] = c.read_val()?;
                let label: LifxString = c.read_val()?;
                let updated_at: u64 = c.read_val()?;
                Response::StateGroup(StateGroup {
                    group,
                    label: label.into_string(),
                    updated_at,
                })
            }
            MessageType::LightState => {
                // trailing reserved u64 is not needed
                require(packet, 44)?;
                let mut c = Cursor::new(&packet.payload);
                let color: HSBK = c.read_val()?;
                let _reserved: u16 = c.read_val()?;
                let power: u16 = c.read_val()?;
                let label: LifxString = c.read_val()?;
                Response::LightState(LightState {
                    color,
                    power,
                    label: label.into_string(),
                })
            }
            MessageType::LightStatePower => unpack!(packet, 2, LightStatePower, level: u16),
            MessageType::InfraredState => unpack!(packet, 2, InfraredState, brightness: u16),
            other => Response::Unknown(UnknownResponse {
                typ: other.code(),
                payload: packet.payload.clone(),
            }),
        };
        Ok(resp)
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Response::Acknowledgement(..) => MessageType::DeviceAcknowledgement,
            Response::StateService(..) => MessageType::DeviceStateService,
            Response::StateLabel(..) => MessageType::DeviceStateLabel,
            Response::StatePower(..) => MessageType::DeviceStatePower,
            Response::StateVersion(..) => MessageType::DeviceStateVersion,
            Response::StateHostFirmware(..) => MessageType::DeviceStateHostFirmware,
            Response::StateGroup(..) => MessageType::DeviceStateGroup,
            Response::LightState(..) => MessageType::LightState,
            Response::LightStatePower(..) => MessageType::LightStatePower,
            Response::InfraredState(..) => MessageType::InfraredState,
            Response::Unknown(u) => MessageType::from(u.typ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode, encode, FrameHeader, LittleEndianWriter};

    fn packet(typ: MessageType, payload: Vec<u8>) -> Packet {
        Packet {
            header: FrameHeader::new(42),
            typ,
            source: 42,
            payload,
        }
    }

    #[test]
    fn test_decode_light_state() {
        // a real LightState captured from a bulb named "Kitchen"
        let v = vec![
            0x58, 0x00, 0x00, 0x54, 0xca, 0x41, 0x37, 0x05, 0xd0, 0x73, 0xd5, 0x02, 0x97, 0xde,
            0x00, 0x00, 0x4c, 0x49, 0x46, 0x58, 0x56, 0x32, 0x00, 0xc0, 0x44, 0x30, 0xeb, 0x47,
            0xc4, 0x48, 0x18, 0x14, 0x6b, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff,
            0xb8, 0x0b, 0x00, 0x00, 0xff, 0xff, 0x4b, 0x69, 0x74, 0x63, 0x68, 0x65, 0x6e, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
        ];

        let packet = decode(&v).unwrap();
        assert_eq!(packet.header.target_mac_name(), "D0:73:D5:02:97:DE");
        assert_eq!(packet.header.sequence, 0xc0);
        assert!(packet.header.at_time.is_some());

        match Response::from_packet(&packet).unwrap() {
            Response::LightState(state) => {
                assert_eq!(
                    state.color,
                    HSBK {
                        hue: 0,
                        saturation: 0,
                        brightness: 65535,
                        kelvin: 3000
                    }
                );
                assert!(state.is_on());
                assert_eq!(state.label, "Kitchen");
            }
            other => panic!("expected LightState, got {:?}", other),
        }
    }

    #[test]
    fn test_acknowledgement_uses_header_sequence() {
        let mut header = FrameHeader::new(99);
        header.sequence = 17;
        let v = encode(&header, MessageType::DeviceAcknowledgement, &[]).unwrap();
        let packet = decode(&v).unwrap();
        assert_eq!(
            Response::from_packet(&packet).unwrap(),
            Response::Acknowledgement(Acknowledgement { sequence: 17 })
        );
    }

    #[test]
    fn test_state_service() {
        let mut payload = Vec::new();
        payload.write_val(1u8).unwrap();
        payload.write_val(56700u32).unwrap();
        let resp =
            Response::from_packet(&packet(MessageType::DeviceStateService, payload)).unwrap();
        assert_eq!(
            resp,
            Response::StateService(StateService {
                service: 1,
                port: 56700
            })
        );
        assert_eq!(resp.message_type(), MessageType::DeviceStateService);
    }

    #[test]
    fn test_power_levels() {
        let on = Response::from_packet(&packet(MessageType::DeviceStatePower, vec![0xff, 0xff]));
        match on.unwrap() {
            Response::StatePower(p) => assert!(p.is_on()),
            other => panic!("unexpected {:?}", other),
        }
        let off = Response::from_packet(&packet(MessageType::LightStatePower, vec![0, 0]));
        match off.unwrap() {
            Response::LightStatePower(p) => assert!(!p.is_on()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_host_firmware() {
        let mut payload = Vec::new();
        payload.write_val(1_500_000_000_000_000_000u64).unwrap();
        payload.write_val(0u64).unwrap();
        payload.write_val(0x0002_0050u32).unwrap();
        match Response::from_packet(&packet(MessageType::DeviceStateHostFirmware, payload)) {
            Ok(Response::StateHostFirmware(fw)) => {
                assert_eq!(fw.build.timestamp(), 1_500_000_000);
                assert_eq!(fw.version, 0x0002_0050);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_state_group() {
        let mut payload = Vec::new();
        payload.write_val(&[7u8; 16][..]).unwrap();
        payload.write_val(&LifxString::new("Living Room")).unwrap();
        payload.write_val(1234u64).unwrap();
        match Response::from_packet(&packet(MessageType::DeviceStateGroup, payload)) {
            Ok(Response::StateGroup(g)) => {
                assert_eq!(g.group, [7; 16]);
                assert_eq!(g.label, "Living Room");
                assert_eq!(g.updated_at, 1234);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_truncated_payload() {
        let err = Response::from_packet(&packet(MessageType::DeviceStateVersion, vec![0; 8]))
            .unwrap_err();
        match err {
            Error::TruncatedPayload {
                typ,
                expected,
                actual,
            } => {
                assert_eq!(typ, 33);
                assert_eq!(expected, 12);
                assert_eq!(actual, 8);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_keeps_payload() {
        let resp = Response::from_packet(&packet(MessageType::from(506), vec![1, 2, 3])).unwrap();
        assert_eq!(
            resp,
            Response::Unknown(UnknownResponse {
                typ: 506,
                payload: vec![1, 2, 3]
            })
        );
        assert_eq!(resp.message_type(), MessageType::Unknown(506));
    }
}
