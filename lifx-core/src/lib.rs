//! This crate provides the wire codec for the LIFX LAN protocol.
//!
//! This lets you build and parse the UDP packets that LIFX devices speak on your local area
//! network.  More info can be found here:
//! https://lan.developer.lifx.com/
//!
//! Since this is a low-level library, it does not deal with issues like talking to the network,
//! tracking known devices, or waiting for replies.  The `lifx-lan` crate does that on top of
//! [encode] and [decode].
//!
//! # Packet layout
//!
//! Every packet is a 36 byte header followed by a message specific payload.  All fields are
//! little-endian:
//!
//! * Frame (8 bytes): size, protocol word, source identifier
//! * Frame Address (16 bytes): target, reserved, ack/res flags, sequence
//! * Protocol Header (12 bytes): at_time, message type, reserved
//!
//! # Reserved fields
//! When *constructing* packets, every reserved field is written as zero.  However, it's
//! possible to receive packets with these fields set to non-zero values, so [decode] ignores them.
//! Be conservative in what you send, and liberal in what you accept.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use std::io::{self, Cursor, Read, Write};
use thiserror::Error;

mod response;

pub use response::{
    Acknowledgement, InfraredState, LightState, LightStatePower, Response, StateGroup,
    StateHostFirmware, StateLabel, StatePower, StateService, StateVersion, UnknownResponse,
};

/// Size of the fixed Frame + Frame Address + Protocol Header section.
pub const HEADER_SIZE: usize = 36;

/// origin=0, tagged=1, addressable=1, protocol=1024
pub const PROTOCOL_WORD: u16 = 0x3400;

const PROTOCOL_NUMBER: u16 = 1024;

/// Width of every string field on the wire (labels).
pub const LABEL_SIZE: usize = 32;

/// Various packet encoding/decoding errors
#[derive(Error, Debug)]
pub enum Error {
    /// The buffer is not a structurally valid LIFX packet.
    ///
    /// The inner string is a description of the problem.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// The payload would overflow the 16-bit size field.
    #[error("payload of {0} bytes does not fit in a single packet")]
    PayloadTooLarge(usize),

    /// A known message type arrived with fewer payload bytes than its layout needs.
    #[error("message type {typ} needs {expected} payload bytes, got {actual}")]
    TruncatedPayload {
        typ: u16,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Writes a single payload argument in its wire representation.
///
/// Implemented for the fixed-width integers, `bool`, [LifxString], [HSBK] and raw byte arrays,
/// so payloads can be laid out with a sequence of `write_val` calls on a `Vec<u8>`.
pub trait LittleEndianWriter<T>: WriteBytesExt {
    fn write_val(&mut self, v: T) -> Result<(), io::Error>;
}

macro_rules! derive_writer {
{ $( $m:ident: $t:ty ),*} => {
    $(
        impl<T: WriteBytesExt> LittleEndianWriter<$t> for T {
            fn write_val(&mut self, v: $t) -> Result<(), io::Error> {
                self . $m ::<LittleEndian>(v)
            }
        }
    )*

}
}

derive_writer! { write_u32: u32, write_u16: u16, write_u64: u64 }

impl<T: WriteBytesExt> LittleEndianWriter<u8> for T {
    fn write_val(&mut self, v: u8) -> Result<(), io::Error> {
        self.write_u8(v)
    }
}

impl<T: WriteBytesExt> LittleEndianWriter<bool> for T {
    fn write_val(&mut self, v: bool) -> Result<(), io::Error> {
        self.write_u8(if v { 1 } else { 0 })
    }
}

impl<'a, T: WriteBytesExt> LittleEndianWriter<&'a [u8]> for T {
    fn write_val(&mut self, v: &'a [u8]) -> Result<(), io::Error> {
        self.write_all(v)
    }
}

impl<T: WriteBytesExt> LittleEndianWriter<&LifxString> for T {
    fn write_val(&mut self, v: &LifxString) -> Result<(), io::Error> {
        let bytes = v.0.as_bytes();
        self.write_all(bytes)?;
        for _ in bytes.len()..LABEL_SIZE {
            self.write_u8(0)?;
        }
        Ok(())
    }
}

impl<T: WriteBytesExt> LittleEndianWriter<HSBK> for T {
    fn write_val(&mut self, v: HSBK) -> Result<(), io::Error> {
        self.write_val(v.hue)?;
        self.write_val(v.saturation)?;
        self.write_val(v.brightness)?;
        self.write_val(v.kelvin)?;
        Ok(())
    }
}

pub(crate) trait LittleEndianReader<T> {
    fn read_val(&mut self) -> Result<T, io::Error>;
}

macro_rules! derive_reader {
{ $( $m:ident: $t:ty ),*} => {
    $(
        impl<T: ReadBytesExt> LittleEndianReader<$t> for T {
            fn read_val(&mut self) -> Result<$t, io::Error> {
                self . $m ::<LittleEndian>()
            }
        }
    )*

}
}

derive_reader! { read_u32: u32, read_u16: u16, read_u64: u64 }

impl<R: ReadBytesExt> LittleEndianReader<u8> for R {
    fn read_val(&mut self) -> Result<u8, io::Error> {
        self.read_u8()
    }
}

impl<R: ReadBytesExt> LittleEndianReader<HSBK> for R {
    fn read_val(&mut self) -> Result<HSBK, io::Error> {
        let hue = self.read_val()?;
        let saturation = self.read_val()?;
        let brightness = self.read_val()?;
        let kelvin = self.read_val()?;
        Ok(HSBK {
            hue,
            saturation,
            brightness,
            kelvin,
        })
    }
}

impl<R: ReadBytesExt> LittleEndianReader<[u8; 16]> for R {
    fn read_val(&mut self) -> Result<[u8; 16], io::Error> {
        let mut val = [0; 16];
        self.read_exact(&mut val)?;
        Ok(val)
    }
}

impl<R: ReadBytesExt> LittleEndianReader<LifxString> for R {
    fn read_val(&mut self) -> Result<LifxString, io::Error> {
        let mut raw = [0; LABEL_SIZE];
        self.read_exact(&mut raw)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(LABEL_SIZE);
        let label = String::from_utf8_lossy(&raw[..end]);
        Ok(LifxString(label.trim_end().to_owned()))
    }
}

/// Lifx strings are fixed-length (32-bytes maximum)
///
/// On the wire the UTF-8 bytes are padded with zeros; when reading, padding and trailing
/// whitespace are trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LifxString(String);

impl LifxString {
    /// Constructs a new LifxString, truncating to 32 bytes without splitting a character.
    pub fn new(s: &str) -> LifxString {
        let mut end = s.len().min(LABEL_SIZE);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        LifxString(s[..end].to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for LifxString {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        write!(fmt, "{}", self.0)
    }
}

impl std::cmp::PartialEq<str> for LifxString {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// Bulb color (Hue-Saturation-Brightness-Kelvin)
///
/// # Notes:
///
/// When a light is displaying whites, saturation will be zero, hue will be ignored, and only
/// brightness and kelvin will matter.
///
/// Normal values for "kelvin" are from 2500 (warm/yellow) to 9000 (cool/blue)
///
/// When a light is displaying colors, kelvin is ignored.
///
/// To display "pure" colors, set saturation to full (65535).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct HSBK {
    pub hue: u16,
    pub saturation: u16,
    pub brightness: u16,
    pub kelvin: u16,
}

/// Message type codes known to this library.
///
/// The numeric codes are fixed by the protocol.  Anything else decodes as [MessageType::Unknown]
/// rather than failing, since LIFX devices are known to send undocumented messages.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// GetService - 2
    DeviceGetService,
    /// StateService - 3
    DeviceStateService,
    /// GetHostFirmware - 14
    DeviceGetHostFirmware,
    /// StateHostFirmware - 15
    DeviceStateHostFirmware,
    /// GetPower - 20
    DeviceGetPower,
    /// SetPower - 21
    DeviceSetPower,
    /// StatePower - 22
    DeviceStatePower,
    /// GetLabel - 23
    DeviceGetLabel,
    /// SetLabel - 24
    DeviceSetLabel,
    /// StateLabel - 25
    DeviceStateLabel,
    /// GetVersion - 32
    DeviceGetVersion,
    /// StateVersion - 33
    DeviceStateVersion,
    /// Acknowledgement - 45
    DeviceAcknowledgement,
    /// GetGroup - 51
    DeviceGetGroup,
    /// StateGroup - 53
    DeviceStateGroup,
    /// Get - 101
    LightGet,
    /// SetColor - 102
    LightSetColor,
    /// State - 107
    LightState,
    /// GetPower - 116
    LightGetPower,
    /// SetPower - 117
    LightSetPower,
    /// StatePower - 118
    LightStatePower,
    /// GetInfrared - 120
    InfraredGet,
    /// StateInfrared - 121
    InfraredState,
    /// SetInfrared - 122
    InfraredSet,
    /// Any other type code.
    Unknown(u16),
}

impl MessageType {
    pub fn code(self) -> u16 {
        match self {
            MessageType::DeviceGetService => 2,
            MessageType::DeviceStateService => 3,
            MessageType::DeviceGetHostFirmware => 14,
            MessageType::DeviceStateHostFirmware => 15,
            MessageType::DeviceGetPower => 20,
            MessageType::DeviceSetPower => 21,
            MessageType::DeviceStatePower => 22,
            MessageType::DeviceGetLabel => 23,
            MessageType::DeviceSetLabel => 24,
            MessageType::DeviceStateLabel => 25,
            MessageType::DeviceGetVersion => 32,
            MessageType::DeviceStateVersion => 33,
            MessageType::DeviceAcknowledgement => 45,
            MessageType::DeviceGetGroup => 51,
            MessageType::DeviceStateGroup => 53,
            MessageType::LightGet => 101,
            MessageType::LightSetColor => 102,
            MessageType::LightState => 107,
            MessageType::LightGetPower => 116,
            MessageType::LightSetPower => 117,
            MessageType::LightStatePower => 118,
            MessageType::InfraredGet => 120,
            MessageType::InfraredState => 121,
            MessageType::InfraredSet => 122,
            MessageType::Unknown(code) => code,
        }
    }
}

impl From<u16> for MessageType {
    fn from(code: u16) -> MessageType {
        match code {
            2 => MessageType::DeviceGetService,
            3 => MessageType::DeviceStateService,
            14 => MessageType::DeviceGetHostFirmware,
            15 => MessageType::DeviceStateHostFirmware,
            20 => MessageType::DeviceGetPower,
            21 => MessageType::DeviceSetPower,
            22 => MessageType::DeviceStatePower,
            23 => MessageType::DeviceGetLabel,
            24 => MessageType::DeviceSetLabel,
            25 => MessageType::DeviceStateLabel,
            32 => MessageType::DeviceGetVersion,
            33 => MessageType::DeviceStateVersion,
            45 => MessageType::DeviceAcknowledgement,
            51 => MessageType::DeviceGetGroup,
            53 => MessageType::DeviceStateGroup,
            101 => MessageType::LightGet,
            102 => MessageType::LightSetColor,
            107 => MessageType::LightState,
            116 => MessageType::LightGetPower,
            117 => MessageType::LightSetPower,
            118 => MessageType::LightStatePower,
            120 => MessageType::InfraredGet,
            121 => MessageType::InfraredState,
            122 => MessageType::InfraredSet,
            other => MessageType::Unknown(other),
        }
    }
}

/// Per-message envelope data.
///
/// Created for each outgoing message and discarded after it is sent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameHeader {
    /// Source identifier.  Replies carry the same value, which is how they are matched to
    /// requests.  Zero means no reply is expected.
    pub identifier: u32,

    /// Wrap around message sequence number
    pub sequence: u8,

    /// Acknowledgement message required
    pub ack_required: bool,

    /// Response message required
    pub res_required: bool,

    /// 6 byte device address (MAC address) followed by two zero bytes.  All zeros addresses
    /// every device.
    pub target: [u8; 8],

    /// Zero on the wire for client originated Get and Set messages.
    pub at_time: Option<DateTime<Utc>>,
}

impl FrameHeader {
    pub fn new(identifier: u32) -> FrameHeader {
        FrameHeader {
            identifier,
            ..Default::default()
        }
    }

    /// Sets the target to a device MAC address, zero filling the last two bytes.
    pub fn with_target_mac(mut self, mac: [u8; 6]) -> FrameHeader {
        self.target = [0; 8];
        self.target[..6].copy_from_slice(&mac);
        self
    }

    pub fn target_mac(&self) -> [u8; 6] {
        let mut mac = [0; 6];
        mac.copy_from_slice(&self.target[..6]);
        mac
    }

    /// The target MAC address formatted as `D0:73:D5:00:00:01`.
    pub fn target_mac_name(&self) -> String {
        format_mac(&self.target_mac())
    }

    /// The Frame Address flag byte: bit 1 is ack_required, bit 0 is res_required.
    pub fn flags(&self) -> u8 {
        (if self.ack_required { 0b10 } else { 0 }) | (if self.res_required { 0b01 } else { 0 })
    }
}

/// Formats a MAC address as colon separated uppercase hex.
pub fn format_mac(mac: &[u8]) -> String {
    mac.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Converts an `at_time` to its wire value.
///
/// Milliseconds since the epoch multiplied by ten, which approximates 100ns ticks.  This does
/// not invert [at_time_from_wire]; both factors are kept as-is for interoperability.
pub fn at_time_to_wire(at_time: Option<DateTime<Utc>>) -> u64 {
    match at_time {
        Some(t) => (t.timestamp_millis().max(0) as u64).saturating_mul(10),
        None => 0,
    }
}

/// Converts a wire `at_time` back to a timestamp, treating the value as nanoseconds and
/// truncating to whole milliseconds.
///
/// Zero means "unset".
pub fn at_time_from_wire(ticks: u64) -> Option<DateTime<Utc>> {
    if ticks == 0 {
        return None;
    }
    DateTime::from_timestamp_millis((ticks / 1_000_000) as i64)
}

/// A decoded packet: header, message type, source identifier and raw payload.
///
/// To interpret the payload, use [Response::from_packet].
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// `header.identifier` holds the same value as `source`.
    pub header: FrameHeader,
    pub typ: MessageType,
    pub source: u32,
    pub payload: Vec<u8>,
}

/// Packs a header, message type and payload into bytes that can be sent over the network.
///
/// The payload is copied verbatim; callers lay out its fields with [LittleEndianWriter].
pub fn encode(header: &FrameHeader, typ: MessageType, payload: &[u8]) -> Result<Vec<u8>, Error> {
    let size = HEADER_SIZE + payload.len();
    if size > u16::MAX as usize {
        return Err(Error::PayloadTooLarge(payload.len()));
    }

    let mut v = Vec::with_capacity(size);

    // frame
    v.write_val(size as u16)?;
    v.write_val(PROTOCOL_WORD)?;
    v.write_val(header.identifier)?;

    // frame address
    v.write_val(&header.target[..])?;
    v.write_val(&[0u8; 6][..])?;
    v.write_val(header.flags())?;
    v.write_val(header.sequence)?;

    // protocol header
    v.write_val(at_time_to_wire(header.at_time))?;
    v.write_val(typ.code())?;
    v.write_val(0u16)?;

    v.write_all(payload)?;
    Ok(v)
}

/// Given some bytes (generally read from a network socket), unpack them into a [Packet].
///
/// Fails with [Error::MalformedPacket] if the buffer is shorter than [HEADER_SIZE], if the size
/// field disagrees with the buffer length, or if the protocol number is not 1024.
pub fn decode(v: &[u8]) -> Result<Packet, Error> {
    if v.len() < HEADER_SIZE {
        return Err(Error::MalformedPacket(format!(
            "{} bytes is shorter than the {} byte header",
            v.len(),
            HEADER_SIZE
        )));
    }

    let mut c = Cursor::new(v);

    let size: u16 = c.read_val()?;
    if size as usize != v.len() {
        return Err(Error::MalformedPacket(format!(
            "size field says {} bytes but {} were received",
            size,
            v.len()
        )));
    }

    // origin + tagged + addressable + protocol
    let d: u16 = c.read_val()?;
    let protocol = d & 0b0000_1111_1111_1111;
    if protocol != PROTOCOL_NUMBER {
        return Err(Error::MalformedPacket(format!(
            "unpacked frame had protocol version {}",
            protocol
        )));
    }
    let source: u32 = c.read_val()?;

    let mut target = [0; 8];
    c.read_exact(&mut target)?;
    let mut reserved = [0; 6];
    c.read_exact(&mut reserved)?;
    let flags: u8 = c.read_val()?;
    let sequence: u8 = c.read_val()?;

    let at_time: u64 = c.read_val()?;
    let typ: u16 = c.read_val()?;
    let _reserved: u16 = c.read_val()?;

    let header = FrameHeader {
        identifier: source,
        sequence,
        ack_required: flags & 0b10 > 0,
        res_required: flags & 0b01 > 0,
        target,
        at_time: at_time_from_wire(at_time),
    };

    Ok(Packet {
        header,
        typ: MessageType::from(typ),
        source,
        payload: v[HEADER_SIZE..].to_vec(),
    })
}
