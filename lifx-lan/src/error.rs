use lifx_core::MessageType;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [LanClient](crate::LanClient) and the device and light operations.
#[derive(Error, Debug)]
pub enum Error {
    // ── Wire / socket ──
    #[error("codec error: {0}")]
    Codec(#[from] lifx_core::Error),

    #[error("socket error: {0}")]
    Io(#[from] io::Error),

    // ── Lifecycle ──
    #[error("client is already started")]
    AlreadyStarted,

    #[error("client is not started")]
    NotStarted,

    // ── Waiting for a reply ──
    #[error("no response after {0:?}")]
    Timeout(Duration),

    #[error("operation cancelled")]
    Cancelled,

    #[error("unexpected response of type {0:?}")]
    UnexpectedResponse(MessageType),

    // ── Caller input ──
    #[error("{name} is out of range: {value}")]
    OutOfRange { name: &'static str, value: i64 },

    #[error("invalid {name}: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("could not resolve host {0:?} to an IPv4 address")]
    UnresolvedHost(String),
}

pub type Result<T> = std::result::Result<T, Error>;
