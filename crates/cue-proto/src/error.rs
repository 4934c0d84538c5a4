//! Protocol-level error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
    /// Reply payload could not be decoded into the expected value.
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// Address does not belong to the engine protocol.
    #[error("unknown address: {0}")]
    UnknownAddress(String),

    /// Role name is not one of MAIN, BACKUP or ONLY.
    #[error("unknown source role: {0}")]
    UnknownRole(String),

    /// Control frame length header exceeds the accepted maximum.
    #[error("control frame of {0} bytes is too large")]
    FrameTooLarge(usize),

    /// Complete control frame whose body is not a valid message.
    #[error("invalid control frame: {reason}")]
    InvalidFrame { consumed: usize, reason: String },
}

pub type ProtoResult<T> = Result<T, ProtoError>;
