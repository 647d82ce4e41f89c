//! # Error Types
//!
//! Error handling for the datagram transport.
//!
//! This module defines every error variant the transport can produce, from socket
//! failures to malformed frames and reliability bookkeeping misuse.
//!
//! ## Error Categories
//! - **I/O Errors**: socket bind, send and receive failures
//! - **Framing Errors**: truncated headers, unknown fragment types, bad NACK payloads
//! - **Reliability Errors**: reconstructing an incomplete transfer, unknown transfer ids
//! - **Cryptographic Errors**: envelope encryption/decryption failures
//! - **Configuration Errors**: invalid or unreadable configuration
//!
//! Only a bind failure is expected to abort startup. Everything that happens on the
//! receive or tick task is logged and absorbed there.
//!
//! ## Example Usage
//! ```rust
//! use datagram_protocol::core::frame::Fragment;
//! use datagram_protocol::error::ProtocolError;
//!
//! match Fragment::from_bytes(&[0u8; 4]) {
//!     Err(ProtocolError::MalformedFrame(reason)) => println!("dropped: {reason}"),
//!     other => println!("unexpected: {other:?}"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Framing errors
    pub const ERR_SHORT_HEADER: &str = "datagram shorter than fragment header";
    pub const ERR_EMPTY_DATAGRAM: &str = "empty datagram";
    pub const ERR_UNKNOWN_ENVELOPE_FLAG: &str = "unknown envelope flag";
    pub const ERR_ZERO_FRAGMENT_COUNT: &str = "fragment count is zero";
    pub const ERR_INDEX_OUT_OF_RANGE: &str = "fragment index outside fragment count";
    pub const ERR_COUNT_MISMATCH: &str = "fragment count disagrees with earlier fragments";

    /// Send path errors
    pub const ERR_ZERO_FRAGMENT_SIZE: &str = "max fragment payload must be greater than 0";
    pub const ERR_RELIABLE_CONTROL: &str = "control messages cannot be sent reliably";
    pub const ERR_CONTROL_TOO_LARGE: &str = "control message does not fit in one fragment";
    pub const ERR_RESERVED_TYPE: &str = "ACK and NACK fragments are generated internally";

    /// Security errors
    pub const ERR_PLAINTEXT_REJECTED: &str =
        "plaintext datagram rejected while a cipher is installed";
    pub const ERR_NO_CIPHER: &str = "encrypted datagram received but no cipher is installed";

    /// Synchronization errors
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";
}

/// Primary error type for all transport operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Malformed NACK payload")]
    MalformedNack,

    #[error("Invalid fragment type: {0}")]
    InvalidFragmentType(u8),

    #[error("Transfer {0} is not complete")]
    IncompleteTransfer(i32),

    #[error("Unknown transfer: {0}")]
    UnknownTransfer(i32),

    #[error("Payload too large: {0} bytes")]
    OversizedPayload(usize),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Encryption failed")]
    EncryptionFailure,

    #[error("Decryption failed")]
    DecryptionFailure,

    #[error("Security error: {0}")]
    SecurityError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Synchronization primitive poisoned")]
    LockPoisoned,

    #[error("Custom error: {0}")]
    Custom(String),
}

impl<T> From<std::sync::PoisonError<T>> for ProtocolError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        ProtocolError::LockPoisoned
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
