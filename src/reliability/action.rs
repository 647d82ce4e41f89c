//! What the reliability layer asks the transport to do.
//!
//! Decisions are made under the table locks; the resulting [`Action`]s are carried out
//! by the transport after the locks are released, so no lock is ever held across
//! socket I/O.

use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;

use crate::core::frame::{Fragment, TransferId};

/// Why an outbound transfer was given up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// No acknowledgment within `max_attempts` check intervals
    RetriesExhausted,
    /// The peer sent an empty NACK
    PeerAbandoned,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::RetriesExhausted => f.write_str("retries exhausted"),
            FailureReason::PeerAbandoned => f.write_str("peer abandoned transfer"),
        }
    }
}

/// Events surfaced to the application on the transport's event channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A transfer was fully reassembled; fired once per transfer
    Delivered {
        transfer_id: TransferId,
        payload: Bytes,
        origin: SocketAddr,
    },
    /// A reliable send was confirmed by the peer
    Acknowledged {
        transfer_id: TransferId,
        peer: SocketAddr,
    },
    /// A reliable send was given up
    DeliveryFailed {
        transfer_id: TransferId,
        peer: SocketAddr,
        reason: FailureReason,
    },
    /// The socket rejected a datagram
    SendFailed {
        transfer_id: TransferId,
        dest: SocketAddr,
        error: String,
    },
    /// A datagram failed decryption or violated the envelope policy
    SecurityViolation { peer: SocketAddr, reason: String },
}

/// One unit of work for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write `fragment` to `dest`; `plaintext` forces the unencrypted envelope
    Send {
        fragment: Fragment,
        dest: SocketAddr,
        plaintext: bool,
    },
    /// Hand an event to the application
    Emit(TransportEvent),
}

impl Action {
    pub fn send(fragment: Fragment, dest: SocketAddr, plaintext: bool) -> Self {
        Action::Send {
            fragment,
            dest,
            plaintext,
        }
    }
}
