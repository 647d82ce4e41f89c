//! # Reliability Layer
//!
//! Receiver-driven reliability on top of the fragment codec.
//!
//! - [`reassembly`]: per-transfer fragment storage and payload reconstruction
//! - [`duplicate`]: retired-transfer tracking and duplicate suppression
//! - [`outbound`]: sender-side state for transfers awaiting an ACK
//! - [`coordinator`]: the ticked state machine tying the above together
//! - [`action`]: work items and application events produced by the coordinator
//!
//! The receiver detects gaps and names them in a NACK; the sender answers with exactly
//! those fragments. A completed transfer is acknowledged once and then retired.

pub mod action;
pub mod coordinator;
pub mod duplicate;
pub mod outbound;
pub mod reassembly;

use std::net::SocketAddr;

use crate::core::frame::TransferId;
use reassembly::TransferKey;

pub use action::{Action, FailureReason, TransportEvent};
pub use coordinator::{Coordinator, Outgoing};
pub use duplicate::{DuplicateGuard, DuplicateVerdict};
pub use reassembly::ReassemblyBuffer;

/// A transfer as seen by the receiving side: the sender's address plus its transfer id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerTransfer {
    pub peer: SocketAddr,
    pub transfer_id: TransferId,
}

impl PeerTransfer {
    pub fn new(peer: SocketAddr, transfer_id: TransferId) -> Self {
        Self { peer, transfer_id }
    }
}

impl TransferKey for PeerTransfer {
    fn transfer_id(&self) -> TransferId {
        self.transfer_id
    }
}
