//! # Datagram Protocol
//!
//! Reliable, fragmenting, optionally encrypted message delivery over UDP.
//!
//! Payloads of any size up to the configured limit are split into fragments that each fit
//! one datagram, reassembled on the far side regardless of arrival order, and, when sent
//! reliably, confirmed with a single ACK. Reliability is receiver-driven: the receiver
//! names missing fragments in a NACK and the sender resends exactly those.
//!
//! ## Layers
//! - [`core`]: fragment codec, encryption envelope, fragmenter, NACK payloads
//! - [`reliability`]: reassembly, duplicate suppression and the ticked retry state machine
//! - [`transport`]: the UDP endpoint and its event channel
//! - [`utils`]: cipher implementation, logging setup, metrics
//!
//! ## Quick Start
//! ```no_run
//! use datagram_protocol::{DatagramTransport, FragmentType, TransportConfig, TransportEvent};
//!
//! # async fn run() -> datagram_protocol::Result<()> {
//! let (transport, mut events) = DatagramTransport::bind(TransportConfig::default()).await?;
//! transport
//!     .send(&b"hello"[..], true, FragmentType::Data, "127.0.0.1:9000".parse().unwrap())
//!     .await?;
//!
//! if let Some(TransportEvent::Delivered { payload, origin, .. }) = events.recv().await {
//!     println!("{} bytes from {origin}", payload.len());
//! }
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod core;
pub mod error;
pub mod reliability;
pub mod transport;
pub mod utils;

pub use crate::config::{NetworkConfig, TransportConfig};
pub use crate::core::envelope::Cipher;
pub use crate::core::frame::{Fragment, FragmentType, TransferId};
pub use crate::error::{ProtocolError, Result};
pub use crate::reliability::{FailureReason, TransportEvent};
pub use crate::transport::DatagramTransport;
pub use crate::utils::crypto::Crypto;
