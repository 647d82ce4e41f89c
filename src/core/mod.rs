//! # Core Wire Components
//!
//! Fragment framing, the encryption envelope, payload splitting and the NACK codec.
//!
//! Everything here is pure: no sockets, no clocks, no shared state.
//!
//! ## Components
//! - **Frame**: the 13-byte fragment header and payload
//! - **Envelope**: the leading encryption flag and the [`envelope::Cipher`] seam
//! - **Fragmenter**: zero-copy payload splitting
//! - **Nack**: missing-index lists carried in NACK payloads
//!
//! ## Wire Format
//! ```text
//! [Flag(1)] [TransferId(4)] [Nonce(4)] [Index(2)] [Count(2)] [Type(1)] [Payload(N)]
//! ```

pub mod envelope;
pub mod fragmenter;
pub mod frame;
pub mod nack;
