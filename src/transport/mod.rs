//! # Transport Layer
//!
//! UDP endpoint for the fragment protocol.
//!
//! - [`udp`]: socket ownership, the receive and tick tasks, the public send API
//! - [`router`]: per-fragment policy applied on the receive path

pub mod router;
pub mod udp;

pub use udp::DatagramTransport;
