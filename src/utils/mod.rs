//! # Utility Modules
//!
//! Supporting utilities for cryptography, logging, and observability.
//!
//! ## Components
//! - **Crypto**: XChaCha20-Poly1305 AEAD [`Cipher`](crate::core::envelope::Cipher)
//! - **Logging**: Structured logging configuration
//! - **Metrics**: Per-transport atomic counters
//!
//! ## Security
//! - Cryptographically secure RNG (getrandom) for AEAD nonces
//! - Memory zeroing for key material (zeroize crate)

pub mod crypto;
pub mod logging;
pub mod metrics;

pub use crypto::Crypto;
pub use metrics::{Metrics, MetricsSnapshot};
