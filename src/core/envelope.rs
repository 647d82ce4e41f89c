//! # Encryption Envelope
//!
//! Every datagram starts with a one-byte flag telling the receiver whether the
//! fragment that follows is plaintext or ciphertext.
//!
//! ```text
//! [flag(1)] [header(13) ‖ payload]            flag = 0
//! [flag(1)] [ciphertext(header ‖ payload)]    flag = 1
//! ```
//!
//! The transport never manages key material. It consumes an opaque [`Cipher`] supplied
//! by whatever session/handshake layer owns the keys.

use bytes::Bytes;

use crate::core::frame::Fragment;
use crate::error::{constants, ProtocolError, Result};

/// Flag byte for a plaintext fragment
pub const FLAG_PLAINTEXT: u8 = 0;

/// Flag byte for an encrypted fragment
pub const FLAG_ENCRYPTED: u8 = 1;

/// Symmetric encryption capability supplied by the session layer
///
/// `decrypt` must authenticate: bytes from a frame that fails authentication are never
/// handed to the codec.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// A fragment taken out of its envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opened {
    pub fragment: Fragment,
    /// Whether the datagram arrived with the encrypted flag
    pub encrypted: bool,
}

/// Wrap a fragment for the wire, encrypting it when a cipher is given
///
/// # Errors
/// Propagates `ProtocolError::EncryptionFailure` from the cipher.
pub fn seal(fragment: &Fragment, cipher: Option<&dyn Cipher>) -> Result<Vec<u8>> {
    match cipher {
        Some(cipher) => {
            let ciphertext = cipher.encrypt(&fragment.to_bytes())?;
            let mut datagram = Vec::with_capacity(1 + ciphertext.len());
            datagram.push(FLAG_ENCRYPTED);
            datagram.extend_from_slice(&ciphertext);
            Ok(datagram)
        }
        None => {
            let mut datagram = Vec::with_capacity(1 + fragment.encoded_len());
            datagram.push(FLAG_PLAINTEXT);
            fragment.encode_into(&mut datagram);
            Ok(datagram)
        }
    }
}

/// Strip the envelope and decode the fragment inside
///
/// # Errors
/// - `ProtocolError::MalformedFrame` for an empty datagram, an unknown flag or a bad header
/// - `ProtocolError::SecurityError` for ciphertext when no cipher is installed
/// - `ProtocolError::DecryptionFailure` when authentication fails
pub fn open(datagram: &[u8], cipher: Option<&dyn Cipher>) -> Result<Opened> {
    let (&flag, body) = datagram
        .split_first()
        .ok_or_else(|| ProtocolError::MalformedFrame(constants::ERR_EMPTY_DATAGRAM.to_string()))?;

    match flag {
        FLAG_PLAINTEXT => Ok(Opened {
            fragment: Fragment::from_bytes(body)?,
            encrypted: false,
        }),
        FLAG_ENCRYPTED => {
            let cipher = cipher
                .ok_or_else(|| ProtocolError::SecurityError(constants::ERR_NO_CIPHER.to_string()))?;
            let plaintext = cipher.decrypt(body)?;
            Ok(Opened {
                fragment: Fragment::decode(Bytes::from(plaintext))?,
                encrypted: true,
            })
        }
        other => Err(ProtocolError::MalformedFrame(format!(
            "{}: {other}",
            constants::ERR_UNKNOWN_ENVELOPE_FLAG
        ))),
    }
}
