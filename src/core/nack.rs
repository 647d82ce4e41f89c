//! NACK payload codec.
//!
//! ```text
//! [count: u16 LE] [index: u16 LE] × count
//! ```
//!
//! An empty payload, or a count of zero, means "abandon this transfer".

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};

/// Decoded NACK request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NackRequest {
    /// Resend exactly these fragment indices
    Resend(Vec<u16>),
    /// Stop retrying; the peer gave up on the transfer
    Abandon,
}

impl NackRequest {
    /// Encode for the wire. `Abandon` encodes to an empty payload.
    pub fn encode(&self) -> Bytes {
        match self {
            NackRequest::Abandon => Bytes::new(),
            NackRequest::Resend(indices) => {
                let mut buf = BytesMut::with_capacity(2 + indices.len() * 2);
                buf.put_u16_le(indices.len() as u16);
                for &index in indices {
                    buf.put_u16_le(index);
                }
                buf.freeze()
            }
        }
    }

    /// Decode a NACK payload
    ///
    /// # Errors
    /// Returns `ProtocolError::MalformedNack` if the length disagrees with the count.
    pub fn decode(mut payload: &[u8]) -> Result<Self> {
        if payload.is_empty() {
            return Ok(NackRequest::Abandon);
        }
        if payload.len() < 2 {
            return Err(ProtocolError::MalformedNack);
        }

        let count = payload.get_u16_le() as usize;
        if count == 0 {
            return Ok(NackRequest::Abandon);
        }
        if payload.len() != count * 2 {
            return Err(ProtocolError::MalformedNack);
        }

        let indices = (0..count).map(|_| payload.get_u16_le()).collect();
        Ok(NackRequest::Resend(indices))
    }
}
