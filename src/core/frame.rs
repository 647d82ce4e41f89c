//! # Fragment Framing
//!
//! The fixed 13-byte fragment header and its payload.
//!
//! ## Wire Format
//! ```text
//! offset 0  i32 transfer_id    (little-endian)
//! offset 4  i32 nonce
//! offset 8  u16 fragment_index
//! offset 10 u16 fragment_count
//! offset 12 u8  type
//! offset 13 ... payload
//! ```
//!
//! The encryption flag byte that precedes the header on the wire belongs to the
//! envelope (see [`crate::core::envelope`]), not to this codec.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{constants, ProtocolError, Result};

/// Size of the serialized fragment header in bytes
pub const HEADER_LEN: usize = 4 + 4 + 2 + 2 + 1;

/// Identifies all fragments belonging to one logical message
pub type TransferId = i32;

/// Fragment type byte
///
/// Numbering is part of the wire contract and must match between peers.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentType {
    /// Application data, carried inside the encryption envelope
    Data = 0,
    /// Confirms a transfer was fully reassembled
    Ack = 1,
    /// Requests missing fragments, or abandons a transfer when empty
    Nack = 2,
    /// In-band UTF-8 text command such as `ping`
    Control = 3,
    /// Application data that bypasses encryption (bootstrap traffic)
    Unencrypted = 4,
}

impl FragmentType {
    /// Wire value of this type
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable name used in logs
    pub fn name(self) -> &'static str {
        match self {
            FragmentType::Data => "DATA",
            FragmentType::Ack => "ACK",
            FragmentType::Nack => "NACK",
            FragmentType::Control => "CONTROL",
            FragmentType::Unencrypted => "UNENCRYPTED",
        }
    }
}

impl TryFrom<u8> for FragmentType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(FragmentType::Data),
            1 => Ok(FragmentType::Ack),
            2 => Ok(FragmentType::Nack),
            3 => Ok(FragmentType::Control),
            4 => Ok(FragmentType::Unencrypted),
            other => Err(ProtocolError::InvalidFragmentType(other)),
        }
    }
}

/// One datagram-sized slice of a transfer, after the envelope is stripped
///
/// Peer provenance is not part of the frame; the receive path carries the source
/// address next to the decoded fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub transfer_id: TransferId,
    /// Random per physical send attempt; only used for duplicate and loop detection
    pub nonce: i32,
    pub fragment_index: u16,
    pub fragment_count: u16,
    pub kind: FragmentType,
    pub payload: Bytes,
}

impl Fragment {
    /// Build an unfragmented message (`fragment_count == 1`)
    pub fn single(
        transfer_id: TransferId,
        nonce: i32,
        kind: FragmentType,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            transfer_id,
            nonce,
            fragment_index: 0,
            fragment_count: 1,
            kind,
            payload: payload.into(),
        }
    }

    /// Length of the encoded header plus payload
    #[inline]
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Append the header and payload to `dst`
    pub fn encode_into(&self, dst: &mut impl BufMut) {
        dst.put_i32_le(self.transfer_id);
        dst.put_i32_le(self.nonce);
        dst.put_u16_le(self.fragment_index);
        dst.put_u16_le(self.fragment_count);
        dst.put_u8(self.kind.as_u8());
        dst.put_slice(&self.payload);
    }

    /// Serialize to a freshly allocated buffer
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    /// Decode a frame, borrowing the payload from `src` without copying
    ///
    /// # Errors
    /// Returns `ProtocolError::MalformedFrame` if the header is truncated, the type byte
    /// is unknown, or the index/count pair is inconsistent.
    pub fn decode(mut src: Bytes) -> Result<Self> {
        if src.len() < HEADER_LEN {
            return Err(ProtocolError::MalformedFrame(format!(
                "{} ({} < {HEADER_LEN} bytes)",
                constants::ERR_SHORT_HEADER,
                src.len()
            )));
        }

        let transfer_id = src.get_i32_le();
        let nonce = src.get_i32_le();
        let fragment_index = src.get_u16_le();
        let fragment_count = src.get_u16_le();
        let kind = FragmentType::try_from(src.get_u8())
            .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;

        let fragment = Self {
            transfer_id,
            nonce,
            fragment_index,
            fragment_count,
            kind,
            payload: src,
        };
        fragment.check_position()?;
        Ok(fragment)
    }

    /// Decode a frame from a borrowed slice, copying the payload
    pub fn from_bytes(src: &[u8]) -> Result<Self> {
        Self::decode(Bytes::copy_from_slice(src))
    }

    /// Encode into a `BytesMut` and freeze it
    pub fn to_frozen(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    fn check_position(&self) -> Result<()> {
        if self.fragment_count == 0 {
            return Err(ProtocolError::MalformedFrame(
                constants::ERR_ZERO_FRAGMENT_COUNT.to_string(),
            ));
        }
        if self.fragment_index >= self.fragment_count {
            return Err(ProtocolError::MalformedFrame(format!(
                "{} ({} >= {})",
                constants::ERR_INDEX_OUT_OF_RANGE,
                self.fragment_index,
                self.fragment_count
            )));
        }
        Ok(())
    }
}
