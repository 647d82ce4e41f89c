//! Splits outbound payloads into fragment-sized slices.

use bytes::Bytes;

use crate::error::{constants, ProtocolError, Result};

/// Largest number of fragments one transfer can carry (`fragment_count` is a `u16`)
pub const MAX_FRAGMENTS: usize = u16::MAX as usize;

/// Split `payload` into ordered slices of at most `max_fragment_payload` bytes
///
/// Slices share the payload's buffer. An empty payload yields exactly one empty slice so
/// that zero-length reliable messages still get acknowledged.
///
/// # Errors
/// - `ProtocolError::InvalidRequest` if `max_fragment_payload` is zero
/// - `ProtocolError::OversizedPayload` if more than [`MAX_FRAGMENTS`] slices would be needed
pub fn split(payload: &Bytes, max_fragment_payload: usize) -> Result<Vec<Bytes>> {
    if max_fragment_payload == 0 {
        return Err(ProtocolError::InvalidRequest(
            constants::ERR_ZERO_FRAGMENT_SIZE.to_string(),
        ));
    }

    if payload.is_empty() {
        return Ok(vec![Bytes::new()]);
    }

    let count = payload.len().div_ceil(max_fragment_payload);
    if count > MAX_FRAGMENTS {
        return Err(ProtocolError::OversizedPayload(payload.len()));
    }

    Ok((0..count)
        .map(|i| {
            let start = i * max_fragment_payload;
            let end = (start + max_fragment_payload).min(payload.len());
            payload.slice(start..end)
        })
        .collect())
}
