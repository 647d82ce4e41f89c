//! Inbound fragment reassembly.
//!
//! Fragments arrive in any order and may be re-delivered; they are stored by index and
//! reconstructed in ascending index order. A duplicate index overwrites the earlier copy,
//! which is harmless because fragments of one transfer are byte-identical per index.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use bytes::{BufMut, Bytes, BytesMut};

use crate::core::frame::{Fragment, TransferId};
use crate::error::{constants, ProtocolError, Result};

/// Key under which an assembly is tracked
pub trait TransferKey: Hash + Eq + Clone {
    fn transfer_id(&self) -> TransferId;
}

impl TransferKey for TransferId {
    fn transfer_id(&self) -> TransferId {
        *self
    }
}

#[derive(Debug)]
struct Assembly {
    fragment_count: u16,
    parts: BTreeMap<u16, Bytes>,
}

/// Per-transfer fragment store
#[derive(Debug)]
pub struct ReassemblyBuffer<K> {
    entries: HashMap<K, Assembly>,
}

impl<K: TransferKey> Default for ReassemblyBuffer<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: TransferKey> ReassemblyBuffer<K> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Store a fragment under `key`, keyed by its index (last write wins)
    ///
    /// # Errors
    /// Returns `ProtocolError::MalformedFrame` if the index is outside the count or the
    /// count disagrees with fragments already held for this transfer. Nothing is stored
    /// in that case.
    pub fn add_fragment(&mut self, key: K, fragment: &Fragment) -> Result<()> {
        if fragment.fragment_count == 0 || fragment.fragment_index >= fragment.fragment_count {
            return Err(ProtocolError::MalformedFrame(
                constants::ERR_INDEX_OUT_OF_RANGE.to_string(),
            ));
        }

        let assembly = self.entries.entry(key).or_insert_with(|| Assembly {
            fragment_count: fragment.fragment_count,
            parts: BTreeMap::new(),
        });

        if assembly.fragment_count != fragment.fragment_count {
            return Err(ProtocolError::MalformedFrame(format!(
                "{} ({} != {})",
                constants::ERR_COUNT_MISMATCH,
                fragment.fragment_count,
                assembly.fragment_count
            )));
        }

        assembly
            .parts
            .insert(fragment.fragment_index, fragment.payload.clone());
        Ok(())
    }

    /// Whether every index in `[0, fragment_count)` is held. False for unknown keys.
    pub fn is_complete(&self, key: &K) -> bool {
        self.entries
            .get(key)
            .is_some_and(|a| a.parts.len() == a.fragment_count as usize)
    }

    /// Ascending indices not yet held. Empty when complete or when the key is unknown.
    pub fn missing_indices(&self, key: &K) -> Vec<u16> {
        match self.entries.get(key) {
            Some(a) => (0..a.fragment_count)
                .filter(|index| !a.parts.contains_key(index))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Concatenate the payloads in index order and drop the entry
    ///
    /// Each transfer can be reconstructed once; a second call reports it as unknown.
    ///
    /// # Errors
    /// - `ProtocolError::UnknownTransfer` if nothing is held for `key`
    /// - `ProtocolError::IncompleteTransfer` if fragments are still missing (the entry is kept)
    pub fn reconstruct(&mut self, key: &K) -> Result<Bytes> {
        let complete = match self.entries.get(key) {
            Some(a) => a.parts.len() == a.fragment_count as usize,
            None => return Err(ProtocolError::UnknownTransfer(key.transfer_id())),
        };
        if !complete {
            return Err(ProtocolError::IncompleteTransfer(key.transfer_id()));
        }

        let assembly = self
            .entries
            .remove(key)
            .ok_or_else(|| ProtocolError::UnknownTransfer(key.transfer_id()))?;

        if assembly.parts.len() == 1 {
            return Ok(assembly.parts.into_values().next().unwrap_or_default());
        }

        let total = assembly.parts.values().map(Bytes::len).sum();
        let mut out = BytesMut::with_capacity(total);
        for part in assembly.parts.values() {
            out.put_slice(part);
        }
        Ok(out.freeze())
    }

    /// Drop whatever is held for `key`
    pub fn discard(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of distinct indices held for `key`
    pub fn held(&self, key: &K) -> usize {
        self.entries.get(key).map_or(0, |a| a.parts.len())
    }

    /// Keys whose assemblies are complete and ready to reconstruct
    pub fn completed_keys(&self) -> Vec<K> {
        self.entries
            .iter()
            .filter(|(_, a)| a.parts.len() == a.fragment_count as usize)
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::core::fragmenter::split;
    use crate::core::frame::FragmentType;

    fn fragments(id: TransferId, payload: &[u8], max: usize) -> Vec<Fragment> {
        let parts = split(&Bytes::copy_from_slice(payload), max).expect("split");
        let count = parts.len() as u16;
        parts
            .into_iter()
            .enumerate()
            .map(|(i, payload)| Fragment {
                transfer_id: id,
                nonce: i as i32,
                fragment_index: i as u16,
                fragment_count: count,
                kind: FragmentType::Data,
                payload,
            })
            .collect()
    }

    #[test]
    fn test_reverse_order_reassembly() {
        let payload: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        let mut buffer = ReassemblyBuffer::new();

        let frags = fragments(5, &payload, 1024);
        for (n, fragment) in frags.iter().rev().enumerate() {
            assert!(!buffer.is_complete(&5));
            buffer.add_fragment(5, fragment).expect("add");
            assert_eq!(buffer.held(&5), n + 1);
        }

        assert!(buffer.is_complete(&5));
        assert!(buffer.missing_indices(&5).is_empty());
        assert_eq!(buffer.reconstruct(&5).expect("reconstruct"), payload);
        assert!(!buffer.contains(&5));
    }

    #[test]
    fn test_missing_indices_reports_gaps() {
        let mut buffer = ReassemblyBuffer::new();
        let frags = fragments(9, &[0u8; 50], 10);
        buffer.add_fragment(9, &frags[0]).expect("add");
        buffer.add_fragment(9, &frags[3]).expect("add");

        assert_eq!(buffer.missing_indices(&9), vec![1, 2, 4]);
        assert!(matches!(
            buffer.reconstruct(&9),
            Err(ProtocolError::IncompleteTransfer(9))
        ));
        assert!(buffer.contains(&9));
    }

    #[test]
    fn test_duplicate_index_does_not_complete() {
        let mut buffer = ReassemblyBuffer::new();
        let frags = fragments(1, &[1u8; 20], 10);
        buffer.add_fragment(1, &frags[0]).expect("add");
        buffer.add_fragment(1, &frags[0]).expect("add");
        assert!(!buffer.is_complete(&1));
        assert_eq!(buffer.held(&1), 1);
    }

    #[test]
    fn test_count_mismatch_rejected() {
        let mut buffer = ReassemblyBuffer::new();
        let frags = fragments(1, &[1u8; 20], 10);
        buffer.add_fragment(1, &frags[0]).expect("add");

        let mut liar = frags[1].clone();
        liar.fragment_count = 3;
        assert!(buffer.add_fragment(1, &liar).is_err());
        assert_eq!(buffer.held(&1), 1);
    }

    #[test]
    fn test_reconstruct_is_single_use() {
        let mut buffer = ReassemblyBuffer::new();
        let frags = fragments(2, b"hello", 1024);
        buffer.add_fragment(2, &frags[0]).expect("add");
        assert_eq!(&buffer.reconstruct(&2).expect("first")[..], b"hello");
        assert!(matches!(
            buffer.reconstruct(&2),
            Err(ProtocolError::UnknownTransfer(2))
        ));
    }

    #[test]
    fn test_completed_keys() {
        let mut buffer = ReassemblyBuffer::new();
        let a = fragments(1, b"a", 10);
        let b = fragments(2, &[0u8; 30], 10);
        buffer.add_fragment(1, &a[0]).expect("add");
        buffer.add_fragment(2, &b[0]).expect("add");
        assert_eq!(buffer.completed_keys(), vec![1]);
        assert_eq!(buffer.len(), 2);
    }
}
