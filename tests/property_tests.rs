//! Property-based tests using proptest
//!
//! These tests validate framing and reassembly invariants across a wide range of randomly
//! generated inputs.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeSet;

use bytes::Bytes;
use datagram_protocol::core::fragmenter::split;
use datagram_protocol::core::frame::{Fragment, FragmentType};
use datagram_protocol::core::nack::NackRequest;
use datagram_protocol::reliability::ReassemblyBuffer;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

fn kind_strategy() -> impl Strategy<Value = FragmentType> {
    prop_oneof![
        Just(FragmentType::Data),
        Just(FragmentType::Ack),
        Just(FragmentType::Nack),
        Just(FragmentType::Control),
        Just(FragmentType::Unencrypted),
    ]
}

fn fragment_strategy() -> impl Strategy<Value = Fragment> {
    (1u16..=u16::MAX)
        .prop_flat_map(|count| {
            (
                any::<i32>(),
                any::<i32>(),
                0..count,
                Just(count),
                kind_strategy(),
                prop::collection::vec(any::<u8>(), 0..2048),
            )
        })
        .prop_map(|(transfer_id, nonce, index, count, kind, payload)| Fragment {
            transfer_id,
            nonce,
            fragment_index: index,
            fragment_count: count,
            kind,
            payload: Bytes::from(payload),
        })
}

fn fragments_of(payload: &[u8], max: usize) -> Vec<Fragment> {
    let parts = split(&Bytes::copy_from_slice(payload), max).expect("split");
    let count = parts.len() as u16;
    parts
        .into_iter()
        .enumerate()
        .map(|(i, payload)| Fragment {
            transfer_id: 1,
            nonce: i as i32,
            fragment_index: i as u16,
            fragment_count: count,
            kind: FragmentType::Data,
            payload,
        })
        .collect()
}

// Property: Any valid fragment survives encode/decode unchanged
proptest! {
    #[test]
    fn prop_fragment_roundtrip(fragment in fragment_strategy()) {
        let bytes = fragment.to_bytes();
        prop_assert_eq!(bytes.len(), fragment.encoded_len());

        let decoded = Fragment::from_bytes(&bytes).expect("Decoding should not fail");
        prop_assert_eq!(decoded, fragment);
    }
}

// Property: Decoding arbitrary bytes never panics
proptest! {
    #[test]
    fn prop_decode_arbitrary_bytes(data in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = Fragment::from_bytes(&data);
        let _ = NackRequest::decode(&data);
    }
}

// Property: Split pieces respect the limit and concatenate to the input
proptest! {
    #[test]
    fn prop_split_bounds(
        payload in prop::collection::vec(any::<u8>(), 0..8000),
        max in 1usize..2048,
    ) {
        let parts = split(&Bytes::from(payload.clone()), max).expect("split");
        prop_assert!(!parts.is_empty());
        prop_assert!(parts.iter().all(|p| p.len() <= max));
        prop_assert_eq!(parts.len(), payload.len().div_ceil(max).max(1));

        let joined: Vec<u8> = parts.iter().flat_map(|p| p.iter().copied()).collect();
        prop_assert_eq!(joined, payload);
    }
}

// Property: Any arrival order, with duplicates, reconstructs the original payload
proptest! {
    #[test]
    fn prop_reassembly_any_order(
        payload in prop::collection::vec(any::<u8>(), 0..5000),
        max in 1usize..1500,
        seed in any::<u64>(),
        duplicates in 0usize..20,
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let fragments = fragments_of(&payload, max);

        let mut arrivals = fragments.clone();
        for _ in 0..duplicates {
            let pick = rng.random_range(0..fragments.len());
            arrivals.push(fragments[pick].clone());
        }
        arrivals.shuffle(&mut rng);

        let mut buffer = ReassemblyBuffer::new();
        for fragment in &arrivals {
            buffer.add_fragment(1, fragment).expect("add");
        }
        prop_assert!(buffer.is_complete(&1));
        let rebuilt = buffer.reconstruct(&1).expect("reconstruct");
        prop_assert_eq!(&rebuilt[..], &payload[..]);
    }
}

// Property: Completion flips exactly when the last distinct index arrives
proptest! {
    #[test]
    fn prop_completion_on_last_distinct_index(
        count in 1usize..200,
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let fragments = fragments_of(&vec![0u8; count * 4], 4);
        let mut order: Vec<usize> = (0..fragments.len()).collect();
        order.shuffle(&mut rng);

        let mut buffer = ReassemblyBuffer::new();
        let mut seen = BTreeSet::new();
        for index in order {
            prop_assert!(!buffer.is_complete(&1));
            buffer.add_fragment(1, &fragments[index]).expect("add");
            seen.insert(index);
            prop_assert_eq!(buffer.is_complete(&1), seen.len() == fragments.len());
        }
    }
}

// Property: Missing indices are exactly the complement of what is held
proptest! {
    #[test]
    fn prop_missing_indices_complement(
        held in prop::collection::btree_set(0u16..300, 1..120),
    ) {
        let count = 300u16;
        let mut buffer = ReassemblyBuffer::new();
        for &index in &held {
            let fragment = Fragment {
                transfer_id: 9,
                nonce: 0,
                fragment_index: index,
                fragment_count: count,
                kind: FragmentType::Data,
                payload: Bytes::from_static(b"x"),
            };
            buffer.add_fragment(9, &fragment).expect("add");
        }

        let expected: Vec<u16> = (0..count).filter(|i| !held.contains(i)).collect();
        prop_assert_eq!(buffer.missing_indices(&9), expected);
    }
}

// Property: NACK lists survive encoding
proptest! {
    #[test]
    fn prop_nack_roundtrip(indices in prop::collection::vec(any::<u16>(), 1..500)) {
        let request = NackRequest::Resend(indices);
        let decoded = NackRequest::decode(&request.encode()).expect("decode");
        prop_assert_eq!(decoded, request);
    }
}
