//! Chaos engineering tests
//!
//! Drives two in-memory endpoints over a simulated network that drops, reorders and
//! duplicates datagrams, and checks that transfers either arrive intact or fail cleanly.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use common::{patterned, Endpoint};
use datagram_protocol::config::TransportConfig;
use datagram_protocol::core::frame::{Fragment, TransferId};
use datagram_protocol::reliability::{Action, TransportEvent};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

type EventLog = Vec<(SocketAddr, TransportEvent)>;

struct Datagram {
    fragment: Fragment,
    from: SocketAddr,
    to: SocketAddr,
}

/// Simulated link between two endpoints
struct Network {
    rng: StdRng,
    loss_rate: f64,
    duplicate_rate: f64,
    reorder: bool,
    partitioned: bool,
    in_flight: Vec<Datagram>,
}

impl Network {
    fn new(seed: u64, loss_rate: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            loss_rate,
            duplicate_rate: 0.0,
            reorder: false,
            partitioned: false,
            in_flight: Vec::new(),
        }
    }

    /// Simulates packet loss (returns true if the datagram should be dropped)
    fn simulate_packet_loss(&mut self) -> bool {
        self.partitioned || self.rng.random::<f64>() < self.loss_rate
    }

    fn collect(&mut self, from: &Endpoint, actions: Vec<Action>, events: &mut EventLog) {
        for action in actions {
            match action {
                Action::Send { fragment, dest, .. } => self.in_flight.push(Datagram {
                    fragment,
                    from: from.addr,
                    to: dest,
                }),
                Action::Emit(event) => events.push((from.addr, event)),
            }
        }
    }

    /// One round: deliver everything in flight, then tick both endpoints
    fn round(&mut self, a: &Endpoint, b: &Endpoint, events: &mut EventLog) {
        let mut batch = std::mem::take(&mut self.in_flight);
        if self.reorder {
            batch.shuffle(&mut self.rng);
        }

        for datagram in batch {
            if self.simulate_packet_loss() {
                continue;
            }
            let copies = if self.rng.random::<f64>() < self.duplicate_rate { 2 } else { 1 };
            let target = if datagram.to == a.addr { a } else { b };
            for _ in 0..copies {
                let actions = target.deliver(&datagram.fragment, datagram.from);
                self.collect(target, actions, events);
            }
        }

        for endpoint in [a, b] {
            let actions = endpoint.tick();
            self.collect(endpoint, actions, events);
        }
    }
}

fn patient_config() -> TransportConfig {
    TransportConfig {
        check_interval_ticks: 5,
        max_attempts: 40,
        ..TransportConfig::default()
    }
}

fn delivered(events: &[(SocketAddr, TransportEvent)]) -> HashMap<TransferId, Vec<Bytes>> {
    let mut out: HashMap<TransferId, Vec<Bytes>> = HashMap::new();
    for (_, event) in events {
        if let TransportEvent::Delivered {
            transfer_id,
            payload,
            ..
        } = event
        {
            out.entry(*transfer_id).or_default().push(payload.clone());
        }
    }
    out
}

fn resolved(events: &[(SocketAddr, TransportEvent)], transfer_id: TransferId) -> bool {
    events.iter().any(|(_, e)| {
        matches!(
            e,
            TransportEvent::Acknowledged { transfer_id: id, .. }
                | TransportEvent::DeliveryFailed { transfer_id: id, .. }
                if *id == transfer_id
        )
    })
}

#[test]
fn test_transfers_survive_heavy_loss() {
    let config = patient_config();
    let a = Endpoint::new(5001, &config);
    let b = Endpoint::new(5002, &config);
    let mut net = Network::new(0xC4A05, 0.2);
    let mut events = Vec::new();

    let payloads: Vec<Vec<u8>> = (1..=5).map(|n| patterned(n * 8000)).collect();
    for payload in &payloads {
        let out = a.send(payload, true, b.addr);
        let actions = out
            .fragments
            .into_iter()
            .map(|f| Action::send(f, out.dest, out.plaintext))
            .collect();
        net.collect(&a, actions, &mut events);
    }

    for _ in 0..2_000 {
        net.round(&a, &b, &mut events);
    }

    let delivered = delivered(&events);
    assert_eq!(delivered.len(), payloads.len());
    for copies in delivered.values() {
        assert_eq!(copies.len(), 1, "each transfer is delivered once");
        assert!(payloads.iter().any(|p| copies[0][..] == p[..]));
    }
    for id in delivered.keys() {
        assert!(resolved(&events, *id), "sender outcome for {id} never reported");
    }
    assert_eq!(a.coordinator.pending_outbound(), 0);
    assert_eq!(b.coordinator.pending_inbound(), 0);
    assert!(a.metrics.snapshot().fragments_resent > 0);
}

#[test]
fn test_reordering_and_duplication_deliver_once() {
    let config = patient_config();
    let a = Endpoint::new(5011, &config);
    let b = Endpoint::new(5012, &config);
    let mut net = Network::new(99, 0.0);
    net.reorder = true;
    net.duplicate_rate = 0.3;
    let mut events = Vec::new();

    let payload = patterned(30_000);
    let out = a.send(&payload, true, b.addr);
    let id = out.transfer_id;
    let actions = out
        .fragments
        .into_iter()
        .map(|f| Action::send(f, out.dest, out.plaintext))
        .collect();
    net.collect(&a, actions, &mut events);

    for _ in 0..50 {
        net.round(&a, &b, &mut events);
    }

    let delivered = delivered(&events);
    assert_eq!(delivered[&id], vec![Bytes::from(payload)]);
    assert!(events.iter().any(|(_, e)| matches!(
        e,
        TransportEvent::Acknowledged { transfer_id, .. } if *transfer_id == id
    )));
}

#[test]
fn test_partition_fails_cleanly_then_recovers() {
    let config = TransportConfig {
        check_interval_ticks: 2,
        max_attempts: 3,
        ..TransportConfig::default()
    };
    let a = Endpoint::new(5021, &config);
    let b = Endpoint::new(5022, &config);
    let mut net = Network::new(7, 0.0);
    net.partitioned = true;
    let mut events = Vec::new();

    let lost = a.send(&patterned(5000), true, b.addr);
    let actions = lost
        .fragments
        .into_iter()
        .map(|f| Action::send(f, lost.dest, lost.plaintext))
        .collect();
    net.collect(&a, actions, &mut events);

    for _ in 0..20 {
        net.round(&a, &b, &mut events);
    }
    assert!(events.iter().any(|(_, e)| matches!(
        e,
        TransportEvent::DeliveryFailed { transfer_id, .. } if *transfer_id == lost.transfer_id
    )));
    assert_eq!(a.coordinator.pending_outbound(), 0);

    net.partitioned = false;
    let payload = patterned(5000);
    let healed = a.send(&payload, true, b.addr);
    let actions = healed
        .fragments
        .into_iter()
        .map(|f| Action::send(f, healed.dest, healed.plaintext))
        .collect();
    net.collect(&a, actions, &mut events);

    for _ in 0..10 {
        net.round(&a, &b, &mut events);
    }
    assert_eq!(delivered(&events)[&healed.transfer_id], vec![Bytes::from(payload)]);
}
