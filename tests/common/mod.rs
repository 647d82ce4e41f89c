//! In-memory endpoints for driving the reliability layer without sockets.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use datagram_protocol::config::TransportConfig;
use datagram_protocol::core::envelope;
use datagram_protocol::core::frame::{Fragment, FragmentType};
use datagram_protocol::reliability::{Action, Coordinator, Outgoing, TransportEvent};
use datagram_protocol::transport::router;
use datagram_protocol::utils::metrics::Metrics;

pub struct Endpoint {
    pub addr: SocketAddr,
    pub coordinator: Coordinator,
    pub metrics: Arc<Metrics>,
}

impl Endpoint {
    pub fn new(port: u16, config: &TransportConfig) -> Self {
        let metrics = Arc::new(Metrics::new());
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], port)),
            coordinator: Coordinator::new(config, metrics.clone()),
            metrics,
        }
    }

    pub fn send(&self, payload: &[u8], reliable: bool, dest: SocketAddr) -> Outgoing {
        self.coordinator
            .prepare_send(
                Bytes::copy_from_slice(payload),
                reliable,
                FragmentType::Data,
                dest,
                true,
            )
            .expect("prepare_send")
    }

    /// Push a fragment through the plaintext envelope and route it as if it came from `from`
    pub fn deliver(&self, fragment: &Fragment, from: SocketAddr) -> Vec<Action> {
        let datagram = envelope::seal(fragment, None).expect("seal");
        let opened = envelope::open(&datagram, None).expect("open");
        router::route(&self.coordinator, &self.metrics, opened, from, false).expect("route")
    }

    pub fn tick(&self) -> Vec<Action> {
        self.coordinator.tick().expect("tick")
    }
}

/// Separate datagrams to send from events to surface
pub fn partition(actions: Vec<Action>) -> (Vec<(Fragment, SocketAddr)>, Vec<TransportEvent>) {
    let mut sends = Vec::new();
    let mut events = Vec::new();
    for action in actions {
        match action {
            Action::Send { fragment, dest, .. } => sends.push((fragment, dest)),
            Action::Emit(event) => events.push(event),
        }
    }
    (sends, events)
}

pub fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
