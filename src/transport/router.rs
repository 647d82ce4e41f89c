//! Inbound fragment routing.
//!
//! Applies the envelope policy, filters duplicates and echoes, answers control traffic
//! and hands data fragments to the coordinator. Runs synchronously on the receive task;
//! any I/O it decides on comes back as [`Action`]s.

use std::net::SocketAddr;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::core::envelope::Opened;
use crate::core::frame::{Fragment, FragmentType};
use crate::core::nack::NackRequest;
use crate::error::{constants, Result};
use crate::reliability::{
    Action, Coordinator, DuplicateVerdict, FailureReason, PeerTransfer, TransportEvent,
};
use crate::utils::metrics::Metrics;

/// Command answered in-band with [`PONG`]
pub const PING: &str = "ping";
pub const PONG: &str = "pong";

/// Decide what to do with one opened fragment from `origin`
///
/// # Errors
/// Returns decode errors for fragments whose payload is malformed (a bad NACK list or a
/// fragment count that contradicts earlier fragments). The caller discards the datagram.
pub fn route(
    coordinator: &Coordinator,
    metrics: &Metrics,
    opened: Opened,
    origin: SocketAddr,
    cipher_installed: bool,
) -> Result<Vec<Action>> {
    let Opened {
        fragment,
        encrypted,
    } = opened;

    if cipher_installed && !encrypted && !plaintext_allowed(coordinator, &fragment)? {
        metrics.security_violation();
        warn!(
            peer = %origin,
            transfer_id = fragment.transfer_id,
            kind = fragment.kind.name(),
            "Plaintext datagram rejected"
        );
        return Ok(vec![Action::Emit(TransportEvent::SecurityViolation {
            peer: origin,
            reason: format!(
                "{} ({})",
                constants::ERR_PLAINTEXT_REJECTED,
                fragment.kind.name()
            ),
        })]);
    }

    match fragment.kind {
        FragmentType::Data | FragmentType::Unencrypted => {
            on_data(coordinator, fragment, origin, !encrypted)
        }
        FragmentType::Ack => {
            metrics.ack_received();
            let acknowledged = coordinator.acknowledge(fragment.transfer_id, origin)?;
            Ok(if acknowledged {
                vec![Action::Emit(TransportEvent::Acknowledged {
                    transfer_id: fragment.transfer_id,
                    peer: origin,
                })]
            } else {
                Vec::new()
            })
        }
        FragmentType::Nack => {
            metrics.nack_received();
            match NackRequest::decode(&fragment.payload)? {
                NackRequest::Resend(indices) => {
                    coordinator.resend(fragment.transfer_id, origin, &indices)
                }
                NackRequest::Abandon => {
                    let abandoned = coordinator.abandon_outbound(fragment.transfer_id, origin)?;
                    Ok(if abandoned {
                        vec![Action::Emit(TransportEvent::DeliveryFailed {
                            transfer_id: fragment.transfer_id,
                            peer: origin,
                            reason: FailureReason::PeerAbandoned,
                        })]
                    } else {
                        Vec::new()
                    })
                }
            }
        }
        FragmentType::Control => Ok(on_control(&fragment, origin, !encrypted)),
    }
}

/// Plaintext is tolerated under an installed cipher only for bootstrap fragments and
/// for ACK/NACK about transfers this side itself sent in plaintext.
fn plaintext_allowed(coordinator: &Coordinator, fragment: &Fragment) -> Result<bool> {
    Ok(match fragment.kind {
        FragmentType::Unencrypted => true,
        FragmentType::Ack | FragmentType::Nack => coordinator
            .outbound_plaintext(fragment.transfer_id)?
            .unwrap_or(false),
        FragmentType::Data | FragmentType::Control => false,
    })
}

fn on_data(
    coordinator: &Coordinator,
    fragment: Fragment,
    origin: SocketAddr,
    plaintext: bool,
) -> Result<Vec<Action>> {
    let key = PeerTransfer::new(origin, fragment.transfer_id);

    if coordinator.gave_up(&key)? {
        trace!(transfer_id = key.transfer_id, peer = %origin, "Ignoring abandoned transfer");
        return Ok(Vec::new());
    }

    match coordinator.outbound_echo(&fragment)? {
        Some(true) => {
            trace!(transfer_id = key.transfer_id, "Dropping looped-back fragment");
            return Ok(Vec::new());
        }
        Some(false) => return on_duplicate(coordinator, key, plaintext),
        None => {}
    }

    if coordinator.is_retired(&key)? {
        return on_duplicate(coordinator, key, plaintext);
    }

    coordinator.accept_fragment(key, &fragment, plaintext)?;
    Ok(Vec::new())
}

fn on_duplicate(
    coordinator: &Coordinator,
    key: PeerTransfer,
    plaintext: bool,
) -> Result<Vec<Action>> {
    match coordinator.record_duplicate(key)? {
        DuplicateVerdict::Suppress | DuplicateVerdict::Ignore => Ok(Vec::new()),
        DuplicateVerdict::GiveUp => Ok(vec![Action::send(
            Fragment::single(
                key.transfer_id,
                rand::random(),
                FragmentType::Nack,
                NackRequest::Abandon.encode(),
            ),
            key.peer,
            plaintext,
        )]),
    }
}

fn on_control(fragment: &Fragment, origin: SocketAddr, plaintext: bool) -> Vec<Action> {
    let command = match std::str::from_utf8(&fragment.payload) {
        Ok(command) => command,
        Err(_) => {
            debug!(peer = %origin, "Control message is not valid UTF-8");
            return Vec::new();
        }
    };

    match command {
        PING => {
            debug!(peer = %origin, "Ping received, answering");
            vec![Action::send(
                Fragment::single(
                    rand::random(),
                    rand::random(),
                    FragmentType::Control,
                    Bytes::from_static(PONG.as_bytes()),
                ),
                origin,
                plaintext,
            )]
        }
        PONG => {
            debug!(peer = %origin, "Pong received");
            Vec::new()
        }
        other => {
            debug!(peer = %origin, command = other, "Unhandled control command");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::config::TransportConfig;
    use std::sync::Arc;

    fn setup() -> (Coordinator, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new());
        let coordinator = Coordinator::new(&TransportConfig::default(), metrics.clone());
        (coordinator, metrics)
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:6000".parse().unwrap()
    }

    fn opened(fragment: Fragment, encrypted: bool) -> Opened {
        Opened {
            fragment,
            encrypted,
        }
    }

    #[test]
    fn test_ping_is_answered_with_matching_envelope() {
        let (c, m) = setup();
        let ping = Fragment::single(1, 2, FragmentType::Control, Bytes::from_static(b"ping"));

        let actions = route(&c, &m, opened(ping, false), peer(), false).expect("route");
        match actions.as_slice() {
            [Action::Send {
                fragment,
                dest,
                plaintext,
            }] => {
                assert_eq!(fragment.kind, FragmentType::Control);
                assert_eq!(&fragment.payload[..], b"pong");
                assert_eq!(*dest, peer());
                assert!(*plaintext);
            }
            other => panic!("unexpected actions: {other:?}"),
        }
    }

    #[test]
    fn test_pong_produces_nothing() {
        let (c, m) = setup();
        let pong = Fragment::single(1, 2, FragmentType::Control, Bytes::from_static(b"pong"));
        assert!(route(&c, &m, opened(pong, true), peer(), true)
            .expect("route")
            .is_empty());
    }

    #[test]
    fn test_plaintext_data_rejected_under_cipher() {
        let (c, m) = setup();
        let data = Fragment::single(4, 5, FragmentType::Data, Bytes::from_static(b"x"));
        let actions = route(&c, &m, opened(data, false), peer(), true).expect("route");

        assert!(matches!(
            actions.as_slice(),
            [Action::Emit(TransportEvent::SecurityViolation { .. })]
        ));
        assert_eq!(c.pending_inbound(), 0);
        assert_eq!(m.snapshot().security_violations, 1);
    }

    #[test]
    fn test_unencrypted_kind_accepted_under_cipher() {
        let (c, m) = setup();
        let boot = Fragment {
            transfer_id: 4,
            nonce: 5,
            fragment_index: 0,
            fragment_count: 2,
            kind: FragmentType::Unencrypted,
            payload: Bytes::from_static(b"hello"),
        };
        assert!(route(&c, &m, opened(boot, false), peer(), true)
            .expect("route")
            .is_empty());
        assert_eq!(c.pending_inbound(), 1);
    }

    #[test]
    fn test_plaintext_ack_accepted_for_plaintext_transfer() {
        let (c, m) = setup();
        let out = c
            .prepare_send(
                Bytes::from_static(b"hi"),
                true,
                FragmentType::Unencrypted,
                peer(),
                true,
            )
            .expect("send");

        let ack = Fragment::single(out.transfer_id, 9, FragmentType::Ack, Bytes::new());
        let actions = route(&c, &m, opened(ack, false), peer(), true).expect("route");
        assert_eq!(
            actions,
            vec![Action::Emit(TransportEvent::Acknowledged {
                transfer_id: out.transfer_id,
                peer: peer(),
            })]
        );
    }

    #[test]
    fn test_own_fragment_loopback_is_dropped() {
        let (c, m) = setup();
        let out = c
            .prepare_send(Bytes::from_static(b"hi"), true, FragmentType::Data, peer(), true)
            .expect("send");
        let own = out.fragments[0].clone();
        let me: SocketAddr = "127.0.0.1:6001".parse().unwrap();

        assert!(route(&c, &m, opened(own, false), me, false)
            .expect("route")
            .is_empty());
        assert_eq!(c.pending_inbound(), 0);
        assert_eq!(m.snapshot().duplicates_suppressed, 0);
    }

    #[test]
    fn test_malformed_nack_is_an_error() {
        let (c, m) = setup();
        let nack = Fragment::single(1, 1, FragmentType::Nack, Bytes::from_static(&[3, 0, 1]));
        assert!(route(&c, &m, opened(nack, false), peer(), false).is_err());
    }
}
