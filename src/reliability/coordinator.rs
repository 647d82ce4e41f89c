//! # Reliability Coordinator
//!
//! A ticked state machine over two tables:
//!
//! - **Outbound** (`transfer_id → OutboundTransfer`): reliable sends awaiting an ACK.
//!   `InFlight(attempt, ticks)` ends as `Acknowledged` (ACK received), `Abandoned`
//!   (attempts exhausted) or `Abandoned` by the peer (empty NACK). The sender never
//!   resends on its own timeout; it only counts attempts and waits for the receiver to
//!   name what is missing.
//! - **Inbound** (`(origin, transfer_id) → assembly`): transfers being reassembled.
//!   `Assembling(attempt, ticks)` ends as `Delivered` (ACK sent, payload emitted) or
//!   `Abandoned` (partial data discarded).
//!
//! Every tick first delivers any assembly that just became complete, then evaluates
//! entries whose check window elapsed. Attempt counters start at 1 for the initial
//! exchange, so an unanswered transfer is abandoned on exactly its `max_attempts`-th
//! timeout.
//!
//! The three tables (outbound, inbound, duplicate guard) each sit behind their own
//! mutex. No method holds two of them at once, and none performs I/O: decisions come
//! back as [`Action`]s for the transport to carry out.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::{debug, instrument, trace, warn};

use crate::config::TransportConfig;
use crate::core::fragmenter::split;
use crate::core::frame::{Fragment, FragmentType, TransferId};
use crate::core::nack::NackRequest;
use crate::error::{constants, ProtocolError, Result};
use crate::reliability::action::{Action, FailureReason, TransportEvent};
use crate::reliability::duplicate::{DuplicateGuard, DuplicateVerdict};
use crate::reliability::outbound::OutboundTransfer;
use crate::reliability::reassembly::ReassemblyBuffer;
use crate::reliability::PeerTransfer;
use crate::utils::metrics::Metrics;

/// Fragments produced for one send, ready for the socket
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub transfer_id: TransferId,
    pub dest: SocketAddr,
    pub plaintext: bool,
    pub fragments: Vec<Fragment>,
}

#[derive(Debug)]
struct InboundAssembly {
    ticks_until_check: u32,
    attempt_count: u32,
    plaintext: bool,
}

#[derive(Debug, Default)]
struct InboundTable {
    buffer: ReassemblyBuffer<PeerTransfer>,
    assemblies: HashMap<PeerTransfer, InboundAssembly>,
}

pub struct Coordinator {
    max_fragment_payload: usize,
    max_payload_size: usize,
    check_interval_ticks: u32,
    max_attempts: u32,
    outbound: Mutex<HashMap<TransferId, OutboundTransfer>>,
    inbound: Mutex<InboundTable>,
    guard: Mutex<DuplicateGuard>,
    metrics: Arc<Metrics>,
}

impl Coordinator {
    pub fn new(config: &TransportConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            max_fragment_payload: config.max_fragment_payload,
            max_payload_size: config.max_payload_size,
            check_interval_ticks: config.check_interval_ticks.max(1),
            max_attempts: config.max_attempts,
            outbound: Mutex::new(HashMap::new()),
            inbound: Mutex::new(InboundTable::default()),
            guard: Mutex::new(DuplicateGuard::new(
                config.duplicate_threshold,
                config.duplicate_ttl,
                config.duplicate_capacity,
            )),
            metrics,
        }
    }

    // ------------------------------------------------------------------
    // Send path
    // ------------------------------------------------------------------

    /// Split a payload into fragments under a fresh transfer id
    ///
    /// Reliable transfers are registered in the outbound table before this returns, so
    /// a NACK can never arrive ahead of the bookkeeping it refers to.
    ///
    /// # Errors
    /// - `ProtocolError::InvalidRequest` for ACK/NACK kinds, reliable or oversized control
    ///   messages
    /// - `ProtocolError::OversizedPayload` past `max_payload_size` or `u16::MAX` fragments
    #[instrument(skip(self, payload), fields(len = payload.len(), kind = kind.name()))]
    pub fn prepare_send(
        &self,
        payload: Bytes,
        reliable: bool,
        kind: FragmentType,
        dest: SocketAddr,
        plaintext: bool,
    ) -> Result<Outgoing> {
        match kind {
            FragmentType::Ack | FragmentType::Nack => {
                return Err(ProtocolError::InvalidRequest(
                    constants::ERR_RESERVED_TYPE.to_string(),
                ));
            }
            FragmentType::Control if reliable => {
                return Err(ProtocolError::InvalidRequest(
                    constants::ERR_RELIABLE_CONTROL.to_string(),
                ));
            }
            FragmentType::Control if payload.len() > self.max_fragment_payload => {
                return Err(ProtocolError::InvalidRequest(
                    constants::ERR_CONTROL_TOO_LARGE.to_string(),
                ));
            }
            _ => {}
        }

        if payload.len() > self.max_payload_size {
            return Err(ProtocolError::OversizedPayload(payload.len()));
        }

        let parts = split(&payload, self.max_fragment_payload)?;
        let fragment_count = parts.len() as u16;

        let mut outbound = self.outbound.lock()?;
        let transfer_id = loop {
            let candidate = rand::random::<i32>();
            if !outbound.contains_key(&candidate) {
                break candidate;
            }
        };

        let fragments: Vec<Fragment> = parts
            .into_iter()
            .enumerate()
            .map(|(index, payload)| Fragment {
                transfer_id,
                nonce: rand::random(),
                fragment_index: index as u16,
                fragment_count,
                kind,
                payload,
            })
            .collect();

        if reliable {
            outbound.insert(
                transfer_id,
                OutboundTransfer::new(
                    dest,
                    fragments.clone(),
                    self.check_interval_ticks,
                    plaintext,
                ),
            );
        }
        drop(outbound);

        debug!(transfer_id, fragment_count, reliable, %dest, "Prepared transfer");
        Ok(Outgoing {
            transfer_id,
            dest,
            plaintext,
            fragments,
        })
    }

    // ------------------------------------------------------------------
    // Receive path primitives
    // ------------------------------------------------------------------

    /// Compare a data fragment against this side's own outbound transfers
    ///
    /// `None` if the transfer id is not ours. `Some(true)` if the nonce is one this side
    /// sent for that index (our own datagram looped back), `Some(false)` otherwise.
    pub fn outbound_echo(&self, fragment: &Fragment) -> Result<Option<bool>> {
        let outbound = self.outbound.lock()?;
        Ok(outbound
            .get(&fragment.transfer_id)
            .map(|t| t.sent_nonce(fragment.fragment_index, fragment.nonce)))
    }

    /// Whether a tracked outbound transfer was sent without encryption
    pub fn outbound_plaintext(&self, transfer_id: TransferId) -> Result<Option<bool>> {
        let outbound = self.outbound.lock()?;
        Ok(outbound.get(&transfer_id).map(|t| t.plaintext))
    }

    /// Retire an outbound transfer confirmed by `peer`
    pub fn acknowledge(&self, transfer_id: TransferId, peer: SocketAddr) -> Result<bool> {
        let removed = {
            let mut outbound = self.outbound.lock()?;
            match outbound.get(&transfer_id) {
                Some(t) if t.dest == peer => outbound.remove(&transfer_id),
                _ => None,
            }
        };

        match removed {
            Some(transfer) => {
                self.metrics.transfer_acknowledged();
                debug!(
                    transfer_id,
                    %peer,
                    attempts = transfer.attempt_count,
                    "Transfer acknowledged"
                );
                Ok(true)
            }
            None => {
                trace!(transfer_id, %peer, "ACK for unknown transfer");
                Ok(false)
            }
        }
    }

    /// Answer a NACK: fresh copies of exactly the named fragments
    ///
    /// Restarts the transfer's wait window. Returns nothing if the transfer is unknown or
    /// was sent to a different peer.
    pub fn resend(
        &self,
        transfer_id: TransferId,
        peer: SocketAddr,
        indices: &[u16],
    ) -> Result<Vec<Action>> {
        let mut outbound = self.outbound.lock()?;
        let transfer = match outbound.get_mut(&transfer_id) {
            Some(t) if t.dest == peer => t,
            _ => {
                trace!(transfer_id, %peer, "NACK for unknown transfer");
                return Ok(Vec::new());
            }
        };

        let fragments = transfer.resend(indices, rand::random);
        transfer.reset_window(self.check_interval_ticks);
        let dest = transfer.dest;
        let plaintext = transfer.plaintext;
        drop(outbound);

        self.metrics.fragments_resent(fragments.len() as u64);
        debug!(
            transfer_id,
            %peer,
            requested = indices.len(),
            resent = fragments.len(),
            "Resending fragments"
        );
        Ok(fragments
            .into_iter()
            .map(|f| Action::send(f, dest, plaintext))
            .collect())
    }

    /// Drop an outbound transfer the peer gave up on
    pub fn abandon_outbound(&self, transfer_id: TransferId, peer: SocketAddr) -> Result<bool> {
        let removed = {
            let mut outbound = self.outbound.lock()?;
            match outbound.get(&transfer_id) {
                Some(t) if t.dest == peer => outbound.remove(&transfer_id),
                _ => None,
            }
        };

        if removed.is_some() {
            self.metrics.outbound_abandoned();
            warn!(transfer_id, %peer, "Peer abandoned transfer");
        }
        Ok(removed.is_some())
    }

    /// Forget an outbound transfer whose initial send never made it onto the socket
    ///
    /// No event is produced; the caller reports the failure itself.
    pub fn cancel_outbound(&self, transfer_id: TransferId) -> Result<bool> {
        let removed = self.outbound.lock()?.remove(&transfer_id).is_some();
        if removed {
            debug!(transfer_id, "Outbound transfer cancelled");
        }
        Ok(removed)
    }

    /// Store an inbound data fragment, opening an assembly on first arrival
    ///
    /// # Errors
    /// Returns `ProtocolError::MalformedFrame` if the fragment contradicts earlier ones.
    pub fn accept_fragment(
        &self,
        key: PeerTransfer,
        fragment: &Fragment,
        plaintext: bool,
    ) -> Result<()> {
        let mut inbound = self.inbound.lock()?;
        inbound.buffer.add_fragment(key, fragment)?;

        if !inbound.assemblies.contains_key(&key) {
            trace!(
                transfer_id = key.transfer_id,
                origin = %key.peer,
                fragment_count = fragment.fragment_count,
                "New inbound transfer"
            );
            inbound.assemblies.insert(
                key,
                InboundAssembly {
                    ticks_until_check: self.check_interval_ticks,
                    attempt_count: 1,
                    plaintext,
                },
            );
        }
        Ok(())
    }

    pub fn is_retired(&self, key: &PeerTransfer) -> Result<bool> {
        Ok(self.guard.lock()?.is_retired(key))
    }

    pub fn gave_up(&self, key: &PeerTransfer) -> Result<bool> {
        Ok(self.guard.lock()?.gave_up(key))
    }

    /// Count a duplicate for `key`
    pub fn record_duplicate(&self, key: PeerTransfer) -> Result<DuplicateVerdict> {
        let verdict = self.guard.lock()?.record(key);
        if verdict != DuplicateVerdict::Ignore {
            self.metrics.duplicate_suppressed();
        }
        Ok(verdict)
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance every timer by one tick and collect the resulting work
    pub fn tick(&self) -> Result<Vec<Action>> {
        let mut actions = Vec::new();
        self.deliver_completed(&mut actions)?;
        self.sweep_inbound(&mut actions)?;
        self.sweep_outbound(&mut actions)?;
        Ok(actions)
    }

    fn deliver_completed(&self, actions: &mut Vec<Action>) -> Result<()> {
        let mut retired = Vec::new();
        {
            let mut inbound = self.inbound.lock()?;
            for key in inbound.buffer.completed_keys() {
                let plaintext = inbound
                    .assemblies
                    .remove(&key)
                    .is_some_and(|a| a.plaintext);

                match inbound.buffer.reconstruct(&key) {
                    Ok(payload) => {
                        debug!(
                            transfer_id = key.transfer_id,
                            origin = %key.peer,
                            len = payload.len(),
                            "Transfer delivered"
                        );
                        actions.push(Action::send(
                            Fragment::single(
                                key.transfer_id,
                                rand::random(),
                                FragmentType::Ack,
                                Bytes::new(),
                            ),
                            key.peer,
                            plaintext,
                        ));
                        actions.push(Action::Emit(TransportEvent::Delivered {
                            transfer_id: key.transfer_id,
                            payload,
                            origin: key.peer,
                        }));
                        self.metrics.ack_sent();
                        self.metrics.transfer_delivered();
                    }
                    Err(e) => {
                        warn!(transfer_id = key.transfer_id, error = %e, "Reassembly failed");
                        inbound.buffer.discard(&key);
                    }
                }
                retired.push(key);
            }
        }

        if !retired.is_empty() {
            let mut guard = self.guard.lock()?;
            for key in retired {
                guard.retire(key);
            }
        }
        Ok(())
    }

    fn sweep_inbound(&self, actions: &mut Vec<Action>) -> Result<()> {
        let max_indices = (self.max_fragment_payload.saturating_sub(2) / 2).max(1);
        let mut abandoned = Vec::new();
        {
            let mut inbound = self.inbound.lock()?;
            let InboundTable { buffer, assemblies } = &mut *inbound;

            for (key, assembly) in assemblies.iter_mut() {
                assembly.ticks_until_check = assembly.ticks_until_check.saturating_sub(1);
                if assembly.ticks_until_check > 0 {
                    continue;
                }
                assembly.ticks_until_check = self.check_interval_ticks;

                let mut missing = buffer.missing_indices(key);
                if missing.is_empty() {
                    continue;
                }

                assembly.attempt_count += 1;
                if assembly.attempt_count > self.max_attempts {
                    abandoned.push(*key);
                    continue;
                }

                missing.truncate(max_indices);
                debug!(
                    transfer_id = key.transfer_id,
                    origin = %key.peer,
                    attempt = assembly.attempt_count,
                    missing = missing.len(),
                    "Requesting missing fragments"
                );
                actions.push(Action::send(
                    Fragment::single(
                        key.transfer_id,
                        rand::random(),
                        FragmentType::Nack,
                        NackRequest::Resend(missing).encode(),
                    ),
                    key.peer,
                    assembly.plaintext,
                ));
                self.metrics.nack_sent();
            }

            for key in &abandoned {
                assemblies.remove(key);
                buffer.discard(key);
                self.metrics.inbound_abandoned();
                warn!(
                    transfer_id = key.transfer_id,
                    origin = %key.peer,
                    "Inbound transfer abandoned, discarding partial data"
                );
            }
        }

        if !abandoned.is_empty() {
            let mut guard = self.guard.lock()?;
            for key in abandoned {
                guard.retire(key);
            }
        }
        Ok(())
    }

    fn sweep_outbound(&self, actions: &mut Vec<Action>) -> Result<()> {
        let mut outbound = self.outbound.lock()?;
        let mut abandoned = Vec::new();

        for (&transfer_id, transfer) in outbound.iter_mut() {
            transfer.ticks_until_check = transfer.ticks_until_check.saturating_sub(1);
            if transfer.ticks_until_check > 0 {
                continue;
            }

            transfer.attempt_count += 1;
            if transfer.attempt_count > self.max_attempts {
                abandoned.push(transfer_id);
            } else {
                trace!(
                    transfer_id,
                    attempt = transfer.attempt_count,
                    "Awaiting acknowledgment"
                );
                transfer.reset_window(self.check_interval_ticks);
            }
        }

        for transfer_id in abandoned {
            if let Some(transfer) = outbound.remove(&transfer_id) {
                self.metrics.outbound_abandoned();
                warn!(
                    transfer_id,
                    peer = %transfer.dest,
                    fragments = transfer.fragment_count(),
                    "Delivery failed, retries exhausted"
                );
                actions.push(Action::Emit(TransportEvent::DeliveryFailed {
                    transfer_id,
                    peer: transfer.dest,
                    reason: FailureReason::RetriesExhausted,
                }));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Introspection and shutdown
    // ------------------------------------------------------------------

    pub fn pending_outbound(&self) -> usize {
        self.outbound.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn pending_inbound(&self) -> usize {
        self.inbound.lock().map(|t| t.assemblies.len()).unwrap_or(0)
    }

    /// Drop every table without flushing
    pub fn clear(&self) -> Result<()> {
        self.outbound.lock()?.clear();
        {
            let mut inbound = self.inbound.lock()?;
            inbound.buffer.clear();
            inbound.assemblies.clear();
        }
        self.guard.lock()?.clear();
        Ok(())
    }
}
