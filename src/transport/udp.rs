//! # UDP Datagram Transport
//!
//! Owns the socket and two long-lived protocol tasks:
//!
//! - the **receive task** waits on `recv_from`, opens the envelope and routes each fragment
//! - the **tick task** drives the reliability coordinator at a fixed period
//!
//! Both stop at their next suspension point once the transport is shut down or dropped.
//! Completed transfers and delivery outcomes reach the application through the
//! [`TransportEvent`] channel returned from [`DatagramTransport::bind`]. Neither task
//! waits on that channel: events are queued internally and a third **forwarding task**
//! feeds them to the bounded application channel, so a slow consumer never stalls
//! ACK/NACK handling or timers.
//!
//! ## Example
//! ```no_run
//! use datagram_protocol::config::TransportConfig;
//! use datagram_protocol::core::frame::FragmentType;
//! use datagram_protocol::transport::udp::DatagramTransport;
//! use datagram_protocol::TransportEvent;
//!
//! # async fn run() -> datagram_protocol::error::Result<()> {
//! let (transport, mut events) = DatagramTransport::bind(TransportConfig::default()).await?;
//! let peer = "127.0.0.1:9000".parse().unwrap();
//! transport.send(vec![0u8; 3000], true, FragmentType::Data, peer).await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let TransportEvent::Acknowledged { transfer_id, .. } = event {
//!         println!("transfer {transfer_id} confirmed");
//!         break;
//!     }
//! }
//! transport.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::{TransportConfig, MAX_DATAGRAM_SIZE};
use crate::core::envelope::{self, Cipher};
use crate::core::frame::{Fragment, FragmentType, TransferId};
use crate::error::{ProtocolError, Result};
use crate::reliability::{Action, Coordinator, TransportEvent};
use crate::transport::router::{self, PING};
use crate::utils::metrics::{Metrics, MetricsSnapshot};

struct Shared {
    socket: UdpSocket,
    coordinator: Coordinator,
    metrics: Arc<Metrics>,
    cipher: RwLock<Option<Arc<dyn Cipher>>>,
    events: mpsc::UnboundedSender<TransportEvent>,
    shutdown: CancellationToken,
}

/// Reliable, fragmenting, optionally encrypted datagram endpoint
pub struct DatagramTransport {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DatagramTransport {
    /// Bind a plaintext transport; install a cipher later with [`set_cipher`](Self::set_cipher)
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// - `ProtocolError::ConfigError` if the configuration does not validate
    /// - `ProtocolError::Io` if the socket cannot be bound
    pub async fn bind(config: TransportConfig) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        Self::bind_with_cipher(config, None).await
    }

    /// Bind a transport that encrypts from the first datagram
    #[instrument(skip(config, cipher), fields(bind_address = %config.bind_address))]
    pub async fn bind_with_cipher(
        config: TransportConfig,
        cipher: Option<Arc<dyn Cipher>>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(ProtocolError::ConfigError(errors.join("; ")));
        }

        let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
            ProtocolError::ConfigError(format!("Invalid bind address: {e}"))
        })?;
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;

        let metrics = Arc::new(Metrics::new());
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(config.event_queue_capacity);
        let encrypted = cipher.is_some();

        let shared = Arc::new(Shared {
            socket,
            coordinator: Coordinator::new(&config, metrics.clone()),
            metrics,
            cipher: RwLock::new(cipher),
            events: queue_tx,
            shutdown: CancellationToken::new(),
        });

        let tasks = vec![
            tokio::spawn(receive_loop(shared.clone())),
            tokio::spawn(tick_loop(shared.clone(), config.tick_interval)),
            tokio::spawn(forward_loop(
                shared.shutdown.clone(),
                queue_rx,
                events_tx,
            )),
        ];

        info!(%local_addr, encrypted, "Datagram transport bound");
        Ok((
            Self {
                shared,
                local_addr,
                tasks: Mutex::new(tasks),
            },
            events_rx,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Install the session cipher
    ///
    /// From here on every outgoing fragment except `Unencrypted` ones is sealed, and
    /// inbound plaintext is restricted to bootstrap traffic.
    pub fn set_cipher(&self, cipher: Arc<dyn Cipher>) -> Result<()> {
        *self.shared.cipher.write()? = Some(cipher);
        info!(local_addr = %self.local_addr, "Cipher installed");
        Ok(())
    }

    /// Fragment and send a payload
    ///
    /// With `reliable` the transfer is tracked until the peer acknowledges it or it is
    /// abandoned; the outcome arrives later as `Acknowledged` or `DeliveryFailed`.
    ///
    /// # Errors
    /// - `ProtocolError::InvalidRequest` for ACK/NACK kinds or misuse of `Control`
    /// - `ProtocolError::OversizedPayload` past the configured limit
    /// - `ProtocolError::Io` if the socket rejects a datagram. The transfer is dropped and
    ///   `SendFailed` is its only outcome; no `DeliveryFailed` follows.
    #[instrument(skip(self, payload), fields(dest = %dest, kind = kind.name()))]
    pub async fn send(
        &self,
        payload: impl Into<Bytes>,
        reliable: bool,
        kind: FragmentType,
        dest: SocketAddr,
    ) -> Result<TransferId> {
        let cipher = self.shared.cipher()?;
        let plaintext = cipher.is_none() || kind == FragmentType::Unencrypted;
        let outgoing =
            self.shared
                .coordinator
                .prepare_send(payload.into(), reliable, kind, dest, plaintext)?;

        for fragment in &outgoing.fragments {
            if let Err(e) = self
                .shared
                .transmit(fragment, dest, plaintext, cipher.as_deref())
                .await
            {
                let transfer_id = outgoing.transfer_id;
                if let Err(cancel_err) = self.shared.coordinator.cancel_outbound(transfer_id) {
                    warn!(transfer_id, error = %cancel_err, "Failed to drop transfer");
                }
                self.shared.report_send_failure(transfer_id, dest, &e);
                return Err(e);
            }
        }

        debug!(
            transfer_id = outgoing.transfer_id,
            fragments = outgoing.fragments.len(),
            reliable,
            "Transfer sent"
        );
        Ok(outgoing.transfer_id)
    }

    /// Send a `ping` control message; the peer answers with `pong`
    pub async fn ping(&self, dest: SocketAddr) -> Result<TransferId> {
        self.send(
            Bytes::from_static(PING.as_bytes()),
            false,
            FragmentType::Control,
            dest,
        )
        .await
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Reliable transfers still awaiting acknowledgment
    pub fn pending_outbound(&self) -> usize {
        self.shared.coordinator.pending_outbound()
    }

    /// Inbound transfers still being reassembled
    pub fn pending_inbound(&self) -> usize {
        self.shared.coordinator.pending_inbound()
    }

    /// Stop both tasks and drop all in-flight state without flushing
    pub async fn shutdown(&self) {
        self.shared.shutdown.cancel();

        let tasks = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Transport task ended abnormally");
            }
        }

        if let Err(e) = self.shared.coordinator.clear() {
            warn!(error = %e, "Failed to clear transfer tables");
        }
        self.shared.metrics.log_metrics();
        info!(local_addr = %self.local_addr, "Datagram transport shut down");
    }
}

impl Drop for DatagramTransport {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

impl Shared {
    fn cipher(&self) -> Result<Option<Arc<dyn Cipher>>> {
        Ok(self.cipher.read()?.clone())
    }

    async fn transmit(
        &self,
        fragment: &Fragment,
        dest: SocketAddr,
        plaintext: bool,
        cipher: Option<&dyn Cipher>,
    ) -> Result<()> {
        let datagram = envelope::seal(fragment, if plaintext { None } else { cipher })?;
        self.socket.send_to(&datagram, dest).await?;
        self.metrics.datagram_sent(datagram.len() as u64);
        Ok(())
    }

    fn report_send_failure(&self, transfer_id: TransferId, dest: SocketAddr, e: &ProtocolError) {
        self.metrics.send_error();
        warn!(transfer_id, %dest, error = %e, "Send failed");
        self.emit(TransportEvent::SendFailed {
            transfer_id,
            dest,
            error: e.to_string(),
        });
    }

    /// Queue an event for the forwarding task; never waits
    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            trace!("Event forwarder stopped, dropping event");
        }
    }

    async fn execute(&self, actions: Vec<Action>) {
        if actions.is_empty() {
            return;
        }
        let cipher = match self.cipher() {
            Ok(cipher) => cipher,
            Err(e) => {
                error!(error = %e, "Cipher unavailable, dropping actions");
                return;
            }
        };

        for action in actions {
            match action {
                Action::Send {
                    fragment,
                    dest,
                    plaintext,
                } => {
                    // ACKs, NACKs and resends: the transfer's outcome still arrives later
                    if let Err(e) = self
                        .transmit(&fragment, dest, plaintext, cipher.as_deref())
                        .await
                    {
                        self.metrics.send_error();
                        warn!(
                            transfer_id = fragment.transfer_id,
                            kind = fragment.kind.name(),
                            %dest,
                            error = %e,
                            "Background send failed"
                        );
                    }
                }
                Action::Emit(event) => self.emit(event),
            }
        }
    }

    fn handle_datagram(&self, datagram: &[u8], origin: SocketAddr) -> Vec<Action> {
        let cipher = match self.cipher() {
            Ok(cipher) => cipher,
            Err(e) => {
                error!(error = %e, "Cipher unavailable, dropping datagram");
                return Vec::new();
            }
        };

        let opened = match envelope::open(datagram, cipher.as_deref()) {
            Ok(opened) => opened,
            Err(e @ (ProtocolError::DecryptionFailure | ProtocolError::SecurityError(_))) => {
                self.metrics.security_violation();
                warn!(peer = %origin, error = %e, "Dropping datagram");
                return vec![Action::Emit(TransportEvent::SecurityViolation {
                    peer: origin,
                    reason: e.to_string(),
                })];
            }
            Err(e) => {
                self.metrics.malformed_datagram();
                debug!(
                    peer = %origin,
                    len = datagram.len(),
                    error = %e,
                    "Discarding undecodable datagram"
                );
                return Vec::new();
            }
        };

        match router::route(
            &self.coordinator,
            &self.metrics,
            opened,
            origin,
            cipher.is_some(),
        ) {
            Ok(actions) => actions,
            Err(e) => {
                self.metrics.malformed_datagram();
                debug!(peer = %origin, error = %e, "Discarding fragment");
                Vec::new()
            }
        }
    }
}

async fn receive_loop(shared: Arc<Shared>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        let (len, origin) = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            received = shared.socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(e) => {
                    debug!(error = %e, "Receive error");
                    continue;
                }
            },
        };

        shared.metrics.datagram_received(len as u64);
        let actions = shared.handle_datagram(&buf[..len], origin);
        shared.execute(actions).await;
    }
    debug!("Receive task stopped");
}

async fn tick_loop(shared: Arc<Shared>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        match shared.coordinator.tick() {
            Ok(actions) => shared.execute(actions).await,
            Err(e) => error!(error = %e, "Reliability tick failed"),
        }
    }
    debug!("Tick task stopped");
}

/// Move queued events to the application channel, waiting on it only here
async fn forward_loop(
    shutdown: CancellationToken,
    mut queue: mpsc::UnboundedReceiver<TransportEvent>,
    events: mpsc::Sender<TransportEvent>,
) {
    let mut lagging = false;
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = queue.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match events.try_send(event) {
            Ok(()) => lagging = false,
            Err(TrySendError::Full(event)) => {
                if !lagging {
                    warn!("Event channel full, application is lagging");
                    lagging = true;
                }
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    sent = events.send(event) => {
                        if sent.is_err() {
                            trace!("Event receiver dropped");
                        }
                    }
                }
            }
            Err(TrySendError::Closed(_)) => trace!("Event receiver dropped"),
        }
    }
    debug!("Event forwarding task stopped");
}
