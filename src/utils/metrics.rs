//! Observability and Metrics
//!
//! Counters for one transport instance. Each transport owns its own [`Metrics`]; nothing
//! here is process-wide.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Metrics collector for one transport
#[derive(Debug)]
pub struct Metrics {
    /// Datagrams written to the socket
    pub datagrams_sent: AtomicU64,
    /// Datagrams read from the socket
    pub datagrams_received: AtomicU64,
    /// Bytes written to the socket
    pub bytes_sent: AtomicU64,
    /// Bytes read from the socket
    pub bytes_received: AtomicU64,
    /// Fragments resent in answer to a NACK
    pub fragments_resent: AtomicU64,
    /// ACKs sent for completed inbound transfers
    pub acks_sent: AtomicU64,
    /// ACKs received for outbound transfers
    pub acks_received: AtomicU64,
    /// NACKs sent (missing-index requests and give-ups)
    pub nacks_sent: AtomicU64,
    /// NACKs received
    pub nacks_received: AtomicU64,
    /// Inbound transfers reassembled and delivered
    pub transfers_delivered: AtomicU64,
    /// Outbound transfers confirmed by the peer
    pub transfers_acknowledged: AtomicU64,
    /// Inbound transfers abandoned after exhausting attempts
    pub inbound_abandoned: AtomicU64,
    /// Outbound transfers abandoned (retries exhausted or peer gave up)
    pub outbound_abandoned: AtomicU64,
    /// Duplicate or echoed fragments absorbed
    pub duplicates_suppressed: AtomicU64,
    /// Datagrams discarded because they could not be decoded
    pub malformed_datagrams: AtomicU64,
    /// Datagrams dropped for failing decryption or envelope policy
    pub security_violations: AtomicU64,
    /// Socket send failures
    pub send_errors: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            datagrams_sent: AtomicU64::new(0),
            datagrams_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            fragments_resent: AtomicU64::new(0),
            acks_sent: AtomicU64::new(0),
            acks_received: AtomicU64::new(0),
            nacks_sent: AtomicU64::new(0),
            nacks_received: AtomicU64::new(0),
            transfers_delivered: AtomicU64::new(0),
            transfers_acknowledged: AtomicU64::new(0),
            inbound_abandoned: AtomicU64::new(0),
            outbound_abandoned: AtomicU64::new(0),
            duplicates_suppressed: AtomicU64::new(0),
            malformed_datagrams: AtomicU64::new(0),
            security_violations: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a datagram written to the socket
    pub fn datagram_sent(&self, byte_count: u64) {
        self.datagrams_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a datagram read from the socket
    pub fn datagram_received(&self, byte_count: u64) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn fragments_resent(&self, count: u64) {
        self.fragments_resent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn ack_sent(&self) {
        self.acks_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ack_received(&self) {
        self.acks_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn nack_sent(&self) {
        self.nacks_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn nack_received(&self) {
        self.nacks_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transfer_delivered(&self) {
        self.transfers_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transfer_acknowledged(&self) {
        self.transfers_acknowledged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inbound_abandoned(&self) {
        self.inbound_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn outbound_abandoned(&self) {
        self.outbound_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn duplicate_suppressed(&self) {
        self.duplicates_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn malformed_datagram(&self) {
        self.malformed_datagrams.fetch_add(1, Ordering::Relaxed);
    }

    pub fn security_violation(&self) {
        self.security_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            fragments_resent: self.fragments_resent.load(Ordering::Relaxed),
            acks_sent: self.acks_sent.load(Ordering::Relaxed),
            acks_received: self.acks_received.load(Ordering::Relaxed),
            nacks_sent: self.nacks_sent.load(Ordering::Relaxed),
            nacks_received: self.nacks_received.load(Ordering::Relaxed),
            transfers_delivered: self.transfers_delivered.load(Ordering::Relaxed),
            transfers_acknowledged: self.transfers_acknowledged.load(Ordering::Relaxed),
            inbound_abandoned: self.inbound_abandoned.load(Ordering::Relaxed),
            outbound_abandoned: self.outbound_abandoned.load(Ordering::Relaxed),
            duplicates_suppressed: self.duplicates_suppressed.load(Ordering::Relaxed),
            malformed_datagrams: self.malformed_datagrams.load(Ordering::Relaxed),
            security_violations: self.security_violations.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            datagrams_sent = snapshot.datagrams_sent,
            datagrams_received = snapshot.datagrams_received,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            fragments_resent = snapshot.fragments_resent,
            acks_sent = snapshot.acks_sent,
            acks_received = snapshot.acks_received,
            nacks_sent = snapshot.nacks_sent,
            nacks_received = snapshot.nacks_received,
            transfers_delivered = snapshot.transfers_delivered,
            transfers_acknowledged = snapshot.transfers_acknowledged,
            inbound_abandoned = snapshot.inbound_abandoned,
            outbound_abandoned = snapshot.outbound_abandoned,
            duplicates_suppressed = snapshot.duplicates_suppressed,
            malformed_datagrams = snapshot.malformed_datagrams,
            security_violations = snapshot.security_violations,
            send_errors = snapshot.send_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Transport metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub datagrams_sent: u64,
    pub datagrams_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub fragments_resent: u64,
    pub acks_sent: u64,
    pub acks_received: u64,
    pub nacks_sent: u64,
    pub nacks_received: u64,
    pub transfers_delivered: u64,
    pub transfers_acknowledged: u64,
    pub inbound_abandoned: u64,
    pub outbound_abandoned: u64,
    pub duplicates_suppressed: u64,
    pub malformed_datagrams: u64,
    pub security_violations: u64,
    pub send_errors: u64,
    pub uptime_seconds: u64,
}
