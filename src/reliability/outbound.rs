//! Sender-side bookkeeping for reliable transfers awaiting acknowledgment.

use std::net::SocketAddr;

use crate::core::frame::{Fragment, TransferId};

/// A reliable transfer that has been sent and not yet acknowledged
///
/// Fragments are retained verbatim so a NACK can be answered with exactly the
/// indices it names. Every nonce ever sent for an index is remembered, which is how a
/// looped-back copy of our own datagram is told apart from a foreign echo.
#[derive(Debug, Clone)]
pub struct OutboundTransfer {
    pub transfer_id: TransferId,
    pub dest: SocketAddr,
    /// Ticks left before the next timeout check
    pub ticks_until_check: u32,
    /// Starts at 1 for the initial send, incremented on each timeout
    pub attempt_count: u32,
    /// Sent without encryption; ACK/NACK for it may arrive in plaintext
    pub plaintext: bool,
    fragments: Vec<Fragment>,
    sent_nonces: Vec<Vec<i32>>,
}

impl OutboundTransfer {
    pub fn new(
        dest: SocketAddr,
        fragments: Vec<Fragment>,
        check_interval_ticks: u32,
        plaintext: bool,
    ) -> Self {
        let transfer_id = fragments.first().map_or(0, |f| f.transfer_id);
        let sent_nonces = fragments.iter().map(|f| vec![f.nonce]).collect();
        Self {
            transfer_id,
            dest,
            ticks_until_check: check_interval_ticks,
            attempt_count: 1,
            plaintext,
            fragments,
            sent_nonces,
        }
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Whether this side sent `nonce` for `index`
    pub fn sent_nonce(&self, index: u16, nonce: i32) -> bool {
        self.sent_nonces
            .get(index as usize)
            .is_some_and(|nonces| nonces.contains(&nonce))
    }

    /// Fresh copies of the named fragments, each with a new nonce
    ///
    /// Unknown and repeated indices are skipped.
    pub fn resend(
        &mut self,
        indices: &[u16],
        mut next_nonce: impl FnMut() -> i32,
    ) -> Vec<Fragment> {
        let mut seen = vec![false; self.fragments.len()];
        let mut out = Vec::with_capacity(indices.len());

        for &index in indices {
            let slot = index as usize;
            if slot >= self.fragments.len() || seen[slot] {
                continue;
            }
            seen[slot] = true;

            let mut fragment = self.fragments[slot].clone();
            fragment.nonce = next_nonce();
            self.sent_nonces[slot].push(fragment.nonce);
            out.push(fragment);
        }
        out
    }

    /// Restart the wait window without touching the attempt counter
    pub fn reset_window(&mut self, check_interval_ticks: u32) {
        self.ticks_until_check = check_interval_ticks;
    }
}
