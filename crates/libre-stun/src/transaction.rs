use crate::TransactionId;
use std::cmp::min;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Retransmission schedule for a client transaction. Geometric backoff
/// bounded by a retransmit count, terminal timeout after the last attempt.
#[derive(Debug, Clone, Copy)]
pub struct TransactionConfig {
    pub initial_rto: Duration,
    pub max_retransmits: u32,
    pub max_rto: Duration,
}

impl TransactionConfig {
    /// RFC 5389 defaults for a bare STUN binding discovery.
    pub fn stun_defaults() -> Self {
        Self {
            initial_rto: Duration::from_millis(500),
            max_retransmits: 7,
            max_rto: Duration::from_secs(8),
        }
    }

    /// ICE connectivity checks use a faster initial RTO so checklists settle quickly.
    pub fn ice_defaults() -> Self {
        Self {
            initial_rto: Duration::from_millis(100),
            ..Self::stun_defaults()
        }
    }

    fn retransmit_delta(&self, attempt: u32) -> Duration {
        let rto = Duration::from_millis(
            (self.initial_rto.as_millis() << attempt.min(16))
                .try_into()
                .unwrap_or(u64::MAX as u128) as u64,
        );
        min(rto, self.max_rto)
    }
}

enum Mode {
    /// Unreliable transport: retransmit on schedule, time out after the last attempt.
    Unreliable { attempts: u32, next_retransmit: Instant },
    /// Reliable transport: a single send, terminal timer only.
    Reliable { deadline: Instant },
}

struct Transaction {
    request: Vec<u8>,
    mode: Mode,
}

/// Events a poll of [`ClientTransactions`] can produce.
#[derive(Debug)]
pub enum TransactionEvent {
    Retransmit { id: TransactionId, bytes: Vec<u8> },
    TimedOut { id: TransactionId },
}

/// Table of in-flight STUN client transactions, keyed by transaction id.
///
/// STUN client transactions sharing one reactor-registered socket must key
/// off the 96-bit transaction id since that's the only thing distinguishing
/// their responses on the wire.
pub struct ClientTransactions {
    config: TransactionConfig,
    table: HashMap<TransactionId, Transaction>,
}

impl ClientTransactions {
    pub fn new(config: TransactionConfig) -> Self {
        Self {
            config,
            table: HashMap::new(),
        }
    }

    /// Register a freshly sent request. `reliable` selects the single-send
    /// mode used over TCP/TLS transports instead of RFC 5389's unreliable
    /// retransmit schedule.
    pub fn send(&mut self, id: TransactionId, request: Vec<u8>, reliable: bool, now: Instant) {
        let mode = if reliable {
            Mode::Reliable {
                deadline: now + self.config.retransmit_delta(self.config.max_retransmits),
            }
        } else {
            Mode::Unreliable {
                attempts: 0,
                next_retransmit: now + self.config.retransmit_delta(0),
            }
        };

        self.table.insert(id, Transaction { request, mode });
    }

    /// Remove and acknowledge a transaction matched by a received response.
    /// Returns `true` if `id` was in flight.
    pub fn complete(&mut self, id: &TransactionId) -> bool {
        self.table.remove(id).is_some()
    }

    pub fn is_pending(&self, id: &TransactionId) -> bool {
        self.table.contains_key(id)
    }

    /// Duration until the next event requires attention, for scheduling the caller's timer.
    pub fn poll_timeout(&self, now: Instant) -> Option<Duration> {
        self.table
            .values()
            .map(|t| match t.mode {
                Mode::Unreliable { next_retransmit, .. } => next_retransmit.saturating_duration_since(now),
                Mode::Reliable { deadline } => deadline.saturating_duration_since(now),
            })
            .min()
    }

    /// Advance all transactions past `now`, producing retransmits and timeouts.
    pub fn poll(&mut self, now: Instant) -> Vec<TransactionEvent> {
        let mut events = Vec::new();
        let mut timed_out = Vec::new();

        for (id, txn) in self.table.iter_mut() {
            match &mut txn.mode {
                Mode::Unreliable { attempts, next_retransmit } => {
                    if now < *next_retransmit {
                        continue;
                    }

                    if *attempts >= self.config.max_retransmits {
                        timed_out.push(*id);
                        continue;
                    }

                    *attempts += 1;
                    *next_retransmit = now + self.config.retransmit_delta(*attempts);
                    events.push(TransactionEvent::Retransmit {
                        id: *id,
                        bytes: txn.request.clone(),
                    });
                }
                Mode::Reliable { deadline } => {
                    if now >= *deadline {
                        timed_out.push(*id);
                    }
                }
            }
        }

        for id in timed_out {
            self.table.remove(&id);
            events.push(TransactionEvent::TimedOut { id });
        }

        events
    }
}
