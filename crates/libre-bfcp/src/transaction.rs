use crate::message::Primitive;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// BFCP runs over a reliable transport, so a client transaction gets exactly
/// one send and one timeout; there is no retransmission ladder to climb.
pub const TRANSACTION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedOut {
    pub transaction_id: u16,
    pub completion: u64,
}

struct Pending {
    #[allow(dead_code)] // kept for callers that want to log the request primitive on timeout
    primitive: Primitive,
    completion: u64,
    deadline: Instant,
}

/// Tracks outstanding client-originated BFCP requests by their 16-bit
/// transaction id (RFC 4582 §5: non-zero, monotonically increasing, wraps
/// past 0 back to 1).
pub struct ClientTransactions {
    next_tid: u16,
    next_completion: u64,
    pending: HashMap<u16, Pending>,
    timeout: Duration,
}

impl ClientTransactions {
    pub fn new() -> Self {
        Self::with_timeout(TRANSACTION_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { next_tid: 1, next_completion: 0, pending: HashMap::new(), timeout }
    }

    fn allocate_tid(&mut self) -> u16 {
        let tid = self.next_tid;
        self.next_tid = match self.next_tid.wrapping_add(1) {
            0 => 1,
            n => n,
        };
        tid
    }

    /// Register a newly-sent request, returning its transaction id and an
    /// opaque completion token the caller correlates its reply with.
    pub fn begin(&mut self, primitive: Primitive, now: Instant) -> (u16, u64) {
        let tid = self.allocate_tid();
        let completion = self.next_completion;
        self.next_completion += 1;
        self.pending.insert(tid, Pending { primitive, completion, deadline: now + self.timeout });
        (tid, completion)
    }

    /// A reply arrived for `transaction_id`; returns its completion token if
    /// a matching request is still outstanding (an unmatched/duplicate reply
    /// returns `None` and is the caller's job to ignore).
    pub fn complete(&mut self, transaction_id: u16) -> Option<u64> {
        self.pending.remove(&transaction_id).map(|p| p.completion)
    }

    /// Drain every transaction whose timeout has elapsed as of `now`.
    pub fn poll(&mut self, now: Instant) -> Vec<TimedOut> {
        let expired: Vec<u16> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(tid, _)| *tid)
            .collect();
        expired
            .into_iter()
            .map(|tid| {
                let p = self.pending.remove(&tid).expect("tid collected from self.pending");
                TimedOut { transaction_id: tid, completion: p.completion }
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for ClientTransactions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_ids_are_monotonic_and_skip_zero() {
        let mut txns = ClientTransactions::new();
        let now = Instant::now();
        let mut txns_ids = Vec::new();
        for _ in 0..3 {
            let (tid, _) = txns.begin(Primitive::FloorRequest, now);
            txns_ids.push(tid);
        }
        assert_eq!(txns_ids, vec![1, 2, 3]);

        txns.next_tid = u16::MAX;
        let (tid, _) = txns.begin(Primitive::Hello, now);
        assert_eq!(tid, u16::MAX);
        let (tid, _) = txns.begin(Primitive::Hello, now);
        assert_eq!(tid, 1, "tid must wrap past 0 straight to 1");
    }

    #[test]
    fn complete_removes_and_returns_the_matching_completion() {
        let mut txns = ClientTransactions::new();
        let now = Instant::now();
        let (tid, completion) = txns.begin(Primitive::FloorRequest, now);
        assert_eq!(txns.complete(tid), Some(completion));
        assert_eq!(txns.complete(tid), None, "a second reply for the same tid is unmatched");
    }

    #[test]
    fn poll_times_out_after_ten_seconds() {
        let mut txns = ClientTransactions::new();
        let now = Instant::now();
        let (tid, completion) = txns.begin(Primitive::FloorRequest, now);

        assert!(txns.poll(now + Duration::from_secs(9)).is_empty());

        let timed_out = txns.poll(now + Duration::from_secs(11));
        assert_eq!(timed_out, vec![TimedOut { transaction_id: tid, completion }]);
        assert!(txns.is_empty());
    }
}
