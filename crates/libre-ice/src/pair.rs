use crate::candidate::CandidateHandle;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    Frozen,
    Waiting,
    InProgress,
    Succeeded,
    Failed,
}

/// `(local, remote, pair_priority, state, default, valid, nominated, use_cand, rtt, last_error)`.
pub struct CandidatePair {
    pub local: CandidateHandle,
    pub remote: CandidateHandle,
    pub priority: u64,
    pub state: PairState,
    pub default: bool,
    pub valid: bool,
    pub nominated: bool,
    pub use_candidate: bool,
    pub rtt: Option<Duration>,
    pub last_error: Option<crate::Error>,
    pub(crate) foundation: String,
}

impl CandidatePair {
    pub fn new(local: CandidateHandle, remote: CandidateHandle, we_are_controlling: bool) -> Self {
        let priority = pair_priority(local.priority, remote.priority, we_are_controlling);
        let foundation = format!("{}:{}", local.foundation, remote.foundation);
        Self {
            local,
            remote,
            priority,
            state: PairState::Frozen,
            default: false,
            valid: false,
            nominated: false,
            use_candidate: false,
            rtt: None,
            last_error: None,
            foundation,
        }
    }

    /// Identity used for pruning: a pair is redundant if a higher-priority
    /// pair already covers the same `(base-of-local, remote)`.
    pub(crate) fn prune_key(&self) -> (SocketAddr, SocketAddr) {
        (self.local.base().address, self.remote.address)
    }
}

/// `2^32 * min(G,D) + 2*max(G,D) + (G>D?1:0)`, RFC 5245 §5.7.2, where `G` is
/// the controlling candidate's priority and `D` the controlled candidate's.
pub fn pair_priority(local_priority: u32, remote_priority: u32, we_are_controlling: bool) -> u64 {
    let (g, d) = if we_are_controlling {
        (local_priority as u64, remote_priority as u64)
    } else {
        (remote_priority as u64, local_priority as u64)
    };
    (1u64 << 32) * g.min(d) + 2 * g.max(d) + u64::from(g > d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_is_order_independent_in_magnitude() {
        // Same pair of priorities, opposite roles: both sides compute the
        // same 64-bit value since min/max is role-symmetric.
        let a = pair_priority(100, 200, true);
        let b = pair_priority(200, 100, false);
        assert_eq!(a, b);
    }
}
