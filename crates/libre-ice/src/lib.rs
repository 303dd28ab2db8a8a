#![deny(unreachable_pub, unsafe_code)]

//! ICE agent (RFC 5245): candidate/pair model, checklist construction,
//! connectivity checks, nomination and role-conflict arbitration.
//!
//! The agent never touches a socket. [`IceSession::poll`] and
//! [`IceSession::recv`] return [`IceEvent`]s the caller dispatches through
//! its own datagram transport, matching the reactor model in spec.md §5:
//! every "wait" is a registered timer/callback, never a blocking call.

mod candidate;
mod checklist;
mod pair;
mod session;

pub use candidate::{Candidate, CandidateHandle, CandidateType};
pub use pair::{pair_priority, CandidatePair, PairState};
pub use session::{AgentConfig, AgentMode, ChecklistState, IceEvent, IceMediaStream, IceSession, Nomination, Role};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("bad ICE message: {0}")]
    BadMessage(&'static str),
    #[error(transparent)]
    Stun(#[from] libre_stun::Error),
    #[error("not supported: {0}")]
    NotSupported(&'static str),
    #[error("authentication failed")]
    AuthFailed,
    #[error("connectivity check timed out")]
    Timeout,
    #[error("protocol violation: {0}")]
    Protocol(&'static str),
}
