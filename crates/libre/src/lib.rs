#![deny(unreachable_pub, unsafe_code)]

//! Facade over the protocol engines: STUN, ICE, BFCP, RTMP and SIP-event
//! subscribe/notify, all routed through a shared transport substrate.
//!
//! Socket I/O, TLS/DTLS record layers, SDP and DNS are external
//! collaborators (spec.md §1 Non-goals) — this crate wires the engines
//! together and exposes one process-wide init/teardown pair (spec.md §6).

pub mod config;
pub mod error;
mod rng;

pub use config::LibreConfig;
pub use error::{Error, ErrorKind};
pub use rng::global_rng;

pub use libre_bfcp as bfcp;
pub use libre_crypto as crypto;
pub use libre_ice as ice;
pub use libre_rtmp as rtmp;
pub use libre_sip_event as sip_event;
pub use libre_stun as stun;
pub use libre_transport as transport;

use std::sync::atomic::{AtomicBool, Ordering};

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// One-time process-wide init: seeds the global RNG (spec.md §9). Calling
/// this more than once is harmless — the RNG is only ever seeded the first
/// time.
pub fn init() {
    rng::seed();
    INITIALIZED.store(true, Ordering::SeqCst);
    log::debug!("libre: initialized (global RNG seeded)");
}

/// Tears down process-global state `init()` set up. After this, engines
/// still function (they don't depend on `libre`'s own init) and
/// `global_rng()` keeps returning the same seeded generator — the global
/// RNG is seeded once per process and `teardown()` doesn't unseed it (see
/// [`rng::teardown`] for why). Only [`is_initialized`] flips back to
/// `false`.
///
/// Socket fd sets and TLS context caches are an external collaborator's
/// state (spec.md §1 Non-goals exclude OS socket abstraction); this
/// teardown only clears what this crate itself owns.
pub fn teardown() {
    rng::teardown();
    INITIALIZED.store(false, Ordering::SeqCst);
    log::debug!("libre: torn down");
}

pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn init_then_teardown_round_trips_initialized_state() {
        init_logging();
        teardown();
        assert!(!is_initialized());
        init();
        assert!(is_initialized());
        assert!(global_rng().is_some());
        teardown();
        assert!(!is_initialized());
        // teardown() only flips is_initialized back; the global RNG it
        // seeded stays seeded for the rest of the process (see rng::teardown).
        assert!(global_rng().is_some());
    }
}
