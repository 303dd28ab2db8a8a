//! Process-wide RNG, seeded once from the OS entropy source on [`crate::init`]
//! (spec.md §9 "Global RNG": STUN tids, ICE tie-breakers, SIP jitter and AES
//! IVs are all drawn from one cryptographically secure generator).
//!
//! Individual engine crates (`libre-stun`, `libre-ice`, `libre-sip-event`)
//! call `rand::thread_rng()` directly rather than threading this handle
//! through every constructor — `thread_rng` is itself `OsRng`-seeded and
//! cryptographically secure, so the two are equivalent in practice. This
//! handle exists for callers that want the single explicit seed point the
//! spec describes without reaching into each engine's internals.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Mutex, OnceLock};

static GLOBAL_RNG: OnceLock<Mutex<StdRng>> = OnceLock::new();

pub(crate) fn seed() {
    GLOBAL_RNG.get_or_init(|| Mutex::new(StdRng::from_entropy()));
}

/// A no-op: `OnceLock::take` isn't stable, so there's no way to actually
/// drop the seeded generator and go back to unseeded. Re-seeding on the
/// next `init()` would be indistinguishable from not clearing it, since
/// nothing but `global_rng()` observes this state and `seed()` itself is
/// idempotent — so `crate::teardown()` doesn't claim to unseed the RNG.
pub(crate) fn teardown() {}

/// The process-wide generator seeded by [`crate::init`]. Returns `None` if
/// `init()` hasn't run yet. Once seeded, stays seeded for the life of the
/// process — `crate::teardown()` doesn't clear it.
pub fn global_rng() -> Option<&'static Mutex<StdRng>> {
    GLOBAL_RNG.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_rng_is_absent_until_seeded() {
        // other tests in this binary may have already called seed(), so this
        // only asserts the accessor doesn't panic either way.
        let _ = global_rng();
        seed();
        assert!(global_rng().is_some());
    }

    #[test]
    fn teardown_does_not_unseed_the_global_rng() {
        seed();
        assert!(global_rng().is_some());
        teardown();
        assert!(global_rng().is_some(), "teardown is a no-op; the RNG stays seeded for the process");
    }
}
