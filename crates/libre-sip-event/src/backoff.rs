use rand::Rng;
use std::time::Duration;

/// Retry delay for a failed subscription refresh: `min(1800s, 30s *
/// 2^min(failc,6)) * jitter` where `jitter` is provided by the caller
/// (spec.md §4.4). Split out from [`jittered`] so the formula itself is
/// testable without depending on RNG.
pub fn delay_for(failc: u32, jitter: f64) -> Duration {
    assert!((0.5..=1.0).contains(&jitter), "jitter must be in 0.5..=1.0");
    let exponent = failc.min(6);
    let base_secs = 30.0 * 2f64.powi(exponent as i32);
    let capped_secs = base_secs.min(1800.0);
    Duration::from_secs_f64(capped_secs * jitter)
}

/// Same formula with the jitter drawn from a uniform `0.5..1.0` distribution.
pub fn jittered(failc: u32) -> Duration {
    let jitter = rand::thread_rng().gen_range(0.5..1.0);
    delay_for(failc, jitter)
}

/// `0.9 * expires`, the refresh-scheduling rule from spec.md §4.4/§8
/// scenario 5.
pub fn refresh_delay(expires: u32) -> Duration {
    Duration::from_secs_f64(f64::from(expires) * 0.9)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_geometrically_then_caps_at_1800s() {
        assert_eq!(delay_for(0, 1.0), Duration::from_secs(30));
        assert_eq!(delay_for(1, 1.0), Duration::from_secs(60));
        assert_eq!(delay_for(2, 1.0), Duration::from_secs(120));
        assert_eq!(delay_for(6, 1.0), Duration::from_secs(1800));
        assert_eq!(delay_for(20, 1.0), Duration::from_secs(1800), "exponent clamps at 6");
    }

    #[test]
    fn jitter_scales_the_base_delay() {
        assert_eq!(delay_for(0, 0.5), Duration::from_secs(15));
    }

    #[test]
    fn jittered_stays_within_the_expected_band() {
        for _ in 0..100 {
            let d = jittered(3);
            assert!(d >= Duration::from_secs_f64(120.0), "{d:?}");
            assert!(d <= Duration::from_secs_f64(240.0), "{d:?}");
        }
    }

    #[test]
    fn refresh_delay_is_ninety_percent_of_expires() {
        assert_eq!(refresh_delay(600), Duration::from_secs(540));
        assert_eq!(refresh_delay(300), Duration::from_secs(270));
    }
}
