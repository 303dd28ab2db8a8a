/// Constant-time byte-string comparison.
///
/// Mismatched lengths short-circuit (there is nothing secret left to leak once the
/// lengths themselves differ), but for two equal-length strings every byte is
/// compared and the accumulator never branches on its running value, so the
/// runtime is independent of the position of the first mismatch.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    subtle::ConstantTimeEq::ct_eq(a, b).into()
}
