//! Monotonic engine clock.

use std::sync::OnceLock;
use std::time::Instant;

static START: OnceLock<Instant> = OnceLock::new();

/// Seconds elapsed since the first call in this process.
pub fn elapsed_time() -> f64 {
    START.get_or_init(Instant::now).elapsed().as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_is_monotonic() {
        let a = elapsed_time();
        let b = elapsed_time();
        assert!(a >= 0.0);
        assert!(b >= a);
    }
}
