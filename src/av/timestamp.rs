//! Normalization of 33-bit MPEG-TS timestamps.
//!
//! PTS and DTS values in a transport stream count a 90 kHz clock modulo 2^33,
//! so they wrap roughly every 26.5 hours. A [`TimestampNormalizer`] turns those
//! raw samples into a running 64-bit tick count that starts at zero on the
//! first sample and keeps increasing across wraparounds.

use std::time::Duration;

/// Rate of the PTS/DTS clock.
pub const PTS_HZ: i64 = 90_000;

/// Modulus of the 33-bit PTS/DTS clock.
pub const PTS_MODULUS: i64 = 1 << 33;

const PTS_MASK: i64 = PTS_MODULUS - 1;

// Differences with this bit set are steps backwards.
const NEGATIVE_THRESHOLD: i64 = PTS_MODULUS >> 1;

#[derive(Debug, Clone, Copy)]
struct ClockState {
    epoch: i64,
    previous: i64,
    total: i64,
}

/// Per-feed clock domain.
///
/// The first decoded sample becomes the epoch and decodes to zero. Every later
/// sample adds its signed distance from the previous sample (modulo 2^33) to a
/// running total. A raw value that drops numerically because the clock wrapped
/// is therefore forward progress, while a small backward step, such as a
/// B-frame presented before its reference, stays a small negative delta.
///
/// ```
/// use udphls::av::timestamp::{TimestampNormalizer, PTS_MODULUS};
///
/// let mut clock = TimestampNormalizer::new();
/// assert_eq!(clock.decode(PTS_MODULUS - 10), 0);
/// assert_eq!(clock.decode(PTS_MODULUS - 5), 5);
/// assert_eq!(clock.decode(3), 13);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TimestampNormalizer {
    state: Option<ClockState>,
}

impl TimestampNormalizer {
    pub fn new() -> Self {
        Self { state: None }
    }

    /// Decodes a raw 33-bit sample into ticks elapsed since the epoch.
    pub fn decode(&mut self, raw: i64) -> i64 {
        let raw = raw & PTS_MASK;
        match self.state.as_mut() {
            None => {
                self.state = Some(ClockState {
                    epoch: raw,
                    previous: raw,
                    total: 0,
                });
                0
            }
            Some(state) => {
                let mut delta = (raw - state.previous) & PTS_MASK;
                if delta & NEGATIVE_THRESHOLD != 0 {
                    delta -= PTS_MODULUS;
                }
                state.total += delta;
                state.previous = raw;
                state.total
            }
        }
    }

    /// Raw sample that anchors this clock, once one has been seen.
    pub fn epoch(&self) -> Option<i64> {
        self.state.map(|s| s.epoch)
    }

    /// Most recent normalized value.
    pub fn last(&self) -> Option<i64> {
        self.state.map(|s| s.total)
    }
}

/// Converts 90 kHz ticks into a duration; negative tick counts have none.
pub fn ticks_to_duration(ticks: i64) -> Option<Duration> {
    if ticks < 0 {
        return None;
    }
    let ticks = ticks as u64;
    let secs = ticks / PTS_HZ as u64;
    let nanos = (ticks % PTS_HZ as u64) * 1_000_000_000 / PTS_HZ as u64;
    Some(Duration::new(secs, nanos as u32))
}

/// Converts a duration into 90 kHz ticks.
pub fn duration_to_ticks(duration: Duration) -> i64 {
    (duration.as_nanos() * PTS_HZ as u128 / 1_000_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_first_sample_is_epoch() {
        let mut clock = TimestampNormalizer::new();
        assert_eq!(clock.epoch(), None);
        assert_eq!(clock.decode(123_456), 0);
        assert_eq!(clock.epoch(), Some(123_456));
        assert_eq!(clock.decode(123_456 + 3000), 3000);
        assert_eq!(clock.last(), Some(3000));
    }

    #[test]
    fn test_wraparound_is_forward_progress() {
        let mut clock = TimestampNormalizer::new();
        let decoded: Vec<i64> = [PTS_MODULUS - 10, PTS_MODULUS - 5, 3]
            .iter()
            .map(|&raw| clock.decode(raw))
            .collect();
        assert_eq!(decoded, vec![0, 5, 13]);
        assert!(decoded.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_small_backward_step_is_negative() {
        let mut clock = TimestampNormalizer::new();
        clock.decode(9000);
        assert_eq!(clock.decode(6000), -3000);
        assert_eq!(clock.decode(12000), 3000);

        let mut clock = TimestampNormalizer::new();
        clock.decode(1000);
        assert_eq!(clock.decode(PTS_MODULUS - 2000), -3000);
    }

    #[test]
    fn test_values_are_masked_to_33_bits() {
        let mut clock = TimestampNormalizer::new();
        clock.decode(PTS_MODULUS + 100);
        assert_eq!(clock.epoch(), Some(100));
        assert_eq!(clock.decode(200), 100);
    }

    #[test]
    fn test_tick_conversions() {
        assert_eq!(ticks_to_duration(90_000), Some(Duration::from_secs(1)));
        assert_eq!(ticks_to_duration(45_000), Some(Duration::from_millis(500)));
        assert_eq!(ticks_to_duration(-1), None);
        assert_eq!(duration_to_ticks(Duration::from_millis(40)), 3600);
    }

    #[quickcheck]
    fn prop_forward_steps_never_decrease(start: u64, steps: Vec<u32>) -> bool {
        let mut clock = TimestampNormalizer::new();
        let mut raw = (start as i64) & PTS_MASK;
        let mut previous = clock.decode(raw);
        let mut expected = 0i64;
        for step in steps {
            // Forward steps must stay below half the modulus to be unambiguous.
            let step = (step >> 1) as i64;
            raw = (raw + step) & PTS_MASK;
            expected += step;
            let current = clock.decode(raw);
            if current < previous || current != expected {
                return false;
            }
            previous = current;
        }
        true
    }
}
