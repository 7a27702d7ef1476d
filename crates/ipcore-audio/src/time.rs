//! Seconds to samples and back.

/// Time in seconds.
pub type Time = f64;

/// Sample position nearest to `t` at `rate`.
pub fn time_to_samples(t: Time, rate: f64) -> i64 {
    (t * rate).round() as i64
}

pub fn samples_to_time(samples: i64, rate: f64) -> Time {
    if rate == 0.0 {
        return 0.0;
    }
    samples as f64 / rate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_boundaries() {
        assert_eq!(time_to_samples(1.0 / 24.0, 48000.0), 2000);
        assert_eq!(time_to_samples(-1.0 / 24.0, 48000.0), -2000);
        assert_eq!(samples_to_time(48000, 48000.0), 1.0);
    }

    #[test]
    fn test_zero_rate() {
        assert_eq!(samples_to_time(10, 0.0), 0.0);
    }
}
