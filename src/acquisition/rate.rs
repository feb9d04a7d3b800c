use std::collections::VecDeque;
use std::time::Instant;

/// Default number of instantaneous rates averaged into one sample
pub const DEFAULT_RATE_WINDOW: usize = 10;

/// Sliding-window frame rate estimator.
///
/// Each arrival after the first contributes `1 / Δt` to a window of fixed
/// capacity; the reported rate is the mean of the window.
#[derive(Debug, Clone)]
pub struct RateMeter {
    window: VecDeque<f64>,
    capacity: usize,
    last_arrival: Option<Instant>,
}

impl RateMeter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            last_arrival: None,
        }
    }

    /// Record an arrival and return the smoothed rate, if one is defined.
    ///
    /// The first arrival only seeds the meter. An arrival that is not later
    /// than the previous one is ignored.
    pub fn record(&mut self, arrival: Instant) -> Option<f64> {
        let previous = match self.last_arrival {
            Some(previous) if arrival > previous => previous,
            Some(_) => return None,
            None => {
                self.last_arrival = Some(arrival);
                return None;
            }
        };
        self.last_arrival = Some(arrival);

        let interval = arrival.duration_since(previous).as_secs_f64();
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(1.0 / interval);

        Some(self.window.iter().sum::<f64>() / self.window.len() as f64)
    }

    #[cfg(test)]
    pub fn samples(&self) -> usize {
        self.window.len()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RateMeter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_first_arrival_emits_nothing() {
        let mut meter = RateMeter::default();
        assert_eq!(meter.record(Instant::now()), None);
        assert_eq!(meter.samples(), 0);
    }

    #[test]
    fn test_rate_is_mean_of_recent_intervals() {
        let base = Instant::now();
        let gaps_ms = [100u64, 50, 200, 25, 100, 40, 80, 20, 10, 100, 250, 50, 125];

        let mut meter = RateMeter::new(10);
        meter.record(base);

        let mut at = base;
        let mut rates = Vec::new();
        for (k, gap) in gaps_ms.iter().enumerate() {
            at += Duration::from_millis(*gap);
            rates.push(1000.0 / *gap as f64);

            let window = &rates[rates.len().saturating_sub(10)..];
            let expected = window.iter().sum::<f64>() / window.len() as f64;
            let emitted = meter.record(at).unwrap();
            assert_close(emitted, expected);
            assert_eq!(meter.samples(), (k + 1).min(10));
        }
    }

    #[test]
    fn test_non_increasing_arrival_is_ignored() {
        let base = Instant::now();
        let mut meter = RateMeter::new(4);
        meter.record(base);
        assert_close(meter.record(base + Duration::from_millis(100)).unwrap(), 10.0);

        assert_eq!(meter.record(base + Duration::from_millis(100)), None);
        assert_eq!(meter.samples(), 1);

        assert_close(meter.record(base + Duration::from_millis(150)).unwrap(), 15.0);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        assert_eq!(RateMeter::new(0).capacity(), 1);
    }
}
