use std::time::Duration;

/// Floor for a single measurement, so a same-instant loopback still counts.
const MIN_RTT_SAMPLE: Duration = Duration::from_millis(1);

/// Snapshot of the round-trip-time estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RttReport {
    /// The most recent measurement.
    pub rtt: Duration,
    /// Mean over every measurement of the session.
    pub avg: Duration,
    /// Lifetime minimum, never reset.
    pub min: Duration,
    /// Lifetime maximum, never reset.
    pub max: Duration,
}

/// Round-trip-time estimate fed by completed report echo exchanges.
///
/// The average is an incremental cumulative mean: repeated identical
/// samples keep it at exactly that value, so it converges immediately under
/// a fixed network delay. A dropped report simply contributes no sample;
/// the estimator never fabricates one.
#[derive(Debug)]
pub struct RttEstimator {
    latest: Option<Duration>,
    min: Duration,
    max: Duration,
    sum_micros: u64,
    samples: u32,
}

impl RttEstimator {
    pub fn new() -> Self {
        RttEstimator {
            latest: None,
            min: Duration::MAX,
            max: Duration::ZERO,
            sum_micros: 0,
            samples: 0,
        }
    }

    pub fn update(&mut self, sample: Duration) {
        let sample = sample.max(MIN_RTT_SAMPLE);

        self.latest = Some(sample);
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);
        self.sum_micros += sample.as_micros() as u64;
        self.samples += 1;
    }

    /// `None` until the first full exchange has produced a sample.
    pub fn report(&self) -> Option<RttReport> {
        let rtt = self.latest?;

        Some(RttReport {
            rtt,
            avg: Duration::from_micros(self.sum_micros / u64::from(self.samples)),
            min: self.min,
            max: self.max,
        })
    }
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_before_first_sample() {
        assert_eq!(RttEstimator::new().report(), None);
    }

    #[test]
    fn identical_samples_converge_immediately() {
        let mut estimator = RttEstimator::new();

        for _ in 0..5 {
            estimator.update(Duration::from_millis(246));

            let report = estimator.report().unwrap();
            assert_eq!(report.rtt, Duration::from_millis(246));
            assert_eq!(report.avg, Duration::from_millis(246));
            assert_eq!(report.min, Duration::from_millis(246));
            assert_eq!(report.max, Duration::from_millis(246));
        }
    }

    #[test]
    fn min_max_are_lifetime_extrema() {
        let mut estimator = RttEstimator::new();

        estimator.update(Duration::from_millis(246));
        estimator.update(Duration::from_millis(223));

        let report = estimator.report().unwrap();
        assert_eq!(report.rtt, Duration::from_millis(223));
        assert_eq!(report.avg, Duration::from_micros(234_500));
        assert_eq!(report.min, Duration::from_millis(223));
        assert_eq!(report.max, Duration::from_millis(246));

        estimator.update(Duration::from_millis(200));

        let report = estimator.report().unwrap();
        assert_eq!(report.min, Duration::from_millis(200));
        assert_eq!(report.max, Duration::from_millis(246));
    }

    #[test]
    fn samples_are_floored_to_one_millisecond() {
        let mut estimator = RttEstimator::new();
        estimator.update(Duration::ZERO);

        assert_eq!(estimator.report().unwrap().rtt, Duration::from_millis(1));
    }
}
