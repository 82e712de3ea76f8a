use crate::detect::DetectError;
use std::collections::VecDeque;

/// Observations kept per metric.
pub const WINDOW_CAPACITY: usize = 100;

/// Observations required before the statistical check runs.
pub const MIN_SAMPLES: usize = 10;

/// Bounded FIFO window of the most recent observations of one metric.
#[derive(Debug, Clone)]
pub struct RollingBaseline {
    values: VecDeque<f64>,
    capacity: usize,
}

impl Default for RollingBaseline {
    fn default() -> Self {
        Self::new()
    }
}

impl RollingBaseline {
    pub fn new() -> Self {
        Self::with_capacity(WINDOW_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `value`, evicting the oldest observation once full.
    pub fn push(&mut self, value: f64) {
        self.values.push_back(value);
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    /// Largest magnitude in the window, used to keep sums in range.
    fn scale(&self) -> f64 {
        let scale = self.values.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
        if scale > 0.0 && scale.is_finite() {
            scale
        } else {
            1.0
        }
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let scale = self.scale();
        let sum: f64 = self.values.iter().map(|x| x / scale).sum();
        sum / self.values.len() as f64 * scale
    }

    /// Sample variance (n - 1 denominator).
    pub fn variance(&self) -> f64 {
        self.std_dev().powi(2)
    }

    pub fn std_dev(&self) -> f64 {
        let n = self.values.len();
        if n < 2 {
            return 0.0;
        }
        let scale = self.scale();
        let mean = self.mean() / scale;
        let sum_sq_diff: f64 = self.values.iter().map(|&x| (x / scale - mean).powi(2)).sum();
        (sum_sq_diff / (n - 1) as f64).sqrt() * scale
    }

    /// Whether `value` falls outside `mean ± sensitivity × std_dev` of the
    /// current window. The window is used as-is, so a value already pushed
    /// counts toward its own baseline.
    pub fn is_outlier(&self, value: f64, sensitivity: f64) -> Result<bool, DetectError> {
        if self.values.len() < MIN_SAMPLES {
            return Err(DetectError::InsufficientBaseline {
                needed: MIN_SAMPLES,
                have: self.values.len(),
            });
        }
        let mean = self.mean();
        let std = self.std_dev();
        if !mean.is_finite() || !std.is_finite() || !value.is_finite() {
            return Err(DetectError::DegenerateBaseline { mean, std_dev: std });
        }
        let lower = mean - sensitivity * std;
        let upper = mean + sensitivity * std;
        Ok(value < lower || value > upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats() {
        let mut b = RollingBaseline::new();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            b.push(v);
        }
        assert!((b.mean() - 3.0).abs() < 1e-12);
        // Sample variance of 1..5 is 2.5
        assert!((b.variance() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_window_is_bounded_fifo() {
        let mut b = RollingBaseline::new();
        for i in 0..250 {
            b.push(i as f64);
            assert!(b.len() <= WINDOW_CAPACITY);
        }
        assert_eq!(b.len(), WINDOW_CAPACITY);
        assert_eq!(b.values().next(), Some(150.0));
        assert_eq!(b.values().last(), Some(249.0));
    }

    #[test]
    fn test_outlier_requires_min_samples() {
        let mut b = RollingBaseline::new();
        for _ in 0..9 {
            b.push(10.0);
        }
        assert_eq!(
            b.is_outlier(1000.0, 2.0),
            Err(DetectError::InsufficientBaseline { needed: 10, have: 9 })
        );
    }

    #[test]
    fn test_constant_window_is_not_outlier_for_same_value() {
        let mut b = RollingBaseline::new();
        for _ in 0..12 {
            b.push(7.0);
        }
        assert_eq!(b.is_outlier(7.0, 2.0), Ok(false));
    }

    #[test]
    fn test_spike_is_outlier() {
        let mut b = RollingBaseline::new();
        for i in 0..15 {
            b.push(50.0 + (i % 5) as f64);
        }
        b.push(120.0);
        assert_eq!(b.is_outlier(120.0, 2.0), Ok(true));
    }

    #[test]
    fn test_non_finite_window_is_degenerate() {
        let mut b = RollingBaseline::new();
        for _ in 0..10 {
            b.push(1.0);
        }
        b.push(f64::NAN);
        assert!(matches!(b.is_outlier(f64::NAN, 2.0), Err(DetectError::DegenerateBaseline { .. })));
    }

    #[test]
    fn test_huge_magnitudes_do_not_overflow() {
        let mut b = RollingBaseline::new();
        for i in 0..20 {
            b.push(if i % 2 == 0 { 1e307 } else { 2e307 });
        }
        b.push(1.7e308);
        assert!(b.mean().is_finite());
        assert!(b.std_dev().is_finite());
        assert_eq!(b.is_outlier(1.7e308, 2.0), Ok(true));
        assert_eq!(b.is_outlier(1.5e307, 2.0), Ok(false));
    }
}
