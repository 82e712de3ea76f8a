//! Per-metric static bounds and the statistical sensitivity multiplier.

use crate::detect::DetectError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SENSITIVITY: f64 = 2.0;

fn default_sensitivity() -> f64 {
    DEFAULT_SENSITIVITY
}

/// Static bounds for one metric. Either bound may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// Standard deviations allowed around the rolling mean.
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,
}

impl Default for Threshold {
    fn default() -> Self {
        Self {
            min: None,
            max: None,
            sensitivity: DEFAULT_SENSITIVITY,
        }
    }
}

impl Threshold {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            min,
            max,
            sensitivity: DEFAULT_SENSITIVITY,
        }
    }

    pub fn bounded(min: f64, max: f64) -> Self {
        Self::new(Some(min), Some(max))
    }

    pub fn upper(max: f64) -> Self {
        Self::new(None, Some(max))
    }

    pub fn lower(min: f64) -> Self {
        Self::new(Some(min), None)
    }

    pub fn with_sensitivity(mut self, sensitivity: f64) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    /// True iff `value` lies strictly outside a configured bound.
    pub fn violated_by(&self, value: f64) -> bool {
        if let Some(min) = self.min {
            if value < min {
                return true;
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return true;
            }
        }
        false
    }

    /// Only bound ordering is checked. A NaN bound never orders.
    fn validate(&self, metric: &str) -> Result<(), DetectError> {
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max || min.is_nan() || max.is_nan() {
                return Err(DetectError::InvalidThreshold {
                    metric: metric.to_string(),
                    min,
                    max,
                });
            }
        }
        Ok(())
    }
}

/// Where the statistical check takes its multiplier from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityMode {
    /// First registered threshold with a non-zero multiplier, whatever metric
    /// it belongs to. Matches the reference detector's output.
    #[default]
    FirstRegistered,
    /// The tested metric's own multiplier. Changes detection output for
    /// registries that mix multipliers.
    PerMetric,
}

/// Threshold lookup keyed by metric name, traversed in registration order.
#[derive(Debug, Clone, Default)]
pub struct ThresholdRegistry {
    entries: Vec<(String, Threshold)>,
}

impl ThresholdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry, rejecting the first malformed threshold.
    pub fn from_entries<I, K>(entries: I) -> Result<Self, DetectError>
    where
        I: IntoIterator<Item = (K, Threshold)>,
        K: Into<String>,
    {
        let mut registry = Self::new();
        for (metric, threshold) in entries {
            registry.set(metric, threshold)?;
        }
        Ok(registry)
    }

    /// Insert or replace the threshold for `metric`. A replaced entry keeps its
    /// position in the traversal order.
    pub fn set(&mut self, metric: impl Into<String>, threshold: Threshold) -> Result<(), DetectError> {
        let metric = metric.into();
        threshold.validate(&metric)?;
        match self.entries.iter_mut().find(|(name, _)| *name == metric) {
            Some((_, existing)) => *existing = threshold,
            None => self.entries.push((metric, threshold)),
        }
        Ok(())
    }

    pub fn get(&self, metric: &str) -> Option<&Threshold> {
        self.entries
            .iter()
            .find(|(name, _)| name == metric)
            .map(|(_, t)| t)
    }

    pub fn contains(&self, metric: &str) -> bool {
        self.get(metric).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Threshold)> {
        self.entries.iter().map(|(name, t)| (name.as_str(), t))
    }

    /// Multiplier for the statistical check on `metric`.
    pub fn sensitivity_for(&self, metric: &str, mode: SensitivityMode) -> f64 {
        match mode {
            SensitivityMode::FirstRegistered => self
                .entries
                .iter()
                .map(|(_, t)| t.sensitivity)
                .find(|s| *s != 0.0)
                .unwrap_or(DEFAULT_SENSITIVITY),
            SensitivityMode::PerMetric => self
                .get(metric)
                .map(|t| t.sensitivity)
                .filter(|s| *s != 0.0)
                .unwrap_or(DEFAULT_SENSITIVITY),
        }
    }
}
