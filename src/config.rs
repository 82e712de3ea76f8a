//! TOML configuration for the triage engines.
//!
//! Every section is optional and missing fields take compiled-in defaults, but
//! a file that is named or present must parse: a wrong-shaped value is an
//! error, not a silent fallback.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::{RcaEngine, Rule};
use crate::detect::{AnomalyDetector, SensitivityMode, Threshold, ThresholdRegistry};

pub const CONFIG_ENV: &str = "OPSTRIAGE_CONFIG";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/opstriage/opstriage.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriageConfig {
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the active configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// `--config` on the command line.
    Explicit(PathBuf),
    /// The file named by `$OPSTRIAGE_CONFIG`.
    Env(PathBuf),
    /// The system-wide file.
    System(PathBuf),
    /// No file; compiled-in defaults.
    Defaults,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Explicit(p) => write!(f, "--config {}", p.display()),
            ConfigSource::Env(p) => write!(f, "${} ({})", CONFIG_ENV, p.display()),
            ConfigSource::System(p) => write!(f, "{}", p.display()),
            ConfigSource::Defaults => write!(f, "compiled-in defaults"),
        }
    }
}

impl TriageConfig {
    /// Parse a TOML document. Unknown shapes are errors, never defaulted.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("malformed triage configuration")
    }

    /// Read and parse the TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("in config file: {}", path.display()))
    }

    /// Pick the configuration for this process: `explicit`, then
    /// `$OPSTRIAGE_CONFIG`, then the system file, then defaults. A named or
    /// present file that fails to load is an error.
    pub fn resolve(explicit: Option<&Path>) -> Result<(Self, ConfigSource)> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::resolve_from(explicit, env_path, Path::new(SYSTEM_CONFIG_PATH))
    }

    fn resolve_from(
        explicit: Option<&Path>,
        env_path: Option<PathBuf>,
        system_path: &Path,
    ) -> Result<(Self, ConfigSource)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, ConfigSource::Explicit(path.to_path_buf())));
        }
        if let Some(path) = env_path.filter(|p| !p.as_os_str().is_empty()) {
            let config = Self::load(&path).with_context(|| format!("{} is set", CONFIG_ENV))?;
            return Ok((config, ConfigSource::Env(path)));
        }
        if system_path.exists() {
            return Ok((Self::load(system_path)?, ConfigSource::System(system_path.to_path_buf())));
        }
        Ok((Self::default(), ConfigSource::Defaults))
    }

    pub fn build_detector(&self) -> Result<AnomalyDetector> {
        let registry = ThresholdRegistry::from_entries(
            self.detector
                .thresholds
                .iter()
                .map(|e| (e.metric.clone(), e.threshold())),
        )
        .context("invalid detector threshold")?;

        Ok(AnomalyDetector::new(registry)
            .with_sensitivity_mode(self.detector.sensitivity_mode)
            .with_history_limit(self.detector.history_limit))
    }

    pub fn build_engine(&self) -> Result<RcaEngine> {
        let engine = RcaEngine::new(self.analysis.rules.clone()).context("invalid analysis rule")?;
        Ok(engine.with_history_limit(self.analysis.history_limit))
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Where the statistical check takes its multiplier from.
    pub sensitivity_mode: SensitivityMode,
    /// Maximum retained anomalies. Unbounded when absent.
    pub history_limit: Option<usize>,
    /// Registered thresholds, in traversal order.
    pub thresholds: Vec<ThresholdEntry>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sensitivity_mode: SensitivityMode::FirstRegistered,
            history_limit: None,
            thresholds: vec![
                ThresholdEntry::bounded("cpu_usage", 0.0, 80.0),
                ThresholdEntry::bounded("memory_usage", 0.0, 85.0),
                ThresholdEntry::bounded("response_time", 0.0, 2000.0),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdEntry {
    pub metric: String,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,
}

fn default_sensitivity() -> f64 {
    crate::detect::threshold::DEFAULT_SENSITIVITY
}

impl ThresholdEntry {
    fn bounded(metric: &str, min: f64, max: f64) -> Self {
        Self {
            metric: metric.to_string(),
            min: Some(min),
            max: Some(max),
            sensitivity: default_sensitivity(),
        }
    }

    pub fn threshold(&self) -> Threshold {
        Threshold::new(self.min, self.max).with_sensitivity(self.sensitivity)
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Maximum retained analysis results. Unbounded when absent.
    pub history_limit: Option<usize>,
    /// Custom rules in match order. The built-in set applies when empty.
    pub rules: Vec<Rule>,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::RootCause;
    use crate::detect::AnomalyKind;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = TriageConfig::default();

        assert_eq!(cfg.detector.sensitivity_mode, SensitivityMode::FirstRegistered);
        assert!(cfg.detector.history_limit.is_none());
        assert_eq!(cfg.detector.thresholds.len(), 3);
        assert_eq!(cfg.detector.thresholds[0].metric, "cpu_usage");
        assert_eq!(cfg.detector.thresholds[2].max, Some(2000.0));

        assert!(cfg.analysis.rules.is_empty());
        assert!(cfg.analysis.history_limit.is_none());

        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.logging.json);
    }

    const FULL: &str = r#"
[detector]
sensitivity_mode = "per_metric"
history_limit = 5000

[[detector.thresholds]]
metric = "cpu_usage"
min = 0.0
max = 90.0
sensitivity = 3.0

[[detector.thresholds]]
metric = "error_rate"
max = 0.05

[analysis]
history_limit = 100

[[analysis.rules]]
id = "R100"
root_cause = "DATABASE_FAILURE"
confidence_prior = 0.8
description = "Database errors"
[analysis.rules.pattern]
required_types = ["LOG_ERROR"]
components = ["Database"]

[logging]
level = "debug"
json = true
"#;

    const WRONG_SHAPE: &str = "[[detector.thresholds]]\nmetric = \"cpu_usage\"\nmax = \"high\"\n";

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_every_section_is_read() {
        let cfg = TriageConfig::from_toml(FULL).unwrap();

        assert_eq!(cfg.detector.sensitivity_mode, SensitivityMode::PerMetric);
        assert_eq!(cfg.detector.history_limit, Some(5000));
        assert_eq!(cfg.detector.thresholds.len(), 2);
        assert_eq!(cfg.detector.thresholds[0].sensitivity, 3.0);
        assert_eq!(cfg.detector.thresholds[1].min, None);
        assert_eq!(cfg.detector.thresholds[1].sensitivity, 2.0);

        assert_eq!(cfg.analysis.history_limit, Some(100));
        let rule = &cfg.analysis.rules[0];
        assert_eq!(rule.root_cause, RootCause::DatabaseFailure);
        assert!(rule
            .pattern
            .required_types
            .as_ref()
            .unwrap()
            .contains(&AnomalyKind::LogError));

        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.logging.json);
    }

    #[test]
    fn test_missing_sections_keep_builtin_thresholds() {
        let cfg = TriageConfig::from_toml("[logging]\nlevel = \"warn\"\n").unwrap();
        assert_eq!(cfg.logging.level, "warn");
        assert_eq!(cfg.detector.thresholds.len(), 3);
        assert!(cfg.analysis.rules.is_empty());

        let empty = TriageConfig::from_toml("").unwrap();
        assert_eq!(empty.detector.thresholds[1].metric, "memory_usage");
    }

    #[test]
    fn test_inverted_threshold_fails_build() {
        let cfg = TriageConfig::from_toml("[[detector.thresholds]]\nmetric = \"cpu_usage\"\nmin = 90.0\nmax = 10.0\n").unwrap();
        let err = cfg.build_detector().unwrap_err();
        assert!(err.to_string().contains("invalid detector threshold"));
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        assert!(TriageConfig::from_toml(WRONG_SHAPE).is_err());
    }

    #[test]
    fn test_invalid_rule_fails_build() {
        let cfg = TriageConfig::from_toml(
            "[[analysis.rules]]\nid = \"R9\"\nroot_cause = \"APPLICATION_BUG\"\nconfidence_prior = 2.0\n",
        )
        .unwrap();
        assert!(cfg.build_engine().is_err());
    }

    #[test]
    fn test_build_engines_from_defaults() {
        let cfg = TriageConfig::default();
        let detector = cfg.build_detector().unwrap();
        assert_eq!(detector.thresholds().len(), 3);
        let engine = cfg.build_engine().unwrap();
        assert_eq!(engine.rules().len(), 3);
    }

    #[test]
    fn test_resolve_prefers_explicit_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let explicit = write(&dir, "cli.toml", "[detector]\nhistory_limit = 10\n");
        let env = write(&dir, "env.toml", "[detector]\nhistory_limit = 20\n");

        let (cfg, source) =
            TriageConfig::resolve_from(Some(&explicit), Some(env), &dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.detector.history_limit, Some(10));
        assert_eq!(source, ConfigSource::Explicit(explicit));
    }

    #[test]
    fn test_resolve_env_path_before_system_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let env = write(&dir, "env.toml", "[detector]\nhistory_limit = 20\n");
        let system = write(&dir, "system.toml", "[detector]\nhistory_limit = 30\n");

        let (cfg, source) = TriageConfig::resolve_from(None, Some(env.clone()), &system).unwrap();
        assert_eq!(cfg.detector.history_limit, Some(20));
        assert_eq!(source, ConfigSource::Env(env));

        let (cfg, source) = TriageConfig::resolve_from(None, None, &system).unwrap();
        assert_eq!(cfg.detector.history_limit, Some(30));
        assert_eq!(source, ConfigSource::System(system));
    }

    #[test]
    fn test_resolve_malformed_env_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let env = write(&dir, "env.toml", WRONG_SHAPE);

        let err = TriageConfig::resolve_from(None, Some(env), &dir.path().join("absent.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains(CONFIG_ENV));
    }

    #[test]
    fn test_resolve_missing_env_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(TriageConfig::resolve_from(None, Some(missing), &dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_resolve_malformed_system_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let system = write(&dir, "system.toml", WRONG_SHAPE);
        assert!(TriageConfig::resolve_from(None, None, &system).is_err());
    }

    #[test]
    fn test_resolve_without_files_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let (cfg, source) =
            TriageConfig::resolve_from(None, Some(PathBuf::new()), &dir.path().join("absent.toml")).unwrap();
        assert_eq!(source, ConfigSource::Defaults);
        assert_eq!(cfg.detector.thresholds.len(), 3);
    }

    #[test]
    fn test_defaults_survive_toml_encoding() {
        let cfg = TriageConfig::default();
        let encoded = toml::to_string_pretty(&cfg).unwrap();
        let decoded = TriageConfig::from_toml(&encoded).unwrap();
        assert_eq!(decoded.detector.thresholds.len(), 3);
        assert_eq!(decoded.detector.thresholds[2].max, Some(2000.0));
        assert_eq!(decoded.logging.level, cfg.logging.level);
    }
}
