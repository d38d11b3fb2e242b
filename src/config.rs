// Configuration surface for the simulation and decision core.
//
// Loaded from JSON (the collaborator CLI merges file + flag overrides before
// handing the struct over). Every option carries a serde default so partial
// configs stay valid; `validate()` enforces the cross-field rules.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("conflicting options: {message}")]
    Conflict { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub num_simulations: usize,
    pub seed: Option<u64>,
    pub use_gmm: bool,
    pub cache_dir: PathBuf,
    pub cache_ttl_hours: u64,
    /// Weight for observed in-season scoring vs the preseason prior.
    pub ratings_blend: f64,
    pub score_variance_floor: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_simulations: 10_000,
            seed: None,
            use_gmm: true,
            cache_dir: PathBuf::from(".cache"),
            cache_ttl_hours: 24,
            ratings_blend: 0.65,
            score_variance_floor: 6.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlphaConfig {
    pub alpha_mode: bool,
    /// Blend of (recent form + alpha delta) against the ESPN baseline.
    pub alpha_blend: f64,
    pub shrinkage_k: f64,
    pub recent_weeks: u32,
    pub injury_penalties: BTreeMap<String, f64>,
    pub signal_weights: BTreeMap<String, f64>,
    pub signal_caps: BTreeMap<String, (f64, f64)>,
    pub total_cap: f64,
    pub enable_extended_signals: bool,
    pub schedule_horizon_weeks: u32,
}

pub fn default_injury_penalties() -> BTreeMap<String, f64> {
    [
        ("OUT", 1.0),
        ("INJURY_RESERVE", 1.0),
        ("SUSPENSION", 1.0),
        ("DOUBTFUL", 0.65),
        ("QUESTIONABLE", 0.15),
        ("DAY_TO_DAY", 0.10),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), *v))
    .collect()
}

impl Default for AlphaConfig {
    fn default() -> Self {
        Self {
            alpha_mode: false,
            alpha_blend: 0.35,
            shrinkage_k: 4.0,
            recent_weeks: 4,
            injury_penalties: default_injury_penalties(),
            signal_weights: BTreeMap::new(),
            signal_caps: BTreeMap::new(),
            total_cap: 6.0,
            enable_extended_signals: false,
            schedule_horizon_weeks: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub timeout_seconds: f64,
    pub retries: u32,
    pub backoff_seconds: f64,
    /// Provider week-payload cache TTL.
    pub cache_ttl_seconds: u64,
    /// Leakage cutoff as an explicit instant. Mutually exclusive with
    /// `as_of_date`.
    pub as_of_utc: Option<DateTime<Utc>>,
    /// Leakage cutoff as a calendar date (resolved to end of day UTC).
    pub as_of_date: Option<NaiveDate>,
    /// Recognized for forward compatibility; the only supported resolution
    /// mode is `backward_publish_time`.
    pub as_of_mode: String,
    /// Recognized for forward compatibility; the only supported miss policy
    /// is `degrade_warn`.
    pub as_of_missing_policy: String,
    pub as_of_publication_lag_seconds_by_feed: BTreeMap<String, i64>,
    pub as_of_max_staleness_seconds_by_feed: BTreeMap<String, i64>,
    pub as_of_snapshot_root: PathBuf,
    pub as_of_snapshot_retention_days: i64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 2.0,
            retries: 1,
            backoff_seconds: 0.2,
            cache_ttl_seconds: 300,
            as_of_utc: None,
            as_of_date: None,
            as_of_mode: "backward_publish_time".to_string(),
            as_of_missing_policy: "degrade_warn".to_string(),
            as_of_publication_lag_seconds_by_feed: BTreeMap::new(),
            as_of_max_staleness_seconds_by_feed: BTreeMap::new(),
            as_of_snapshot_root: PathBuf::from("data/feed_snapshots"),
            as_of_snapshot_retention_days: 120,
        }
    }
}

impl RuntimeConfig {
    /// Effective cutoff, if any. `as_of_date` resolves to 23:59:59 UTC so a
    /// date-scoped backtest can see everything published that day.
    pub fn as_of_cutoff(&self) -> Option<DateTime<Utc>> {
        if let Some(instant) = self.as_of_utc {
            return Some(instant);
        }
        self.as_of_date
            .and_then(|date| date.and_hms_opt(23, 59, 59))
            .map(|naive| naive.and_utc())
    }

    pub fn publication_lag_seconds(&self, feed_name: &str) -> i64 {
        self.as_of_publication_lag_seconds_by_feed
            .get(feed_name)
            .copied()
            .unwrap_or(0)
    }

    pub fn max_staleness_seconds(&self, feed_name: &str) -> Option<i64> {
        self.as_of_max_staleness_seconds_by_feed
            .get(feed_name)
            .copied()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub min_advantage: f64,
    pub max_trades_per_team: usize,
    pub max_total_opportunities: usize,
    /// Percent, 0-100.
    pub min_acceptance_probability: f64,
    pub top_n_recommendations: usize,
    pub positions_filter: Option<Vec<String>>,
    pub exclude_injured: bool,
    pub use_ros: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_advantage: 3.0,
            max_trades_per_team: 2,
            max_total_opportunities: 10,
            min_acceptance_probability: 30.0,
            top_n_recommendations: 10,
            positions_filter: None,
            exclude_injured: true,
            use_ros: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub simulation: SimulationConfig,
    pub alpha: AlphaConfig,
    pub runtime: RuntimeConfig,
    pub analysis: AnalysisConfig,
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    let config: Config = serde_json::from_str(&raw).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.simulation.num_simulations == 0 {
        return Err(ConfigError::ValidationError {
            field: "simulation.num_simulations".into(),
            message: "must be greater than 0".into(),
        });
    }
    if !(0.0..=1.0).contains(&config.simulation.ratings_blend) {
        return Err(ConfigError::ValidationError {
            field: "simulation.ratings_blend".into(),
            message: format!(
                "must be within [0, 1], got {}",
                config.simulation.ratings_blend
            ),
        });
    }
    if config.simulation.score_variance_floor < 0.0 {
        return Err(ConfigError::ValidationError {
            field: "simulation.score_variance_floor".into(),
            message: "must be non-negative".into(),
        });
    }

    if !(0.0..=1.0).contains(&config.alpha.alpha_blend) {
        return Err(ConfigError::ValidationError {
            field: "alpha.alpha_blend".into(),
            message: format!("must be within [0, 1], got {}", config.alpha.alpha_blend),
        });
    }
    if config.alpha.shrinkage_k < 0.0 {
        return Err(ConfigError::ValidationError {
            field: "alpha.shrinkage_k".into(),
            message: "must be non-negative".into(),
        });
    }
    if config.alpha.total_cap <= 0.0 {
        return Err(ConfigError::ValidationError {
            field: "alpha.total_cap".into(),
            message: "must be positive".into(),
        });
    }
    for (name, (low, high)) in &config.alpha.signal_caps {
        if low > high {
            return Err(ConfigError::ValidationError {
                field: format!("alpha.signal_caps.{name}"),
                message: format!("inverted range [{low}, {high}]"),
            });
        }
    }

    if config.runtime.as_of_utc.is_some() && config.runtime.as_of_date.is_some() {
        return Err(ConfigError::Conflict {
            message: "as_of_utc and as_of_date are mutually exclusive; set at most one".into(),
        });
    }
    if config.runtime.as_of_mode != "backward_publish_time" {
        return Err(ConfigError::ValidationError {
            field: "runtime.as_of_mode".into(),
            message: format!(
                "unsupported mode `{}`; only backward_publish_time is implemented",
                config.runtime.as_of_mode
            ),
        });
    }
    if config.runtime.as_of_missing_policy != "degrade_warn" {
        return Err(ConfigError::ValidationError {
            field: "runtime.as_of_missing_policy".into(),
            message: format!(
                "unsupported policy `{}`; only degrade_warn is implemented",
                config.runtime.as_of_missing_policy
            ),
        });
    }
    if config.runtime.timeout_seconds <= 0.0 {
        return Err(ConfigError::ValidationError {
            field: "runtime.timeout_seconds".into(),
            message: "must be positive".into(),
        });
    }
    if config.runtime.as_of_snapshot_retention_days < 0 {
        return Err(ConfigError::ValidationError {
            field: "runtime.as_of_snapshot_retention_days".into(),
            message: "must be non-negative".into(),
        });
    }
    for (feed, lag) in &config.runtime.as_of_publication_lag_seconds_by_feed {
        if *lag < 0 {
            return Err(ConfigError::ValidationError {
                field: format!("runtime.as_of_publication_lag_seconds_by_feed.{feed}"),
                message: "lag must be non-negative".into(),
            });
        }
    }
    for (feed, staleness) in &config.runtime.as_of_max_staleness_seconds_by_feed {
        if *staleness < 0 {
            return Err(ConfigError::ValidationError {
                field: format!("runtime.as_of_max_staleness_seconds_by_feed.{feed}"),
                message: "staleness must be non-negative".into(),
            });
        }
    }

    if config.analysis.min_acceptance_probability < 0.0
        || config.analysis.min_acceptance_probability > 100.0
    {
        return Err(ConfigError::ValidationError {
            field: "analysis.min_acceptance_probability".into(),
            message: "must be a percentage in [0, 100]".into(),
        });
    }
    if config.analysis.max_total_opportunities == 0 {
        return Err(ConfigError::ValidationError {
            field: "analysis.max_total_opportunities".into(),
            message: "must be greater than 0".into(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        validate(&Config::default()).expect("default config should be valid");
    }

    #[test]
    fn both_as_of_forms_conflict() {
        let mut config = Config::default();
        config.runtime.as_of_utc = Some(Utc::now());
        config.runtime.as_of_date = NaiveDate::from_ymd_opt(2025, 11, 2);
        match validate(&config) {
            Err(ConfigError::Conflict { .. }) => {}
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn unsupported_as_of_mode_is_rejected() {
        let mut config = Config::default();
        config.runtime.as_of_mode = "forward_fill".to_string();
        match validate(&config) {
            Err(ConfigError::ValidationError { field, .. }) => {
                assert_eq!(field, "runtime.as_of_mode");
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn negative_retention_is_rejected() {
        let mut config = Config::default();
        config.runtime.as_of_snapshot_retention_days = -1;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn as_of_date_resolves_to_end_of_day() {
        let mut config = Config::default();
        config.runtime.as_of_date = NaiveDate::from_ymd_opt(2025, 10, 12);
        let cutoff = config.runtime.as_of_cutoff().expect("cutoff");
        assert_eq!(cutoff.to_rfc3339(), "2025-10-12T23:59:59+00:00");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"simulation": {"num_simulations": 500}}"#).unwrap();
        assert_eq!(config.simulation.num_simulations, 500);
        assert_eq!(config.simulation.cache_ttl_hours, 24);
        assert_eq!(config.analysis.min_advantage, 3.0);
        assert!(config.analysis.exclude_injured);
    }

    #[test]
    fn inverted_signal_cap_is_rejected() {
        let mut config = Config::default();
        config
            .alpha
            .signal_caps
            .insert("usage_trend".into(), (1.0, -1.0));
        assert!(validate(&config).is_err());
    }
}
