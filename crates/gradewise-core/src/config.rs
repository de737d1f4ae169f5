//! Workspace configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Grading engine knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fraction of the total max score needed to pass.
    pub pass_ratio: f64,
    /// Keywords extracted per reference answer.
    pub keyword_top_k: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pass_ratio: 0.6,
            keyword_top_k: 10,
        }
    }
}

/// Quality monitor thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub min_grading_time_secs: f64,
    pub max_grading_time_secs: f64,
    pub low_confidence_threshold: f64,
    /// Score-ratio variance at which consistency reaches 0.
    pub score_variance_threshold: f64,
    pub consistency_threshold: f64,
    pub anomaly_rate_threshold: f64,
    pub iqr_multiplier: f64,
    /// Smallest group the IQR check runs on.
    pub min_group_size: usize,
    pub max_report_anomalies: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            min_grading_time_secs: 5.0,
            max_grading_time_secs: 1800.0,
            low_confidence_threshold: 0.5,
            score_variance_threshold: 0.1,
            consistency_threshold: 0.8,
            anomaly_rate_threshold: 0.1,
            iqr_multiplier: 1.5,
            min_group_size: 3,
            max_report_anomalies: 10,
        }
    }
}

/// Top-level gradewise configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradewiseConfig {
    /// Directory holding one JSON file per persisted rule.
    #[serde(default = "default_rules_dir")]
    pub rules_dir: PathBuf,
    /// Append-only JSON-lines grading record log.
    #[serde(default = "default_records_path")]
    pub records_path: PathBuf,
    /// Output directory for results and reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Max answer sheets graded concurrently.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

fn default_rules_dir() -> PathBuf {
    PathBuf::from("./gradewise-rules")
}
fn default_records_path() -> PathBuf {
    PathBuf::from("./gradewise-records.jsonl")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./gradewise-results")
}
fn default_parallelism() -> usize {
    4
}

impl Default for GradewiseConfig {
    fn default() -> Self {
        Self {
            rules_dir: default_rules_dir(),
            records_path: default_records_path(),
            output_dir: default_output_dir(),
            parallelism: default_parallelism(),
            engine: EngineConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
///
/// Unset variables expand to the empty string.
pub fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

fn resolve_path(path: &Path) -> PathBuf {
    PathBuf::from(resolve_env_vars(&path.to_string_lossy()))
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `gradewise.toml` in the current directory
/// 2. `~/.config/gradewise/config.toml`
///
/// Environment variable overrides: `GRADEWISE_RULES_DIR`, `GRADEWISE_RECORDS`.
pub fn load_config() -> Result<GradewiseConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<GradewiseConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("gradewise.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            let config = toml::from_str::<GradewiseConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?;
            tracing::debug!("loaded config from {}", path.display());
            config
        }
        None => GradewiseConfig::default(),
    };

    if let Ok(dir) = std::env::var("GRADEWISE_RULES_DIR") {
        config.rules_dir = PathBuf::from(dir);
    }
    if let Ok(records) = std::env::var("GRADEWISE_RECORDS") {
        config.records_path = PathBuf::from(records);
    }

    config.rules_dir = resolve_path(&config.rules_dir);
    config.records_path = resolve_path(&config.records_path);
    config.output_dir = resolve_path(&config.output_dir);
    if config.parallelism == 0 {
        config.parallelism = 1;
    }

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("gradewise"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_GRADEWISE_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_GRADEWISE_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_GRADEWISE_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("${unterminated"), "${unterminated");
        std::env::remove_var("_GRADEWISE_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = GradewiseConfig::default();
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.engine.pass_ratio, 0.6);
        assert_eq!(config.engine.keyword_top_k, 10);
        assert_eq!(config.monitor.min_group_size, 3);
        assert_eq!(config.monitor.max_report_anomalies, 10);
    }

    #[test]
    fn parse_partial_sections() {
        let toml_str = r#"
parallelism = 8
output_dir = "out"

[engine]
pass_ratio = 0.5

[monitor]
consistency_threshold = 0.9
"#;
        let config: GradewiseConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.parallelism, 8);
        assert_eq!(config.engine.pass_ratio, 0.5);
        assert_eq!(config.engine.keyword_top_k, 10);
        assert_eq!(config.monitor.consistency_threshold, 0.9);
        assert_eq!(config.monitor.score_variance_threshold, 0.1);
        assert_eq!(config.rules_dir, PathBuf::from("./gradewise-rules"));
    }

    #[test]
    fn load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gradewise.toml");
        std::fs::write(&path, "parallelism = 0\n[engine]\nkeyword_top_k = 3\n").unwrap();
        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.parallelism, 1);
        assert_eq!(config.engine.keyword_top_k, 3);
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let err = load_config_from(Some(Path::new("/nonexistent/gradewise.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }
}
