use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use qestimate::invariant::DEFAULT_INVARIANTS;
use qestimate::window::{DEFAULT_AGE_BUCKETS, DEFAULT_MAX_AGE};

/// Configuration file structure for qestimate.
///
/// Lets users keep their quantile targets and window settings in one place
/// instead of repeating them on every run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Quantile targets
    #[serde(default)]
    pub estimator: EstimatorConfig,

    /// Sliding window settings for the `window` command
    #[serde(default)]
    pub window: WindowConfig,

    /// Output format preferences
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EstimatorConfig {
    /// Quantiles to track and the rank error allowed for each
    #[serde(default = "default_invariants")]
    pub invariants: Vec<InvariantConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InvariantConfig {
    pub quantile: f64,
    pub error: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WindowConfig {
    /// Oldest observation age that still counts towards estimates
    #[serde(default = "default_max_age_seconds")]
    pub max_age_seconds: u64,

    /// Number of estimators in the rotation ring
    #[serde(default = "default_age_buckets")]
    pub age_buckets: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Default output format
    #[serde(default)]
    pub format: OutputFormat,

    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,

    /// Ranks to report; empty means the invariant quantiles
    #[serde(default)]
    pub ranks: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Summary,
    Json,
    Csv,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            invariants: default_invariants(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_age_seconds: default_max_age_seconds(),
            age_buckets: default_age_buckets(),
        }
    }
}

fn default_invariants() -> Vec<InvariantConfig> {
    DEFAULT_INVARIANTS
        .iter()
        .map(|&(quantile, error)| InvariantConfig { quantile, error })
        .collect()
}

fn default_max_age_seconds() -> u64 {
    DEFAULT_MAX_AGE.as_secs()
}

fn default_age_buckets() -> usize {
    DEFAULT_AGE_BUCKETS
}

impl EstimatorConfig {
    pub fn invariant_pairs(&self) -> Vec<(f64, f64)> {
        self.invariants
            .iter()
            .map(|invariant| (invariant.quantile, invariant.error))
            .collect()
    }
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./qestimate.toml
    /// 3. ./qestimate.json
    /// 4. `<user config dir>/qestimate/config.toml`
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let mut candidates: Vec<PathBuf> = ["qestimate.toml", "qestimate.json"]
            .iter()
            .map(PathBuf::from)
            .collect();
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("qestimate").join("config.toml"));
        }

        for candidate in &candidates {
            if candidate.exists() {
                log::debug!("Using config file: {}", candidate.display());
                return Self::load_from_path(candidate);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            _ => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(
            config.estimator.invariant_pairs(),
            vec![(0.50, 0.01), (0.99, 0.001)]
        );
        assert_eq!(config.window.max_age_seconds, 600);
        assert_eq!(config.window.age_buckets, 5);
        assert_eq!(config.output.format, OutputFormat::Summary);
        assert!(config.output.ranks.is_empty());
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[estimator]
invariants = [
    { quantile = 0.5, error = 0.05 },
    { quantile = 0.9, error = 0.01 },
]

[window]
max-age-seconds = 60

[output]
format = "json"
ranks = [0.5, 0.9]
"#;
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::load(Some(temp_file.path())).unwrap();
        assert_eq!(
            config.estimator.invariant_pairs(),
            vec![(0.5, 0.05), (0.9, 0.01)]
        );
        assert_eq!(config.window.max_age_seconds, 60);
        assert_eq!(config.window.age_buckets, 5);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.output.ranks, vec![0.5, 0.9]);
    }

    #[test]
    fn test_load_json_config() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        let json_content = r#"{
  "window": { "age-buckets": 3 },
  "output": { "format": "csv", "pretty": true }
}"#;
        write!(temp_file, "{}", json_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.window.age_buckets, 3);
        assert_eq!(config.window.max_age_seconds, 600);
        assert_eq!(config.output.format, OutputFormat::Csv);
        assert!(config.output.pretty);
        assert_eq!(config.estimator.invariants.len(), 2);
    }

    #[test]
    fn test_unknown_extension_falls_back_to_json() {
        let mut temp_file = NamedTempFile::with_suffix(".conf").unwrap();
        write!(temp_file, r#"{{"output": {{"format": "json"}}}}"#).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.output.format, OutputFormat::Json);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "[window]\nage-buckets = \"many\"\n").unwrap();

        assert!(Config::load_from_path(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_missing_explicit_path_is_an_error() {
        assert!(Config::load(Some(Path::new("does-not-exist.toml"))).is_err());
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("qestimate.toml");

        let mut config = Config::default();
        config.estimator.invariants = vec![InvariantConfig {
            quantile: 0.75,
            error: 0.02,
        }];
        config.output.format = OutputFormat::Csv;
        config.save(&path).unwrap();

        let reloaded = Config::load(Some(&path)).unwrap();
        assert_eq!(reloaded.estimator.invariant_pairs(), vec![(0.75, 0.02)]);
        assert_eq!(reloaded.output.format, OutputFormat::Csv);
    }
}
