//! Harness configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::engine::GradingConfig;
use crate::generator::DEFAULT_SEED;

/// Top-level paritest configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParitestConfig {
    /// Max submissions graded concurrently.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Seed used by questions that do not pin their own.
    #[serde(default = "default_seed")]
    pub default_seed: u64,
    /// Scales every question's timeouts, for slow machines.
    #[serde(default = "default_timeout_multiplier")]
    pub timeout_multiplier: f64,
    /// Output directory for reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_parallelism() -> usize {
    4
}
fn default_seed() -> u64 {
    DEFAULT_SEED
}
fn default_timeout_multiplier() -> f64 {
    1.0
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./paritest-results")
}

impl Default for ParitestConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            default_seed: default_seed(),
            timeout_multiplier: default_timeout_multiplier(),
            output_dir: default_output_dir(),
        }
    }
}

impl ParitestConfig {
    pub fn grading(&self) -> GradingConfig {
        GradingConfig {
            parallelism: self.parallelism.max(1),
            default_seed: self.default_seed,
            timeout_multiplier: self.timeout_multiplier,
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.timeout_multiplier.is_finite() && self.timeout_multiplier > 0.0) {
            anyhow::bail!(
                "timeout_multiplier must be a positive number, got {}",
                self.timeout_multiplier
            );
        }
        Ok(())
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `paritest.toml` in the current directory
/// 2. `~/.config/paritest/config.toml`
///
/// Environment variable overrides: `PARITEST_SEED`, `PARITEST_PARALLELISM`.
pub fn load_config() -> Result<ParitestConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ParitestConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("paritest.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<ParitestConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => ParitestConfig::default(),
    };

    let config = apply_env_overrides(config, |name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

fn apply_env_overrides(
    mut config: ParitestConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ParitestConfig> {
    if let Some(seed) = lookup("PARITEST_SEED") {
        config.default_seed = seed
            .trim()
            .parse()
            .with_context(|| format!("PARITEST_SEED is not a valid seed: {seed}"))?;
    }
    if let Some(parallelism) = lookup("PARITEST_PARALLELISM") {
        config.parallelism = parallelism
            .trim()
            .parse()
            .with_context(|| format!("PARITEST_PARALLELISM is not a number: {parallelism}"))?;
    }
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("paritest"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ParitestConfig::default();
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.default_seed, 124);
        let grading = config.grading();
        assert_eq!(grading.default_seed, 124);
        assert_eq!(grading.timeout_multiplier, 1.0);
    }

    #[test]
    fn parse_partial_config() {
        let config: ParitestConfig = toml::from_str("default_seed = 7\ntimeout_multiplier = 2.5\n").unwrap();
        assert_eq!(config.default_seed, 7);
        assert_eq!(config.timeout_multiplier, 2.5);
        assert_eq!(config.parallelism, 4);
    }

    #[test]
    fn load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paritest.toml");
        std::fs::write(&path, "parallelism = 2\noutput_dir = \"out\"\n").unwrap();
        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.parallelism, 2);
        assert_eq!(config.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn missing_explicit_path_fails() {
        let err = load_config_from(Some(Path::new("/nonexistent/paritest.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn rejects_non_positive_multiplier() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paritest.toml");
        std::fs::write(&path, "timeout_multiplier = 0.0\n").unwrap();
        assert!(load_config_from(Some(&path)).is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let config = apply_env_overrides(ParitestConfig::default(), |name| match name {
            "PARITEST_SEED" => Some("99".to_string()),
            "PARITEST_PARALLELISM" => Some(" 8 ".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.default_seed, 99);
        assert_eq!(config.parallelism, 8);

        let err = apply_env_overrides(ParitestConfig::default(), |name| {
            (name == "PARITEST_SEED").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("PARITEST_SEED"));
    }

    #[test]
    fn zero_parallelism_is_clamped() {
        let config = ParitestConfig {
            parallelism: 0,
            ..Default::default()
        };
        assert_eq!(config.grading().parallelism, 1);
    }
}
