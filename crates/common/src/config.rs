//! Simple config loader using TOML and serde.
//! The config struct is intentionally small and typed for the node shell.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::Result;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Path of the on-disk pending-upgrade plan record.
    pub plan_path: Option<String>,

    /// Heights at which an otherwise-matching store rewrite is suppressed.
    /// Operator override for recovery scenarios.
    pub skip_heights: Option<Vec<i64>>,

    /// How many recent blocks commit asks the engine to retain.
    pub retain_blocks: Option<i64>,

    /// Name of the environment variable that, when set, points at the
    /// health-monitor config file. Unset variable means no monitor.
    pub health_env_var: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            plan_path: Some("./data/upgrade-info.json".to_string()),
            skip_heights: Some(Vec::new()),
            retain_blocks: Some(0),
            health_env_var: Some("DSTATE_HEALTH_CONFIG".to_string()),
        }
    }
}

impl Config {
    /// Skip heights as a plain vector regardless of whether the field was set.
    #[must_use]
    pub fn skip_heights(&self) -> Vec<i64> {
        self.skip_heights.clone().unwrap_or_default()
    }
}

/// Load config from a TOML file path.
/// If file is missing or parse fails, an error is returned.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
    let p = path.as_ref();
    let s = fs::read_to_string(p)?;
    let cfg: Config = toml::from_str(&s)?;
    Ok(cfg)
}
