//! Optional process-wide health monitor.
//!
//! Activated only when the configured environment variable names a config
//! file; a missing or empty variable means no monitor. Whatever happens
//! here must never block app construction: the monitor is a detached
//! background task, and a broken monitor config downgrades to a warning.

use std::env;
use std::path::Path;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Heartbeat period for the monitor task.
const HEARTBEAT_SECS: u64 = 30;

/// Start the monitor if `env_var` names an existing config file.
///
/// Returns the task handle so a shutdown path can abort it; callers that
/// do not care may drop it (the task is detached either way).
pub fn maybe_start(env_var: &str) -> Option<JoinHandle<()>> {
    let config_path = match env::var(env_var) {
        Ok(path) if !path.is_empty() => path,
        _ => {
            debug!(var = env_var, "health monitor not configured");
            return None;
        }
    };

    if !Path::new(&config_path).exists() {
        warn!(
            config = %config_path,
            "health monitor config file missing, starting without monitor"
        );
        return None;
    }

    info!(config = %config_path, "starting health monitor");
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(HEARTBEAT_SECS));
        loop {
            interval.tick().await;
            debug!(config = %config_path, "health monitor heartbeat");
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_unset_variable_means_no_monitor() {
        assert!(maybe_start("DSTATE_TEST_HEALTH_UNSET").is_none());
    }

    #[tokio::test]
    async fn test_missing_config_file_means_no_monitor() {
        env::set_var("DSTATE_TEST_HEALTH_MISSING", "/nonexistent/health.toml");
        assert!(maybe_start("DSTATE_TEST_HEALTH_MISSING").is_none());
        env::remove_var("DSTATE_TEST_HEALTH_MISSING");
    }

    #[tokio::test]
    async fn test_existing_config_starts_task() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "interval = 30").expect("write");
        env::set_var("DSTATE_TEST_HEALTH_OK", file.path());

        let handle = maybe_start("DSTATE_TEST_HEALTH_OK").expect("task spawned");
        handle.abort();
        env::remove_var("DSTATE_TEST_HEALTH_OK");
    }
}
