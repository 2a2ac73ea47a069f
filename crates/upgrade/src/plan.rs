//! On-disk pending-upgrade plan.
//!
//! Governance writes `{name, height}` to a well-known path; the coordinator
//! reads it exactly once at boot. The record must be stable across a restart
//! that straddles the plan height, so the read is side-effect-free and the
//! file is cleared only after the handler has succeeded.
//!
//! Missing file means "no pending upgrade" and is perfectly normal.
//! An existing-but-unreadable file is boot-fatal: the coordinator cannot
//! safely decide whether a store rewrite is due.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::UpgradeError;

/// Governance-approved upgrade: which named upgrade to apply, and at which
/// block height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPlan {
    pub name: String,
    pub height: i64,
}

impl PendingPlan {
    /// Structural validation applied after every successful read.
    pub fn validate(&self) -> Result<(), UpgradeError> {
        if self.name.is_empty() {
            return Err(UpgradeError::InvalidPlan("empty upgrade name".to_string()));
        }
        if self.height <= 0 {
            return Err(UpgradeError::InvalidPlan(format!(
                "non-positive upgrade height {}",
                self.height
            )));
        }
        Ok(())
    }
}

/// Read the pending plan, once, at boot.
///
/// Returns `Ok(None)` when the file does not exist. Any other read or
/// decode failure is returned as [`UpgradeError::PlanUnreadable`].
pub fn read_plan(path: &Path) -> Result<Option<PendingPlan>, UpgradeError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no pending upgrade plan");
            return Ok(None);
        }
        Err(e) => {
            return Err(UpgradeError::PlanUnreadable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        }
    };

    let plan: PendingPlan =
        serde_json::from_slice(&bytes).map_err(|e| UpgradeError::PlanUnreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    plan.validate()?;
    Ok(Some(plan))
}

/// Write a plan record. Used by the governance collaborator and by tests.
pub fn write_plan(path: &Path, plan: &PendingPlan) -> Result<(), UpgradeError> {
    plan.validate()?;
    let bytes = serde_json::to_vec_pretty(plan).map_err(|e| UpgradeError::PlanUnreadable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| UpgradeError::PlanUnreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    }
    fs::write(path, bytes).map_err(|e| UpgradeError::PlanUnreadable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Remove a consumed plan. Removing an already-absent file is fine:
/// idempotence does not depend on this file, only operator hygiene does.
pub fn clear_plan(path: &Path) -> Result<(), UpgradeError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(UpgradeError::PlanUnreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_path(dir: &tempfile::TempDir) -> std::path::PathBuf {
        dir.path().join("upgrade-info.json")
    }

    #[test]
    fn test_missing_file_is_no_plan() {
        let dir = tempfile::tempdir().expect("tempdir");
        let read = read_plan(&plan_path(&dir)).expect("read");
        assert_eq!(read, None);
    }

    #[test]
    fn test_write_read_clear_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = plan_path(&dir);
        let plan = PendingPlan {
            name: "v0.7.0".to_string(),
            height: 100,
        };

        write_plan(&path, &plan).expect("write");
        let read = read_plan(&path).expect("read").expect("some");
        assert_eq!(read, plan);

        clear_plan(&path).expect("clear");
        assert_eq!(read_plan(&path).expect("read"), None);

        // clearing twice is fine
        clear_plan(&path).expect("clear again");
    }

    #[test]
    fn test_garbage_file_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = plan_path(&dir);
        fs::write(&path, b"{ not json").expect("write");

        let err = read_plan(&path).expect_err("unreadable");
        assert!(matches!(err, UpgradeError::PlanUnreadable { .. }));
    }

    #[test]
    fn test_invalid_plan_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = plan_path(&dir);

        fs::write(&path, br#"{"name":"","height":100}"#).expect("write");
        assert!(matches!(
            read_plan(&path).expect_err("empty name"),
            UpgradeError::InvalidPlan(_)
        ));

        fs::write(&path, br#"{"name":"v0.7.0","height":0}"#).expect("write");
        assert!(matches!(
            read_plan(&path).expect_err("zero height"),
            UpgradeError::InvalidPlan(_)
        ));
    }
}
