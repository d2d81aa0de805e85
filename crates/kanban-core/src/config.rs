use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::Result;
use crate::error::KanbanError;

/// Directory under the project root that holds the store, config and locks.
pub const KANBAN_DIR: &str = ".kanban";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KanbanConfig {
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Defaults for `kb sweep-guests`; flags on the command line win.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_inactive_days")]
    pub inactive_days: u32,
    #[serde(default = "default_grace_period_hours")]
    pub grace_period_hours: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            inactive_days: default_inactive_days(),
            grace_period_hours: default_grace_period_hours(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database path, relative to the project root when not absolute.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl KanbanConfig {
    /// Resolve the SQLite database path for `project_root`.
    #[must_use]
    pub fn store_path(&self, project_root: &Path) -> PathBuf {
        match &self.store.path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => project_root.join(path),
            None => project_root.join(KANBAN_DIR).join("kanban.db"),
        }
    }

    /// Path of the advisory lock taken by the guest sweep.
    #[must_use]
    pub fn sweep_lock_path(project_root: &Path) -> PathBuf {
        project_root.join(KANBAN_DIR).join("sweep.lock")
    }
}

/// Load `.kanban/config.toml`, falling back to defaults when it is absent.
///
/// # Errors
///
/// Returns [`KanbanError::Config`] if the file exists but cannot be read or
/// parsed.
pub fn load_config(project_root: &Path) -> Result<KanbanConfig> {
    let path = project_root.join(KANBAN_DIR).join("config.toml");
    if !path.exists() {
        return Ok(KanbanConfig::default());
    }

    let content = std::fs::read_to_string(&path).map_err(|err| KanbanError::Config {
        path: path.clone(),
        reason: err.to_string(),
    })?;

    toml::from_str::<KanbanConfig>(&content).map_err(|err| KanbanError::Config {
        path,
        reason: err.to_string(),
    })
}

const fn default_inactive_days() -> u32 {
    14
}

const fn default_grace_period_hours() -> u32 {
    24
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn missing_config_uses_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cfg = load_config(dir.path()).expect("load should succeed");
        assert_eq!(cfg.sweep.inactive_days, 14);
        assert_eq!(cfg.sweep.grace_period_hours, 24);
        assert_eq!(
            cfg.store_path(dir.path()),
            dir.path().join(".kanban/kanban.db")
        );
    }

    #[test]
    fn partial_sweep_section_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir_all(dir.path().join(KANBAN_DIR)).expect("create .kanban");
        std::fs::write(
            dir.path().join(".kanban/config.toml"),
            "[sweep]\ninactive_days = 30\n\n[store]\npath = \"data/boards.db\"\n",
        )
        .expect("write config");

        let cfg = load_config(dir.path()).expect("load should succeed");
        assert_eq!(cfg.sweep.inactive_days, 30);
        assert_eq!(cfg.sweep.grace_period_hours, 24);
        assert_eq!(cfg.store_path(dir.path()), dir.path().join("data/boards.db"));
    }

    #[test]
    fn malformed_config_reports_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir_all(dir.path().join(KANBAN_DIR)).expect("create .kanban");
        std::fs::write(dir.path().join(".kanban/config.toml"), "[sweep\n").expect("write");

        let err = load_config(dir.path()).expect_err("parse must fail");
        assert!(err.to_string().contains("config.toml"));
        assert_eq!(err.code(), ErrorCode::ConfigParseError);
    }

    #[test]
    fn wrong_value_type_is_a_config_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir_all(dir.path().join(KANBAN_DIR)).expect("create .kanban");
        std::fs::write(
            dir.path().join(".kanban/config.toml"),
            "[sweep]\ninactive_days = \"two weeks\"\n",
        )
        .expect("write");

        let err = load_config(dir.path()).expect_err("type mismatch");
        assert!(matches!(err, KanbanError::Config { .. }));
    }
}
