use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::info;

use crate::execution::dry_run::DryRunConfig;
use crate::scenario::venues::VenueKind;
use crate::scheduling::types::SessionWindow;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeskConfig {
    /// Number of concurrent dispatch workers, at least 1.
    pub workers: usize,

    pub venue: VenueKind,

    pub audit_log: PathBuf,

    /// Default window applied at startup.
    pub session: SessionWindow,

    /// Refuse orders while no session is active.
    pub enforce_session_gate: bool,

    pub api: ApiConfig,

    pub dry_run: DryRunConfig,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            venue: VenueKind::default(),
            audit_log: PathBuf::from("logs/executor_audit.log"),
            session: SessionWindow::default(),
            enforce_session_gate: true,
            api: ApiConfig::default(),
            dry_run: DryRunConfig::default(),
        }
    }
}

impl DeskConfig {
    pub const FILE_NAME: &'static str = "dispatcher.yml";

    /// Reads the file if present. A missing file means defaults; a file that
    /// exists but does not parse or validate is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;

        Self::from_yaml(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: DeskConfig =
            serde_yaml::from_str(raw).context("failed to parse config yaml")?;
        config.validate().context("config validation failed")?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("workers must be >= 1");
        }
        if self.audit_log.as_os_str().is_empty() {
            bail!("audit_log must not be empty");
        }
        self.session.validate()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = DeskConfig::load(&dir.path().join(DeskConfig::FILE_NAME)).unwrap();

        assert_eq!(config.workers, 2);
        assert_eq!(config.session, SessionWindow::default());
        assert_eq!(config.venue, VenueKind::DryRun);
        assert!(config.enforce_session_gate);
        assert_eq!(config.api.bind.port(), 8000);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = DeskConfig::from_yaml(
            r#"
workers: 4
venue: none
session:
  duration_minutes: 90
api:
  bind: "0.0.0.0:9100"
dry_run:
  reject_one_in: 0
"#,
        )
        .unwrap();

        assert_eq!(config.workers, 4);
        assert_eq!(config.venue, VenueKind::Unconfigured);
        assert_eq!(config.session.duration_minutes, 90);
        assert_eq!(config.session.cooldown_minutes, 60);
        assert_eq!(config.api.bind.port(), 9100);
        assert_eq!(config.dry_run.reject_one_in, 0);
        assert_eq!(config.dry_run.latency_ms, 50);
    }

    #[test]
    fn rejects_zero_workers() {
        let error = DeskConfig::from_yaml("workers: 0").unwrap_err();

        assert!(format!("{error:#}").contains("workers must be >= 1"));
    }

    #[test]
    fn rejects_zero_cooldown() {
        let error = DeskConfig::from_yaml("session:\n  cooldown_minutes: 0").unwrap_err();

        assert!(format!("{error:#}").contains("cooldown_minutes"));
    }

    #[test]
    fn unreadable_yaml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DeskConfig::FILE_NAME);
        fs::write(&path, "workers: [1, 2").unwrap();

        assert!(DeskConfig::load(&path).is_err());
    }
}
