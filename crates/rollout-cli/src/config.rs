//! CLI configuration

use crate::error::{CliError, CliResult};
use rollout_observability::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// Directory holding the registry, plans, records and audit log
    pub state_dir: Option<PathBuf>,

    /// Artifact store root, `<state_dir>/artifacts` when unset
    pub artifact_dir: Option<PathBuf>,

    /// Audit log file, `<state_dir>/audit.jsonl` when unset
    pub audit_log: Option<PathBuf>,

    /// Install action
    pub install: InstallConfig,

    /// Secret store
    pub secrets: SecretsConfig,

    /// Logging options
    pub logging: LoggingConfig,
}

/// Install action run once per target per attempt
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct InstallConfig {
    pub program: Option<String>,
    pub args: Vec<String>,
}

/// Where target credentials come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecretsConfig {
    /// Environment variable holding the secret; anonymous when unset
    pub env_var: Option<String>,

    pub username: Option<String>,

    pub lease_ttl_secs: u64,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            env_var: None,
            username: None,
            lease_ttl_secs: 900,
        }
    }
}

impl SecretsConfig {
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }
}

impl CliConfig {
    /// Load configuration from file
    pub fn load(path: Option<&Path>) -> CliResult<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path()?,
        };

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            let config: CliConfig = toml::from_str(&contents)
                .map_err(|e| CliError::Config(format!("{}: {}", config_path.display(), e)))?;
            if config.secrets.lease_ttl_secs == 0 {
                return Err(CliError::Config(
                    "secrets.lease_ttl_secs must be greater than 0".into(),
                ));
            }
            Ok(config)
        } else {
            Ok(CliConfig::default())
        }
    }

    /// Get the default configuration file path
    fn default_config_path() -> CliResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CliError::Config("Cannot find config directory".into()))?;
        Ok(config_dir.join("rollout").join("config.toml"))
    }

    /// Resolve the on-disk layout, `override_dir` taking precedence
    pub fn paths(&self, override_dir: Option<&Path>) -> CliResult<StatePaths> {
        let root = match override_dir.or(self.state_dir.as_deref()) {
            Some(dir) => dir.to_path_buf(),
            None => dirs::data_local_dir()
                .ok_or_else(|| CliError::Config("Cannot find a data directory; set state_dir".into()))?
                .join("rollout"),
        };

        Ok(StatePaths {
            artifacts: self
                .artifact_dir
                .clone()
                .unwrap_or_else(|| root.join("artifacts")),
            audit_log: self
                .audit_log
                .clone()
                .unwrap_or_else(|| root.join("audit.jsonl")),
            root,
        })
    }
}

/// Files and directories under the state directory
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub root: PathBuf,
    pub artifacts: PathBuf,
    pub audit_log: PathBuf,
}

impl StatePaths {
    pub fn targets(&self) -> PathBuf {
        self.root.join("targets")
    }

    pub fn plans(&self) -> PathBuf {
        self.root.join("plans")
    }

    pub fn records(&self) -> PathBuf {
        self.root.join("records.jsonl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollout_observability::LogFormat;

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();
        assert!(config.state_dir.is_none());
        assert!(config.install.program.is_none());
        assert_eq!(config.secrets.lease_ttl(), Duration::from_secs(900));
    }

    #[test]
    fn test_load_missing_config() {
        let config = CliConfig::load(Some(Path::new("/nonexistent/path/config.toml"))).unwrap();
        assert!(config.state_dir.is_none());
    }

    #[test]
    fn test_load_full_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
state_dir = "/var/lib/rollout"
artifact_dir = "/srv/releases"

[install]
program = "/usr/local/bin/install-release"
args = ["--quiet"]

[secrets]
env_var = "SITE_TOKEN"
username = "deploy"
lease_ttl_secs = 60

[logging]
level = "debug"
format = "json"
"#,
        )
        .unwrap();

        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.install.args, vec!["--quiet".to_string()]);
        assert_eq!(config.secrets.lease_ttl(), Duration::from_secs(60));
        assert_eq!(config.logging.format, LogFormat::Json);

        let paths = config.paths(None).unwrap();
        assert_eq!(paths.artifacts, PathBuf::from("/srv/releases"));
        assert_eq!(paths.audit_log, PathBuf::from("/var/lib/rollout/audit.jsonl"));
        assert_eq!(paths.plans(), PathBuf::from("/var/lib/rollout/plans"));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "stat_dir = \"/tmp\"\n").unwrap();
        assert!(matches!(CliConfig::load(Some(&path)), Err(CliError::Config(_))));
    }

    #[test]
    fn test_override_dir_wins() {
        let config = CliConfig {
            state_dir: Some(PathBuf::from("/var/lib/rollout")),
            ..Default::default()
        };
        let paths = config.paths(Some(Path::new("/tmp/state"))).unwrap();
        assert_eq!(paths.targets(), PathBuf::from("/tmp/state/targets"));
    }
}
