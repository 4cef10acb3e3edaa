//! Layered engine configuration (SPEC_FULL.md §3.3): defaults → `rigkit.toml`
//! → `RIGKIT_*` environment variables → explicit constructor overrides.

use std::collections::HashMap;
use std::env;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_RUNS_ROOT: &str = "runs";
const DEFAULT_CASES_ROOT: &str = "cases";
const DEFAULT_SUITES_ROOT: &str = "suites";
const DEFAULT_PLANS_ROOT: &str = "plans";
const DEFAULT_TIMEOUT_SEC: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: Utf8PathBuf, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: Utf8PathBuf, source: toml::de::Error },

    #[error("environment variable {name} has an invalid value '{value}': {reason}")]
    InvalidEnvValue { name: String, value: String, reason: String },
}

/// Whether elevation should be probed from the host OS, or forced to a fixed
/// answer. Forcing exists so tests (and CI containers that cannot represent
/// "elevated") don't depend on the process's real privilege level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElevationOverride {
    #[default]
    Probe,
    ForceElevated,
    ForceNotElevated,
}

/// On-disk shape of `rigkit.toml`. Every field optional: an absent field
/// falls through to the next-lower layer rather than overwriting it with a
/// default (SPEC_FULL.md §3.3 layering order).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileConfig {
    cases_root: Option<String>,
    suites_root: Option<String>,
    plans_root: Option<String>,
    runs_root: Option<String>,
    default_timeout_sec: Option<u64>,
}

/// Fully resolved engine configuration, after all layers have been applied.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cases_root: Utf8PathBuf,
    pub suites_root: Utf8PathBuf,
    pub plans_root: Utf8PathBuf,
    pub runs_root: Utf8PathBuf,
    pub default_timeout_sec: u64,
    pub elevation_override: ElevationOverride,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cases_root: Utf8PathBuf::from(DEFAULT_CASES_ROOT),
            suites_root: Utf8PathBuf::from(DEFAULT_SUITES_ROOT),
            plans_root: Utf8PathBuf::from(DEFAULT_PLANS_ROOT),
            runs_root: Utf8PathBuf::from(DEFAULT_RUNS_ROOT),
            default_timeout_sec: DEFAULT_TIMEOUT_SEC,
            elevation_override: ElevationOverride::Probe,
        }
    }
}

/// Builder-style overrides applied last, with the highest precedence
/// (explicit constructor arguments in SPEC_FULL.md §3.3's layering order).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub cases_root: Option<Utf8PathBuf>,
    pub suites_root: Option<Utf8PathBuf>,
    pub plans_root: Option<Utf8PathBuf>,
    pub runs_root: Option<Utf8PathBuf>,
    pub default_timeout_sec: Option<u64>,
    pub elevation_override: Option<ElevationOverride>,
}

fn parse_bool_env(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => Err(ConfigError::InvalidEnvValue {
            name: name.to_string(),
            value: other.to_string(),
            reason: "expected a boolean (1/0/true/false)".to_string(),
        }),
    }
}

impl EngineConfig {
    /// Load the file layer from `path` if it exists; a missing file is not
    /// an error (the file layer is optional), but a malformed one is.
    fn load_file(path: &Utf8Path) -> Result<FileConfig, ConfigError> {
        if !path.is_file() {
            return Ok(FileConfig::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    fn apply_file(mut self, file: FileConfig) -> Self {
        if let Some(v) = file.cases_root {
            self.cases_root = Utf8PathBuf::from(v);
        }
        if let Some(v) = file.suites_root {
            self.suites_root = Utf8PathBuf::from(v);
        }
        if let Some(v) = file.plans_root {
            self.plans_root = Utf8PathBuf::from(v);
        }
        if let Some(v) = file.runs_root {
            self.runs_root = Utf8PathBuf::from(v);
        }
        if let Some(v) = file.default_timeout_sec {
            self.default_timeout_sec = v;
        }
        self
    }

    fn apply_env(mut self, vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        if let Some(v) = vars.get("RIGKIT_CASES_ROOT") {
            self.cases_root = Utf8PathBuf::from(v);
        }
        if let Some(v) = vars.get("RIGKIT_SUITES_ROOT") {
            self.suites_root = Utf8PathBuf::from(v);
        }
        if let Some(v) = vars.get("RIGKIT_PLANS_ROOT") {
            self.plans_root = Utf8PathBuf::from(v);
        }
        if let Some(v) = vars.get("RIGKIT_RUNS_ROOT") {
            self.runs_root = Utf8PathBuf::from(v);
        }
        if let Some(v) = vars.get("RIGKIT_DEFAULT_TIMEOUT_SEC") {
            self.default_timeout_sec = v.parse().map_err(|_| ConfigError::InvalidEnvValue {
                name: "RIGKIT_DEFAULT_TIMEOUT_SEC".to_string(),
                value: v.clone(),
                reason: "expected a non-negative integer".to_string(),
            })?;
        }
        if let Some(v) = vars.get("RIGKIT_FORCE_ELEVATED") {
            self.elevation_override = if parse_bool_env("RIGKIT_FORCE_ELEVATED", v)? {
                ElevationOverride::ForceElevated
            } else {
                ElevationOverride::ForceNotElevated
            };
        }
        Ok(self)
    }

    fn apply_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(v) = overrides.cases_root {
            self.cases_root = v;
        }
        if let Some(v) = overrides.suites_root {
            self.suites_root = v;
        }
        if let Some(v) = overrides.plans_root {
            self.plans_root = v;
        }
        if let Some(v) = overrides.runs_root {
            self.runs_root = v;
        }
        if let Some(v) = overrides.default_timeout_sec {
            self.default_timeout_sec = v;
        }
        if let Some(v) = overrides.elevation_override {
            self.elevation_override = v;
        }
        self
    }

    /// Build the configuration: defaults, then `config_path` if it exists,
    /// then `RIGKIT_*` from the real process environment, then `overrides`.
    pub fn load(config_path: &Utf8Path, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let env_vars: HashMap<String, String> = env::vars().filter(|(k, _)| k.starts_with("RIGKIT_")).collect();
        Self::load_from(config_path, &env_vars, overrides)
    }

    /// Same as [`Self::load`] but takes an explicit environment snapshot,
    /// so tests don't depend on (or mutate) the real process environment.
    pub fn load_from(
        config_path: &Utf8Path,
        env_vars: &HashMap<String, String>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let file = Self::load_file(config_path)?;
        Ok(Self::default().apply_file(file).apply_env(env_vars)?.apply_overrides(overrides))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn defaults_apply_when_no_file_and_no_env() {
        let tmp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let config = EngineConfig::load_from(&root.join("rigkit.toml"), &HashMap::new(), ConfigOverrides::default())
            .unwrap();
        assert_eq!(config.default_timeout_sec, DEFAULT_TIMEOUT_SEC);
        assert_eq!(config.runs_root, Utf8PathBuf::from(DEFAULT_RUNS_ROOT));
    }

    #[test]
    fn file_layer_overrides_defaults() {
        let tmp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let config_path = root.join("rigkit.toml");
        fs::write(&config_path, "runsRoot = \"/var/rigkit/runs\"\ndefaultTimeoutSec = 60\n").unwrap();
        let config = EngineConfig::load_from(&config_path, &HashMap::new(), ConfigOverrides::default()).unwrap();
        assert_eq!(config.runs_root, Utf8PathBuf::from("/var/rigkit/runs"));
        assert_eq!(config.default_timeout_sec, 60);
    }

    #[test]
    fn env_layer_overrides_file_layer() {
        let tmp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let config_path = root.join("rigkit.toml");
        fs::write(&config_path, "defaultTimeoutSec = 60\n").unwrap();
        let mut env_vars = HashMap::new();
        env_vars.insert("RIGKIT_DEFAULT_TIMEOUT_SEC".to_string(), "120".to_string());
        let config = EngineConfig::load_from(&config_path, &env_vars, ConfigOverrides::default()).unwrap();
        assert_eq!(config.default_timeout_sec, 120);
    }

    #[test]
    fn constructor_overrides_win_over_everything() {
        let tmp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let config_path = root.join("rigkit.toml");
        fs::write(&config_path, "defaultTimeoutSec = 60\n").unwrap();
        let mut env_vars = HashMap::new();
        env_vars.insert("RIGKIT_DEFAULT_TIMEOUT_SEC".to_string(), "120".to_string());
        let overrides = ConfigOverrides { default_timeout_sec: Some(5), ..Default::default() };
        let config = EngineConfig::load_from(&config_path, &env_vars, overrides).unwrap();
        assert_eq!(config.default_timeout_sec, 5);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let config = EngineConfig::load_from(&root.join("nope.toml"), &HashMap::new(), ConfigOverrides::default());
        assert!(config.is_ok());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let config_path = root.join("rigkit.toml");
        fs::write(&config_path, "not = [valid").unwrap();
        let err = EngineConfig::load_from(&config_path, &HashMap::new(), ConfigOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    /// Exercises `load` against the *real* process environment rather than
    /// an injected map. `#[serial]` because it mutates process-wide env vars
    /// that other tests in this crate must not observe mid-mutation.
    #[test]
    #[serial]
    fn load_reads_rigkit_vars_from_the_real_process_environment() {
        let tmp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        std::env::set_var("RIGKIT_DEFAULT_TIMEOUT_SEC", "45");
        let config = EngineConfig::load(&root.join("nope.toml"), ConfigOverrides::default());
        std::env::remove_var("RIGKIT_DEFAULT_TIMEOUT_SEC");
        assert_eq!(config.unwrap().default_timeout_sec, 45);
    }

    #[test]
    fn force_elevated_env_var_is_parsed() {
        let tmp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let mut env_vars = HashMap::new();
        env_vars.insert("RIGKIT_FORCE_ELEVATED".to_string(), "true".to_string());
        let config =
            EngineConfig::load_from(&root.join("nope.toml"), &env_vars, ConfigOverrides::default()).unwrap();
        assert_eq!(config.elevation_override, ElevationOverride::ForceElevated);
    }
}
