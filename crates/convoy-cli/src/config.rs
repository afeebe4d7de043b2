//! Configuration Vault – reads/writes `~/.convoy/config.toml`.
//!
//! Precedence, lowest first: built-in defaults, the config file, `CONVOY_*`
//! environment variables, command-line flags (applied by the binaries).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use convoy_types::{ConvoyError, Result};

/// Persisted settings shared by `convoy-monitor` and `convoy-vehicle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// LCM provider URL. Empty selects `LCM_DEFAULT_URL` or the built-in
    /// multicast default.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub lcm_url: String,

    /// Receive loop timeout in milliseconds.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Silence after which the monitor reports a lost heartbeat; 0 disables.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    /// Identity of `convoy-vehicle` when `--vehicle-id` is not given.
    #[serde(default = "default_vehicle_id")]
    pub vehicle_id: i32,

    /// Coloured terminal output.
    #[serde(default = "default_color")]
    pub color: bool,
}

fn default_poll_timeout_ms() -> u64 {
    100
}
fn default_heartbeat_timeout_ms() -> u64 {
    3000
}
fn default_vehicle_id() -> i32 {
    1
}
fn default_color() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lcm_url: String::new(),
            poll_timeout_ms: default_poll_timeout_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            vehicle_id: default_vehicle_id(),
            color: default_color(),
        }
    }
}

/// Return the path to `~/.convoy/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".convoy").join("config.toml")
}

/// Effective configuration: the file (or defaults when it is absent) with
/// environment overrides applied.
pub fn load() -> Result<Config> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Read the config file at `path`. Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        ConvoyError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| ConvoyError::Config(format!("failed to parse config: {e}")))?;
    Ok(Some(cfg))
}

/// Apply `CONVOY_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `CONVOY_LCM_URL` | `lcm_url` |
/// | `CONVOY_POLL_TIMEOUT_MS` | `poll_timeout_ms` |
/// | `CONVOY_HEARTBEAT_TIMEOUT_MS` | `heartbeat_timeout_ms` |
/// | `CONVOY_VEHICLE_ID` | `vehicle_id` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("CONVOY_LCM_URL") {
        cfg.lcm_url = v;
    }
    if let Ok(v) = std::env::var("CONVOY_POLL_TIMEOUT_MS")
        && let Ok(ms) = v.trim().parse::<u64>()
    {
        cfg.poll_timeout_ms = ms;
    }
    if let Ok(v) = std::env::var("CONVOY_HEARTBEAT_TIMEOUT_MS")
        && let Ok(ms) = v.trim().parse::<u64>()
    {
        cfg.heartbeat_timeout_ms = ms;
    }
    if let Ok(v) = std::env::var("CONVOY_VEHICLE_ID")
        && let Ok(id) = v.trim().parse::<i32>()
    {
        cfg.vehicle_id = id;
    }
}

/// Save the config to disk, creating `~/.convoy/` if necessary.
pub fn save(cfg: &Config) -> Result<PathBuf> {
    let path = config_path();
    save_to(cfg, &path)?;
    Ok(path)
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            ConvoyError::Config(format!("failed to create config directory: {e}"))
        })?;
        // Owner only (rwx------).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                ConvoyError::Config(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| ConvoyError::Config(format!("failed to serialize config: {e}")))?;
    let write_err =
        |e: std::io::Error| ConvoyError::Config(format!("failed to write config at {}: {e}", path.display()));
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}
