//! Runtime configuration – reads/writes `~/.posefuse/config.toml`.
//!
//! ```toml
//! service_name = "posefuse"
//! bus_capacity = 256
//!
//! [filter]
//! count = 128
//! max_inconsistency = 0.2
//! locator_on_robot = { x = -0.31, y = 0.0 }
//! ```
//!
//! Every key is optional; missing keys take their defaults.

use std::fs;
use std::path::{Path, PathBuf};

use posefuse_filter::FilterConfig;
use posefuse_types::FusionError;
use serde::{Deserialize, Serialize};

/// Persisted runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Service name reported to the tracing backend.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Per-topic capacity of the event bus.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    /// Capacity of the fused-pose output channel.
    #[serde(default = "default_output_capacity")]
    pub output_capacity: usize,

    #[serde(default)]
    pub filter: FilterConfig,
}

fn default_service_name() -> String {
    "posefuse".to_string()
}
fn default_bus_capacity() -> usize {
    256
}
fn default_output_capacity() -> usize {
    64
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            bus_capacity: default_bus_capacity(),
            output_capacity: default_output_capacity(),
            filter: FilterConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Reject configurations the runtime cannot start with.
    ///
    /// # Errors
    ///
    /// [`FusionError::InvalidConfig`] for a zero channel capacity or an
    /// unusable filter section.
    pub fn validate(&self) -> Result<(), FusionError> {
        if self.bus_capacity == 0 {
            return Err(FusionError::InvalidConfig("bus_capacity must be positive".to_string()));
        }
        if self.output_capacity == 0 {
            return Err(FusionError::InvalidConfig(
                "output_capacity must be positive".to_string(),
            ));
        }
        self.filter.validate()
    }
}

/// Return the path to `~/.posefuse/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".posefuse").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<RuntimeConfig>, FusionError> {
    load_from(&config_path())
}

/// Load, apply environment overrides and validate the config at `path`.
///
/// # Errors
///
/// [`FusionError::Config`] on I/O or parse failure,
/// [`FusionError::InvalidConfig`] when [`RuntimeConfig::validate`] fails.
pub fn load_from(path: &Path) -> Result<Option<RuntimeConfig>, FusionError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        FusionError::Config(format!("Failed to read config at {}: {e}", path.display()))
    })?;
    let mut cfg: RuntimeConfig = toml::from_str(&raw)
        .map_err(|e| FusionError::Config(format!("Failed to parse config: {e}")))?;
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(Some(cfg))
}

/// Apply `POSEFUSE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `POSEFUSE_COUNT` | `filter.count` |
/// | `POSEFUSE_MAX_INCONSISTENCY` | `filter.max_inconsistency` |
/// | `POSEFUSE_MAX_AGE` | `filter.max_age` |
/// | `POSEFUSE_BEACON_X` | `filter.locator_on_robot.x` |
/// | `POSEFUSE_BEACON_Y` | `filter.locator_on_robot.y` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut RuntimeConfig) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut RuntimeConfig, lookup: impl Fn(&str) -> Option<String>) {
    let filter = &mut cfg.filter;
    if let Some(count) = lookup("POSEFUSE_COUNT").and_then(|v| v.parse().ok()) {
        filter.count = count;
    }
    if let Some(v) = lookup("POSEFUSE_MAX_INCONSISTENCY").and_then(|v| v.parse().ok()) {
        filter.max_inconsistency = v;
    }
    if let Some(age) = lookup("POSEFUSE_MAX_AGE").and_then(|v| v.parse().ok()) {
        filter.max_age = age;
    }
    if let Some(x) = lookup("POSEFUSE_BEACON_X").and_then(|v| v.parse().ok()) {
        filter.locator_on_robot.x = x;
    }
    if let Some(y) = lookup("POSEFUSE_BEACON_Y").and_then(|v| v.parse().ok()) {
        filter.locator_on_robot.y = y;
    }
}

/// Save the config to disk, creating `~/.posefuse/` if necessary.
pub fn save(cfg: &RuntimeConfig) -> Result<(), FusionError> {
    save_to(cfg, &config_path())
}

/// Save the config to `path` with owner-only permissions on Unix.
pub fn save_to(cfg: &RuntimeConfig, path: &Path) -> Result<(), FusionError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            FusionError::Config(format!("Failed to create config directory: {e}"))
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                FusionError::Config(format!("Failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| FusionError::Config(format!("Failed to serialize config: {e}")))?;
    let write_err =
        |e: std::io::Error| FusionError::Config(format!("Failed to write config at {}: {e}", path.display()));
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

#[cfg(test)]
mod tests {
    use super::*;
    use posefuse_types::Point2D;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn config_path_points_to_posefuse_dir() {
        let p = config_path_for_home("/home/robot");
        assert_eq!(p, PathBuf::from("/home/robot/.posefuse/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn roundtrip_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = RuntimeConfig::default();
        cfg.filter.count = 64;
        cfg.filter.locator_on_robot = Point2D::new(-0.31, 0.0);
        cfg.filter.seed = Some(7);
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.filter.count, 64);
        assert_eq!(loaded.filter.locator_on_robot, Point2D::new(-0.31, 0.0));
        assert_eq!(loaded.filter.seed, Some(7));
        assert_eq!(loaded.service_name, "posefuse");
    }

    #[test]
    fn partial_file_takes_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[filter]\nmax_inconsistency = 0.1\n").expect("write");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.bus_capacity, 256);
        assert_eq!(loaded.filter.count, 128);
        assert!((loaded.filter.max_inconsistency - 0.1).abs() < 1e-12);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "filter = [").expect("write");
        assert!(matches!(load_from(&path), Err(FusionError::Config(_))));
    }

    #[test]
    fn invalid_filter_section_is_rejected() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[filter]\ncount = 1\n").expect("write");
        assert!(matches!(load_from(&path), Err(FusionError::InvalidConfig(_))));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "output_capacity = 0\n").expect("write");
        assert!(matches!(load_from(&path), Err(FusionError::InvalidConfig(_))));

        let cfg = RuntimeConfig {
            bus_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(FusionError::InvalidConfig(_))));
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&RuntimeConfig::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let parent = path.parent().expect("parent");
        let dir_mode = std::fs::metadata(parent).expect("dir").permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn overrides_apply_to_filter_section() {
        let mut cfg = RuntimeConfig::default();
        apply_overrides(
            &mut cfg,
            lookup(&[
                ("POSEFUSE_COUNT", "32"),
                ("POSEFUSE_MAX_INCONSISTENCY", "0.15"),
                ("POSEFUSE_MAX_AGE", "20"),
                ("POSEFUSE_BEACON_X", "-0.31"),
                ("POSEFUSE_BEACON_Y", "0.05"),
            ]),
        );
        assert_eq!(cfg.filter.count, 32);
        assert!((cfg.filter.max_inconsistency - 0.15).abs() < 1e-12);
        assert_eq!(cfg.filter.max_age, 20);
        assert_eq!(cfg.filter.locator_on_robot, Point2D::new(-0.31, 0.05));
    }

    #[test]
    fn overrides_ignore_unparsable_values() {
        let mut cfg = RuntimeConfig::default();
        apply_overrides(
            &mut cfg,
            lookup(&[("POSEFUSE_COUNT", "many"), ("POSEFUSE_MAX_AGE", "-3")]),
        );
        assert_eq!(cfg.filter.count, 128);
        assert_eq!(cfg.filter.max_age, 50);
    }
}
