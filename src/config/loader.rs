//! Settings loader with tier-based merging.
//!
//! Loads settings from multiple tiers and merges them field-by-field.

use super::merge::deep_merge_all;
use super::types::{KeyMode, ReconcileSettings};
use crate::error::{ReconcileError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name looked up in the working directory.
pub const PROJECT_SETTINGS_FILE: &str = "tile-reconcile.yaml";

/// Directory under the home directory holding user settings.
pub const USER_SETTINGS_DIR: &str = ".tile-reconcile";

/// Environment variable naming an explicit settings file.
pub const SETTINGS_PATH_ENV: &str = "TILE_RECONCILE_SETTINGS";

/// Settings tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    /// Built-in defaults (lowest priority)
    Defaults = 0,
    /// `./tile-reconcile.yaml`
    Project = 1,
    /// `~/.tile-reconcile/config.yaml`
    User = 2,
    /// File named by `--settings` or `TILE_RECONCILE_SETTINGS`
    Explicit = 3,
    /// Environment variables (highest priority)
    Environment = 4,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Explicit => write!(f, "explicit"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Locations of the settings files for each tier.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// Explicit settings file; replaces the project and user tiers.
    pub explicit: Option<PathBuf>,
    /// Project-level settings file
    pub project_file: Option<PathBuf>,
    /// User-level settings file
    pub user_file: Option<PathBuf>,
}

impl ConfigPaths {
    /// Discover settings paths from the environment and defaults.
    pub fn discover() -> Self {
        let explicit = std::env::var(SETTINGS_PATH_ENV).ok().map(PathBuf::from);
        let user_file = dirs::home_dir().map(|h| h.join(USER_SETTINGS_DIR).join("config.yaml"));

        Self {
            explicit,
            project_file: Some(PathBuf::from(PROJECT_SETTINGS_FILE)),
            user_file,
        }
    }

    /// Paths with an explicit settings file taking over the file tiers.
    pub fn with_explicit(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit = Some(path.into());
        self
    }
}

/// Settings loader that handles tier-based merging.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    settings: ReconcileSettings,
    /// Settings files that contributed, lowest tier first
    sources: Vec<(ConfigTier, PathBuf)>,
}

impl ConfigLoader {
    /// Load settings from all tiers, reading overrides from the process environment.
    pub fn load(paths: ConfigPaths) -> Result<Self> {
        Self::load_with_env(paths, |name| std::env::var(name).ok())
    }

    /// Load settings with an explicit environment lookup.
    pub fn load_with_env<F>(paths: ConfigPaths, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut sources = Vec::new();

        let mut settings = if let Some(ref explicit) = paths.explicit {
            // An explicit file must parse; tier files below are best-effort
            let settings = ReconcileSettings::load(explicit)?;
            sources.push((ConfigTier::Explicit, explicit.clone()));
            settings
        } else {
            let mut tiers: Vec<Value> = Vec::new();

            let defaults = serde_json::to_value(ReconcileSettings::default())
                .map_err(|e| ReconcileError::settings(e.to_string()))?;
            tiers.push(defaults);

            for (tier, file) in [
                (ConfigTier::Project, paths.project_file.as_ref()),
                (ConfigTier::User, paths.user_file.as_ref()),
            ] {
                let Some(file) = file else { continue };
                if let Some(value) = read_yaml_tier(file) {
                    debug!(tier = %tier, path = %file.display(), "Loaded settings tier");
                    tiers.push(value);
                    sources.push((tier, file.clone()));
                }
            }

            serde_json::from_value(deep_merge_all(tiers))
                .map_err(|e| ReconcileError::settings(e.to_string()))?
        };

        Self::apply_env_overrides(&mut settings, env)?;
        settings.validate()?;

        Ok(Self {
            settings,
            sources,
        })
    }

    /// Apply environment variable overrides to settings.
    fn apply_env_overrides<F>(settings: &mut ReconcileSettings, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(tiles_dir) = env("TILE_RECONCILE_TILES_DIR") {
            settings.tiles_dir = Some(PathBuf::from(tiles_dir));
        }

        if let Some(mode) = env("TILE_RECONCILE_KEY_MODE") {
            settings.key_mode = mode.parse::<KeyMode>()?;
        }

        if let Some(sort) = env("TILE_RECONCILE_SORT") {
            settings.natural_sort = parse_bool("TILE_RECONCILE_SORT", &sort)?;
        }

        if let Some(read) = env("TILE_RECONCILE_READ_METADATA") {
            settings.read_metadata = parse_bool("TILE_RECONCILE_READ_METADATA", &read)?;
        }

        if let Some(max) = env("TILE_RECONCILE_MAX_CONCURRENT_READS") {
            settings.max_concurrent_reads = max.trim().parse().map_err(|_| {
                ReconcileError::settings(format!(
                    "TILE_RECONCILE_MAX_CONCURRENT_READS must be a positive integer, got '{}'",
                    max
                ))
            })?;
        }

        Ok(())
    }

    /// Get the loaded settings.
    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    /// Get mutable access to the settings, for CLI overrides.
    pub fn settings_mut(&mut self) -> &mut ReconcileSettings {
        &mut self.settings
    }

    /// Settings files that were merged, lowest tier first.
    pub fn sources(&self) -> &[(ConfigTier, PathBuf)] {
        &self.sources
    }

    /// Consume the loader and return the settings.
    pub fn into_settings(self) -> ReconcileSettings {
        self.settings
    }
}

/// Read one optional YAML tier. Missing files are silent, broken ones are skipped with a warning.
///
/// A tier must deserialize as settings on its own, so a bad value in one
/// file cannot poison the merged result.
fn read_yaml_tier(path: &Path) -> Option<Value> {
    if !path.exists() {
        return None;
    }
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable settings file");
            return None;
        }
    };
    let value = match serde_yaml::from_str::<Value>(&content) {
        Ok(Value::Null) => return None,
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring malformed settings file");
            return None;
        }
    };
    let checked = ReconcileSettings::deserialize(&value)
        .map_err(|e| e.to_string())
        .and_then(|settings| settings.validate().map_err(|e| e.to_string()));
    if let Err(e) = checked {
        warn!(path = %path.display(), error = %e, "Ignoring invalid settings file");
        return None;
    }
    Some(value)
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ReconcileError::settings(format!(
            "{} must be a boolean, got '{}'",
            name, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn paths_in(temp: &TempDir) -> ConfigPaths {
        ConfigPaths {
            explicit: None,
            project_file: Some(temp.path().join("project.yaml")),
            user_file: Some(temp.path().join("user.yaml")),
        }
    }

    #[test]
    fn test_defaults_when_no_files() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::load_with_env(paths_in(&temp), no_env).unwrap();
        assert!(loader.sources().is_empty());
        assert_eq!(loader.settings().key_mode, KeyMode::DirStem);
    }

    #[test]
    fn test_user_tier_overrides_project_tier() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("project.yaml"),
            "key_mode: stem\nnatural_sort: true\n",
        )
        .unwrap();
        fs::write(temp.path().join("user.yaml"), "key_mode: path\n").unwrap();

        let loader = ConfigLoader::load_with_env(paths_in(&temp), no_env).unwrap();
        let settings = loader.settings();
        assert_eq!(settings.key_mode, KeyMode::Path);
        assert!(settings.natural_sort);
        assert_eq!(loader.sources().len(), 2);
        assert_eq!(loader.sources()[0].0, ConfigTier::Project);
    }

    #[test]
    fn test_malformed_tier_is_ignored() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("project.yaml"), "key_mode: [unclosed\n").unwrap();
        let loader = ConfigLoader::load_with_env(paths_in(&temp), no_env).unwrap();
        assert!(loader.sources().is_empty());
    }

    #[test]
    fn test_mistyped_tier_is_ignored() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("project.yaml"), "natural_sort: maybe
").unwrap();
        fs::write(temp.path().join("user.yaml"), "key_mode: stem
").unwrap();

        let loader = ConfigLoader::load_with_env(paths_in(&temp), no_env).unwrap();
        assert_eq!(loader.sources().len(), 1);
        assert_eq!(loader.sources()[0].0, ConfigTier::User);
        assert!(!loader.settings().natural_sort);
        assert_eq!(loader.settings().key_mode, KeyMode::Stem);
    }

    #[test]
    fn test_malformed_explicit_file_is_fatal() {
        let temp = TempDir::new().unwrap();
        let explicit = temp.path().join("explicit.yaml");
        fs::write(&explicit, "max_concurrent_reads: lots\n").unwrap();
        let paths = paths_in(&temp).with_explicit(&explicit);
        assert!(ConfigLoader::load_with_env(paths, no_env).is_err());
    }

    #[test]
    fn test_explicit_file_replaces_file_tiers() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("project.yaml"), "natural_sort: true\n").unwrap();
        let explicit = temp.path().join("explicit.yaml");
        fs::write(&explicit, "key_mode: stem\n").unwrap();

        let paths = paths_in(&temp).with_explicit(&explicit);
        let settings = ConfigLoader::load_with_env(paths, no_env)
            .unwrap()
            .into_settings();
        assert_eq!(settings.key_mode, KeyMode::Stem);
        assert!(!settings.natural_sort);
    }

    #[test]
    fn test_env_overrides_files() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("project.yaml"), "natural_sort: true\n").unwrap();

        let env: HashMap<&str, &str> = HashMap::from([
            ("TILE_RECONCILE_SORT", "off"),
            ("TILE_RECONCILE_KEY_MODE", "stem"),
            ("TILE_RECONCILE_TILES_DIR", "/mnt/data/tiles"),
            ("TILE_RECONCILE_MAX_CONCURRENT_READS", "4"),
        ]);
        let settings =
            ConfigLoader::load_with_env(paths_in(&temp), |k| env.get(k).map(|v| v.to_string()))
                .unwrap()
                .into_settings();

        assert!(!settings.natural_sort);
        assert_eq!(settings.key_mode, KeyMode::Stem);
        assert_eq!(settings.tiles_dir, Some(PathBuf::from("/mnt/data/tiles")));
        assert_eq!(settings.max_concurrent_reads, 4);
    }

    #[test]
    fn test_bad_env_value_is_an_error() {
        let temp = TempDir::new().unwrap();
        let result = ConfigLoader::load_with_env(paths_in(&temp), |k| {
            (k == "TILE_RECONCILE_READ_METADATA").then(|| "maybe".to_string())
        });
        assert!(result.is_err());
    }
}
