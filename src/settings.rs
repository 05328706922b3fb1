//! Persisted key/value settings and the typed view over them.
//!
//! The store itself only knows string keys and scalar values. [`Settings`]
//! and [`SettingsService`] layer defaults, typing and validation on top so
//! that components receive an explicit settings object instead of reaching
//! for process-wide state.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::platform::{FolderPicker, PickerLocation};

pub mod keys {
    pub const SAVE_DIR: &str = "saveDir";
    pub const LOGGING_ENABLED: &str = "logging.enabled";
    pub const LOGGING_LEVEL: &str = "logging.level";
    pub const LOGGING_DIRECTORY: &str = "logging.directory";
    pub const INSTALLED: &str = "installInfo.installed";
    pub const INSTALL_DATE: &str = "installInfo.installDate";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Text(String),
}

impl SettingValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            Self::Bool(_) => None,
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&Path> for SettingValue {
    fn from(value: &Path) -> Self {
        Self::Text(value.to_string_lossy().into_owned())
    }
}

impl From<LogLevel> for SettingValue {
    fn from(value: LogLevel) -> Self {
        Self::Text(value.as_tag().to_string())
    }
}

impl From<DateTime<Utc>> for SettingValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Text(value.to_rfc3339())
    }
}

/// Key/value persistence used by the settings layer.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<SettingValue>;
    fn set(&self, key: &str, value: SettingValue) -> Result<()>;

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

impl<S: SettingsStore + ?Sized> SettingsStore for Arc<S> {
    fn get(&self, key: &str) -> Option<SettingValue> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: SettingValue) -> Result<()> {
        (**self).set(key, value)
    }
}

type ValueMap = BTreeMap<String, SettingValue>;

fn lock_values(values: &Mutex<ValueMap>) -> Result<std::sync::MutexGuard<'_, ValueMap>> {
    values
        .lock()
        .map_err(|_| Error::Settings("settings lock poisoned".into()))
}

/// Volatile store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<ValueMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Option<SettingValue> {
        lock_values(&self.values).ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: SettingValue) -> Result<()> {
        lock_values(&self.values)?.insert(key.to_string(), value);
        Ok(())
    }
}

/// Flat YAML map on disk; every `set` is written through.
#[derive(Debug)]
pub struct YamlFileStore {
    path: PathBuf,
    values: Mutex<ValueMap>,
}

impl YamlFileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => ValueMap::new(),
            Ok(text) => serde_yaml::from_str(&text)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "settings file missing; starting empty");
                ValueMap::new()
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &ValueMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_yaml::to_string(values)?;
        let tmp = self.path.with_extension("yaml.tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SettingsStore for YamlFileStore {
    fn get(&self, key: &str) -> Option<SettingValue> {
        lock_values(&self.values).ok()?.get(key).cloned()
    }

    /// The in-memory map only changes once the file write succeeded.
    fn set(&self, key: &str, value: SettingValue) -> Result<()> {
        let mut values = lock_values(&self.values)?;
        let mut updated = values.clone();
        updated.insert(key.to_string(), value);
        self.persist(&updated)?;
        *values = updated;
        Ok(())
    }
}

/// Minimum severity recorded by the session log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    Verbose,
    #[default]
    Information,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub const ALL: &'static [Self] = &[
        Self::Verbose,
        Self::Information,
        Self::Warning,
        Self::Error,
        Self::Critical,
    ];
    const TAGS: &'static [(Self, &'static str)] = &[
        (Self::Verbose, "verbose"),
        (Self::Information, "information"),
        (Self::Warning, "warning"),
        (Self::Error, "error"),
        (Self::Critical, "critical"),
    ];

    pub fn as_tag(self) -> &'static str {
        Self::TAGS
            .iter()
            .find(|(level, _)| *level == self)
            .map(|(_, tag)| *tag)
            .unwrap_or("information")
    }

    /// Case-insensitive lookup in the tag table.
    pub fn from_tag(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::TAGS
            .iter()
            .find(|(_, tag)| tag.eq_ignore_ascii_case(raw))
            .map(|(level, _)| *level)
    }

    pub fn from_tag_or_default(raw: &str) -> Self {
        Self::from_tag(raw).unwrap_or_else(|| {
            warn!(tag = raw, "unknown logging level; using default");
            Self::default()
        })
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// Session log configuration as persisted under the `logging.*` keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub enabled: bool,
    pub level: LogLevel,
    pub directory: PathBuf,
}

/// Written once by the first successful initialization.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstallInfo {
    pub installed: bool,
    pub install_date: Option<DateTime<Utc>>,
}

/// Typed snapshot of every settings key, with defaults filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub save_dir: PathBuf,
    pub logging: LoggingSettings,
    pub install_info: InstallInfo,
}

impl Settings {
    /// Defaults applied when a key is unset.
    pub fn defaults(cfg: &Configuration) -> Self {
        Self {
            save_dir: cfg.default_save_dir.clone(),
            logging: LoggingSettings {
                enabled: false,
                level: LogLevel::default(),
                directory: cfg.default_log_dir.clone(),
            },
            install_info: InstallInfo::default(),
        }
    }

    /// Read every key from `store`, substituting `defaults` for values that are
    /// missing or of the wrong type.
    pub fn load(store: &dyn SettingsStore, defaults: &Settings) -> Self {
        let text = |key: &str| match store.get(key) {
            Some(SettingValue::Text(s)) => Some(s),
            Some(other) => {
                warn!(key, value = ?other, "expected text setting; using default");
                None
            }
            None => None,
        };
        let flag = |key: &str| match store.get(key) {
            Some(SettingValue::Bool(b)) => Some(b),
            Some(other) => {
                warn!(key, value = ?other, "expected boolean setting; using default");
                None
            }
            None => None,
        };

        let install_date = text(keys::INSTALL_DATE).and_then(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|err| warn!(value = %raw, "invalid install date: {err}"))
                .ok()
        });

        Self {
            save_dir: text(keys::SAVE_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| defaults.save_dir.clone()),
            logging: LoggingSettings {
                enabled: flag(keys::LOGGING_ENABLED).unwrap_or(defaults.logging.enabled),
                level: text(keys::LOGGING_LEVEL)
                    .map(|raw| LogLevel::from_tag_or_default(&raw))
                    .unwrap_or(defaults.logging.level),
                directory: text(keys::LOGGING_DIRECTORY)
                    .map(PathBuf::from)
                    .unwrap_or_else(|| defaults.logging.directory.clone()),
            },
            install_info: InstallInfo {
                installed: flag(keys::INSTALLED).unwrap_or(defaults.install_info.installed),
                install_date: install_date.or(defaults.install_info.install_date),
            },
        }
    }

    /// Key/value pairs that seeding writes for unset keys. Install metadata is
    /// handled separately by the bootstrap.
    fn seed_entries(&self) -> [(&'static str, SettingValue); 4] {
        [
            (keys::SAVE_DIR, self.save_dir.as_path().into()),
            (keys::LOGGING_ENABLED, self.logging.enabled.into()),
            (keys::LOGGING_LEVEL, self.logging.level.into()),
            (keys::LOGGING_DIRECTORY, self.logging.directory.as_path().into()),
        ]
    }
}

/// Typed access to a shared settings store.
#[derive(Clone)]
pub struct SettingsService {
    store: Arc<dyn SettingsStore>,
    defaults: Settings,
}

impl SettingsService {
    pub fn new(store: Arc<dyn SettingsStore>, defaults: Settings) -> Self {
        Self { store, defaults }
    }

    pub fn store(&self) -> &dyn SettingsStore {
        self.store.as_ref()
    }

    pub fn defaults(&self) -> &Settings {
        &self.defaults
    }

    /// Fresh snapshot read from the store.
    #[must_use]
    pub fn current(&self) -> Settings {
        Settings::load(self.store.as_ref(), &self.defaults)
    }

    #[must_use]
    pub fn save_dir(&self) -> PathBuf {
        self.current().save_dir
    }

    pub fn set_save_dir(&self, dir: &Path) -> Result<()> {
        self.store.set(keys::SAVE_DIR, dir.into())
    }

    pub fn set_logging_enabled(&self, enabled: bool) -> Result<()> {
        self.store.set(keys::LOGGING_ENABLED, enabled.into())
    }

    pub fn set_logging_level(&self, level: LogLevel) -> Result<()> {
        self.store.set(keys::LOGGING_LEVEL, level.into())
    }

    pub fn set_logging_directory(&self, dir: &Path) -> Result<()> {
        self.store.set(keys::LOGGING_DIRECTORY, dir.into())
    }

    /// Write defaults for keys that are currently unset; returns the keys written.
    pub fn seed_missing(&self) -> Result<Vec<&'static str>> {
        let mut seeded = Vec::new();
        for (key, value) in self.defaults.seed_entries() {
            if self.store.contains(key) {
                continue;
            }
            self.store.set(key, value)?;
            seeded.push(key);
        }
        if !seeded.is_empty() {
            debug!(?seeded, "seeded default settings");
        }
        Ok(seeded)
    }

    /// Ask the user for a save directory; `Ok(None)` when cancelled.
    pub fn pick_save_dir(&self, picker: &dyn FolderPicker) -> Result<Option<PathBuf>> {
        let Some(dir) = picker.pick_folder(PickerLocation::Pictures) else {
            return Ok(None);
        };
        self.set_save_dir(&dir)?;
        info!(dir = %dir.display(), "save directory changed");
        Ok(Some(dir))
    }

    /// Ask the user for a log directory; `Ok(None)` when cancelled.
    pub fn pick_log_dir(&self, picker: &dyn FolderPicker) -> Result<Option<PathBuf>> {
        let Some(dir) = picker.pick_folder(PickerLocation::Documents) else {
            return Ok(None);
        };
        self.set_logging_directory(&dir)?;
        info!(dir = %dir.display(), "log directory changed");
        Ok(Some(dir))
    }
}
