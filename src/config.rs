use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

const APP_DIR_NAME: &str = "SpotlightCapture";
const SPOTLIGHT_PACKAGE: &str = "Microsoft.Windows.ContentDeliveryManager_cw5n1h2txyewy";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Per-user application directory. Its absence marks a first launch.
    pub app_data_dir: PathBuf,
    /// Vendor-controlled directory holding the extensionless Spotlight assets.
    pub asset_cache_dir: PathBuf,
    /// Scratch directory receiving copies with a normalized image extension.
    pub working_dir: PathBuf,
    /// Persisted key/value settings file.
    pub settings_file: PathBuf,
    /// Save directory seeded on first launch.
    pub default_save_dir: PathBuf,
    /// Log directory seeded on first launch.
    pub default_log_dir: PathBuf,
    /// Extension appended when an asset's format cannot be sniffed.
    pub fallback_extension: String,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(mut self) -> Result<Self> {
        ensure!(
            !self.app_data_dir.as_os_str().is_empty(),
            "app-data-dir must not be empty"
        );
        ensure!(
            !self.working_dir.as_os_str().is_empty(),
            "working-dir must not be empty"
        );
        ensure!(
            self.working_dir != self.asset_cache_dir,
            "working-dir must differ from asset-cache-dir"
        );
        let ext = self.fallback_extension.trim().trim_start_matches('.');
        ensure!(
            !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()),
            "fallback-extension must be a plain extension such as \"jpg\""
        );
        self.fallback_extension = ext.to_ascii_lowercase();
        if self.settings_file.as_os_str().is_empty() {
            self.settings_file = self.app_data_dir.join("settings.yaml");
        }
        Ok(self)
    }

    fn default_app_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
    }

    fn default_asset_cache_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Packages")
            .join(SPOTLIGHT_PACKAGE)
            .join("LocalState")
            .join("Assets")
    }

    fn default_save_dir() -> PathBuf {
        dirs::picture_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Spotlight")
    }
}

impl Default for Configuration {
    fn default() -> Self {
        let app_data_dir = Self::default_app_data_dir();
        Self {
            asset_cache_dir: Self::default_asset_cache_dir(),
            working_dir: std::env::temp_dir().join(APP_DIR_NAME),
            settings_file: app_data_dir.join("settings.yaml"),
            default_save_dir: Self::default_save_dir(),
            default_log_dir: app_data_dir.join("logs"),
            fallback_extension: "jpg".to_string(),
            app_data_dir,
        }
    }
}
