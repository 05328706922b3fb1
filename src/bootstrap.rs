//! First-launch detection and the idempotent startup initialization.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::settings::{SettingsService, keys};

/// True until the per-user application directory has been created.
pub fn is_first_launch(cfg: &Configuration) -> bool {
    !cfg.app_data_dir.is_dir()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOutcome {
    /// Whether this run created the application directory.
    pub first_launch: bool,
    /// Settings keys seeded with defaults during this run.
    pub seeded: Vec<&'static str>,
    /// Install date, freshly recorded or read back.
    pub install_date: Option<DateTime<Utc>>,
}

/// Prepare directories and settings. Safe to call on every launch: existing
/// directories and values, including user changes, are never replaced.
#[instrument(skip_all, fields(app_data = %cfg.app_data_dir.display()))]
pub fn initialize(cfg: &Configuration, settings: &SettingsService) -> Result<InitOutcome> {
    initialize_at(cfg, settings, Utc::now())
}

pub fn initialize_at(
    cfg: &Configuration,
    settings: &SettingsService,
    now: DateTime<Utc>,
) -> Result<InitOutcome> {
    let first_launch = is_first_launch(cfg);
    ensure_dir(&cfg.app_data_dir)?;

    let seeded = settings.seed_missing()?;
    ensure_dir(&cfg.default_save_dir)?;

    let current = settings.current();
    let install_date = if current.install_info.installed {
        current.install_info.install_date
    } else {
        settings.store().set(keys::INSTALLED, true.into())?;
        if current.install_info.install_date.is_none() {
            settings.store().set(keys::INSTALL_DATE, now.into())?;
        }
        info!(date = %now.to_rfc3339(), "recorded install metadata");
        Some(current.install_info.install_date.unwrap_or(now))
    };

    if first_launch {
        info!(seeded = seeded.len(), "first launch setup complete");
    }
    Ok(InitOutcome {
        first_launch,
        seeded,
        install_date,
    })
}

fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|source| Error::Init {
        path: path.to_path_buf(),
        source,
    })
}

/// Message shown when setup fails, mirroring the other user-facing errors.
pub fn failure_message(err: &Error) -> (String, String) {
    (
        format!("We had a problem setting up this program for first use.\n\n{err}"),
        format!("{} - Setup Failed", err.category()),
    )
}
