//! Seams to the desktop environment: folder picking, modal messages,
//! launching an external viewer and composing mail.

use std::path::{Path, PathBuf};

use crate::error::Result;

pub mod shell;

/// Suggested starting location for a folder picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerLocation {
    Pictures,
    Documents,
}

impl PickerLocation {
    pub fn resolve(self) -> Option<PathBuf> {
        match self {
            Self::Pictures => dirs::picture_dir(),
            Self::Documents => dirs::document_dir(),
        }
        .or_else(dirs::home_dir)
    }
}

pub trait FolderPicker: Send + Sync {
    /// Returns `None` when the user cancels.
    fn pick_folder(&self, suggested: PickerLocation) -> Option<PathBuf>;
}

pub trait Notifier: Send + Sync {
    fn show_message(&self, body: &str, title: &str);
}

pub trait Launcher: Send + Sync {
    fn open(&self, path: &Path) -> Result<()>;
}

pub trait Mailer: Send + Sync {
    fn compose(&self, attachment: &Path) -> Result<()>;
}
