use std::path::PathBuf;

use thiserror::Error;

/// Library error type for capture operations.
#[derive(Debug, Error)]
pub enum Error {
    /// First-run setup could not create the directories the app needs.
    #[error("could not prepare {path}: {source}")]
    Init {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No image is positioned in the cache.
    #[error("no image is currently selected")]
    NoCurrentImage,

    /// The image could not be decoded.
    #[error("could not decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// An external program (viewer, mail client) could not be started.
    #[error("could not launch {program}: {reason}")]
    Launch { program: String, reason: String },

    /// The settings store rejected a read or write.
    #[error("settings store error: {0}")]
    Settings(String),

    /// Persisted settings were not valid YAML.
    #[error(transparent)]
    SettingsFormat(#[from] serde_yaml::Error),

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A blocking worker panicked or was cancelled.
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Short category name used in user-facing message titles.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Init { .. } => "InitError",
            Self::NoCurrentImage => "NoCurrentImage",
            Self::Decode { .. } => "DecodeError",
            Self::Launch { .. } => "LaunchError",
            Self::Settings(_) => "SettingsError",
            Self::SettingsFormat(_) => "SettingsFormatError",
            Self::Io(_) => "IoError",
            Self::Join(_) => "JoinError",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
