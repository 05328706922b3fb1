use std::path::PathBuf;
use std::sync::Arc;

/// One successfully copied asset. `index` equals its position in the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub index: usize,
    pub path: PathBuf,
}

pub type ImageList = Vec<ImageRecord>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// The image put on screen by an advance or seek.
#[derive(Debug, Clone)]
pub struct Displayed {
    pub index: usize,
    pub path: PathBuf,
    /// `None` when the image could not be decoded.
    pub image: Option<Arc<PreparedImage>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerCommand {
    Next,
    Previous,
    Open,
    Save,
    Share,
    Reload,
}

/// Emitted by the viewer task for the interactive front-end.
#[derive(Debug, Clone)]
pub enum ViewerUpdate {
    /// A fresh enumeration pass was installed; `showing` is its first image.
    Loaded {
        count: usize,
        showing: Option<Displayed>,
    },
    Showing(Displayed),
    /// Nothing to show (empty gallery).
    Nothing,
    Saved(PathBuf),
    Opened(PathBuf),
    Shared(PathBuf),
    /// A user action failed; the message has already been shown.
    Failed(ViewerCommand),
}
