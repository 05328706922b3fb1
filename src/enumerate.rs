//! Copies the extensionless Spotlight assets into a working directory under a
//! recognizable image extension.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::config::Configuration;
use crate::error::Result;
use crate::events::{ImageList, ImageRecord};

/// Enough leading bytes for `image::guess_format` to recognize every format
/// we decode.
const SNIFF_LEN: usize = 32;

/// Copy every entry of `source_dir` into `dest_dir` and return the copies in
/// listing order. Entries that cannot be read or copied are skipped; indices
/// are dense over the copies that succeeded.
#[instrument(skip_all, fields(source = %source_dir.display(), dest = %dest_dir.display()))]
pub fn enumerate(source_dir: &Path, dest_dir: &Path, fallback_ext: &str) -> ImageList {
    if !source_dir.is_dir() {
        warn!("asset cache directory is missing or unreadable");
        return ImageList::new();
    }
    if let Err(err) = fs::create_dir_all(dest_dir) {
        warn!("cannot create working directory: {err}");
        return ImageList::new();
    }

    let mut images = ImageList::new();
    let mut skipped = 0usize;
    for entry in WalkDir::new(source_dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!("skipping unreadable entry: {err}");
                skipped += 1;
                continue;
            }
        };
        match copy_asset(entry.path(), dest_dir, fallback_ext) {
            Ok(path) => {
                debug!(path = %path.display(), index = images.len(), "asset copied");
                images.push(ImageRecord {
                    index: images.len(),
                    path,
                });
            }
            Err(err) => {
                debug!(path = %entry.path().display(), "skipping asset: {err}");
                skipped += 1;
            }
        }
    }
    info!(copied = images.len(), skipped, "enumeration complete");
    images
}

/// Runs [`enumerate`] on the blocking pool with the configured directories.
pub async fn enumerate_async(cfg: &Configuration) -> Result<ImageList> {
    let source = cfg.asset_cache_dir.clone();
    let dest = cfg.working_dir.clone();
    let ext = cfg.fallback_extension.clone();
    Ok(tokio::task::spawn_blocking(move || enumerate(&source, &dest, &ext)).await?)
}

fn copy_asset(source: &Path, dest_dir: &Path, fallback_ext: &str) -> std::io::Result<PathBuf> {
    let meta = fs::metadata(source)?;
    if !meta.is_file() {
        return Err(std::io::Error::other("not a regular file"));
    }
    let ext = sniff_extension(source)?.unwrap_or(fallback_ext);
    let Some(name) = source.file_name() else {
        return Err(std::io::Error::other("entry has no file name"));
    };
    let mut file_name = name.to_os_string();
    file_name.push(".");
    file_name.push(ext);
    let target = dest_dir.join(file_name);
    // An existing target from an earlier pass is overwritten in place.
    fs::copy(source, &target)?;
    Ok(target)
}

fn sniff_extension(path: &Path) -> std::io::Result<Option<&'static str>> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)?;
    Ok(image::guess_format(&head)
        .ok()
        .and_then(|format| format.extensions_str().first().copied()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn extension_is_sniffed_or_defaulted() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("abc123"), PNG_MAGIC).unwrap();
        fs::write(src.path().join("def456"), b"not an image").unwrap();

        let mut names: Vec<String> = enumerate(src.path(), dst.path(), "jpg")
            .into_iter()
            .map(|r| r.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["abc123.png", "def456.jpg"]);
    }

    #[test]
    fn missing_source_yields_empty_list() {
        let dst = tempfile::tempdir().unwrap();
        let images = enumerate(Path::new("/no/such/assets"), dst.path(), "jpg");
        assert!(images.is_empty());
    }

    #[test]
    fn rerun_reuses_existing_targets() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("one"), b"first").unwrap();
        let first = enumerate(src.path(), dst.path(), "jpg");
        fs::write(src.path().join("one"), b"second").unwrap();
        let second = enumerate(src.path(), dst.path(), "jpg");
        assert_eq!(first, second);
        assert_eq!(fs::read(&second[0].path).unwrap(), b"second");
    }
}
