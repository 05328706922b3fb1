use crate::error::{Error, Result};
use crate::events::PreparedImage;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// Blocking decode used by the cache's preload slots. Implementations run on
/// tokio's blocking pool.
pub trait ImageLoader: Send + Sync + 'static {
    fn load(&self, path: &Path) -> Result<PreparedImage>;
}

/// Decodes to RGBA8 with the `image` crate and applies EXIF orientation.
#[derive(Debug, Default, Clone, Copy)]
pub struct RgbaDecoder;

impl ImageLoader for RgbaDecoder {
    fn load(&self, path: &Path) -> Result<PreparedImage> {
        let rgba8 = decode_upright(path)?;
        let (width, height) = rgba8.dimensions();
        debug!(path = %path.display(), width, height, "decoded");
        Ok(PreparedImage {
            path: path.to_path_buf(),
            width,
            height,
            pixels: rgba8.into_raw(),
        })
    }
}

/// Steps that bring an image stored with the given EXIF orientation upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upright {
    Rotate90,
    Rotate180,
    Rotate270,
    FlipHorizontal,
    FlipVertical,
}

fn upright_steps(orientation: u16) -> &'static [Upright] {
    use Upright::*;
    match orientation {
        2 => &[FlipHorizontal],
        3 => &[Rotate180],
        4 => &[FlipVertical],
        5 => &[Rotate90, FlipHorizontal],
        6 => &[Rotate90],
        7 => &[Rotate270, FlipHorizontal],
        8 => &[Rotate270],
        _ => &[],
    }
}

fn apply(step: Upright, img: &image::RgbaImage) -> image::RgbaImage {
    use image::imageops;
    match step {
        Upright::Rotate90 => imageops::rotate90(img),
        Upright::Rotate180 => imageops::rotate180(img),
        Upright::Rotate270 => imageops::rotate270(img),
        Upright::FlipHorizontal => imageops::flip_horizontal(img),
        Upright::FlipVertical => imageops::flip_vertical(img),
    }
}

/// Without readable metadata the pixels stay as stored.
fn decode_upright(path: &Path) -> Result<image::RgbaImage> {
    let decoded = image::ImageReader::open(path)?
        .with_guessed_format()? // Spotlight copies may carry a fallback extension
        .decode()
        .map_err(|source| Error::Decode {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgba8();
    let orientation = read_orientation(path).unwrap_or(1);
    Ok(upright_steps(orientation)
        .iter()
        .fold(decoded, |img, step| apply(*step, &img)))
}

fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let meta = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let orientation = meta
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)?
        .value
        .get_uint(0)
        .and_then(|raw| u16::try_from(raw).ok())?;
    debug!(path = %path.display(), orientation, "exif orientation");
    Some(orientation)
}
