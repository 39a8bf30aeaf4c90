use image::error::LimitErrorKind;
use image::{DynamicImage, ImageError, ImageReader};
use log::{debug, warn};
use std::io::BufReader;
use std::path::Path;

use crate::error::{FaceFindError, Result};

/// Recognized file name suffixes, compared case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 4] = [".png", ".jpg", ".jpeg", ".webp"];

pub fn has_image_extension(path: &Path) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    let name = name.to_string_lossy().to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Whether `path` is a regular file with an image extension whose content
/// decodes as an image header.
///
/// Unreadable, corrupt or unsupported files give `Ok(false)`, as do files
/// whose declared size exceeds the decoder's memory or dimension limits.
/// Parameter errors and unsupported limit settings are returned.
pub fn is_valid_image(path: &Path) -> Result<bool> {
    if !has_image_extension(path) {
        return Ok(false);
    }
    if !path.is_file() {
        return Ok(false);
    }

    let Some(reader) = open(path) else {
        return Ok(false);
    };
    match reader.into_dimensions() {
        Ok(_) => Ok(true),
        Err(err) => {
            absorb_decode_error(path, err)?;
            Ok(false)
        }
    }
}

/// Fully decode `path`, with the same failure split as [`is_valid_image`].
pub fn decode_image(path: &Path) -> Result<Option<DynamicImage>> {
    let Some(reader) = open(path) else {
        return Ok(None);
    };
    match reader.decode() {
        Ok(img) => Ok(Some(img)),
        Err(err) => {
            absorb_decode_error(path, err)?;
            Ok(None)
        }
    }
}

fn open(path: &Path) -> Option<ImageReader<BufReader<std::fs::File>>> {
    match ImageReader::open(path).and_then(|r| r.with_guessed_format()) {
        Ok(reader) => Some(reader),
        Err(err) => {
            // also covers the file vanishing after the is_file check
            debug!("cannot open {}: {}", path.display(), err);
            None
        }
    }
}

fn absorb_decode_error(path: &Path, err: ImageError) -> Result<()> {
    match err {
        ImageError::Decoding(_) | ImageError::Unsupported(_) | ImageError::IoError(_) => {
            debug!("not a usable image {}: {}", path.display(), err);
            Ok(())
        }
        ImageError::Limits(ref limit)
            if matches!(
                limit.kind(),
                LimitErrorKind::InsufficientMemory | LimitErrorKind::DimensionError
            ) =>
        {
            warn!("skipping {}: {}", path.display(), err);
            Ok(())
        }
        other => Err(FaceFindError::Image {
            path: path.to_path_buf(),
            source: other,
        }),
    }
}
