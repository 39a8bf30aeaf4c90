use std::path::PathBuf;

/// Failures that stop a scan or report.
///
/// Per-file decode problems never show up here: they turn into "not an image"
/// or "no faces" and the file is skipped.
#[derive(thiserror::Error, Debug)]
pub enum FaceFindError {
    #[error("directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("no face found in reference image {}", .0.display())]
    NoFaceInReference(PathBuf),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("image error in {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Model(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FaceFindError>;
