//! Raw IDX dataset loading.
//!
//! IDX files (as used by MNIST) start with a fixed-size header followed by
//! the payload bytes. The loaders here skip the header and return the payload
//! untouched; no dimension parsing is done.

use anyhow::{Context, Result, ensure};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Header length of an IDX3 image file (magic + count + rows + columns).
pub const IMAGE_HEADER_OFFSET: u64 = 16;

/// Header length of an IDX1 label file (magic + count).
pub const LABEL_HEADER_OFFSET: u64 = 8;

/// Read everything in `path` after the first `header_offset` bytes.
pub fn import_idx(path: &Path, header_offset: u64) -> Result<Vec<u8>> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open dataset {}", path.display()))?;
    let len = file
        .metadata()
        .with_context(|| format!("Failed to stat dataset {}", path.display()))?
        .len();
    ensure!(
        len >= header_offset,
        "{} is {len} bytes, shorter than its {header_offset}-byte header",
        path.display()
    );

    file.seek(SeekFrom::Start(header_offset))?;
    let mut data = Vec::with_capacity((len - header_offset) as usize);
    file.read_to_end(&mut data)
        .with_context(|| format!("Failed to read dataset {}", path.display()))?;
    Ok(data)
}

pub fn import_images(path: &Path) -> Result<Vec<u8>> {
    import_idx(path, IMAGE_HEADER_OFFSET)
}

pub fn import_labels(path: &Path) -> Result<Vec<u8>> {
    import_idx(path, LABEL_HEADER_OFFSET)
}

/// Payloads of an image file and its label file.
///
/// A file that cannot be loaded is logged and left empty.
#[derive(Debug, Default)]
pub struct Dataset {
    pub images: Vec<u8>,
    pub labels: Vec<u8>,
}

impl Dataset {
    pub fn load(images: &Path, labels: &Path) -> Self {
        Self {
            images: load_or_log(images, IMAGE_HEADER_OFFSET),
            labels: load_or_log(labels, LABEL_HEADER_OFFSET),
        }
    }
}

fn load_or_log(path: &Path, header_offset: u64) -> Vec<u8> {
    match import_idx(path, header_offset) {
        Ok(data) => {
            tracing::info!(path = %path.display(), bytes = data.len(), "Loaded dataset");
            data
        }
        Err(e) => {
            tracing::error!("could not open {}: {e:#}", path.display());
            Vec::new()
        }
    }
}
