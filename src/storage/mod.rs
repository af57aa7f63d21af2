//! On-disk persistence of output images.
//!
//! Each written item is one file:
//!
//! ```text
//! [MAGIC: 4 bytes][VERSION: 1 byte]
//! [section: FileHeader]
//! [section: Image]
//! ```
//!
//! Files are written to a temporary sibling first and renamed into place,
//! so a crash never leaves a half-written file under the final name.

pub mod codec;

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Result as IoResult, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::image::Image;

use self::codec::SectionTag;

/// Provenance stored in front of every image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    /// Item name inside its container, e.g. `numerator`.
    pub item: String,
    /// Container class or item shape that produced the file.
    pub kind: String,
    /// Samples accumulated into the data (mean-valued containers).
    pub number_of_samples: u64,
    /// When the file was written.
    pub written_at: DateTime<Utc>,
    /// Container metadata at write time.
    pub metadata: Map<String, Value>,
}

impl FileHeader {
    /// Create a header stamped with the current time.
    #[must_use]
    pub fn new(
        item: impl Into<String>,
        kind: impl Into<String>,
        number_of_samples: u64,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            item: item.into(),
            kind: kind.into(),
            number_of_samples,
            written_at: Utc::now(),
            metadata,
        }
    }
}

/// Contents of an output data file.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredImage {
    pub header: FileHeader,
    pub image: Image,
}

/// Atomically write `image` to `path`, creating parent directories.
///
/// # Errors
/// Any I/O or serialization failure; the final path is untouched on error.
pub fn write_image_file(path: &Path, header: &FileHeader, image: &Image) -> IoResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let temp_path = temp_path_for(path);
    let result = write_to(&temp_path, header, image).and_then(|()| fs::rename(&temp_path, path));
    if result.is_err() && temp_path.exists() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".tmp.{}", Uuid::new_v4()));
    path.with_file_name(name)
}

fn write_to(temp_path: &Path, header: &FileHeader, image: &Image) -> IoResult<()> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(temp_path)?;
    let mut writer = BufWriter::new(file);
    codec::write_preamble(&mut writer)?;
    codec::write_section(&mut writer, SectionTag::Header, header)?;
    codec::write_section(&mut writer, SectionTag::Image, image)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Read a file written by [`write_image_file`].
///
/// # Errors
/// Missing file, bad magic bytes, checksum mismatch or malformed JSON.
pub fn read_image_file(path: &Path) -> IoResult<StoredImage> {
    let mut reader = BufReader::new(File::open(path)?);
    codec::read_preamble(&mut reader)?;
    let header: FileHeader = codec::read_section(&mut reader, SectionTag::Header)?;
    let image: Image = codec::read_section(&mut reader, SectionTag::Image)?;
    Ok(StoredImage { header, image })
}
