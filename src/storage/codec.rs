//! Binary layout of output image files.
//!
//! A file is a magic/version preamble followed by typed sections:
//!
//! ```text
//! [MAGIC: 4 bytes][VERSION: 1 byte]
//! [section: FileHeader]
//! [section: Image]
//! ```
//!
//! Each section is `[tag: 1 byte][length: 4 bytes LE][JSON][crc32: 4 bytes LE]`,
//! the checksum covering tag and JSON. Sections are read in a fixed order and
//! the tag must match the section expected at that position.

use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult, Write};

use crc32fast::Hasher;
use serde::{de::DeserializeOwned, Serialize};

/// Current file format version.
pub const FORMAT_VERSION: u8 = 1;

/// Magic bytes at the start of every output image file.
pub const MAGIC: [u8; 4] = *b"AOUT";

/// Largest section accepted on read (1 GiB); voxel images get big.
const MAX_SECTION_SIZE: usize = 1024 * 1024 * 1024;

/// Kind of a section, stored as its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SectionTag {
    /// Provenance: item name, container class, samples, metadata.
    Header = 1,
    /// Voxel data with spacing and origin.
    Image = 2,
}

impl SectionTag {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Header),
            2 => Some(Self::Image),
            _ => None,
        }
    }
}

fn invalid(message: String) -> IoError {
    IoError::new(ErrorKind::InvalidData, message)
}

fn section_checksum(tag: SectionTag, json: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[tag as u8]);
    hasher.update(json);
    hasher.finalize()
}

/// Serializes `value` as a section tagged `tag`.
///
/// # Errors
/// Serialization failure, or a value too large for the length field.
pub fn write_section<T: Serialize>(writer: &mut impl Write, tag: SectionTag, value: &T) -> IoResult<()> {
    let json = serde_json::to_vec(value).map_err(|e| invalid(format!("cannot serialize {tag:?} section: {e}")))?;
    let len = u32::try_from(json.len())
        .map_err(|_| invalid(format!("{tag:?} section of {} bytes is too large", json.len())))?;

    writer.write_all(&[tag as u8])?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&json)?;
    writer.write_all(&section_checksum(tag, &json).to_le_bytes())?;
    Ok(())
}

/// Reads the next section, which must carry `expected`.
///
/// # Errors
/// - unknown or unexpected tag
/// - oversized section
/// - checksum mismatch (corruption)
/// - JSON deserialization failure
pub fn read_section<T: DeserializeOwned>(reader: &mut impl Read, expected: SectionTag) -> IoResult<T> {
    let mut tag = [0u8; 1];
    reader.read_exact(&mut tag)?;
    match SectionTag::from_byte(tag[0]) {
        Some(found) if found == expected => {}
        Some(found) => return Err(invalid(format!("expected {expected:?} section, found {found:?}"))),
        None => return Err(invalid(format!("unknown section tag {}", tag[0]))),
    }

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_SECTION_SIZE {
        return Err(invalid(format!("{expected:?} section of {len} bytes exceeds {MAX_SECTION_SIZE}")));
    }

    let mut json = vec![0u8; len];
    reader.read_exact(&mut json)?;

    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes)?;
    let stored = u32::from_le_bytes(crc_bytes);
    let computed = section_checksum(expected, &json);
    if stored != computed {
        return Err(invalid(format!(
            "{expected:?} section corrupted: checksum {stored:08x}, computed {computed:08x}"
        )));
    }

    serde_json::from_slice(&json).map_err(|e| invalid(format!("malformed {expected:?} section: {e}")))
}

/// Write the magic/version preamble.
pub fn write_preamble(writer: &mut impl Write) -> IoResult<()> {
    writer.write_all(&MAGIC)?;
    writer.write_all(&[FORMAT_VERSION])
}

/// Check the magic/version preamble.
///
/// # Errors
/// Foreign files and versions this build cannot read.
pub fn read_preamble(reader: &mut impl Read) -> IoResult<()> {
    let mut preamble = [0u8; 5];
    reader.read_exact(&mut preamble)?;
    if preamble[..4] != MAGIC {
        return Err(invalid("not an actor output image file".to_string()));
    }
    if preamble[4] != FORMAT_VERSION {
        return Err(invalid(format!(
            "unsupported format version {} (expected {FORMAT_VERSION})",
            preamble[4]
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn section(tag: SectionTag, value: &impl Serialize) -> Vec<u8> {
        let mut buf = Vec::new();
        write_section(&mut buf, tag, value).unwrap();
        buf
    }

    #[test]
    fn test_detects_corruption() {
        let mut bytes = section(SectionTag::Image, &vec![1.0f64, 2.0, 3.0]);
        bytes[6] ^= 0xFF;
        let err = read_section::<Vec<f64>>(&mut Cursor::new(bytes), SectionTag::Image).unwrap_err();
        assert!(err.to_string().contains("corrupted"));
    }

    #[test]
    fn test_sections_are_read_in_order() {
        let bytes = section(SectionTag::Image, &"voxels");
        let err = read_section::<String>(&mut Cursor::new(bytes), SectionTag::Header).unwrap_err();
        assert!(err.to_string().contains("expected Header section, found Image"));
    }

    #[test]
    fn test_rejects_unknown_tag() {
        let mut bytes = section(SectionTag::Header, &"x");
        bytes[0] = 9;
        let err = read_section::<String>(&mut Cursor::new(bytes), SectionTag::Header).unwrap_err();
        assert!(err.to_string().contains("unknown section tag 9"));
    }

    #[test]
    fn test_checksum_covers_tag() {
        // Relabelling a section must not pass as a valid section of the other kind.
        let mut bytes = section(SectionTag::Header, &"x");
        bytes[0] = SectionTag::Image as u8;
        assert!(read_section::<String>(&mut Cursor::new(bytes), SectionTag::Image).is_err());
    }

    #[test]
    fn test_rejects_truncated_section() {
        let bytes = section(SectionTag::Header, &"truncated payload");
        let short = bytes[..bytes.len() - 3].to_vec();
        let err = read_section::<String>(&mut Cursor::new(short), SectionTag::Header).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_preamble() {
        let mut buf = Vec::new();
        write_preamble(&mut buf).unwrap();
        assert!(read_preamble(&mut Cursor::new(buf)).is_ok());

        assert!(read_preamble(&mut Cursor::new(b"ObjectType".to_vec())).is_err());
        let newer = [&MAGIC[..], &[FORMAT_VERSION + 1]].concat();
        assert!(read_preamble(&mut Cursor::new(newer)).is_err());
    }
}
