//! File name derivation and output directory resolution.

use std::fmt;
use std::path::{Path, PathBuf};

/// Inserts `_suffix` between the file stem and the extension.
///
/// `dose.mhd` + `run0003` gives `dose_run0003.mhd`. A `None` or empty suffix
/// returns the path unchanged.
#[must_use]
pub fn insert_suffix_before_extension(path: &Path, suffix: Option<&str>) -> PathBuf {
    let Some(suffix) = suffix.filter(|s| !s.is_empty()) else {
        return path.to_path_buf();
    };
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match path.extension() {
        Some(ext) => format!("{stem}_{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{suffix}"),
    };
    path.with_file_name(file_name)
}

/// Resolves relative output file names against the simulation's output
/// location.
///
/// This is the boundary to the simulation collaborator; actor outputs never
/// resolve paths beyond suffix insertion.
pub trait OutputPathResolver: Send + Sync + fmt::Debug {
    /// Returns the full path for `filename`.
    fn get_output_path(&self, filename: &Path) -> PathBuf;
}

/// Resolver backed by a single global output directory.
///
/// Absolute file names are returned unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDirectory {
    root: PathBuf,
}

impl OutputDirectory {
    /// Create a resolver rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory relative names are resolved against.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for OutputDirectory {
    fn default() -> Self {
        Self::new(".")
    }
}

impl OutputPathResolver for OutputDirectory {
    fn get_output_path(&self, filename: &Path) -> PathBuf {
        if filename.is_absolute() {
            filename.to_path_buf()
        } else {
            self.root.join(filename)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_suffix() {
        let p = insert_suffix_before_extension(Path::new("out/dose.mhd"), Some("run0003"));
        assert_eq!(p, PathBuf::from("out/dose_run0003.mhd"));
    }

    #[test]
    fn test_insert_suffix_composes() {
        let p = insert_suffix_before_extension(Path::new("dose.mhd"), Some("run0001"));
        let p = insert_suffix_before_extension(&p, Some("numerator"));
        assert_eq!(p, PathBuf::from("dose_run0001_numerator.mhd"));
    }

    #[test]
    fn test_no_suffix_is_identity() {
        let p = Path::new("dose.mhd");
        assert_eq!(insert_suffix_before_extension(p, None), PathBuf::from("dose.mhd"));
        assert_eq!(insert_suffix_before_extension(p, Some("")), PathBuf::from("dose.mhd"));
    }

    #[test]
    fn test_insert_suffix_without_extension() {
        let p = insert_suffix_before_extension(Path::new("dose"), Some("quotient"));
        assert_eq!(p, PathBuf::from("dose_quotient"));
    }

    #[test]
    fn test_output_directory_resolution() {
        let dir = OutputDirectory::new("/tmp/sim");
        assert_eq!(dir.get_output_path(Path::new("a.mhd")), PathBuf::from("/tmp/sim/a.mhd"));
        assert_eq!(dir.get_output_path(Path::new("/abs/b.mhd")), PathBuf::from("/abs/b.mhd"));
    }
}
