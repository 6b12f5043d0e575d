//! Job identity and intermediate file naming.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Compute the fingerprint that namespaces a job's temporary files.
///
/// SHA-256 of the input name, first 16 hex characters.
pub fn compute_fingerprint(input_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input_name.as_bytes());
    let result = hasher.finalize();
    format!("{:x}", result)[..16].to_string()
}

/// One document-to-audio conversion.
#[derive(Debug, Clone)]
pub struct Job {
    /// Input file stem, used as a readable filename prefix
    pub stem: String,
    /// Deterministic identifier derived from the input name
    pub fingerprint: String,
    /// Directory holding intermediate parts and the manifest
    pub work_dir: PathBuf,
    /// Extension of the per-chunk audio files
    pub extension: String,
}

impl Job {
    /// Create a job for `input_path`, keeping intermediates in `work_dir`.
    pub fn new(input_path: &Path, work_dir: &Path, extension: &str) -> Self {
        let stem = input_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "speech".to_string());

        Self {
            stem,
            fingerprint: compute_fingerprint(&input_path.to_string_lossy()),
            work_dir: work_dir.to_path_buf(),
            extension: extension.to_string(),
        }
    }

    /// Path of the audio file for chunk `index`.
    pub fn part_path(&self, index: usize) -> PathBuf {
        self.work_dir.join(format!(
            "{} part {} {}.{}",
            self.stem, index, self.fingerprint, self.extension
        ))
    }

    /// Path of the concatenation manifest.
    pub fn manifest_path(&self) -> PathBuf {
        self.work_dir
            .join(format!("{} lists {}.txt", self.stem, self.fingerprint))
    }

    /// Remove part files for chunks `0..count` that exist.
    ///
    /// Used when a job fails before reassembly. Returns how many were removed.
    pub fn remove_parts(&self, count: usize) -> usize {
        (0..count)
            .filter(|&index| remove_if_present(&self.part_path(index)))
            .count()
    }
}

/// Delete `path`, logging anything other than "not found". True if removed.
pub fn remove_if_present(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            log::warn!("Failed to remove {}: {}", path.display(), e);
            false
        }
    }
}
