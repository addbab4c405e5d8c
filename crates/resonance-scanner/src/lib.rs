//! Filesystem scanner: walks root directories and groups files by the
//! directory that contains them, filtering to known audio extensions and
//! caller-supplied exclude patterns.

use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;
use walkdir::WalkDir;

use resonance_domain::DirectorySignature;
use resonance_identity::{dir_id, dir_signature, IdentityError};

const DEFAULT_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "ogg", "opus", "wav"];

#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("invalid exclude pattern {pattern:?}: {source}")]
    InvalidExcludePattern { pattern: String, source: regex::Error },
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// A directory containing audio files, with its non-audio siblings and
/// already-computed content signature.
#[derive(Debug, Clone)]
pub struct DirectoryBatch {
    pub directory: PathBuf,
    pub files: Vec<PathBuf>,
    pub non_audio_files: Vec<PathBuf>,
    pub signature: DirectorySignature,
    pub dir_id: String,
}

pub struct LibraryScanner {
    roots: Vec<PathBuf>,
    extensions: Vec<String>,
    exclude_patterns: Vec<Regex>,
}

impl LibraryScanner {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            exclude_patterns: Vec::new(),
        }
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions.into_iter().map(|e| e.trim_start_matches('.').to_lowercase()).collect();
        self
    }

    /// `patterns` are shell-glob style (`*`, `?`) matched against the full
    /// path, mirroring the reference scanner's `fnmatch` exclude list.
    pub fn with_exclude_patterns(mut self, patterns: &[String]) -> Result<Self, ScannerError> {
        self.exclude_patterns = patterns
            .iter()
            .map(|p| glob_to_regex(p).map_err(|source| ScannerError::InvalidExcludePattern { pattern: p.clone(), source }))
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    fn should_include(&self, path: &Path) -> bool {
        let ext_matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|known| known.eq_ignore_ascii_case(e)))
            .unwrap_or(false);
        if !ext_matches {
            return false;
        }
        let rel = path.to_string_lossy();
        !self.exclude_patterns.iter().any(|pattern| pattern.is_match(&rel))
    }

    /// Walk every root and yield one `DirectoryBatch` per directory that
    /// contains at least one included audio file. Directories are visited
    /// in deterministic (sorted) order; within a directory, files are sorted.
    pub fn iter_directories(&self) -> Result<Vec<DirectoryBatch>, ScannerError> {
        let mut batches = Vec::new();
        for root in &self.roots {
            if !root.exists() {
                continue;
            }
            let mut by_dir: std::collections::BTreeMap<PathBuf, (Vec<PathBuf>, Vec<PathBuf>)> = std::collections::BTreeMap::new();
            for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path().to_path_buf();
                let parent = path.parent().unwrap_or(root).to_path_buf();
                let slot = by_dir.entry(parent).or_default();
                if self.should_include(&path) {
                    slot.0.push(path);
                } else {
                    slot.1.push(path);
                }
            }
            for (directory, (mut files, mut non_audio)) in by_dir {
                if files.is_empty() {
                    continue;
                }
                files.sort();
                non_audio.sort();
                let signature = dir_signature(files.clone(), non_audio.clone())?;
                let id = dir_id(&signature);
                batches.push(DirectoryBatch {
                    directory,
                    files,
                    non_audio_files: non_audio,
                    signature,
                    dir_id: id,
                });
            }
        }
        Ok(batches)
    }

    /// Collect a single directory (non-recursive) if it contains audio files.
    pub fn collect_directory(&self, directory: &Path) -> Result<Option<DirectoryBatch>, ScannerError> {
        if !directory.is_dir() {
            return Ok(None);
        }
        let mut files = Vec::new();
        let mut non_audio = Vec::new();
        let entries = match std::fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(_) => return Ok(None),
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if self.should_include(&path) {
                files.push(path);
            } else {
                non_audio.push(path);
            }
        }
        if files.is_empty() {
            return Ok(None);
        }
        files.sort();
        non_audio.sort();
        let signature = dir_signature(files.clone(), non_audio.clone())?;
        let id = dir_id(&signature);
        Ok(Some(DirectoryBatch {
            directory: directory.to_path_buf(),
            files,
            non_audio_files: non_audio,
            signature,
            dir_id: id,
        }))
    }
}

fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut out = String::with_capacity(pattern.len() * 2);
    out.push('^');
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '.' | '(' | ')' | '+' | '|' | '^' | '$' | '[' | ']' | '{' | '}' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out.push('$');
    Regex::new(&out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn groups_files_by_directory_and_skips_empty_dirs() {
        let root = tempdir().unwrap();
        let album_dir = root.path().join("Artist").join("Album");
        fs::create_dir_all(&album_dir).unwrap();
        fs::write(album_dir.join("01.flac"), b"a").unwrap();
        fs::write(album_dir.join("02.flac"), b"b").unwrap();
        fs::write(album_dir.join("cover.jpg"), b"c").unwrap();
        let empty_dir = root.path().join("Empty");
        fs::create_dir_all(&empty_dir).unwrap();

        let scanner = LibraryScanner::new(vec![root.path().to_path_buf()]);
        let batches = scanner.iter_directories().unwrap();

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].files.len(), 2);
        assert_eq!(batches[0].non_audio_files.len(), 1);
    }

    #[test]
    fn exclude_pattern_filters_matching_paths() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("keep.flac"), b"a").unwrap();
        fs::write(root.path().join("sample.flac"), b"b").unwrap();

        let scanner = LibraryScanner::new(vec![root.path().to_path_buf()])
            .with_exclude_patterns(&["*sample*".to_string()])
            .unwrap();
        let batches = scanner.iter_directories().unwrap();

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].files.len(), 1);
        assert!(batches[0].files[0].ends_with("keep.flac"));
    }

    #[test]
    fn collect_directory_is_non_recursive() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("01.flac"), b"a").unwrap();
        let nested = root.path().join("nested");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("02.flac"), b"b").unwrap();

        let scanner = LibraryScanner::new(vec![]);
        let batch = scanner.collect_directory(root.path()).unwrap().unwrap();
        assert_eq!(batch.files.len(), 1);
    }

    #[test]
    fn collect_directory_returns_none_when_no_audio_present() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("readme.txt"), b"a").unwrap();
        let scanner = LibraryScanner::new(vec![]);
        assert!(scanner.collect_directory(root.path()).unwrap().is_none());
    }
}
