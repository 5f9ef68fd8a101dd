//! Audio file discovery for corpus ingestion.
//!
//! A corpus directory holds one subdirectory per genre; every audio file
//! below a genre directory is a clip of that genre.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Audio file extensions decoded during ingestion.
pub const DEFAULT_AUDIO_EXTENSIONS: &[&str] = &["aac", "flac", "m4a", "mp3", "ogg", "wav"];

/// Audio formats that no enabled decoder reads. Ingestion refuses a corpus
/// containing them instead of skipping clips silently.
pub const UNSUPPORTED_AUDIO_EXTENSIONS: &[&str] = &["au", "snd", "wma"];

/// Get a sorted list of files below `directory` whose extension matches one
/// of `extensions`, ignoring ASCII case.
///
/// Subdirectories are searched recursively; unreadable ones are skipped.
///
/// # Examples
/// ```no_run
/// use cqtstore::files::{find_files, DEFAULT_AUDIO_EXTENSIONS};
///
/// let clips = find_files("corpus/jazz", DEFAULT_AUDIO_EXTENSIONS);
/// let wavs = find_files("corpus/rock", &["wav"]);
/// ```
pub fn find_files(directory: impl AsRef<Path>, extensions: &[&str]) -> Vec<PathBuf> {
    let mut files = BTreeSet::new();
    collect_files_recursive(directory.as_ref(), extensions, &mut files);
    files.into_iter().collect()
}

/// Sorted immediate subdirectories of `directory`, skipping hidden ones.
///
/// # Errors
/// Returns the I/O error if `directory` cannot be read.
pub fn subdirectories(directory: impl AsRef<Path>) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs = BTreeSet::new();
    for entry in std::fs::read_dir(directory)?.flatten() {
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if path.is_dir() && !hidden {
            dirs.insert(path);
        }
    }
    Ok(dirs.into_iter().collect())
}

fn matches_extension(path: &Path, extensions: &[&str]) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(e) => extensions.iter().any(|x| x.eq_ignore_ascii_case(e)),
        None => false,
    }
}

fn collect_files_recursive(dir: &Path, extensions: &[&str], out: &mut BTreeSet<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files_recursive(&path, extensions, out);
        } else if path.is_file() && matches_extension(&path, extensions) {
            out.insert(path);
        }
    }
}
