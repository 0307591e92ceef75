//! Directory scanning.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::print_json;
use crate::reader::MediaReader;

/// Extensions worth handing to the prober.
const MEDIA_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "oga", "opus", "wav", "m4a", "m4b", "mp4", "mka", "mkv", "webm", "caf", "aiff",
];

/// Outcome of probing one file.
#[derive(Debug, Serialize)]
struct ScanEntry {
    path: PathBuf,
    title: Option<String>,
    codec: Option<String>,
    duration: u32,
    chapters: usize,
    warnings: usize,
    error: Option<String>,
}

/// Whether `path` has a media extension.
pub fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| MEDIA_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Probe every media file under `path`
pub fn cmd_scan(reader: &MediaReader, path: &Path, recursive: bool, json: bool) -> anyhow::Result<()> {
    if !path.is_dir() {
        anyhow::bail!("Not a directory: {}", path.display());
    }

    let walker = WalkDir::new(path).max_depth(if recursive { usize::MAX } else { 1 });
    let files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_media_file(e.path()))
        .map(|e| e.into_path())
        .collect();

    info!(path = %path.display(), files = files.len(), "Scanning");
    let entries: Vec<ScanEntry> = files.par_iter().map(|file| probe_file(reader, file)).collect();

    if json {
        return print_json(&entries);
    }

    let mut failed = 0;
    for entry in &entries {
        match &entry.error {
            Some(e) => {
                failed += 1;
                eprintln!("{}: {}", entry.path.display(), e);
            }
            None => {
                let title = entry.title.as_deref().unwrap_or("(untitled)");
                let codec = entry.codec.as_deref().unwrap_or("?");
                let chapters = if entry.chapters > 0 {
                    format!(", {} chapters", entry.chapters)
                } else {
                    String::new()
                };
                println!("{} - {} [{}, {}s{}]", entry.path.display(), title, codec, entry.duration, chapters);
            }
        }
    }
    println!("\nScan complete. {} files, {} failed.", entries.len(), failed);
    Ok(())
}

fn probe_file(reader: &MediaReader, path: &Path) -> ScanEntry {
    let mut entry = ScanEntry {
        path: path.to_path_buf(),
        title: None,
        codec: None,
        duration: 0,
        chapters: 0,
        warnings: 0,
        error: None,
    };

    let handle = match reader.open(path) {
        Ok(handle) => handle,
        Err(e) => {
            entry.error = Some(e.to_string());
            return entry;
        }
    };

    match reader.tag_from_handle(&handle, Some(path)) {
        Ok(loaded) => {
            entry.title = loaded.tag.loaded.then_some(loaded.tag.title);
            entry.codec = Some(loaded.tag.codec);
            entry.duration = loaded.tag.duration;
            entry.warnings = loaded.diagnostics.significant().count();
        }
        Err(e) => entry.error = Some(e.to_string()),
    }
    entry.chapters = reader.chapters_from_handle(&handle).items.len();

    debug!(path = %path.display(), chapters = entry.chapters, "Probed");
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::wav_bytes;

    #[test]
    fn test_is_media_file() {
        assert!(is_media_file(Path::new("a/b/book.M4B")));
        assert!(is_media_file(Path::new("live.mka")));
        assert!(!is_media_file(Path::new("cover.jpg")));
        assert!(!is_media_file(Path::new("README")));
    }

    #[test]
    fn test_probe_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("tone.wav");
        std::fs::write(&good, wav_bytes(8000, 1, 8000)).unwrap();
        let bad = dir.path().join("broken.mp3");
        std::fs::write(&bad, b"definitely not audio").unwrap();

        let reader = MediaReader::default();
        let entry = probe_file(&reader, &good);
        assert!(entry.error.is_none());
        assert_eq!(entry.duration, 1);
        assert_eq!(entry.chapters, 0);

        assert!(probe_file(&reader, &bad).error.is_some());
    }

    #[test]
    fn test_scan_rejects_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(cmd_scan(&MediaReader::default(), file.path(), false, false).is_err());
    }
}
