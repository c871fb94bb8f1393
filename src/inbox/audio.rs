//! Audio inbox enumeration and transcript naming.
//!
//! The audio inbox is a flat directory; anything with a recognized extension
//! is a candidate. Transcript filenames are derived deterministically from
//! the file's modification time and a sanitized title, with name collisions
//! resolved by a numeric suffix, never by overwrite.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Recognized audio/video extensions (lowercase, no dot)
pub const AUDIO_EXTS: &[&str] = &[
    "mp3", "mp4", "mpeg", "mpga", "m4a", "wav", "webm", "ogg", "oga", "flac",
];

/// Enumerate candidate audio files, sorted by name for a stable order.
pub async fn scan_audio(dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut found = Vec::new();

    if !dir.exists() {
        return Ok(found);
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let recognized = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .map(|e| AUDIO_EXTS.contains(&e.as_str()))
            .unwrap_or(false);
        if recognized {
            found.push(path);
        }
    }

    found.sort();
    Ok(found)
}

/// Datestamp for a transcript filename, from the source file's mtime.
pub async fn date_stamp(path: &Path) -> Result<String, std::io::Error> {
    let meta = tokio::fs::metadata(path).await?;
    let mtime: DateTime<Local> = meta.modified()?.into();
    Ok(mtime.format("%Y%m%d %H%M%S").to_string())
}

/// Strip path-hostile and smart-quote characters from a title and collapse
/// runs of whitespace.
pub fn safe_stem(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '“' | '”' | '‘' | '’' => ' ',
            c => c,
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First free `<base>.txt` path in a folder, suffixing " 2", " 3", ... on
/// collision.
pub async fn unique_transcript_path(folder: &Path, base_name: &str) -> PathBuf {
    let candidate = folder.join(format!("{}.txt", base_name));
    if !candidate.exists() {
        return candidate;
    }

    let mut i = 2u32;
    loop {
        let candidate = folder.join(format!("{} {}.txt", base_name, i));
        if !candidate.exists() {
            return candidate;
        }
        i += 1;
    }
}

/// Read the URL list file: one URL per line, blank and `#` lines ignored.
/// A missing file yields an empty list.
pub async fn load_urls(path: &Path) -> Result<Vec<String>, std::io::Error> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = tokio::fs::read_to_string(path).await?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect())
}
