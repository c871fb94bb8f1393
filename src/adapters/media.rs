//! Media tool shell-outs: URL download and oversize-audio compression.
//!
//! Both tools are external binaries invoked per pass. The downloader keeps
//! its own archive file of source identifiers so a URL is fetched at most
//! once; compression produces a throwaway low-bitrate copy for upload and
//! never touches the original file. Every invocation runs under a bounded
//! timeout — the run lock is held for the whole pass, so a hung tool must
//! never stall it indefinitely.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::info;

/// Run a tool to completion within the bound; the child is killed on expiry.
async fn run_bounded(
    mut cmd: Command,
    what: &str,
    bound: Duration,
) -> Result<std::process::Output> {
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match tokio::time::timeout(bound, cmd.output()).await {
        Ok(output) => output.with_context(|| format!("Failed to run {}", what)),
        Err(_) => anyhow::bail!("{} timed out after {}s", what, bound.as_secs()),
    }
}

/// Download audio for each URL into the inbox via yt-dlp.
///
/// `archive_file` is yt-dlp's download archive: one source identifier per
/// line, preventing re-downloads across passes.
pub async fn download_audio(
    ytdlp: &str,
    urls: &[String],
    inbox: &Path,
    archive_file: &Path,
    bound: Duration,
) -> Result<()> {
    if urls.is_empty() {
        return Ok(());
    }

    tokio::fs::create_dir_all(inbox)
        .await
        .with_context(|| format!("Failed to create inbox: {}", inbox.display()))?;

    let out_template = inbox.join("%(title).200s [%(id)s].%(ext)s");

    info!(count = urls.len(), "Downloading queued URLs");

    let mut cmd = Command::new(ytdlp);
    cmd.arg("--download-archive")
        .arg(archive_file)
        .arg("-f")
        .arg("bestaudio/best")
        .arg("--no-playlist")
        .arg("-x")
        .arg("--audio-format")
        .arg("m4a")
        .arg("-o")
        .arg(&out_template)
        .args(urls);

    let output = run_bounded(cmd, "yt-dlp", bound).await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("yt-dlp failed: {}", stderr.trim());
    }

    Ok(())
}

/// Transcode to a temporary 64 kbps m4a next to the source file.
///
/// The caller owns cleanup of the returned path.
pub async fn compress_for_upload(ffmpeg: &str, src: &Path, bound: Duration) -> Result<PathBuf> {
    let compressed = src.with_extension("compressed.m4a");
    if compressed.exists() {
        tokio::fs::remove_file(&compressed).await?;
    }

    let mut cmd = Command::new(ffmpeg);
    cmd.arg("-y")
        .arg("-i")
        .arg(src)
        .arg("-vn")
        .arg("-c:a")
        .arg("aac")
        .arg("-b:a")
        .arg("64k")
        .arg(&compressed);

    let output = run_bounded(cmd, "ffmpeg", bound).await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("ffmpeg failed: {}", stderr.trim());
    }

    Ok(compressed)
}
