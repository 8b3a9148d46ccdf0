/// yt-dlp subprocess runner.
///
/// Probes media metadata with `-J` and performs downloads with a chosen
/// format id, optionally extracting audio to mp3. The binary path comes
/// from YTDLP_BIN (default `yt-dlp`).
use std::path::PathBuf;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use snag_shared::errors::ExtractError;

/// Metadata for one encoded variant of a media item, as reported by yt-dlp.
#[derive(Debug, Clone, Deserialize)]
pub struct FormatDescriptor {
    pub format_id: String,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    /// Total bitrate (video + audio), kbit/s.
    #[serde(default)]
    pub tbr: Option<f64>,
    /// Audio bitrate, kbit/s.
    #[serde(default)]
    pub abr: Option<f64>,
    #[serde(default)]
    pub filesize_approx: Option<u64>,
}

impl FormatDescriptor {
    /// yt-dlp reports an absent codec as the literal string "none".
    pub fn has_video(&self) -> bool {
        self.vcodec.as_deref().map_or(false, |c| c != "none")
    }

    pub fn has_audio(&self) -> bool {
        self.acodec.as_deref().map_or(false, |c| c != "none")
    }
}

/// Top-level probe result.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaInfo {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub formats: Vec<FormatDescriptor>,
}

#[derive(Clone)]
pub struct YtDlp {
    bin: String,
    download_dir: PathBuf,
}

impl YtDlp {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin: std::env::var("YTDLP_BIN").unwrap_or_else(|_| "yt-dlp".to_string()),
            download_dir: download_dir.into(),
        }
    }

    /// Enumerate available formats without downloading anything.
    pub async fn probe(&self, url: &str) -> Result<MediaInfo, ExtractError> {
        let output = Command::new(&self.bin)
            .args(["-J", "--no-playlist", url])
            .output()
            .await
            .map_err(|e| ExtractError::Spawn {
                bin: self.bin.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(failure(&output));
        }

        let info: MediaInfo = serde_json::from_slice(&output.stdout)
            .map_err(|e| ExtractError::InvalidMetadata(e.to_string()))?;
        debug!(
            "Probed {} ({}): {} formats",
            info.id,
            info.title.as_deref().unwrap_or("untitled"),
            info.formats.len()
        );
        Ok(info)
    }

    /// Fetch the media in the chosen format into the download directory,
    /// named `<id>.<ext>`. When `audio` is set the stream is extracted and
    /// transcoded to mp3 at 192K, and the reported path carries the mp3
    /// extension. Returns the final file path after post-processing.
    pub async fn download(
        &self,
        url: &str,
        format_id: &str,
        audio: bool,
    ) -> Result<PathBuf, ExtractError> {
        let template = self.download_dir.join("%(id)s.%(ext)s");

        let mut cmd = Command::new(&self.bin);
        cmd.args(["-f", format_id, "--no-playlist", "--no-progress"])
            .arg("-o")
            .arg(&template)
            .args(["--print", "after_move:filepath", "--no-simulate"]);
        if audio {
            cmd.args(["-x", "--audio-format", "mp3", "--audio-quality", "192K"]);
        }
        cmd.arg(url);

        let output = cmd.output().await.map_err(|e| ExtractError::Spawn {
            bin: self.bin.clone(),
            source: e,
        })?;

        if !output.status.success() {
            return Err(failure(&output));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .map(|l| PathBuf::from(l.trim()))
            .ok_or(ExtractError::MissingOutput)?;

        if !path.is_file() {
            return Err(ExtractError::FileNotFound(path.display().to_string()));
        }
        debug!("Downloaded {} to {}", url, path.display());
        Ok(path)
    }
}

fn failure(output: &std::process::Output) -> ExtractError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    ExtractError::Failed {
        code: output.status.code().unwrap_or(-1),
        stderr: stderr.lines().last().unwrap_or("").to_string(),
    }
}
