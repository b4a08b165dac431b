//! Media source backed by the yt-dlp executable.
//!
//! Metadata comes from `yt-dlp -J`, which prints one JSON document per URL
//! including every available format. Individual formats are downloaded with
//! `yt-dlp -f <format_id>` straight to the requested path.

use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::model::{StreamDescriptor, StreamKind, VideoMetadata};
use crate::process::{display_command, run_cancellable, summarize_stderr, Finished};

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("failed to start yt-dlp: {0}")]
    Spawn(#[source] io::Error),

    #[error("could not resolve video: {0}")]
    Resolution(String),

    #[error("unexpected yt-dlp output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("stream download failed: {0}")]
    Download(String),

    #[error("cancelled")]
    Cancelled,
}

/// Anything that can describe a URL and fetch one of its streams
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn resolve(&self, url: &str, cancel: &CancellationToken) -> Result<VideoMetadata, MediaError>;

    /// Downloads stream `stream_id` of `url` into `dest`.
    async fn download(
        &self,
        url: &str,
        stream_id: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), MediaError>;
}

#[derive(Debug, Clone)]
pub struct YtDlpSource {
    bin: PathBuf,
}

impl YtDlpSource {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    async fn run(&self, args: Vec<String>, cancel: &CancellationToken) -> Result<std::process::Output, MediaError> {
        tracing::debug!("{}", display_command(self.bin.as_os_str(), &args));
        let mut command = Command::new(&self.bin);
        command.args(&args);
        match run_cancellable(command, cancel).await.map_err(MediaError::Spawn)? {
            Finished::Exited(output) => Ok(output),
            Finished::Cancelled => Err(MediaError::Cancelled),
        }
    }
}

#[async_trait]
impl MediaSource for YtDlpSource {
    async fn resolve(&self, url: &str, cancel: &CancellationToken) -> Result<VideoMetadata, MediaError> {
        let args = vec![
            "-J".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            url.to_string(),
        ];
        let output = self.run(args, cancel).await?;
        // Non-zero exit means the URL is unsupported or unreachable
        if !output.status.success() {
            return Err(MediaError::Resolution(summarize_stderr(&output.stderr)));
        }
        parse_metadata(&output.stdout)
    }

    async fn download(
        &self,
        url: &str,
        stream_id: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), MediaError> {
        let args = vec![
            "-f".to_string(),
            stream_id.to_string(),
            "--no-playlist".to_string(),
            "--no-part".to_string(),
            "--no-progress".to_string(),
            "-o".to_string(),
            output_template(dest),
            url.to_string(),
        ];
        let output = self.run(args, cancel).await?;
        if !output.status.success() {
            return Err(MediaError::Download(summarize_stderr(&output.stderr)));
        }
        // yt-dlp exits 0 on some skips without writing anything
        if !dest.exists() {
            return Err(MediaError::Download(format!(
                "yt-dlp finished but {} was not written",
                dest.display()
            )));
        }
        Ok(())
    }
}

/// `-o` takes an output template; literal `%` must be doubled.
fn output_template(dest: &Path) -> String {
    dest.display().to_string().replace('%', "%%")
}

#[derive(Deserialize)]
struct RawInfo {
    title: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Deserialize)]
struct RawFormat {
    format_id: String,
    ext: String,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    fps: Option<f64>,
}

/// Parses the JSON document printed by `yt-dlp -J`.
pub fn parse_metadata(json: &[u8]) -> Result<VideoMetadata, MediaError> {
    let raw: RawInfo = serde_json::from_slice(json)?;
    // Storyboards and other trackless formats drop out here
    let streams = raw.formats.into_iter().filter_map(descriptor).collect();
    Ok(VideoMetadata {
        title: raw.title.unwrap_or_else(|| "untitled".to_string()),
        thumbnail_url: raw.thumbnail,
        streams,
    })
}

/// `None` for formats with neither track (storyboards and the like).
fn descriptor(raw: RawFormat) -> Option<StreamDescriptor> {
    let has_video = raw.vcodec.as_deref() != Some("none");
    let has_audio = raw.acodec.as_deref() != Some("none");
    let kind = match (has_video, has_audio) {
        (true, true) => StreamKind::Combined,
        (true, false) => StreamKind::VideoOnly,
        (false, true) => StreamKind::AudioOnly,
        (false, false) => return None,
    };
    // Audio tracks report no meaningful height or fps
    let is_video = kind != StreamKind::AudioOnly;
    Some(StreamDescriptor {
        resolution: raw.height.filter(|_| is_video).map(|h| format!("{h}p")),
        fps: raw.fps.filter(|_| is_video).map(|f| f.round() as u32),
        container: raw.ext,
        kind,
        id: raw.format_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "id": "abc",
        "title": "Clip: the \"best\" one",
        "thumbnail": "https://i.ytimg.com/vi/abc/hqdefault.jpg",
        "formats": [
            {"format_id": "sb0", "ext": "mhtml", "vcodec": "none", "acodec": "none"},
            {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "height": null, "fps": null},
            {"format_id": "18", "ext": "mp4", "vcodec": "avc1.42001E", "acodec": "mp4a.40.2", "height": 360, "fps": 30},
            {"format_id": "137", "ext": "mp4", "vcodec": "avc1.640028", "acodec": "none", "height": 1080, "fps": 29.97},
            {"format_id": "248", "ext": "webm", "vcodec": "vp9", "acodec": "none", "height": 1080, "fps": 30}
        ]
    }"#;

    #[test]
    fn output_template_escapes_percent() {
        let dest = Path::new("/tmp/100% (s)/abc.video.mp4");
        assert_eq!(output_template(dest), "/tmp/100%% (s)/abc.video.mp4");
        assert_eq!(output_template(Path::new("/tmp/a.mp4")), "/tmp/a.mp4");
    }

    #[test]
    fn parses_formats_into_descriptors() {
        let meta = parse_metadata(SAMPLE.as_bytes()).unwrap();
        assert_eq!(meta.title, "Clip: the \"best\" one");
        assert_eq!(meta.thumbnail_url.as_deref(), Some("https://i.ytimg.com/vi/abc/hqdefault.jpg"));

        let kinds: Vec<_> = meta.streams.iter().map(|s| (s.id.as_str(), s.kind)).collect();
        assert_eq!(
            kinds,
            [
                ("140", StreamKind::AudioOnly),
                ("18", StreamKind::Combined),
                ("137", StreamKind::VideoOnly),
                ("248", StreamKind::VideoOnly),
            ]
        );

        let hd = &meta.streams[2];
        assert_eq!(hd.resolution.as_deref(), Some("1080p"));
        assert_eq!(hd.fps, Some(30));
        assert_eq!(hd.container, "mp4");
        assert_eq!(meta.streams[0].resolution, None);
    }

    #[test]
    fn missing_formats_yield_empty_list() {
        let meta = parse_metadata(br#"{"title": "x"}"#).unwrap();
        assert!(meta.streams.is_empty());
        assert!(meta.thumbnail_url.is_none());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(parse_metadata(b"ERROR: nope"), Err(MediaError::Parse(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_extractor_is_a_resolution_error() {
        let source = YtDlpSource::new("false");
        let err = source
            .resolve("https://example.com/watch?v=x", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Resolution(_)));
    }

    #[tokio::test]
    async fn missing_extractor_is_a_spawn_error() {
        let source = YtDlpSource::new("definitely-not-a-real-yt-dlp-binary");
        let err = source
            .resolve("https://example.com", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Spawn(_)));
    }
}
