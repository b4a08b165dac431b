use std::{fmt, path::PathBuf};

use uuid::Uuid;

/// Which tracks a stream carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Adaptive video track without audio
    VideoOnly,
    /// Adaptive audio track without video
    AudioOnly,
    /// Progressive stream with both tracks
    Combined,
}

/// One downloadable track as reported by the media source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    /// Vertical resolution label such as `720p`
    pub resolution: Option<String>,
    /// Frames per second (video tracks only)
    pub fps: Option<u32>,
    /// Container extension, e.g. `mp4`, `webm`, `m4a`
    pub container: String,
    pub kind: StreamKind,
    /// Opaque token handed back to the source when downloading
    pub id: String,
}

/// Everything the source knows about one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMetadata {
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub streams: Vec<StreamDescriptor>,
}

/// What the user asked the pipeline to produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Merge this video stream with the audio track into an mp4
    Stream(String),
    /// Extract audio only into an mp3
    Audio,
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Stream(id) => f.write_str(id),
            Selector::Audio => f.write_str("audio"),
        }
    }
}

/// One entry of the quality dropdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityChoice {
    pub label: String,
    pub selector: Selector,
}

/// A single download request, consumed by exactly one pipeline run
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub id: Uuid,
    pub url: String,
    pub selector: Selector,
}

impl DownloadJob {
    pub fn new(url: impl Into<String>, selector: Selector) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            selector,
        }
    }
}

/// Coarse pipeline step, reported to the UI as a status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    DownloadingVideo,
    DownloadingAudio,
    Transcoding,
    CleaningUp,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Stage::Resolving => "Resolving streams…",
            Stage::DownloadingVideo => "Downloading video track…",
            Stage::DownloadingAudio => "Downloading audio track…",
            Stage::Transcoding => "Running ffmpeg…",
            Stage::CleaningUp => "Cleaning up…",
        };
        f.write_str(text)
    }
}

/// Terminal result of one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub success: bool,
    /// Human-readable summary shown in the status area
    pub message: String,
    pub output: Option<PathBuf>,
}

impl PipelineOutcome {
    pub fn succeeded(message: String, output: PathBuf) -> Self {
        Self {
            success: true,
            message,
            output: Some(output),
        }
    }

    pub fn failed(message: String) -> Self {
        Self {
            success: false,
            message,
            output: None,
        }
    }
}
