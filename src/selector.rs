use crate::model::{QualityChoice, Selector, StreamDescriptor, StreamKind};

/// Label of the trailing audio-only entry
pub const AUDIO_ONLY_LABEL: &str = "Download audio only (MP3)";

/// Builds the quality dropdown: adaptive mp4 video streams in source order,
/// then the audio-only entry.
pub fn quality_choices(streams: &[StreamDescriptor]) -> Vec<QualityChoice> {
    streams
        .iter()
        .filter(|s| s.kind == StreamKind::VideoOnly && s.container == "mp4")
        .map(|s| QualityChoice {
            label: video_label(s),
            selector: Selector::Stream(s.id.clone()),
        })
        .chain(std::iter::once(QualityChoice {
            label: AUDIO_ONLY_LABEL.to_string(),
            selector: Selector::Audio,
        }))
        .collect()
}

fn video_label(stream: &StreamDescriptor) -> String {
    let resolution = stream.resolution.as_deref().unwrap_or("None");
    let fps = stream
        .fps
        .map(|f| f.to_string())
        .unwrap_or_else(|| "None".to_string());
    format!("{resolution} - {fps}fps")
}

/// The audio track merged into videos and used for mp3 extraction.
pub fn audio_stream(streams: &[StreamDescriptor]) -> Option<&StreamDescriptor> {
    streams
        .iter()
        .find(|s| s.kind == StreamKind::AudioOnly && matches!(s.container.as_str(), "mp4" | "m4a"))
}

pub fn stream_by_id<'a>(streams: &'a [StreamDescriptor], id: &str) -> Option<&'a StreamDescriptor> {
    streams.iter().find(|s| s.id == id)
}
