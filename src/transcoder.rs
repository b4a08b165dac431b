//! ffmpeg invocation for the two output kinds.

use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::process::{display_command, run_cancellable, summarize_stderr, Finished};

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("failed to start ffmpeg ({path}): {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("ffmpeg exited with {}: {detail}", .code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}")))]
    Failed { code: Option<i32>, detail: String },

    #[error("cancelled")]
    Cancelled,
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn run(&self, args: &[OsString], cancel: &CancellationToken) -> Result<(), TranscodeError>;
}

/// `-y -i <input> -q:a 0 -map a <output>`: best-quality audio only
pub fn audio_extract_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.into()];
    args.extend(["-q:a", "0", "-map", "a"].map(OsString::from));
    args.push(output.into());
    args
}

/// Copies the video track and re-encodes audio to AAC into one container.
pub fn mux_args(video: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-i".into(),
        video.into(),
        "-i".into(),
        audio.into(),
    ];
    args.extend(["-c:v", "copy", "-c:a", "aac", "-strict", "experimental"].map(OsString::from));
    args.push(output.into());
    args
}

/// The real ffmpeg executable
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    bin: PathBuf,
}

impl Ffmpeg {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }
}

#[async_trait]
impl Transcoder for Ffmpeg {
    async fn run(&self, args: &[OsString], cancel: &CancellationToken) -> Result<(), TranscodeError> {
        tracing::info!("$ {}", display_command(self.bin.as_os_str(), args));

        let mut command = Command::new(&self.bin);
        command.args(args);
        let finished = run_cancellable(command, cancel)
            .await
            .map_err(|source| TranscodeError::Spawn {
                path: self.bin.clone(),
                source,
            })?;

        match finished {
            Finished::Cancelled => Err(TranscodeError::Cancelled),
            Finished::Exited(output) if output.status.success() => Ok(()),
            Finished::Exited(output) => {
                let detail = summarize_stderr(&output.stderr);
                tracing::debug!("ffmpeg stderr:\n{}", String::from_utf8_lossy(&output.stderr));
                Err(TranscodeError::Failed {
                    code: output.status.code(),
                    detail,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn audio_args_match_ffmpeg_extraction() {
        let args = audio_extract_args(Path::new("dl/t.mp4"), Path::new("dl/My Song.mp3"));
        assert_eq!(
            strings(&args),
            ["-y", "-i", "dl/t.mp4", "-q:a", "0", "-map", "a", "dl/My Song.mp3"]
        );
    }

    #[test]
    fn mux_args_copy_video_and_encode_aac() {
        let args = mux_args(Path::new("v.mp4"), Path::new("a.mp4"), Path::new("Clip.mp4"));
        assert_eq!(
            strings(&args),
            [
                "-y", "-i", "v.mp4", "-i", "a.mp4", "-c:v", "copy", "-c:a", "aac", "-strict",
                "experimental", "Clip.mp4"
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn zero_exit_is_success() {
        let ffmpeg = Ffmpeg::new("true");
        ffmpeg.run(&[], &CancellationToken::new()).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_failure() {
        let ffmpeg = Ffmpeg::new("false");
        let err = ffmpeg.run(&[], &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, TranscodeError::Failed { code: Some(1), .. }));
        assert!(err.to_string().starts_with("ffmpeg exited with code 1"));
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let ffmpeg = Ffmpeg::new("no-such-ffmpeg-binary");
        let err = ffmpeg.run(&[], &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, TranscodeError::Spawn { .. }));
    }
}
