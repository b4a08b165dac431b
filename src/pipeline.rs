//! Download-and-merge pipeline.
//!
//! One [`DownloadJob`] becomes exactly one [`PipelineOutcome`]. Steps run
//! strictly in order (resolve, download, rename, transcode, clean up) and
//! every intermediate file lives in a [`TempFiles`] guard, so nothing is left
//! behind in the download directory whichever way the job ends.

use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use thiserror::Error;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::model::{DownloadJob, PipelineOutcome, Selector, Stage, VideoMetadata};
use crate::provider::{MediaError, MediaSource};
use crate::sanitize::sanitize_filename;
use crate::selector::{audio_stream, stream_by_id};
use crate::transcoder::{audio_extract_args, mux_args, TranscodeError, Transcoder};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Media(MediaError),

    #[error("No audio found.")]
    NoAudio,

    #[error("No video or audio found.")]
    NoVideoOrAudio,

    #[error("transcoding failed: {0}")]
    Transcode(TranscodeError),

    #[error("file operation failed on {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("download cancelled")]
    Cancelled,
}

impl From<MediaError> for PipelineError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::Cancelled => Self::Cancelled,
            other => Self::Media(other),
        }
    }
}

impl From<TranscodeError> for PipelineError {
    fn from(e: TranscodeError) -> Self {
        match e {
            TranscodeError::Cancelled => Self::Cancelled,
            other => Self::Transcode(other),
        }
    }
}

fn fs_error(path: &Path) -> impl FnOnce(io::Error) -> PipelineError + '_ {
    move |source| PipelineError::Filesystem {
        path: path.to_path_buf(),
        source,
    }
}

/// Intermediate files of one job, named `<job id>.<name>` so concurrent jobs
/// never share a path. Every registered file is removed on drop.
pub struct TempFiles {
    dir: PathBuf,
    prefix: String,
    paths: Vec<PathBuf>,
}

impl TempFiles {
    pub fn new(dir: &Path, job: Uuid) -> Self {
        Self {
            dir: dir.to_path_buf(),
            prefix: job.simple().to_string(),
            paths: Vec::new(),
        }
    }

    /// Registers and returns the path for `name`.
    pub fn path(&mut self, name: &str) -> PathBuf {
        let path = self.dir.join(format!("{}.{name}", self.prefix));
        self.paths.push(path.clone());
        path
    }

    /// Removes every registered file that still exists.
    pub fn cleanup(&mut self) -> Result<(), PipelineError> {
        while let Some(path) = self.paths.pop() {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!("removed {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(fs_error(&path)(e)),
            }
        }
        Ok(())
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            tracing::warn!("temporary file left behind: {e}");
        }
    }
}

/// Final file name for a title, e.g. `My Song.mp3`
pub fn output_path(dir: &Path, title: &str, ext: &str) -> PathBuf {
    let name = sanitize_filename(title);
    let name = match name.trim() {
        "" => "untitled",
        trimmed => trimmed,
    };
    dir.join(format!("{name}.{ext}"))
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

async fn rename(from: &Path, to: &Path) -> Result<(), PipelineError> {
    fs::rename(from, to).await.map_err(fs_error(from))
}

/// Stage callback; may borrow from the caller
pub type StageFn<'a> = dyn Fn(Stage) + Send + Sync + 'a;

/// Runs jobs against one configuration, media source and transcoder
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<Config>,
    source: Arc<dyn MediaSource>,
    transcoder: Arc<dyn Transcoder>,
}

impl Pipeline {
    pub fn new(config: Arc<Config>, source: Arc<dyn MediaSource>, transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            config,
            source,
            transcoder,
        }
    }

    /// Runs `job` to completion. Errors never escape; they become a failed outcome.
    pub async fn run(&self, job: &DownloadJob, cancel: &CancellationToken, on_stage: &StageFn<'_>) -> PipelineOutcome {
        tracing::info!(job = %job.id, url = %job.url, selector = %job.selector, "job started");
        match self.execute(job, cancel, on_stage).await {
            Ok(outcome) => {
                tracing::info!(job = %job.id, "{}", outcome.message);
                outcome
            }
            Err(e) => {
                tracing::warn!(job = %job.id, "job failed: {e}");
                PipelineOutcome::failed(e.to_string())
            }
        }
    }

    async fn execute(
        &self,
        job: &DownloadJob,
        cancel: &CancellationToken,
        on_stage: &StageFn<'_>,
    ) -> Result<PipelineOutcome, PipelineError> {
        // Outputs and temp files share the download directory
        let dir = &self.config.download_dir;
        fs::create_dir_all(dir).await.map_err(fs_error(dir))?;

        ensure_live(cancel)?;
        on_stage(Stage::Resolving);
        let meta = self.source.resolve(&job.url, cancel).await?;

        let mut temps = TempFiles::new(dir, job.id);
        let outcome = match &job.selector {
            Selector::Audio => self.extract_audio(job, &meta, &mut temps, cancel, on_stage).await?,
            Selector::Stream(id) => {
                self.merge_video(job, &meta, id, &mut temps, cancel, on_stage)
                    .await?
            }
        };

        // The output is already in place, so a stuck temp file does not fail the job
        on_stage(Stage::CleaningUp);
        if let Err(e) = temps.cleanup() {
            tracing::warn!(job = %job.id, "{e}");
        }
        Ok(outcome)
    }

    async fn extract_audio(
        &self,
        job: &DownloadJob,
        meta: &VideoMetadata,
        temps: &mut TempFiles,
        cancel: &CancellationToken,
        on_stage: &StageFn<'_>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let audio = audio_stream(&meta.streams).ok_or(PipelineError::NoAudio)?;
        let output = output_path(&self.config.download_dir, &meta.title, "mp3");

        // Fetch the audio track
        ensure_live(cancel)?;
        on_stage(Stage::DownloadingAudio);
        let downloaded = temps.path("audio.mp4");
        self.source.download(&job.url, &audio.id, &downloaded, cancel).await?;
        let temp_audio = temps.path("temp_audio.mp4");
        rename(&downloaded, &temp_audio).await?;

        // Convert to mp3 next to the temp files, then move over the final name
        ensure_live(cancel)?;
        on_stage(Stage::Transcoding);
        let converted = temps.path("output.mp3");
        self.transcode(&audio_extract_args(&temp_audio, &converted), cancel)
            .await?;
        rename(&converted, &output).await?;

        Ok(PipelineOutcome::succeeded(
            format!("Audio '{}' successfully downloaded to {}", meta.title, output.display()),
            output,
        ))
    }

    async fn merge_video(
        &self,
        job: &DownloadJob,
        meta: &VideoMetadata,
        stream_id: &str,
        temps: &mut TempFiles,
        cancel: &CancellationToken,
        on_stage: &StageFn<'_>,
    ) -> Result<PipelineOutcome, PipelineError> {
        // Both tracks must exist before anything is downloaded
        let (Some(video), Some(audio)) = (stream_by_id(&meta.streams, stream_id), audio_stream(&meta.streams))
        else {
            return Err(PipelineError::NoVideoOrAudio);
        };
        let output = output_path(&self.config.download_dir, &meta.title, "mp4");

        // Video track first, then audio, one after the other
        ensure_live(cancel)?;
        on_stage(Stage::DownloadingVideo);
        let video_file = temps.path("video.mp4");
        self.source.download(&job.url, &video.id, &video_file, cancel).await?;

        ensure_live(cancel)?;
        on_stage(Stage::DownloadingAudio);
        let audio_file = temps.path("audio.mp4");
        self.source.download(&job.url, &audio.id, &audio_file, cancel).await?;

        let temp_video = temps.path("temp_video.mp4");
        let temp_audio = temps.path("temp_audio.mp4");
        rename(&video_file, &temp_video).await?;
        rename(&audio_file, &temp_audio).await?;

        // Mux into a temp container; only a finished file replaces the final name
        ensure_live(cancel)?;
        on_stage(Stage::Transcoding);
        let muxed = temps.path("output.mp4");
        self.transcode(&mux_args(&temp_video, &temp_audio, &muxed), cancel)
            .await?;
        rename(&muxed, &output).await?;

        Ok(PipelineOutcome::succeeded(
            format!(
                "Video '{}' successfully downloaded and merged into {}",
                meta.title,
                output.display()
            ),
            output,
        ))
    }

    async fn transcode(&self, args: &[OsString], cancel: &CancellationToken) -> Result<(), PipelineError> {
        self.transcoder
            .run(args, cancel)
            .await
            .map_err(PipelineError::from)
    }
}
