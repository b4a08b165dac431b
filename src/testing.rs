//! In-memory media source and transcoder for pipeline and worker tests.

use std::{
    ffi::OsString,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::model::VideoMetadata;
use crate::provider::{MediaError, MediaSource};
use crate::transcoder::{TranscodeError, Transcoder};

/// Serves fixed metadata; downloads write a small marker file
pub struct FakeSource {
    pub meta: VideoMetadata,
    /// Cancelled right after the first download completes
    pub cancel_after_download: Option<CancellationToken>,
    /// Delay inside each download, to widen race windows
    pub download_delay: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeSource {
    pub fn new(title: &str, streams: Vec<crate::model::StreamDescriptor>) -> Self {
        Self {
            meta: VideoMetadata {
                title: title.to_string(),
                thumbnail_url: None,
                streams,
            },
            cancel_after_download: None,
            download_delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MediaSource for FakeSource {
    async fn resolve(&self, url: &str, _cancel: &CancellationToken) -> Result<VideoMetadata, MediaError> {
        if url.starts_with("bad") {
            return Err(MediaError::Resolution("unsupported URL".to_string()));
        }
        Ok(self.meta.clone())
    }

    async fn download(
        &self,
        _url: &str,
        stream_id: &str,
        dest: &Path,
        _cancel: &CancellationToken,
    ) -> Result<(), MediaError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.download_delay.is_zero() {
            tokio::time::sleep(self.download_delay).await;
        }
        let written = std::fs::write(dest, format!("stream {stream_id}"));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        written.map_err(|e| MediaError::Download(e.to_string()))?;

        if let Some(token) = &self.cancel_after_download {
            token.cancel();
        }
        Ok(())
    }
}

/// Records its arguments and writes the output file (the last argument)
#[derive(Default)]
pub struct FakeTranscoder {
    pub fail: bool,
    /// Swaps each input file for a directory, so it cannot be removed as a file
    pub replace_inputs_with_dirs: bool,
    pub calls: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn run(&self, args: &[OsString], _cancel: &CancellationToken) -> Result<(), TranscodeError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        for pair in args.windows(2) {
            if pair[0] == "-i" {
                assert!(Path::new(&pair[1]).exists(), "input {} missing", pair[1]);
            }
        }
        if self.replace_inputs_with_dirs {
            for pair in args.windows(2).filter(|pair| pair[0] == "-i") {
                std::fs::remove_file(&pair[1]).unwrap();
                std::fs::create_dir(&pair[1]).unwrap();
            }
        }
        let output = args.last().cloned().unwrap_or_default();
        self.calls.lock().unwrap().push(args);
        std::fs::write(&output, b"muxed").unwrap();

        if self.fail {
            return Err(TranscodeError::Failed {
                code: Some(1),
                detail: "Invalid data found when processing input".to_string(),
            });
        }
        Ok(())
    }
}
