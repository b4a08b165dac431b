//! Desktop tool that downloads a video stream with yt-dlp and merges or
//! converts it with ffmpeg.

// Flat key = value settings file
mod config;
// Debouncing of URL edits before metadata lookups
mod debounce;
// Data models for streams, jobs and outcomes
mod model;
// Download-and-merge pipeline
mod pipeline;
// Subprocess helpers (cancellation, stderr summaries)
mod process;
// yt-dlp backed media source
mod provider;
// Title to file name conversion
mod sanitize;
// Quality list construction
mod selector;
// Thumbnail fetching and scaling
mod thumbnail;
// ffmpeg argument building and invocation
mod transcoder;
// Background job queue
mod worker;
#[cfg(test)]
mod testing;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use eframe::{egui, App, Frame};
use egui::{Color32, ColorImage, TextureOptions, Visuals};
// OnceCell for single-time runtime initialization
use once_cell::sync::OnceCell;
use tokio::{
    runtime::{Handle, Runtime},
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use config::{Config, DEFAULT_CONFIG_FILE};
use debounce::Debouncer;
use model::{DownloadJob, QualityChoice, Stage, VideoMetadata};
use pipeline::Pipeline;
use provider::{MediaSource, YtDlpSource};
use transcoder::Ffmpeg;
use worker::{JobHandle, Worker, WorkerEvent};

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// Quiet period after the last keystroke before the URL is looked up
const LOOKUP_DEBOUNCE: Duration = Duration::from_millis(400);

/// Program entry point: loads settings, starts the runtime and launches the GUI
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = Arc::new(Config::load_or_default(&config_path));

    let runtime = RUNTIME.get_or_try_init(Runtime::new)?;
    let handle = runtime.handle().clone();

    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "Video Downloader",
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_visuals(Visuals::dark());
            Box::new(DownloaderApp::new(cc.egui_ctx.clone(), config, handle))
        }),
    )?;
    Ok(())
}

/// Results of background metadata and preview lookups
enum LookupEvent {
    Resolved { generation: u64, meta: VideoMetadata },
    Failed { generation: u64 },
    Preview { generation: u64, image: ColorImage },
}

/// Status line under the controls
enum Status {
    Info(String),
    Error(String),
}

/// Application state for the GUI
struct DownloaderApp {
    config: Arc<Config>,
    runtime: Handle,
    ctx: egui::Context,
    source: Arc<dyn MediaSource>,
    worker: Worker,
    worker_events: UnboundedReceiver<WorkerEvent>,

    /// Input field for the video URL
    url_input: String,
    debouncer: Debouncer<String>,
    /// URL whose metadata is currently shown or being fetched
    looked_up: Option<String>,
    /// Bumped on every lookup so stale results can be ignored
    generation: u64,
    lookup_cancel: Option<CancellationToken>,
    lookup_tx: UnboundedSender<LookupEvent>,
    lookup_rx: UnboundedReceiver<LookupEvent>,
    resolving: bool,

    title: Option<String>,
    quality_options: Vec<QualityChoice>,
    selected_quality: usize,
    preview: Option<egui::TextureHandle>,

    active_job: Option<JobHandle>,
    stage: Option<Stage>,
    /// Coarse: 0 until a job finishes, then 1
    progress: f32,
    status: Option<Status>,
    last_output: Option<PathBuf>,
}

impl DownloaderApp {
    fn new(ctx: egui::Context, config: Arc<Config>, runtime: Handle) -> Self {
        let source: Arc<dyn MediaSource> = Arc::new(YtDlpSource::new(&config.extractor_path));
        let transcoder = Arc::new(Ffmpeg::new(&config.transcoder_path));
        let pipeline = Pipeline::new(config.clone(), source.clone(), transcoder);

        let (event_tx, worker_events) = unbounded_channel();
        let repaint_ctx = ctx.clone();
        let worker = Worker::spawn(&runtime, pipeline, event_tx, Arc::new(move || repaint_ctx.request_repaint()));
        let (lookup_tx, lookup_rx) = unbounded_channel();

        Self {
            config,
            runtime,
            ctx,
            source,
            worker,
            worker_events,
            url_input: String::new(),
            debouncer: Debouncer::new(LOOKUP_DEBOUNCE),
            looked_up: None,
            generation: 0,
            lookup_cancel: None,
            lookup_tx,
            lookup_rx,
            resolving: false,
            title: None,
            quality_options: Vec::new(),
            selected_quality: 0,
            preview: None,
            active_job: None,
            stage: None,
            progress: 0.0,
            status: None,
            last_output: None,
        }
    }

    /// Drops whatever belongs to the previous URL.
    fn reset_video_info(&mut self) {
        if let Some(cancel) = self.lookup_cancel.take() {
            cancel.cancel();
        }
        self.generation += 1;
        self.resolving = false;
        self.looked_up = None;
        self.title = None;
        self.quality_options.clear();
        self.selected_quality = 0;
        self.preview = None;
    }

    /// Resolves `url` in the background, then fetches its thumbnail.
    fn start_lookup(&mut self, url: String) {
        self.reset_video_info();
        self.looked_up = Some(url.clone());
        self.resolving = true;
        self.progress = 0.0;

        let generation = self.generation;
        let cancel = CancellationToken::new();
        self.lookup_cancel = Some(cancel.clone());

        let source = Arc::clone(&self.source);
        let tx = self.lookup_tx.clone();
        let ctx = self.ctx.clone();
        let runtime = self.runtime.clone();
        self.runtime.spawn(async move {
            let meta = match source.resolve(&url, &cancel).await {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::warn!("error loading video information for {url}: {e}");
                    let _ = tx.send(LookupEvent::Failed { generation });
                    ctx.request_repaint();
                    return;
                }
            };

            if let Some(thumb_url) = meta.thumbnail_url.clone() {
                let tx = tx.clone();
                let ctx = ctx.clone();
                runtime.spawn_blocking(move || match thumbnail::fetch_thumbnail(&thumb_url) {
                    Ok(image) => {
                        let _ = tx.send(LookupEvent::Preview { generation, image });
                        ctx.request_repaint();
                    }
                    Err(e) => tracing::warn!("error loading preview: {e}"),
                });
            }

            let _ = tx.send(LookupEvent::Resolved { generation, meta });
            ctx.request_repaint();
        });
    }

    fn pump_lookup_events(&mut self) {
        while let Ok(event) = self.lookup_rx.try_recv() {
            match event {
                LookupEvent::Resolved { generation, meta } if generation == self.generation => {
                    self.resolving = false;
                    self.quality_options = selector::quality_choices(&meta.streams);
                    self.selected_quality = 0;
                    self.title = Some(meta.title);
                }
                LookupEvent::Failed { generation } if generation == self.generation => {
                    self.resolving = false;
                }
                LookupEvent::Preview { generation, image } if generation == self.generation => {
                    self.preview = Some(self.ctx.load_texture("preview", image, TextureOptions::default()));
                }
                _ => tracing::debug!("dropping stale lookup result"),
            }
        }
    }

    fn pump_worker_events(&mut self) {
        while let Ok(event) = self.worker_events.try_recv() {
            match event {
                WorkerEvent::Started { .. } => self.stage = None,
                WorkerEvent::Stage { stage, .. } => self.stage = Some(stage),
                WorkerEvent::Finished { job, outcome } => {
                    if self.active_job.as_ref().is_some_and(|h| h.id == job) {
                        self.active_job = None;
                    }
                    self.stage = None;
                    self.progress = 1.0;
                    if outcome.success {
                        self.url_input.clear();
                        self.debouncer.clear();
                        self.reset_video_info();
                        self.last_output = outcome.output;
                        self.status = Some(Status::Info(outcome.message));
                    } else {
                        self.status = Some(Status::Error(format!("Error: {}", outcome.message)));
                    }
                }
            }
        }
    }

    /// Job for the URL the quality list was built from, once editing and lookup have settled.
    fn pending_job(&self, now: Instant) -> Option<DownloadJob> {
        let settled = !self.resolving && self.debouncer.remaining(now).is_none();
        ready_job(
            self.looked_up.as_deref(),
            &self.url_input,
            settled,
            self.quality_options.get(self.selected_quality),
        )
    }

    fn start_download(&mut self, job: DownloadJob) {
        self.progress = 0.0;
        self.status = None;
        self.last_output = None;
        self.active_job = Some(self.worker.submit(job));
    }
}

/// Pairs a quality choice with the URL it was resolved for. `None` while the
/// field holds a different URL or a lookup is still pending.
fn ready_job(
    looked_up: Option<&str>,
    input: &str,
    settled: bool,
    choice: Option<&QualityChoice>,
) -> Option<DownloadJob> {
    let url = looked_up?;
    if !settled || url != input.trim() {
        return None;
    }
    choice.map(|c| DownloadJob::new(url, c.selector.clone()))
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for DownloaderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.pump_worker_events();
        self.pump_lookup_events();

        let now = Instant::now();
        if let Some(url) = self.debouncer.poll(now) {
            if url.is_empty() {
                self.reset_video_info();
            } else if self.looked_up.as_deref() != Some(url.as_str()) {
                self.start_lookup(url);
            }
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Video Downloader");

            ui.label("Enter video URL:");
            let edit = ui.add(
                egui::TextEdit::singleline(&mut self.url_input)
                    .hint_text("Enter video URL")
                    .desired_width(f32::INFINITY),
            );
            if edit.changed() {
                self.debouncer.push(self.url_input.trim().to_string(), Instant::now());
            }

            // Preview, fixed 320x180 box
            let preview_size = egui::vec2(thumbnail::PREVIEW_WIDTH as f32, thumbnail::PREVIEW_HEIGHT as f32);
            ui.allocate_ui(preview_size, |ui| {
                ui.set_min_size(preview_size);
                ui.centered_and_justified(|ui| {
                    if let Some(tex) = &self.preview {
                        ui.image(tex);
                    } else if self.resolving {
                        ui.spinner();
                    }
                });
            });
            if let Some(title) = &self.title {
                ui.strong(title);
            }

            ui.label("Select quality:");
            let selected_text = self
                .quality_options
                .get(self.selected_quality)
                .map(|c| c.label.clone())
                .unwrap_or_default();
            egui::ComboBox::from_id_source("quality")
                .selected_text(selected_text)
                .width(240.0)
                .show_ui(ui, |ui| {
                    for (idx, choice) in self.quality_options.iter().enumerate() {
                        ui.selectable_value(&mut self.selected_quality, idx, &choice.label);
                    }
                });

            // Only offer a download for the URL the choices were built for
            let ready = match self.active_job {
                None => self.pending_job(now),
                Some(_) => None,
            };
            ui.horizontal(|ui| {
                if ui.add_enabled(ready.is_some(), egui::Button::new("Download")).clicked() {
                    if let Some(job) = ready {
                        self.start_download(job);
                    }
                }
                if let Some(job) = &self.active_job {
                    if ui.button("Cancel").clicked() {
                        job.cancel();
                    }
                    ui.spinner();
                    if let Some(stage) = self.stage {
                        ui.label(stage.to_string());
                    }
                }
            });

            ui.add(egui::ProgressBar::new(self.progress).show_percentage());

            match &self.status {
                Some(Status::Info(msg)) => {
                    ui.label(msg);
                }
                Some(Status::Error(msg)) => {
                    ui.colored_label(Color32::RED, msg);
                }
                None => {}
            }
            if self.last_output.is_some() && ui.button("Open Folder").clicked() {
                open_folder(&self.config.download_dir);
            }
        });

        // Wake up when the debounce window closes, otherwise poll periodically
        let wait = self
            .debouncer
            .remaining(now)
            .unwrap_or(Duration::from_millis(250));
        ctx.request_repaint_after(wait);
    }
}

/// Opens the download directory in the platform file manager
fn open_folder(dir: &Path) {
    let folder = dir.to_path_buf();
    std::thread::spawn(move || {
        #[cfg(target_os = "windows")]
        let opener = "explorer";
        #[cfg(target_os = "macos")]
        let opener = "open";
        #[cfg(all(unix, not(target_os = "macos")))]
        let opener = "xdg-open";

        if let Err(e) = std::process::Command::new(opener).arg(&folder).spawn() {
            tracing::warn!("could not open {}: {e}", folder.display());
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Selector;

    fn choice(id: &str) -> QualityChoice {
        QualityChoice {
            label: "720p - 30fps".to_string(),
            selector: Selector::Stream(id.to_string()),
        }
    }

    #[test]
    fn job_uses_resolved_url_and_its_stream() {
        let c = choice("136");
        let job = ready_job(Some("https://a"), " https://a ", true, Some(&c)).unwrap();
        assert_eq!(job.url, "https://a");
        assert_eq!(job.selector, Selector::Stream("136".into()));
    }

    #[test]
    fn edited_url_does_not_reuse_old_streams() {
        let c = choice("136");
        assert!(ready_job(Some("https://a"), "https://b", true, Some(&c)).is_none());
        assert!(ready_job(Some("https://b"), "https://b", false, Some(&c)).is_none());
        assert!(ready_job(None, "https://b", true, Some(&c)).is_none());
        assert!(ready_job(Some("https://b"), "https://b", true, None).is_none());
    }
}
