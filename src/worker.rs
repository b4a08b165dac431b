//! Single background worker that runs download jobs one at a time.

use std::sync::Arc;

use tokio::{runtime::Handle, sync::mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::model::{DownloadJob, PipelineOutcome, Stage};
use crate::pipeline::Pipeline;

/// Progress of a job as seen by the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Started { job: Uuid },
    Stage { job: Uuid, stage: Stage },
    Finished { job: Uuid, outcome: PipelineOutcome },
}

/// Callback used to wake the UI after each event
pub type Notifier = Arc<dyn Fn() + Send + Sync>;

/// Lets the submitter cancel a queued or running job
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub id: Uuid,
    cancel: CancellationToken,
}

impl JobHandle {
    pub fn cancel(&self) {
        tracing::info!(job = %self.id, "cancellation requested");
        self.cancel.cancel();
    }
}

pub struct Worker {
    jobs: mpsc::UnboundedSender<(DownloadJob, CancellationToken)>,
}

impl Worker {
    /// Starts the worker task on `runtime`. Events go to `events`.
    pub fn spawn(
        runtime: &Handle,
        pipeline: Pipeline,
        events: mpsc::UnboundedSender<WorkerEvent>,
        notify: Notifier,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<(DownloadJob, CancellationToken)>();

        runtime.spawn(async move {
            let emit = |event: WorkerEvent| {
                // The receiver only goes away when the UI shuts down
                let _ = events.send(event);
                notify();
            };

            // One job at a time; the next is only taken once this one finished
            while let Some((job, cancel)) = rx.recv().await {
                emit(WorkerEvent::Started { job: job.id });
                let id = job.id;
                let on_stage = |stage: Stage| emit(WorkerEvent::Stage { job: id, stage });
                // Cancelled jobs still run through the pipeline so they report an outcome
                let outcome = pipeline.run(&job, &cancel, &on_stage).await;
                emit(WorkerEvent::Finished { job: job.id, outcome });
            }
            tracing::debug!("job queue closed, worker exiting");
        });

        Self { jobs: tx }
    }

    /// Queues `job`; it starts once every earlier job has finished.
    pub fn submit(&self, job: DownloadJob) -> JobHandle {
        let cancel = CancellationToken::new();
        let handle = JobHandle {
            id: job.id,
            cancel: cancel.clone(),
        };
        // Send fails only if the worker task has ended
        if let Err(mpsc::error::SendError((job, _))) = self.jobs.send((job, cancel)) {
            tracing::error!(job = %job.id, "worker is gone, job dropped");
        }
        handle
    }
}
