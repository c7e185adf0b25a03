// Worker pool for parallel conversions

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use uuid::Uuid;

use super::convert::{ConversionRequest, Converter};
use super::core::ProgressEvent;

/// A request tagged with the id its messages carry
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub id: Uuid,
    pub request: ConversionRequest,
    /// Keep only the audio (`Converter::extract_audio`)
    pub audio_only: bool,
}

impl ConversionJob {
    pub fn new(request: ConversionRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            audio_only: false,
        }
    }

    pub fn audio_only(mut self) -> Self {
        self.audio_only = true;
        self
    }
}

/// Message from worker to main thread
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    /// Job started converting
    JobStarted { job_id: Uuid },

    /// Progress update during conversion
    Progress {
        job_id: Uuid,
        fraction: f64,
        message: String,
    },

    /// Job completed successfully
    JobCompleted { job_id: Uuid, output: PathBuf },

    /// Job failed with error
    JobFailed { job_id: Uuid, error: String },

    /// Job was cancelled by the caller
    JobCancelled { job_id: Uuid },

    /// Worker is idle (waiting for work)
    WorkerIdle { worker_id: usize },
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Worker pool for managing parallel conversion jobs
pub struct WorkerPool {
    converter: Arc<Converter>,
    max_workers: Arc<Mutex<usize>>,
    tx: Sender<WorkerMessage>,
    rx: Receiver<WorkerMessage>,
    active_workers: Arc<Mutex<usize>>,
    /// Output paths handed out so far; each is written by one job only
    claimed_outputs: Mutex<HashSet<PathBuf>>,
}

impl WorkerPool {
    /// Create a new worker pool
    pub fn new(converter: Arc<Converter>, max_workers: usize) -> Self {
        let (tx, rx) = mpsc::channel();

        Self {
            converter,
            max_workers: Arc::new(Mutex::new(max_workers.max(1))),
            tx,
            rx,
            active_workers: Arc::new(Mutex::new(0)),
            claimed_outputs: Mutex::new(HashSet::new()),
        }
    }

    /// Get the receiver for worker messages
    pub fn receiver(&self) -> &Receiver<WorkerMessage> {
        &self.rx
    }

    /// Spawn a worker thread for one job.
    ///
    /// A job whose output path another job of this pool already writes is
    /// failed at once instead of racing it.
    pub fn spawn_job(&self, worker_id: usize, job: ConversionJob) {
        let output = job.request.output_path();
        if !lock(&self.claimed_outputs).insert(output.clone()) {
            let _ = self.tx.send(WorkerMessage::JobFailed {
                job_id: job.id,
                error: format!(
                    "output {} is already written by another job",
                    output.display()
                ),
            });
            let _ = self.tx.send(WorkerMessage::WorkerIdle { worker_id });
            return;
        }

        let tx = self.tx.clone();
        let active = Arc::clone(&self.active_workers);
        let converter = Arc::clone(&self.converter);

        // Counted before the thread starts so can_spawn() is accurate immediately
        *lock(&active) += 1;

        thread::spawn(move || {
            let job_id = job.id;
            let _ = tx.send(WorkerMessage::JobStarted { job_id });

            // Create progress callback that sends updates via channel
            let tx_progress = tx.clone();
            let on_progress = move |event: ProgressEvent| {
                let _ = tx_progress.send(WorkerMessage::Progress {
                    job_id,
                    fraction: event.fraction,
                    message: event.message,
                });
            };
            let result = if job.audio_only {
                converter.extract_audio(&job.request, on_progress)
            } else {
                converter.convert(&job.request, on_progress)
            };

            // Send completion, cancellation or failure message
            let message = match result {
                Ok(output) => WorkerMessage::JobCompleted { job_id, output },
                Err(e) if e.is_cancelled() => WorkerMessage::JobCancelled { job_id },
                Err(e) => WorkerMessage::JobFailed {
                    job_id,
                    error: e.to_string(),
                },
            };
            let _ = tx.send(message);

            *lock(&active) -= 1;

            // Send idle message
            let _ = tx.send(WorkerMessage::WorkerIdle { worker_id });
        });
    }

    /// Get the number of active workers
    pub fn active_count(&self) -> usize {
        *lock(&self.active_workers)
    }

    /// Get the maximum number of workers
    pub fn max_workers(&self) -> usize {
        *lock(&self.max_workers)
    }

    /// Set the maximum number of workers
    pub fn set_max_workers(&self, max: usize) {
        *lock(&self.max_workers) = max.max(1);
    }

    /// Check if we can spawn more workers
    pub fn can_spawn(&self) -> bool {
        self.active_count() < self.max_workers()
    }
}
