//! Generation requests and the worker pool that consumes them.
//!
//! Requests go in through the [`JobQueue`] trait; [`WorkerPool`] is the
//! in-process implementation. It runs each request as an independent job on
//! a fixed-size rayon pool and streams [`JobEvent`]s back over an mpsc
//! channel, so a single printer thread can report progress while workers
//! keep going.
//!
//! Jobs share nothing but storage. A request delivered twice is harmless:
//! the second run finds every rung present and skips (unless forced).
//! A job that fails, or panics, becomes a [`JobEvent::Failed`] and never
//! takes another job down with it.

use crate::config::effective_threads;
use crate::imaging::{ImageBackend, RustBackend};
use crate::naming::SourcePath;
use crate::process::{Generator, RungOutcome, RungStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error};

/// Ask for the ladder of one source to be (re)generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub source: SourcePath,
    #[serde(default)]
    pub force: bool,
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue is closed")]
    Closed,
    #[error("Failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Anything that accepts generation requests.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, request: GenerationRequest) -> Result<(), QueueError>;
}

impl<Q: JobQueue + ?Sized> JobQueue for &Q {
    fn enqueue(&self, request: GenerationRequest) -> Result<(), QueueError> {
        (**self).enqueue(request)
    }
}

impl<Q: JobQueue + ?Sized> JobQueue for Arc<Q> {
    fn enqueue(&self, request: GenerationRequest) -> Result<(), QueueError> {
        (**self).enqueue(request)
    }
}

/// Progress reported by pool workers.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Started {
        source: SourcePath,
        force: bool,
    },
    Finished {
        source: SourcePath,
        rungs: Vec<RungOutcome>,
        elapsed: Duration,
    },
    Failed {
        source: SourcePath,
        error: String,
    },
}

/// Count of jobs submitted but not yet finished.
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn begin(&self) {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn end(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            count = self
                .idle
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Fixed-size pool running generation jobs.
pub struct WorkerPool<B: ImageBackend + 'static = RustBackend> {
    pool: rayon::ThreadPool,
    generator: Arc<Generator<B>>,
    events: Sender<JobEvent>,
    in_flight: Arc<InFlight>,
    closed: AtomicBool,
}

impl<B: ImageBackend + 'static> WorkerPool<B> {
    /// Start a pool sized from the generator's processing config.
    ///
    /// Returns the pool and the receiving end of its event channel. The
    /// channel closes once the pool and all of its jobs are gone.
    pub fn new(generator: Arc<Generator<B>>) -> Result<(Self, Receiver<JobEvent>), QueueError> {
        let threads = effective_threads(&generator.config().processing);
        Self::with_threads(generator, threads)
    }

    pub fn with_threads(
        generator: Arc<Generator<B>>,
        threads: usize,
    ) -> Result<(Self, Receiver<JobEvent>), QueueError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("pic-ladder-worker-{i}"))
            .build()?;
        let (events, receiver) = channel();
        debug!(threads, "worker pool started");
        Ok((
            Self {
                pool,
                generator,
                events,
                in_flight: Arc::new(InFlight::default()),
                closed: AtomicBool::new(false),
            },
            receiver,
        ))
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Stop accepting new requests. Jobs already submitted still run.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Block until every submitted job has finished.
    pub fn drain(&self) {
        self.in_flight.wait_idle();
    }
}

impl<B: ImageBackend + 'static> JobQueue for WorkerPool<B> {
    fn enqueue(&self, request: GenerationRequest) -> Result<(), QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        self.in_flight.begin();

        let generator = Arc::clone(&self.generator);
        let events = self.events.clone();
        let in_flight = Arc::clone(&self.in_flight);
        self.pool.spawn(move || {
            let GenerationRequest { source, force } = request;
            // Nobody listening is fine; the work still happens.
            let _ = events.send(JobEvent::Started {
                source: source.clone(),
                force,
            });

            let started = Instant::now();
            let result = catch_unwind(AssertUnwindSafe(|| generator.generate(&source, force)));
            let event = match result {
                Ok(Ok(rungs)) => JobEvent::Finished {
                    source,
                    rungs,
                    elapsed: started.elapsed(),
                },
                Ok(Err(e)) => {
                    error!(source = %source, error = %e, "generation failed");
                    JobEvent::Failed {
                        source,
                        error: e.to_string(),
                    }
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(source = %source, panic = %message, "generation panicked");
                    JobEvent::Failed {
                        source,
                        error: format!("worker panicked: {message}"),
                    }
                }
            };
            let _ = events.send(event);
            in_flight.end();
        });
        Ok(())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Totals over a stream of job events.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub jobs_finished: u32,
    pub jobs_failed: u32,
    pub rungs_written: u32,
    pub rungs_skipped: u32,
    pub rungs_failed: u32,
}

impl RunSummary {
    pub fn record(&mut self, event: &JobEvent) {
        match event {
            JobEvent::Started { .. } => {}
            JobEvent::Finished { rungs, .. } => {
                self.jobs_finished += 1;
                for rung in rungs {
                    match rung.status {
                        RungStatus::Written => self.rungs_written += 1,
                        RungStatus::Skipped => self.rungs_skipped += 1,
                        RungStatus::Failed(_) => self.rungs_failed += 1,
                    }
                }
            }
            JobEvent::Failed { .. } => self.jobs_failed += 1,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.jobs_failed > 0 || self.rungs_failed > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} jobs done, {} failed; {} rungs written, {} skipped",
            self.jobs_finished, self.jobs_failed, self.rungs_written, self.rungs_skipped
        )?;
        if self.rungs_failed > 0 {
            write!(f, ", {} failed", self.rungs_failed)?;
        }
        Ok(())
    }
}
