//! # Orchestrator Module
//!
//! Fans a task list out across a bounded number of worker threads and
//! gathers the results back in one place.
//!
//! ## Episode
//! 1. The tasks are split into contiguous chunks, at most one per worker.
//! 2. Each chunk gets its own thread, which handles its items in order and
//!    reports after every item.
//! 3. The orchestrator blocks on the message channel, keeps a monotonic
//!    `processed/total` count, and collects each chunk's results.
//! 4. Results are concatenated in chunk order once every chunk is done.
//!
//! ## Failures
//! A handler error only skips that item. A chunk whose worker panics, or
//! goes silent for longer than the idle timeout, is handed to a fresh
//! worker; once its retries are used up the episode fails with a
//! [`WorkerError`]. Workers check the [`CancellationToken`] between items.

mod chunk;
mod worker;

pub use chunk::{chunk_size, partition, WorkChunk};

use crate::core::config::{DedupConfig, DEFAULT_WORKER_COUNT, DEFAULT_WORKER_RETRIES};
use crate::error::WorkerError;
use crate::events::{Event, EventSender, PipelinePhase, WorkEvent, WorkProgress};
use crossbeam_channel::{unbounded, RecvTimeoutError};
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use worker::{Assignment, WorkerMessage};

/// How often the orchestrator wakes up to look at cancellation and deadlines
/// when no worker has anything to say.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared flag that asks every worker to stop after its current item
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of one fan-out episode
#[derive(Debug)]
pub struct Episode<R, E> {
    /// Successful results, in task order
    pub results: Vec<R>,
    /// Items the handler could not process
    pub failures: Vec<E>,
    pub elapsed: Duration,
    /// Chunk attempts that had to be restarted
    pub retries: u32,
}

/// Bounded worker pool with a per-chunk watchdog
#[derive(Debug, Clone)]
pub struct WorkOrchestrator {
    workers: usize,
    idle_timeout: Option<Duration>,
    max_retries: u32,
    cancel: CancellationToken,
}

impl Default for WorkOrchestrator {
    fn default() -> Self {
        Self::new(DEFAULT_WORKER_COUNT)
    }
}

impl WorkOrchestrator {
    /// Orchestrator with `workers` threads, no deadline and the default retry budget
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            idle_timeout: None,
            max_retries: DEFAULT_WORKER_RETRIES,
            cancel: CancellationToken::new(),
        }
    }

    /// Orchestrator sized and guarded as the run configuration says
    pub fn from_config(config: &DedupConfig, cancel: CancellationToken) -> Self {
        Self::new(config.worker_count)
            .with_idle_timeout(config.worker_idle_timeout)
            .with_max_retries(config.max_worker_retries)
            .with_cancellation(cancel)
    }

    /// Give up on a chunk attempt that sends nothing for this long
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `handler` over every task and collect the results.
    ///
    /// Blocks until every chunk has finished, a chunk exhausts its retries,
    /// or the run is cancelled.
    pub fn run<T, R, E, F>(
        &self,
        phase: PipelinePhase,
        tasks: Vec<T>,
        handler: F,
        events: &EventSender,
    ) -> Result<Episode<R, E>, WorkerError>
    where
        T: Send + Sync + 'static,
        R: Send + 'static,
        E: Display + Send + 'static,
        F: Fn(&T) -> Result<R, E> + Send + Sync + 'static,
    {
        let started = Instant::now();
        let total = tasks.len();

        if total == 0 {
            return Ok(Episode {
                results: Vec::new(),
                failures: Vec::new(),
                elapsed: started.elapsed(),
                retries: 0,
            });
        }
        if self.cancel.is_cancelled() {
            return Err(WorkerError::Cancelled);
        }

        let chunks = partition(tasks, self.workers);
        let handler = Arc::new(handler);
        let (tx, rx) = unbounded::<WorkerMessage<R, E>>();

        info!(%phase, total, workers = chunks.len(), "starting workers");
        events.send(Event::Work(WorkEvent::Started {
            phase,
            total,
            workers: chunks.len(),
        }));

        let mut slots: Vec<ChunkSlot<T, R, E>> = chunks.into_iter().map(ChunkSlot::new).collect();
        for slot in &slots {
            self.launch(phase, slot, &handler, &tx)?;
        }

        let mut pending = slots.len();
        let mut processed = 0usize;
        let mut retries = 0u32;

        while pending > 0 {
            if self.cancel.is_cancelled() {
                slots.iter().for_each(|s| s.abandon.store(true, Ordering::SeqCst));
                warn!(%phase, processed, total, "run cancelled");
                return Err(WorkerError::Cancelled);
            }

            let message = match rx.recv_timeout(POLL_INTERVAL) {
                Ok(message) => Some(message),
                Err(RecvTimeoutError::Timeout) => None,
                // Unreachable while `tx` is held here, but never spin on it.
                Err(RecvTimeoutError::Disconnected) => break,
            };

            match message {
                Some(WorkerMessage::Progress { chunk, attempt }) => {
                    let slot = &mut slots[chunk];
                    if slot.is_current(attempt) {
                        slot.last_signal = Instant::now();
                        slot.current += 1;
                        if slot.current > slot.best {
                            slot.best = slot.current;
                            processed += 1;
                            events.send(Event::Work(WorkEvent::Progress(WorkProgress {
                                phase,
                                processed,
                                total,
                            })));
                        }
                    }
                }
                Some(WorkerMessage::Finished {
                    chunk,
                    attempt,
                    outcomes,
                }) => {
                    let slot = &mut slots[chunk];
                    if slot.is_current(attempt) {
                        let len = slot.chunk.len();
                        if slot.best < len {
                            processed += len - slot.best;
                            slot.best = len;
                            events.send(Event::Work(WorkEvent::Progress(WorkProgress {
                                phase,
                                processed,
                                total,
                            })));
                        }
                        debug!(%phase, chunk, attempt, items = len, "chunk finished");
                        slot.outcomes = Some(outcomes);
                        pending -= 1;
                    }
                }
                Some(WorkerMessage::Failed {
                    chunk,
                    attempt,
                    reason,
                }) => {
                    if slots[chunk].is_current(attempt) {
                        let error = WorkerError::Panicked {
                            chunk,
                            attempts: attempt + 1,
                            reason: reason.clone(),
                        };
                        self.retry_or_fail(
                            phase,
                            &mut slots[chunk],
                            &handler,
                            &tx,
                            events,
                            reason,
                            error,
                        )?;
                        retries += 1;
                    }
                }
                None => {}
            }

            if let Some(timeout) = self.idle_timeout {
                for index in 0..slots.len() {
                    let slot = &slots[index];
                    if slot.outcomes.is_some() || slot.last_signal.elapsed() <= timeout {
                        continue;
                    }
                    let error = WorkerError::Stalled {
                        chunk: index,
                        attempts: slot.attempt + 1,
                        timeout,
                    };
                    let reason = format!("no progress for {:?}", timeout);
                    self.retry_or_fail(
                        phase,
                        &mut slots[index],
                        &handler,
                        &tx,
                        events,
                        reason,
                        error,
                    )?;
                    retries += 1;
                }
            }
        }

        let mut results = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for outcome in slots.into_iter().flat_map(|s| s.outcomes.unwrap_or_default()) {
            match outcome {
                Ok(result) => results.push(result),
                Err(error) => {
                    warn!(%phase, %error, "item skipped");
                    events.send(Event::Work(WorkEvent::ItemFailed {
                        phase,
                        message: error.to_string(),
                    }));
                    failures.push(error);
                }
            }
        }

        let elapsed = started.elapsed();
        info!(
            %phase,
            processed,
            failed = failures.len(),
            retries,
            elapsed_ms = elapsed.as_millis() as u64,
            "workers finished"
        );
        events.send(Event::Work(WorkEvent::Completed {
            phase,
            processed,
            duration_ms: elapsed.as_millis() as u64,
        }));

        Ok(Episode {
            results,
            failures,
            elapsed,
            retries,
        })
    }

    fn launch<T, R, E, F>(
        &self,
        phase: PipelinePhase,
        slot: &ChunkSlot<T, R, E>,
        handler: &Arc<F>,
        tx: &crossbeam_channel::Sender<WorkerMessage<R, E>>,
    ) -> Result<(), WorkerError>
    where
        T: Send + Sync + 'static,
        R: Send + 'static,
        E: Send + 'static,
        F: Fn(&T) -> Result<R, E> + Send + Sync + 'static,
    {
        let assignment = Assignment {
            chunk: slot.chunk.index,
            attempt: slot.attempt,
            items: Arc::clone(&slot.chunk.items),
            handler: Arc::clone(handler),
            cancel: self.cancel.clone(),
            abandon: Arc::clone(&slot.abandon),
        };
        let name = format!("{}-{}", phase_slug(phase), slot.chunk.index);

        worker::spawn(name, assignment, tx.clone()).map_err(|source| WorkerError::Spawn {
            chunk: slot.chunk.index,
            source,
        })
    }

    /// Abandon the slot's current attempt and start a new one, or fail with
    /// `exhausted` when the chunk has no retries left.
    #[allow(clippy::too_many_arguments)]
    fn retry_or_fail<T, R, E, F>(
        &self,
        phase: PipelinePhase,
        slot: &mut ChunkSlot<T, R, E>,
        handler: &Arc<F>,
        tx: &crossbeam_channel::Sender<WorkerMessage<R, E>>,
        events: &EventSender,
        reason: String,
        exhausted: WorkerError,
    ) -> Result<(), WorkerError>
    where
        T: Send + Sync + 'static,
        R: Send + 'static,
        E: Send + 'static,
        F: Fn(&T) -> Result<R, E> + Send + Sync + 'static,
    {
        slot.abandon.store(true, Ordering::SeqCst);

        if slot.attempt >= self.max_retries {
            warn!(%phase, chunk = slot.chunk.index, error = %exhausted, "giving up on chunk");
            return Err(exhausted);
        }

        slot.attempt += 1;
        slot.abandon = Arc::new(AtomicBool::new(false));
        slot.current = 0;
        slot.last_signal = Instant::now();

        warn!(
            %phase,
            chunk = slot.chunk.index,
            attempt = slot.attempt,
            %reason,
            "restarting chunk on a fresh worker"
        );
        events.send(Event::Work(WorkEvent::WorkerRetried {
            phase,
            chunk: slot.chunk.index,
            attempt: slot.attempt,
            reason,
        }));

        self.launch(phase, slot, handler, tx)
    }
}

/// Orchestrator-side bookkeeping for one chunk
struct ChunkSlot<T, R, E> {
    chunk: WorkChunk<T>,
    /// Zero-based attempt currently trusted for this chunk
    attempt: u32,
    abandon: Arc<AtomicBool>,
    last_signal: Instant,
    /// Items the current attempt has reported
    current: usize,
    /// Most items any attempt has reported; what progress shows
    best: usize,
    outcomes: Option<Vec<Result<R, E>>>,
}

impl<T, R, E> ChunkSlot<T, R, E> {
    fn new(chunk: WorkChunk<T>) -> Self {
        Self {
            chunk,
            attempt: 0,
            abandon: Arc::new(AtomicBool::new(false)),
            last_signal: Instant::now(),
            current: 0,
            best: 0,
            outcomes: None,
        }
    }

    /// Messages from abandoned attempts, or for a finished chunk, are stale
    fn is_current(&self, attempt: u32) -> bool {
        self.outcomes.is_none() && attempt == self.attempt
    }
}

fn phase_slug(phase: PipelinePhase) -> &'static str {
    match phase {
        PipelinePhase::Scanning => "scan",
        PipelinePhase::Registering => "register",
        PipelinePhase::Thumbnailing => "thumbnail",
        PipelinePhase::Comparing => "compare",
        PipelinePhase::Reporting => "report",
    }
}
