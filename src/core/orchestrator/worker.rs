//! One worker thread processing one chunk attempt.

use super::CancellationToken;
use crossbeam_channel::Sender;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Tagged message from a worker to the orchestrator
pub(crate) enum WorkerMessage<R, E> {
    /// One more item of the chunk was handled
    Progress { chunk: usize, attempt: u32 },
    /// The whole chunk was handled
    Finished {
        chunk: usize,
        attempt: u32,
        outcomes: Vec<Result<R, E>>,
    },
    /// The handler panicked
    Failed {
        chunk: usize,
        attempt: u32,
        reason: String,
    },
}

/// Everything a worker thread needs for one attempt at a chunk
pub(crate) struct Assignment<T, F> {
    pub chunk: usize,
    pub attempt: u32,
    pub items: Arc<Vec<T>>,
    pub handler: Arc<F>,
    pub cancel: CancellationToken,
    /// Set by the orchestrator when it gives up on this attempt
    pub abandon: Arc<AtomicBool>,
}

impl<T, F> Assignment<T, F> {
    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.abandon.load(Ordering::SeqCst)
    }
}

/// Start a named thread that runs `assignment` and reports over `tx`.
pub(crate) fn spawn<T, R, E, F>(
    name: String,
    assignment: Assignment<T, F>,
    tx: Sender<WorkerMessage<R, E>>,
) -> std::io::Result<()>
where
    T: Send + Sync + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(&T) -> Result<R, E> + Send + Sync + 'static,
{
    thread::Builder::new().name(name).spawn(move || {
        let chunk = assignment.chunk;
        let attempt = assignment.attempt;

        let run = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut outcomes = Vec::with_capacity(assignment.items.len());
            for item in assignment.items.iter() {
                if assignment.should_stop() {
                    return None;
                }
                outcomes.push((assignment.handler)(item));
                let _ = tx.send(WorkerMessage::Progress { chunk, attempt });
            }
            Some(outcomes)
        }));

        // The orchestrator may have stopped listening; nothing to do then.
        let _ = match run {
            Ok(Some(outcomes)) => tx.send(WorkerMessage::Finished {
                chunk,
                attempt,
                outcomes,
            }),
            Ok(None) => Ok(()),
            Err(payload) => tx.send(WorkerMessage::Failed {
                chunk,
                attempt,
                reason: panic_message(payload.as_ref()),
            }),
        };
    })?;
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
