//! Splitting a task list into contiguous per-worker chunks.

use std::sync::Arc;

/// A contiguous slice of the task list assigned to one worker
#[derive(Debug)]
pub struct WorkChunk<T> {
    /// Position of the chunk in assignment order
    pub index: usize,
    /// The chunk's tasks, shared so a retry can reuse them
    pub items: Arc<Vec<T>>,
}

impl<T> WorkChunk<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Clone for WorkChunk<T> {
    fn clone(&self) -> Self {
        Self {
            index: self.index,
            items: Arc::clone(&self.items),
        }
    }
}

/// Tasks per chunk for `total` tasks spread across `workers`
pub fn chunk_size(total: usize, workers: usize) -> usize {
    total.div_ceil(workers.max(1)).max(1)
}

/// Split `tasks` into at most `workers` contiguous, non-empty chunks.
///
/// Concatenating the chunks in index order gives back `tasks` exactly.
pub fn partition<T>(tasks: Vec<T>, workers: usize) -> Vec<WorkChunk<T>> {
    if tasks.is_empty() {
        return Vec::new();
    }

    let size = chunk_size(tasks.len(), workers);
    let mut chunks = Vec::with_capacity(tasks.len().div_ceil(size));
    let mut remaining = tasks.into_iter().peekable();

    while remaining.peek().is_some() {
        let items: Vec<T> = remaining.by_ref().take(size).collect();
        chunks.push(WorkChunk {
            index: chunks.len(),
            items: Arc::new(items),
        });
    }

    chunks
}
