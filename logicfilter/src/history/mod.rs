//! Bounded undo/redo history of completed runs.
//!
//! Entries form a linear sequence with a cursor. The current entry is the one
//! just before the cursor; recording truncates everything after it. One mutex
//! guards every operation and is never held across an await point.

use crate::pipeline::PipelineRun;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Default number of runs kept.
pub const DEFAULT_CAPACITY: usize = 50;

/// A recorded run.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Entry id, unique within one history.
    pub id: u64,
    /// When the run was recorded.
    pub recorded_at: DateTime<Utc>,
    /// The run.
    pub run: Arc<PipelineRun>,
}

#[derive(Serialize)]
struct ExportedEntry<'a> {
    id: u64,
    recorded_at: DateTime<Utc>,
    current: bool,
    run: &'a PipelineRun,
}

#[derive(Debug)]
struct State {
    entries: VecDeque<HistoryEntry>,
    /// Number of entries at or before the current one; `0..=entries.len()`.
    cursor: usize,
    next_id: u64,
}

impl State {
    fn current_id(&self) -> Option<u64> {
        self.cursor
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(|e| e.id)
    }
}

/// Thread-safe processing history.
#[derive(Debug)]
pub struct ProcessingHistory {
    state: Mutex<State>,
    capacity: usize,
}

impl Default for ProcessingHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ProcessingHistory {
    /// Creates a history holding at most `capacity` runs (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                entries: VecDeque::with_capacity(capacity),
                cursor: 0,
                next_id: 1,
            }),
            capacity,
        }
    }

    /// Records a run as the new current entry and returns its id.
    ///
    /// Entries after the current one are discarded. When full, the oldest
    /// entry is evicted and the cursor shifts with it.
    pub fn record(&self, run: impl Into<Arc<PipelineRun>>) -> u64 {
        let mut state = self.state.lock();

        let cursor = state.cursor;
        state.entries.truncate(cursor);

        let id = state.next_id;
        state.next_id += 1;
        state.entries.push_back(HistoryEntry {
            id,
            recorded_at: Utc::now(),
            run: run.into(),
        });
        state.cursor = state.entries.len();

        if state.entries.len() > self.capacity {
            state.entries.pop_front();
            state.cursor -= 1;
            debug!(capacity = self.capacity, "History full, evicted oldest run");
        }

        id
    }

    /// Steps back and returns the previous run, or `None` at the oldest.
    pub fn undo(&self) -> Option<Arc<PipelineRun>> {
        let mut state = self.state.lock();
        if state.cursor <= 1 {
            return None;
        }
        state.cursor -= 1;
        state.entries.get(state.cursor - 1).map(|e| Arc::clone(&e.run))
    }

    /// Steps forward and returns the next run, or `None` at the newest.
    pub fn redo(&self) -> Option<Arc<PipelineRun>> {
        let mut state = self.state.lock();
        if state.cursor >= state.entries.len() {
            return None;
        }
        state.cursor += 1;
        state.entries.get(state.cursor - 1).map(|e| Arc::clone(&e.run))
    }

    /// Returns the current run.
    #[must_use]
    pub fn current(&self) -> Option<Arc<PipelineRun>> {
        let state = self.state.lock();
        state
            .cursor
            .checked_sub(1)
            .and_then(|i| state.entries.get(i))
            .map(|e| Arc::clone(&e.run))
    }

    /// Returns true if `undo` would return a run.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.state.lock().cursor > 1
    }

    /// Returns true if `redo` would return a run.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        let state = self.state.lock();
        state.cursor < state.entries.len()
    }

    /// Returns every entry, oldest first.
    #[must_use]
    pub fn export(&self) -> Vec<HistoryEntry> {
        self.state.lock().entries.iter().cloned().collect()
    }

    /// Serialises every entry, oldest first, marking the current one.
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        let state = self.state.lock();
        let current = state.current_id();
        let exported: Vec<ExportedEntry<'_>> = state
            .entries
            .iter()
            .map(|e| ExportedEntry {
                id: e.id,
                recorded_at: e.recorded_at,
                current: Some(e.id) == current,
                run: &e.run,
            })
            .collect();
        serde_json::to_string_pretty(&exported)
    }

    /// Returns the id of the current entry.
    #[must_use]
    pub fn current_id(&self) -> Option<u64> {
        self.state.lock().current_id()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.cursor = 0;
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
