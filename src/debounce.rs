//! Save scheduling for the grade grid.
//!
//! The scheduler owns no timer thread. The host passes the current
//! `Instant` into every call and polls for due flushes, which keeps the
//! state machine deterministic under test:
//!
//! - `Idle --edit--> Pending` arms the deadline.
//! - `Pending --edit--> Pending` pushes the deadline back.
//! - `Pending --deadline--> Flushing` when polled at or after the deadline.
//! - `Flushing --settle--> Idle | Pending` depending on edits seen mid-flush.
//! - An explicit save moves `Idle | Pending` straight to `Flushing`.
//!
//! Only one flush is in flight at a time. Requests that arrive while
//! flushing are remembered and replayed when the flush settles.

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Pending,
    Flushing,
}

/// What the host must do once a flush has settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterFlush {
    Idle,
    /// Edits arrived during the flush; a new deadline is armed.
    Pending { deadline: Instant },
    /// An explicit save was requested during the flush; flush again now.
    FlushNow,
}

#[derive(Debug, Clone)]
pub struct DebounceScheduler {
    delay: Duration,
    state: SchedulerState,
    deadline: Option<Instant>,
    edited_during_flush: bool,
    save_requested: bool,
    closed: bool,
}

impl DebounceScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: SchedulerState::Idle,
            deadline: None,
            edited_during_flush: false,
            save_requested: false,
            closed: false,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Record an accepted edit.
    pub fn on_edit(&mut self, now: Instant) {
        if self.closed {
            return;
        }
        match self.state {
            SchedulerState::Idle | SchedulerState::Pending => {
                self.state = SchedulerState::Pending;
                self.deadline = Some(now + self.delay);
            }
            SchedulerState::Flushing => {
                self.edited_during_flush = true;
            }
        }
    }

    /// Returns true when the deadline has passed; the scheduler is then
    /// `Flushing` and the caller must run a flush and call [`settle`].
    ///
    /// [`settle`]: DebounceScheduler::settle
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.state != SchedulerState::Pending {
            return false;
        }
        match self.deadline {
            Some(deadline) if now >= deadline => {
                debug!("debounce deadline elapsed; flushing");
                self.state = SchedulerState::Flushing;
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Explicit "save now". Returns true when a flush should start
    /// immediately, false when one is already running (the request is
    /// then deferred until it settles) or the scheduler is closed.
    pub fn request_flush(&mut self) -> bool {
        if self.closed {
            return false;
        }
        match self.state {
            SchedulerState::Idle | SchedulerState::Pending => {
                self.state = SchedulerState::Flushing;
                self.deadline = None;
                true
            }
            SchedulerState::Flushing => {
                self.save_requested = true;
                false
            }
        }
    }

    /// Mark the in-flight flush as finished, successful or not.
    pub fn settle(&mut self, now: Instant) -> AfterFlush {
        if self.state != SchedulerState::Flushing {
            return match (self.state, self.deadline) {
                (SchedulerState::Pending, Some(deadline)) => AfterFlush::Pending { deadline },
                _ => AfterFlush::Idle,
            };
        }
        let edited = std::mem::take(&mut self.edited_during_flush);
        let requested = std::mem::take(&mut self.save_requested);

        if self.closed {
            self.state = SchedulerState::Idle;
            return AfterFlush::Idle;
        }
        if requested {
            return AfterFlush::FlushNow;
        }
        if edited {
            let deadline = now + self.delay;
            self.state = SchedulerState::Pending;
            self.deadline = Some(deadline);
            return AfterFlush::Pending { deadline };
        }
        self.state = SchedulerState::Idle;
        AfterFlush::Idle
    }

    /// Teardown. Drops any armed deadline so nothing fires afterwards. An
    /// in-flight flush is left to finish and settle.
    pub fn cancel(&mut self) {
        self.closed = true;
        self.deadline = None;
        self.save_requested = false;
        if self.state == SchedulerState::Pending {
            self.state = SchedulerState::Idle;
        }
    }
}

impl Default for DebounceScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}
