//! Batch grade-entry engine.
//!
//! A teacher edits a students x subjects grid of marks. This crate keeps the
//! grid state, validates edits, collapses duplicated history at load time,
//! and coalesces bursts of edits into single idempotent batch saves.
//!
//! - `validate`: the edit gate (`""` or an integer 0..=100)
//! - `resolve`: latest-write-wins de-duplication of stored rows
//! - `cells`: the in-memory grid and its dirty set
//! - `progress` / `navigate`: fill statistics and row-major focus order
//! - `debounce`: the Idle/Pending/Flushing save scheduler
//! - `persist`: batch building and the repository seams
//! - `session`: all of the above for one open grid
//! - `store`: the SQLite repository used by the `gradegridd` sidecar

pub mod cells;
pub mod config;
pub mod db;
pub mod debounce;
pub mod error;
pub mod navigate;
pub mod persist;
pub mod progress;
pub mod resolve;
pub mod session;
pub mod store;
pub mod types;
pub mod validate;

pub use cells::{CellStore, CellView, DirtyMark, EditOutcome};
pub use config::GridConfig;
pub use debounce::{AfterFlush, DebounceScheduler, SchedulerState};
pub use error::{GridError, PersistenceFailure};
pub use persist::{
    FlushTicket, FlushTrigger, GradeRepository, SaveOutcome, StudentDirectory, SubjectDirectory,
};
pub use progress::{Progress, StudentSummary};
pub use session::{FlushReport, GradeEntrySession};
pub use store::SqliteStore;
pub use types::{CellKey, CellPos, GradeRecord, GradeUpsert, Student, Subject};
