use crate::cells::{CellView, DirtyMark};
use crate::error::{PersistenceFailure, Result};
use crate::types::{GradeRecord, GradeUpsert, Student, Subject};
use crate::validate;
use serde::Serialize;
use tracing::{info, warn};

/// Ordered roster for the grid's rows.
pub trait StudentDirectory {
    fn list_students(&self, teacher_id: &str) -> Result<Vec<Student>>;
}

/// Ordered column set for the grid.
pub trait SubjectDirectory {
    fn list_subjects(&self, teacher_id: &str) -> Result<Vec<Subject>>;
}

pub trait GradeRepository {
    /// Stored rows for the given students and subjects. May contain several
    /// rows per (student, subject) pair.
    fn read(&self, student_ids: &[String], subject_ids: &[String]) -> Result<Vec<GradeRecord>>;

    /// Insert-or-update keyed on (student_id, subject_id). Submitting
    /// identical data again must not change the store. The batch is applied
    /// as a whole or not at all.
    fn upsert(&mut self, rows: &[GradeUpsert]) -> std::result::Result<(), PersistenceFailure>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushTrigger {
    Debounce,
    Explicit,
}

/// A flush that has started but not yet settled.
///
/// Holds the rows to write and the dirty marks they cover, captured when
/// the flush began.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushTicket {
    pub trigger: FlushTrigger,
    pub rows: Vec<GradeUpsert>,
    pub marks: Vec<DirtyMark>,
    /// Dirty cells left out because they are blank.
    pub skipped: usize,
}

impl FlushTicket {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    /// Marks to clear; empty when the write failed.
    pub saved: Vec<DirtyMark>,
    pub error: Option<PersistenceFailure>,
}

/// Denominator written with every saved mark. The edit gate caps marks at
/// the same value, so a stored row never exceeds its maximum.
pub const MAX_MARKS: u16 = validate::MAX_CELL_VALUE as u16;

/// Build one batch from the dirty cells. Only non-empty, in-range values
/// are included.
pub fn build_batch(trigger: FlushTrigger, dirty: &[CellView]) -> FlushTicket {
    let mut rows = Vec::with_capacity(dirty.len());
    let mut marks = Vec::with_capacity(dirty.len());
    let mut skipped = 0;
    for cell in dirty {
        let Some(marks_obtained) = validate::parse_marks(cell.value.trim()) else {
            skipped += 1;
            continue;
        };
        rows.push(GradeUpsert {
            student_id: cell.key.student_id.clone(),
            subject_id: cell.key.subject_id.clone(),
            marks_obtained,
            max_marks: MAX_MARKS,
            grade: validate::letter_grade(marks_obtained, MAX_MARKS),
        });
        marks.push(DirtyMark {
            key: cell.key.clone(),
            revision: cell.revision,
        });
    }
    FlushTicket {
        trigger,
        rows,
        marks,
        skipped,
    }
}

/// Write a ticket's rows in a single upsert.
pub fn save<R>(repo: &mut R, ticket: &FlushTicket) -> SaveOutcome
where
    R: GradeRepository + ?Sized,
{
    if ticket.is_empty() {
        return SaveOutcome {
            saved: Vec::new(),
            error: None,
        };
    }
    match repo.upsert(&ticket.rows) {
        Ok(()) => {
            info!(
                rows = ticket.rows.len(),
                trigger = ?ticket.trigger,
                "saved grade batch"
            );
            SaveOutcome {
                saved: ticket.marks.clone(),
                error: None,
            }
        }
        Err(e) => {
            warn!(rows = ticket.rows.len(), error = %e, "grade batch failed");
            SaveOutcome {
                saved: Vec::new(),
                error: Some(e),
            }
        }
    }
}
