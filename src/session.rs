use crate::cells::{CellStore, EditOutcome};
use crate::config::GridConfig;
use crate::debounce::{AfterFlush, DebounceScheduler, SchedulerState};
use crate::error::{GridError, PersistenceFailure, Result};
use crate::navigate;
use crate::persist::{
    self, FlushTicket, FlushTrigger, GradeRepository, StudentDirectory, SubjectDirectory,
};
use crate::progress::{self, Progress, StudentSummary};
use crate::resolve;
use crate::types::{CellKey, CellPos, GradeRecord, Student, Subject};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of one settled flush.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushReport {
    pub trigger: FlushTrigger,
    /// Rows sent to the repository.
    pub attempted: usize,
    /// Cells whose dirty flag was cleared.
    pub saved: usize,
    /// Blank dirty cells that were not sent.
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub state: SchedulerState,
}

/// One teacher's grade-entry grid: roster, cell values and save scheduling.
pub struct GradeEntrySession {
    teacher_id: String,
    students: Vec<Student>,
    subjects: Vec<Subject>,
    cells: CellStore,
    scheduler: DebounceScheduler,
    config: GridConfig,
    progress: Progress,
    last_error: Option<PersistenceFailure>,
}

impl GradeEntrySession {
    /// Load the roster and resolve stored grades into the initial grid.
    pub fn open<S, J, G>(
        teacher_id: &str,
        students: &S,
        subjects: &J,
        grades: &G,
        config: GridConfig,
    ) -> Result<Self>
    where
        S: StudentDirectory + ?Sized,
        J: SubjectDirectory + ?Sized,
        G: GradeRepository + ?Sized,
    {
        let students = students.list_students(teacher_id)?;
        let subjects = subjects.list_subjects(teacher_id)?;
        let student_ids: Vec<String> = students.iter().map(|s| s.id.clone()).collect();
        let subject_ids: Vec<String> = subjects.iter().map(|s| s.id.clone()).collect();
        let records = if student_ids.is_empty() || subject_ids.is_empty() {
            Vec::new()
        } else {
            grades.read(&student_ids, &subject_ids)?
        };
        info!(
            teacher_id,
            students = students.len(),
            subjects = subjects.len(),
            records = records.len(),
            "opening grade grid"
        );
        Ok(Self::from_parts(teacher_id, students, subjects, &records, config))
    }

    pub fn from_parts(
        teacher_id: &str,
        students: Vec<Student>,
        subjects: Vec<Subject>,
        records: &[GradeRecord],
        config: GridConfig,
    ) -> Self {
        let cells = CellStore::load(resolve::resolve(records));
        let scheduler = DebounceScheduler::new(config.debounce());
        let mut session = Self {
            teacher_id: teacher_id.to_string(),
            students,
            subjects,
            cells,
            scheduler,
            config,
            progress: Progress {
                filled: 0,
                total: 0,
                average: None,
            },
            last_error: None,
        };
        session.recompute_progress();
        session
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn row_count(&self) -> usize {
        self.students.len()
    }

    pub fn col_count(&self) -> usize {
        self.subjects.len()
    }

    pub fn key_at(&self, row: usize, col: usize) -> Option<CellKey> {
        let student = self.students.get(row)?;
        let subject = self.subjects.get(col)?;
        Some(CellKey::new(student.id.clone(), subject.id.clone()))
    }

    pub fn value_at(&self, row: usize, col: usize) -> Option<&str> {
        let key = self.key_at(row, col)?;
        Some(self.cells.value(&key))
    }

    pub fn value(&self, key: &CellKey) -> &str {
        self.cells.value(key)
    }

    pub fn is_dirty(&self, key: &CellKey) -> bool {
        self.cells.is_dirty(key)
    }

    pub fn dirty_count(&self) -> usize {
        self.cells.dirty_count()
    }

    pub fn dirty_keys(&self) -> impl Iterator<Item = &CellKey> {
        self.cells.dirty_keys()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.cells.dirty_count() > 0
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.scheduler.deadline()
    }

    pub fn last_error(&self) -> Option<&PersistenceFailure> {
        self.last_error.as_ref()
    }

    /// Per-student totals and averages over entered subjects, in roster order.
    pub fn student_summaries(&self) -> Vec<StudentSummary> {
        progress::student_summaries(
            &self.cells.snapshot(),
            self.students.iter().map(|s| s.id.as_str()),
        )
    }

    /// Dense rows of cell values in roster order.
    pub fn grid(&self) -> Vec<Vec<String>> {
        self.students
            .iter()
            .map(|student| {
                self.subjects
                    .iter()
                    .map(|subject| {
                        self.cells
                            .value(&CellKey::new(student.id.clone(), subject.id.clone()))
                            .to_string()
                    })
                    .collect()
            })
            .collect()
    }

    /// Row-major successor of `pos`, or `None` at the last cell.
    pub fn next_cell(&self, pos: CellPos) -> Option<CellPos> {
        navigate::next(pos.row, pos.col, self.row_count(), self.col_count())
    }

    /// Apply an edit addressed by grid position.
    pub fn edit(&mut self, row: usize, col: usize, raw: &str, now: Instant) -> Result<EditOutcome> {
        let key = self
            .key_at(row, col)
            .ok_or(GridError::OutOfRange { row, col })?;
        Ok(self.apply(key, raw, now))
    }

    /// Apply an edit addressed by student and subject id.
    pub fn edit_key(&mut self, key: CellKey, raw: &str, now: Instant) -> Result<EditOutcome> {
        if !self.students.iter().any(|s| s.id == key.student_id) {
            return Err(GridError::UnknownStudent(key.student_id));
        }
        if !self.subjects.iter().any(|s| s.id == key.subject_id) {
            return Err(GridError::UnknownSubject(key.subject_id));
        }
        Ok(self.apply(key, raw, now))
    }

    fn apply(&mut self, key: CellKey, raw: &str, now: Instant) -> EditOutcome {
        let outcome = self.cells.set(key, raw);
        if outcome.is_applied() {
            self.recompute_progress();
            self.scheduler.on_edit(now);
        }
        outcome
    }

    /// Fill every blank cell in the roster with `raw`. Returns the number of
    /// cells written, or `None` when the value is not a valid mark.
    pub fn fill_empty(&mut self, raw: &str, now: Instant) -> Option<usize> {
        let keys: Vec<CellKey> = self
            .students
            .iter()
            .flat_map(|student| {
                self.subjects
                    .iter()
                    .map(move |subject| CellKey::new(student.id.clone(), subject.id.clone()))
            })
            .collect();
        let filled = self.cells.fill_empty(&keys, raw)?;
        if filled > 0 {
            self.recompute_progress();
            self.scheduler.on_edit(now);
        }
        Some(filled)
    }

    /// Start a debounce flush if its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<FlushTicket> {
        if self.scheduler.poll(now) {
            Some(self.begin_flush(FlushTrigger::Debounce))
        } else {
            None
        }
    }

    /// Start an explicit save. Returns `None` when a flush is already in
    /// flight; the request then runs as soon as that flush settles.
    pub fn save_now(&mut self) -> Option<FlushTicket> {
        if self.scheduler.request_flush() {
            Some(self.begin_flush(FlushTrigger::Explicit))
        } else {
            None
        }
    }

    fn begin_flush(&mut self, trigger: FlushTrigger) -> FlushTicket {
        let dirty = self.cells.dirty_snapshot();
        let ticket = persist::build_batch(trigger, &dirty);
        debug!(
            rows = ticket.rows.len(),
            skipped = ticket.skipped,
            trigger = ?trigger,
            "flush started"
        );
        ticket
    }

    /// Settle a flush with the repository's answer.
    ///
    /// On success the saved cells are marked clean, except those edited
    /// again since the ticket was taken. On failure every cell stays dirty.
    /// When an explicit save was requested mid-flush, the follow-up ticket
    /// is returned and must be run the same way.
    pub fn complete(
        &mut self,
        ticket: FlushTicket,
        result: std::result::Result<(), PersistenceFailure>,
        now: Instant,
    ) -> (FlushReport, Option<FlushTicket>) {
        let (saved, error) = match result {
            Ok(()) => {
                let saved = self.cells.clear_dirty(&ticket.marks);
                self.last_error = None;
                (saved, None)
            }
            Err(e) => {
                warn!(error = %e, "grades not saved; cells stay dirty");
                let message = e.to_string();
                self.last_error = Some(e);
                (0, Some(message))
            }
        };
        self.recompute_progress();

        let follow_up = match self.scheduler.settle(now) {
            AfterFlush::FlushNow => Some(self.begin_flush(FlushTrigger::Explicit)),
            AfterFlush::Pending { .. } | AfterFlush::Idle => None,
        };
        let report = FlushReport {
            trigger: ticket.trigger,
            attempted: ticket.rows.len(),
            saved,
            skipped: ticket.skipped,
            error,
            state: self.scheduler.state(),
        };
        (report, follow_up)
    }

    /// Run a due debounce flush against `repo`, if any.
    pub fn flush_due<R>(&mut self, repo: &mut R, now: Instant) -> Option<FlushReport>
    where
        R: GradeRepository + ?Sized,
    {
        let ticket = self.poll(now)?;
        Some(self.run(repo, ticket, now))
    }

    /// Explicit save against `repo`.
    pub fn flush_now<R>(&mut self, repo: &mut R, now: Instant) -> Option<FlushReport>
    where
        R: GradeRepository + ?Sized,
    {
        let ticket = self.save_now()?;
        Some(self.run(repo, ticket, now))
    }

    fn run<R>(&mut self, repo: &mut R, ticket: FlushTicket, now: Instant) -> FlushReport
    where
        R: GradeRepository + ?Sized,
    {
        let mut ticket = ticket;
        let mut attempted = 0;
        let mut saved = 0;
        loop {
            let outcome = persist::save(repo, &ticket);
            let result = match outcome.error {
                Some(e) => Err(e),
                None => Ok(()),
            };
            let (report, follow_up) = self.complete(ticket, result, now);
            attempted += report.attempted;
            saved += report.saved;
            match follow_up {
                Some(next) => ticket = next,
                None => {
                    return FlushReport {
                        attempted,
                        saved,
                        ..report
                    }
                }
            }
        }
    }

    /// Teardown: cancel the save timer. An in-flight flush may still be
    /// completed afterwards. Returns true when unsaved edits remain.
    pub fn close(&mut self) -> bool {
        self.scheduler.cancel();
        let unsaved = self.has_unsaved_changes();
        if unsaved {
            warn!(
                teacher_id = %self.teacher_id,
                dirty = self.cells.dirty_count(),
                "closing grade grid with unsaved edits"
            );
        }
        unsaved
    }

    /// Final save followed by [`close`]. The flush only runs when edits are
    /// pending; a failed final save is logged and returned, and the cells
    /// stay dirty.
    ///
    /// [`close`]: GradeEntrySession::close
    pub fn close_with_flush<R>(&mut self, repo: &mut R, now: Instant) -> Option<FlushReport>
    where
        R: GradeRepository + ?Sized,
    {
        let report = if self.has_unsaved_changes() {
            self.flush_now(repo, now)
        } else {
            None
        };
        if let Some(error) = report.as_ref().and_then(|r| r.error.as_deref()) {
            warn!(teacher_id = %self.teacher_id, %error, "final save before close failed");
        }
        self.close();
        report
    }

    fn recompute_progress(&mut self) {
        self.progress = progress::compute(
            &self.cells.snapshot(),
            self.students.len(),
            self.subjects.len(),
        );
    }
}
