use crate::db;
use crate::error::{GridError, PersistenceFailure, Result};
use crate::persist::{GradeRepository, StudentDirectory, SubjectDirectory};
use crate::resolve;
use crate::types::{GradeRecord, GradeUpsert, Student, Subject};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Transaction};
use std::path::Path;
use tracing::warn;

/// SQLite-backed roster and grade table.
pub struct SqliteStore {
    conn: Connection,
    unique_key: bool,
}

impl SqliteStore {
    /// Open (or create) the store inside a workspace directory.
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        let conn = db::open_db(workspace)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        let unique_key = db::ensure_schema(&conn)?;
        Ok(Self { conn, unique_key })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Whether upserts use the (student_id, subject_id) conflict target.
    pub fn has_unique_key(&self) -> bool {
        self.unique_key
    }

    pub fn put_student(&self, teacher_id: &str, student: &Student) -> Result<()> {
        self.conn.execute(
            "INSERT INTO students(id, teacher_id, display_name, sort_order)
             VALUES(?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               teacher_id = excluded.teacher_id,
               display_name = excluded.display_name,
               sort_order = excluded.sort_order",
            (
                &student.id,
                teacher_id,
                &student.display_name,
                student.sort_order,
            ),
        )?;
        Ok(())
    }

    pub fn put_subject(&self, teacher_id: &str, subject: &Subject) -> Result<()> {
        self.conn.execute(
            "INSERT INTO subjects(id, teacher_id, name, sort_order)
             VALUES(?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               teacher_id = excluded.teacher_id,
               name = excluded.name,
               sort_order = excluded.sort_order",
            (&subject.id, teacher_id, &subject.name, subject.sort_order),
        )?;
        Ok(())
    }

    fn read_key(tx: &Transaction<'_>, student_id: &str, subject_id: &str) -> Result<Vec<GradeRecord>> {
        let mut stmt = tx.prepare_cached(
            "SELECT id, student_id, subject_id, marks_obtained, max_marks, created_at
             FROM grade_records WHERE student_id = ? AND subject_id = ?",
        )?;
        let rows = stmt
            .query_map((student_id, subject_id), raw_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(into_records(rows))
    }

    fn upsert_on_conflict(tx: &Transaction<'_>, rows: &[GradeUpsert], now: &str) -> Result<()> {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO grade_records(
                student_id, subject_id, marks_obtained, max_marks, grade, created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(student_id, subject_id) DO UPDATE SET
               marks_obtained = excluded.marks_obtained,
               max_marks = excluded.max_marks,
               grade = excluded.grade,
               created_at = CASE WHEN datetime(grade_records.created_at) IS NULL
                                 THEN excluded.created_at
                                 ELSE grade_records.created_at END,
               updated_at = excluded.updated_at
             WHERE grade_records.marks_obtained IS NOT excluded.marks_obtained
                OR grade_records.max_marks IS NOT excluded.max_marks
                OR grade_records.grade IS NOT excluded.grade
                OR datetime(grade_records.created_at) IS NULL",
        )?;
        for row in rows {
            stmt.execute((
                &row.student_id,
                &row.subject_id,
                i64::from(row.marks_obtained),
                i64::from(row.max_marks),
                row.grade,
                now,
            ))?;
        }
        Ok(())
    }

    /// Without a unique index the newest row of each key is updated in
    /// place; older duplicates are left untouched.
    fn upsert_newest(tx: &Transaction<'_>, rows: &[GradeUpsert], now: &str) -> Result<()> {
        for row in rows {
            let existing = Self::read_key(tx, &row.student_id, &row.subject_id)?;
            match resolve::latest(&existing) {
                Some(newest) => {
                    tx.execute(
                        "UPDATE grade_records SET
                           marks_obtained = ?1, max_marks = ?2, grade = ?3, updated_at = ?4
                         WHERE id = ?5
                           AND (marks_obtained IS NOT ?1 OR max_marks IS NOT ?2 OR grade IS NOT ?3)",
                        (
                            i64::from(row.marks_obtained),
                            i64::from(row.max_marks),
                            row.grade,
                            now,
                            newest.id,
                        ),
                    )?;
                }
                None => {
                    tx.execute(
                        "INSERT INTO grade_records(
                            student_id, subject_id, marks_obtained, max_marks, grade, created_at, updated_at)
                         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                        (
                            &row.student_id,
                            &row.subject_id,
                            i64::from(row.marks_obtained),
                            i64::from(row.max_marks),
                            row.grade,
                            now,
                        ),
                    )?;
                }
            }
        }
        Ok(())
    }

    fn upsert_batch(&mut self, rows: &[GradeUpsert]) -> Result<()> {
        let now = timestamp_now();
        let tx = self.conn.transaction()?;
        if self.unique_key {
            Self::upsert_on_conflict(&tx, rows, &now)?;
        } else {
            Self::upsert_newest(&tx, rows, &now)?;
        }
        tx.commit()?;
        Ok(())
    }
}

impl StudentDirectory for SqliteStore {
    fn list_students(&self, teacher_id: &str) -> Result<Vec<Student>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, display_name, sort_order FROM students
             WHERE teacher_id = ? ORDER BY sort_order, id",
        )?;
        let students = stmt
            .query_map([teacher_id], |r| {
                Ok(Student {
                    id: r.get(0)?,
                    display_name: r.get(1)?,
                    sort_order: r.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(students)
    }
}

impl SubjectDirectory for SqliteStore {
    fn list_subjects(&self, teacher_id: &str) -> Result<Vec<Subject>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, sort_order FROM subjects
             WHERE teacher_id = ? ORDER BY sort_order, id",
        )?;
        let subjects = stmt
            .query_map([teacher_id], |r| {
                Ok(Subject {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    sort_order: r.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(subjects)
    }
}

impl GradeRepository for SqliteStore {
    fn read(&self, student_ids: &[String], subject_ids: &[String]) -> Result<Vec<GradeRecord>> {
        if student_ids.is_empty() || subject_ids.is_empty() {
            return Ok(Vec::new());
        }
        let stud_placeholders = std::iter::repeat_n("?", student_ids.len())
            .collect::<Vec<_>>()
            .join(",");
        let subj_placeholders = std::iter::repeat_n("?", subject_ids.len())
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "SELECT id, student_id, subject_id, marks_obtained, max_marks, created_at
             FROM grade_records
             WHERE student_id IN ({}) AND subject_id IN ({})",
            stud_placeholders, subj_placeholders
        );

        let mut bind_values: Vec<Value> = Vec::with_capacity(student_ids.len() + subject_ids.len());
        for id in student_ids {
            bind_values.push(Value::Text(id.clone()));
        }
        for id in subject_ids {
            bind_values.push(Value::Text(id.clone()));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(bind_values), raw_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(into_records(rows))
    }

    fn upsert(&mut self, rows: &[GradeUpsert]) -> std::result::Result<(), PersistenceFailure> {
        if rows.is_empty() {
            return Ok(());
        }
        self.upsert_batch(rows)
            .map_err(|e| PersistenceFailure::new(e.to_string(), rows.len()))
    }
}

type RawRecord = (i64, String, String, i64, i64, String);

fn raw_record(r: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
}

/// Rows with an unreadable `created_at` are left out so one damaged row
/// cannot block the whole grid. The next save of that cell repairs it.
fn into_records(rows: Vec<RawRecord>) -> Vec<GradeRecord> {
    rows.into_iter()
        .filter_map(|raw| {
            let record_id = raw.0;
            match into_record(raw) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(record_id, error = %e, "skipping grade row with unreadable timestamp");
                    None
                }
            }
        })
        .collect()
}

fn into_record(raw: RawRecord) -> Result<GradeRecord> {
    let (id, student_id, subject_id, marks_obtained, max_marks, created_at) = raw;
    Ok(GradeRecord {
        id,
        student_id,
        subject_id,
        marks_obtained,
        max_marks,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Accepts RFC 3339 and SQLite's `CURRENT_TIMESTAMP` format (assumed UTC).
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| GridError::BadTimestamp {
            column: "created_at",
            value: raw.to_string(),
        })
}
