use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Composite cell key. Ordering is (student, subject) so iteration is stable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellKey {
    pub student_id: String,
    pub subject_id: String,
}

impl CellKey {
    pub fn new(student_id: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            subject_id: subject_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub display_name: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub sort_order: i64,
}

/// A persisted grade row as read back from the store.
///
/// Several rows may share a (student, subject) key when they were written by
/// older insert-only code paths.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeRecord {
    pub id: i64,
    pub student_id: String,
    pub subject_id: String,
    pub marks_obtained: i64,
    pub max_marks: i64,
    pub created_at: DateTime<Utc>,
}

impl GradeRecord {
    pub fn key(&self) -> CellKey {
        CellKey::new(self.student_id.clone(), self.subject_id.clone())
    }
}

/// One row of an upsert batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GradeUpsert {
    pub student_id: String,
    pub subject_id: String,
    pub marks_obtained: u8,
    pub max_marks: u16,
    pub grade: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellPos {
    pub row: usize,
    pub col: usize,
}
