use crate::cells::CellView;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub filled: usize,
    pub total: usize,
    /// Mean of the filled cells, if any.
    pub average: Option<f64>,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        100.0 * self.filled as f64 / self.total as f64
    }
}

pub fn compute(cells: &[CellView], total_students: usize, total_subjects: usize) -> Progress {
    let mut filled = 0usize;
    let mut sum = 0u64;
    let mut counted = 0u64;
    for cell in cells {
        let trimmed = cell.value.trim();
        if trimmed.is_empty() {
            continue;
        }
        filled += 1;
        if let Ok(v) = trimmed.parse::<u64>() {
            sum += v;
            counted += 1;
        }
    }
    Progress {
        filled,
        total: total_students * total_subjects,
        average: (counted > 0).then(|| sum as f64 / counted as f64),
    }
}

/// One student's row: sum and mean of the marks entered so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub student_id: String,
    /// Subjects with a mark entered.
    pub entered: usize,
    pub total: u64,
    pub average: Option<f64>,
}

/// Row summaries for `students`, in the order given. Blank cells are left
/// out of both the total and the average.
pub fn student_summaries<'a, I>(cells: &[CellView], students: I) -> Vec<StudentSummary>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut sums: BTreeMap<&str, (usize, u64)> = BTreeMap::new();
    for cell in cells {
        let Ok(v) = cell.value.trim().parse::<u64>() else {
            continue;
        };
        let entry = sums.entry(cell.key.student_id.as_str()).or_default();
        entry.0 += 1;
        entry.1 += v;
    }
    students
        .into_iter()
        .map(|student_id| {
            let (entered, total) = sums.get(student_id).copied().unwrap_or((0, 0));
            StudentSummary {
                student_id: student_id.to_string(),
                entered,
                total,
                average: (entered > 0).then(|| total as f64 / entered as f64),
            }
        })
        .collect()
}
