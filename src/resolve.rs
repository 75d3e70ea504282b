use crate::types::{CellKey, GradeRecord};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Collapse historical grade rows into one display value per cell.
///
/// Within each (student, subject) group the row with the greatest
/// `created_at` wins. Rows with an identical `created_at` are ordered by
/// surrogate id, and the highest id wins, so the most recently inserted
/// duplicate is shown. The result does not depend on input order.
pub fn resolve(records: &[GradeRecord]) -> BTreeMap<CellKey, String> {
    let mut latest: BTreeMap<CellKey, &GradeRecord> = BTreeMap::new();
    for record in records {
        match latest.get_mut(&record.key()) {
            Some(current) => {
                if newer(record, current) == Ordering::Greater {
                    *current = record;
                }
            }
            None => {
                latest.insert(record.key(), record);
            }
        }
    }
    latest
        .into_iter()
        .map(|(key, record)| (key, record.marks_obtained.to_string()))
        .collect()
}

/// Newest record among `records` by the same ordering `resolve` uses.
pub fn latest<'a, I>(records: I) -> Option<&'a GradeRecord>
where
    I: IntoIterator<Item = &'a GradeRecord>,
{
    records.into_iter().max_by(|a, b| newer(a, b))
}

fn newer(a: &GradeRecord, b: &GradeRecord) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(id: i64, student: &str, subject: &str, marks: i64, secs: i64) -> GradeRecord {
        GradeRecord {
            id,
            student_id: student.to_string(),
            subject_id: subject.to_string(),
            marks_obtained: marks,
            max_marks: 100,
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[test]
    fn latest_created_at_wins() {
        let records = vec![
            record(1, "S2", "Science", 70, 10),
            record(2, "S2", "Science", 75, 20),
        ];
        let resolved = resolve(&records);
        assert_eq!(resolved.len(), 1);
        assert_eq!(
            resolved.get(&CellKey::new("S2", "Science")).map(String::as_str),
            Some("75")
        );
    }

    #[test]
    fn latest_wins_regardless_of_input_order() {
        let records = vec![
            record(9, "S1", "Math", 60, 30),
            record(3, "S1", "Math", 90, 50),
            record(5, "S1", "Math", 40, 40),
        ];
        let mut reversed = records.clone();
        reversed.reverse();
        assert_eq!(resolve(&records), resolve(&reversed));
        assert_eq!(
            resolve(&records).get(&CellKey::new("S1", "Math")).map(String::as_str),
            Some("90")
        );
    }

    #[test]
    fn tied_timestamps_pick_highest_id() {
        let records = vec![
            record(4, "S1", "Math", 55, 10),
            record(7, "S1", "Math", 66, 10),
            record(2, "S1", "Math", 77, 10),
        ];
        let resolved = resolve(&records);
        assert_eq!(
            resolved.get(&CellKey::new("S1", "Math")).map(String::as_str),
            Some("66")
        );
    }

    #[test]
    fn distinct_keys_are_kept_apart() {
        let records = vec![
            record(1, "S1", "Math", 10, 0),
            record(2, "S1", "Science", 20, 0),
            record(3, "S2", "Math", 30, 0),
        ];
        let resolved = resolve(&records);
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[&CellKey::new("S2", "Math")], "30");
    }

    #[test]
    fn latest_matches_resolve() {
        let records = vec![
            record(4, "S1", "Math", 55, 10),
            record(7, "S1", "Math", 66, 10),
            record(1, "S1", "Math", 11, 5),
        ];
        assert_eq!(latest(&records).map(|r| r.id), Some(7));
        assert!(latest(&Vec::<GradeRecord>::new()).is_none());
    }

    #[test]
    fn empty_input_resolves_to_nothing() {
        assert!(resolve(&[]).is_empty());
    }
}
