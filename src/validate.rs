/// Longest raw value the grid accepts ("100").
pub const MAX_INPUT_LEN: usize = 3;
/// Upper bound for a cell value; marks are always out of 100 in the grid.
pub const MAX_CELL_VALUE: u8 = 100;

/// Accept or reject a raw cell edit.
///
/// The empty string clears a cell. Otherwise the value must be one to three
/// ASCII digits with a numeric value of at most 100. Signs, decimals,
/// whitespace and letters are rejected. Rejection is silent: the caller keeps
/// the previous value.
pub fn accept(raw: &str) -> bool {
    raw.is_empty() || parse_marks(raw).is_some()
}

/// Parse a non-empty, accepted cell value into marks.
pub fn parse_marks(raw: &str) -> Option<u8> {
    if raw.is_empty() || raw.len() > MAX_INPUT_LEN {
        return None;
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: u16 = raw.parse().ok()?;
    if n > u16::from(MAX_CELL_VALUE) {
        return None;
    }
    Some(n as u8)
}

/// Letter grade for a mark out of `max_marks`.
pub fn letter_grade(marks: u8, max_marks: u16) -> &'static str {
    if max_marks == 0 {
        return "F";
    }
    let percentage = 100.0 * f64::from(marks) / f64::from(max_marks);
    if percentage >= 90.0 {
        "A+"
    } else if percentage >= 80.0 {
        "A"
    } else if percentage >= 70.0 {
        "B"
    } else if percentage >= 60.0 {
        "C"
    } else if percentage >= 40.0 {
        "D"
    } else {
        "F"
    }
}
