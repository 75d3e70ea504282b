use crate::types::CellPos;

/// Next cell in row-major order, or `None` past the last cell.
pub fn next(row: usize, col: usize, row_count: usize, col_count: usize) -> Option<CellPos> {
    if col + 1 < col_count {
        Some(CellPos { row, col: col + 1 })
    } else if row + 1 < row_count {
        Some(CellPos { row: row + 1, col: 0 })
    } else {
        None
    }
}
