use rusqlite::Connection;
use std::path::Path;
use tracing::warn;

pub const DB_FILE_NAME: &str = "gradegrid.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    Ok(conn)
}

/// Create missing tables and columns. Returns whether the
/// (student_id, subject_id) unique index is in place.
pub fn ensure_schema(conn: &Connection) -> anyhow::Result<bool> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            display_name TEXT NOT NULL,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_teacher_sort ON students(teacher_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_teacher_sort ON subjects(teacher_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_records(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            marks_obtained INTEGER NOT NULL,
            max_marks INTEGER NOT NULL DEFAULT 100,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_records_key ON grade_records(student_id, subject_id)",
        [],
    )?;

    // Stores written by older clients lack the derived columns.
    ensure_grade_records_grade(conn)?;
    ensure_grade_records_updated_at(conn)?;

    ensure_unique_grade_key(conn)
}

fn ensure_grade_records_grade(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "grade_records", "grade")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE grade_records ADD COLUMN grade TEXT", [])?;
    Ok(())
}

fn ensure_grade_records_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "grade_records", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE grade_records ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn ensure_unique_grade_key(conn: &Connection) -> anyhow::Result<bool> {
    let has_duplicates: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM grade_records
            GROUP BY student_id, subject_id
            HAVING COUNT(*) > 1
        )",
        [],
        |r| r.get(0),
    )?;
    if has_duplicates {
        // Duplicate history is read through the resolver; it is never rewritten here.
        warn!("grade_records holds duplicate rows per key; upserts will target the newest row");
        return Ok(false);
    }
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_grade_records_key
         ON grade_records(student_id, subject_id)",
        [],
    )?;
    Ok(true)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
