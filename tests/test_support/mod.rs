#![allow(dead_code)]

use gradegrid::{SqliteStore, Student, Subject};
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    spawn_sidecar_with_env(&[])
}

pub fn spawn_sidecar_with_env(env: &[(&str, &str)]) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradegridd");
    let mut cmd = Command::new(exe);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    for (k, v) in env {
        cmd.env(k, v);
    }
    let mut child = cmd.spawn().expect("spawn gradegridd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}

pub fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

/// Two students by four subjects for teacher `T1`.
pub fn seed_workspace(workspace: &Path) {
    let store = SqliteStore::open(workspace).expect("open store");
    for (i, id) in ["S1", "S2"].iter().enumerate() {
        store
            .put_student(
                "T1",
                &Student {
                    id: id.to_string(),
                    display_name: format!("Student {id}"),
                    sort_order: i as i64,
                },
            )
            .expect("put student");
    }
    for (i, id) in ["Math", "Science", "English", "Art"].iter().enumerate() {
        store
            .put_subject(
                "T1",
                &Subject {
                    id: id.to_string(),
                    name: id.to_string(),
                    sort_order: i as i64,
                },
            )
            .expect("put subject");
    }
}

pub fn stored_marks(workspace: &Path, student_id: &str, subject_id: &str) -> Vec<i64> {
    let store = SqliteStore::open(workspace).expect("open store");
    let mut stmt = store
        .connection()
        .prepare(
            "SELECT marks_obtained FROM grade_records
             WHERE student_id = ? AND subject_id = ? ORDER BY id",
        )
        .expect("prepare");
    let marks = stmt
        .query_map((student_id, subject_id), |r| r.get(0))
        .expect("query")
        .collect::<Result<Vec<i64>, _>>()
        .expect("rows");
    marks
}
