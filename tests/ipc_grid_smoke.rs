mod test_support;

use serde_json::json;
use test_support::{
    error_code, request, request_ok, seed_workspace, spawn_sidecar, stored_marks, temp_dir,
};

#[test]
fn grid_session_edit_save_and_close() {
    let workspace = temp_dir("gradegrid-ipc-grid");
    seed_workspace(&workspace);
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health.get("debounceMs").and_then(|v| v.as_u64()), Some(1500));
    assert_eq!(health.get("openSessions").and_then(|v| v.as_u64()), Some(0));

    let early = request(
        &mut stdin,
        &mut reader,
        "2",
        "grid.open",
        json!({ "teacherId": "T1" }),
    );
    assert_eq!(error_code(&early), Some("no_workspace"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grid.open",
        json!({ "teacherId": "T1" }),
    );
    let session_id = opened
        .get("sessionId")
        .and_then(|v| v.as_str())
        .expect("sessionId")
        .to_string();
    assert_eq!(opened["students"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(opened["subjects"][0]["id"], json!("Math"));
    assert_eq!(opened["cells"], json!([["", "", "", ""], ["", "", "", ""]]));
    assert_eq!(opened["progress"]["filled"], json!(0));
    assert_eq!(opened["progress"]["total"], json!(8));
    assert_eq!(opened["state"], json!("idle"));

    let rejected = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "grid.edit",
        json!({ "sessionId": session_id, "row": 0, "col": 0, "value": "150" }),
    );
    assert_eq!(rejected["accepted"], json!(false));
    assert_eq!(rejected["value"], json!(""));
    assert_eq!(rejected["dirty"], json!(0));

    let edited = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "grid.edit",
        json!({ "sessionId": session_id, "row": 0, "col": 0, "value": "85" }),
    );
    assert_eq!(edited["accepted"], json!(true));
    assert_eq!(edited["next"], json!({ "row": 0, "col": 1 }));
    assert_eq!(edited["dirty"], json!(1));
    assert_eq!(edited["state"], json!("pending"));
    assert_eq!(edited["progress"]["filled"], json!(1));

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "grid.saveNow",
        json!({ "sessionId": session_id }),
    );
    assert_eq!(saved["deferred"], json!(false));
    assert_eq!(saved["flushed"]["trigger"], json!("explicit"));
    assert_eq!(saved["flushed"]["saved"], json!(1));
    assert_eq!(saved["dirty"], json!(0));
    assert_eq!(stored_marks(&workspace, "S1", "Math"), vec![85]);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "grid.edit",
        json!({ "sessionId": session_id, "row": 1, "col": 3, "value": 72 }),
    );
    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "grid.get",
        json!({ "sessionId": session_id }),
    );
    assert_eq!(grid["cells"][1][3], json!("72"));
    assert_eq!(
        grid["dirtyKeys"],
        json!([{ "studentId": "S2", "subjectId": "Art" }])
    );
    assert_eq!(
        grid["studentSummaries"],
        json!([
            { "studentId": "S1", "entered": 1, "total": 85, "average": 85.0 },
            { "studentId": "S2", "entered": 1, "total": 72, "average": 72.0 }
        ])
    );

    let next = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "grid.nextCell",
        json!({ "row": 1, "col": 3, "rowCount": 2, "colCount": 4 }),
    );
    assert!(next["next"].is_null());

    let closed = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "grid.close",
        json!({ "sessionId": session_id, "flush": true }),
    );
    assert_eq!(closed["unsaved"], json!(false));
    assert_eq!(closed["flushed"]["saved"], json!(1));
    assert_eq!(stored_marks(&workspace, "S2", "Art"), vec![72]);

    let gone = request(
        &mut stdin,
        &mut reader,
        "12",
        "grid.tick",
        json!({ "sessionId": session_id }),
    );
    assert_eq!(error_code(&gone), Some("not_found"));

    let unknown = request(&mut stdin, &mut reader, "13", "grid.explode", json!({}));
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&workspace);
}

#[test]
fn debounced_flush_runs_on_next_request() {
    let workspace = temp_dir("gradegrid-ipc-debounce");
    seed_workspace(&workspace);
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grid.open",
        json!({ "teacherId": "T1", "debounceMs": 0 }),
    );
    assert_eq!(opened["debounceMs"], json!(0));
    let session_id = opened["sessionId"].as_str().expect("sessionId").to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grid.edit",
        json!({ "sessionId": session_id, "row": 1, "col": 1, "value": "64" }),
    );
    let tick = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grid.tick",
        json!({ "sessionId": session_id }),
    );
    assert_eq!(tick["flushed"]["trigger"], json!("debounce"));
    assert_eq!(tick["flushed"]["saved"], json!(1));
    assert_eq!(tick["state"], json!("idle"));
    assert_eq!(stored_marks(&workspace, "S2", "Science"), vec![64]);

    let bad_fill = request(
        &mut stdin,
        &mut reader,
        "5",
        "grid.fillEmpty",
        json!({ "sessionId": session_id, "value": "abc" }),
    );
    assert_eq!(error_code(&bad_fill), Some("bad_params"));

    let filled = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "grid.fillEmpty",
        json!({ "sessionId": session_id, "value": "50" }),
    );
    assert_eq!(filled["filled"], json!(7));
    assert_eq!(filled["progress"]["filled"], json!(8));

    let tick = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "grid.tick",
        json!({ "sessionId": session_id }),
    );
    assert_eq!(tick["flushed"]["saved"], json!(7));
    assert_eq!(tick["dirty"], json!(0));
    assert_eq!(stored_marks(&workspace, "S2", "Science"), vec![64]);
    assert_eq!(stored_marks(&workspace, "S1", "Art"), vec![50]);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&workspace);
}

#[test]
fn pending_edits_are_saved_on_shutdown() {
    let workspace = temp_dir("gradegrid-ipc-shutdown");
    seed_workspace(&workspace);
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grid.open",
        json!({ "teacherId": "T1" }),
    );
    let session_id = opened["sessionId"].as_str().expect("sessionId").to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grid.edit",
        json!({ "sessionId": session_id, "row": 0, "col": 2, "value": "91" }),
    );
    assert!(stored_marks(&workspace, "S1", "English").is_empty());

    drop(stdin);
    let status = child.wait().expect("wait for sidecar");
    assert!(status.success());
    assert_eq!(stored_marks(&workspace, "S1", "English"), vec![91]);

    let _ = std::fs::remove_dir_all(&workspace);
}

#[test]
fn bad_requests_report_error_codes() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let missing = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({}),
    );
    assert_eq!(error_code(&missing), Some("bad_params"));

    let no_session = request(
        &mut stdin,
        &mut reader,
        "2",
        "grid.edit",
        json!({ "sessionId": "nope", "row": 0, "col": 0, "value": "1" }),
    );
    assert_eq!(error_code(&no_session), Some("not_found"));

    let bad_index = request(
        &mut stdin,
        &mut reader,
        "3",
        "grid.edit",
        json!({ "sessionId": "nope", "row": -1, "col": 0, "value": "1" }),
    );
    assert_eq!(error_code(&bad_index), Some("bad_params"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn rejected_edit_still_reports_due_flush() {
    let workspace = temp_dir("gradegrid-ipc-edit-error");
    seed_workspace(&workspace);
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grid.open",
        json!({ "teacherId": "T1", "debounceMs": 0 }),
    );
    let session_id = opened["sessionId"].as_str().expect("sessionId").to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grid.edit",
        json!({ "sessionId": session_id, "row": 0, "col": 0, "value": "77" }),
    );

    let out_of_range = request(
        &mut stdin,
        &mut reader,
        "4",
        "grid.edit",
        json!({ "sessionId": session_id, "row": 9, "col": 0, "value": "10" }),
    );
    assert_eq!(error_code(&out_of_range), Some("not_found"));
    let flushed = &out_of_range["error"]["details"]["flushed"];
    assert_eq!(flushed["trigger"], json!("debounce"));
    assert_eq!(flushed["saved"], json!(1));
    assert_eq!(stored_marks(&workspace, "S1", "Math"), vec![77]);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&workspace);
}
