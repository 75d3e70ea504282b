use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use gradegrid::{navigate, CellPos, FlushReport, GradeEntrySession, GridError};
use serde_json::json;
use std::time::Instant;
use uuid::Uuid;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }
}

impl From<GridError> for HandlerErr {
    fn from(e: GridError) -> Self {
        let code = match e {
            GridError::UnknownStudent(_) | GridError::UnknownSubject(_) | GridError::OutOfRange { .. } => {
                "not_found"
            }
            GridError::Sqlite(_) | GridError::BadTimestamp { .. } => "db_query_failed",
        };
        HandlerErr {
            code,
            message: e.to_string(),
            details: None,
        }
    }
}

fn param_str<'a>(req: &'a Request, name: &str) -> Result<&'a str, HandlerErr> {
    req.params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", name)))
}

fn param_index(req: &Request, name: &str) -> Result<usize, HandlerErr> {
    req.params
        .get(name)
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .ok_or_else(|| HandlerErr::bad_params(format!("missing/invalid {}", name)))
}

/// Cell input as typed by the user. Whole JSON numbers are accepted as
/// their decimal text so `85` and `"85"` behave the same.
fn param_cell_value(req: &Request, name: &str) -> Result<String, HandlerErr> {
    match req.params.get(name) {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(serde_json::Value::Null) => Ok(String::new()),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        _ => Err(HandlerErr::bad_params(format!("missing {}", name))),
    }
}

fn session_mut<'a>(
    state: &'a mut AppState,
    req: &Request,
) -> Result<(String, &'a mut GradeEntrySession), HandlerErr> {
    let session_id = param_str(req, "sessionId")?.to_string();
    let Some(session) = state.sessions.get_mut(&session_id) else {
        return Err(HandlerErr {
            code: "not_found",
            message: "grid session not found".to_string(),
            details: Some(json!({ "sessionId": session_id })),
        });
    };
    Ok((session_id, session))
}

/// Run the session's debounce flush if it has come due.
fn run_due(state: &mut AppState, session_id: &str, now: Instant) -> Option<FlushReport> {
    let store = state.db.as_mut()?;
    let session = state.sessions.get_mut(session_id)?;
    session.flush_due(store, now)
}

fn session_summary(session: &GradeEntrySession) -> serde_json::Value {
    json!({
        "progress": session.progress(),
        "studentSummaries": session.student_summaries(),
        "dirty": session.dirty_count(),
        "state": session.state(),
        "lastError": session.last_error().map(|e| e.to_string()),
    })
}

fn merge(mut base: serde_json::Value, extra: serde_json::Value) -> serde_json::Value {
    if let (Some(b), serde_json::Value::Object(e)) = (base.as_object_mut(), extra) {
        for (k, v) in e {
            b.insert(k, v);
        }
    }
    base
}

fn handle_grid_open(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(store) = state.db.as_ref() else {
        return Err(HandlerErr {
            code: "no_workspace",
            message: "select a workspace first".to_string(),
            details: None,
        });
    };
    let teacher_id = param_str(req, "teacherId")?;
    let config = state.config.merged_with(&req.params);

    let session = GradeEntrySession::open(teacher_id, store, store, store, config)?;
    let session_id = Uuid::new_v4().to_string();
    let result = merge(
        json!({
            "sessionId": session_id,
            "teacherId": teacher_id,
            "debounceMs": session.config().debounce_ms,
            "students": session.students(),
            "subjects": session.subjects(),
            "cells": session.grid(),
        }),
        session_summary(&session),
    );
    state.sessions.insert(session_id, session);
    Ok(result)
}

fn handle_grid_edit(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let now = Instant::now();
    let row = param_index(req, "row")?;
    let col = param_index(req, "col")?;
    let value = param_cell_value(req, "value")?;

    let (session_id, _) = session_mut(state, req)?;
    let flushed = run_due(state, &session_id, now);
    let (_, session) = session_mut(state, req)?;

    let outcome = match session.edit(row, col, &value, now) {
        Ok(outcome) => outcome,
        Err(e) => {
            // The due flush already ran; its report must not be lost.
            let mut e = HandlerErr::from(e);
            e.details = Some(json!({ "flushed": flushed }));
            return Err(e);
        }
    };
    let next = session.next_cell(CellPos { row, col });
    Ok(merge(
        json!({
            "accepted": outcome.is_applied(),
            "value": session.value_at(row, col),
            "next": next,
            "flushed": flushed,
        }),
        session_summary(session),
    ))
}

fn handle_grid_fill_empty(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let now = Instant::now();
    let value = param_cell_value(req, "value")?;
    let (session_id, _) = session_mut(state, req)?;
    let flushed = run_due(state, &session_id, now);
    let (_, session) = session_mut(state, req)?;

    let Some(filled) = session.fill_empty(&value, now) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "fill value must be a whole number from 0 to 100".to_string(),
            details: Some(json!({ "value": value })),
        });
    };
    Ok(merge(
        json!({ "filled": filled, "flushed": flushed }),
        session_summary(session),
    ))
}

fn handle_grid_tick(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let now = Instant::now();
    let (session_id, _) = session_mut(state, req)?;
    let flushed = run_due(state, &session_id, now);
    let (_, session) = session_mut(state, req)?;
    Ok(merge(json!({ "flushed": flushed }), session_summary(session)))
}

fn handle_grid_save_now(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let now = Instant::now();
    let session_id = session_mut(state, req)?.0;
    let Some(store) = state.db.as_mut() else {
        return Err(HandlerErr {
            code: "no_workspace",
            message: "select a workspace first".to_string(),
            details: None,
        });
    };
    let Some(session) = state.sessions.get_mut(&session_id) else {
        return Err(HandlerErr::bad_params("missing sessionId"));
    };

    let report = session.flush_now(store, now);
    if let Some(FlushReport {
        error: Some(message),
        ..
    }) = &report
    {
        return Err(HandlerErr {
            code: "persist_failed",
            message: message.clone(),
            details: Some(json!({ "flush": report, "dirty": session.dirty_count() })),
        });
    }
    Ok(merge(
        json!({ "flushed": report, "deferred": report.is_none() }),
        session_summary(session),
    ))
}

fn handle_grid_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let now = Instant::now();
    let (session_id, _) = session_mut(state, req)?;
    let flushed = run_due(state, &session_id, now);
    let (_, session) = session_mut(state, req)?;
    let dirty: Vec<_> = session.dirty_keys().cloned().collect();
    Ok(merge(
        json!({
            "cells": session.grid(),
            "dirtyKeys": dirty,
            "flushed": flushed,
        }),
        session_summary(session),
    ))
}

fn handle_grid_next_cell(req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let row = param_index(req, "row")?;
    let col = param_index(req, "col")?;
    let row_count = param_index(req, "rowCount")?;
    let col_count = param_index(req, "colCount")?;
    Ok(json!({ "next": navigate::next(row, col, row_count, col_count) }))
}

fn handle_grid_close(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let now = Instant::now();
    let flush = req
        .params
        .get("flush")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let session_id = session_mut(state, req)?.0;
    let Some(mut session) = state.sessions.remove(&session_id) else {
        return Err(HandlerErr::bad_params("missing sessionId"));
    };

    let flushed = match (flush, state.db.as_mut()) {
        (true, Some(store)) => session.close_with_flush(store, now),
        _ => {
            session.close();
            None
        }
    };
    let unsaved = session.has_unsaved_changes();
    Ok(json!({
        "closed": true,
        "unsaved": unsaved,
        "dirty": session.dirty_count(),
        "flushed": flushed,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grid.open" => handle_grid_open(state, req),
        "grid.edit" => handle_grid_edit(state, req),
        "grid.fillEmpty" => handle_grid_fill_empty(state, req),
        "grid.tick" => handle_grid_tick(state, req),
        "grid.saveNow" => handle_grid_save_now(state, req),
        "grid.get" => handle_grid_get(state, req),
        "grid.nextCell" => handle_grid_next_cell(req),
        "grid.close" => handle_grid_close(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
