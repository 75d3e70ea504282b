use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;
use std::time::Instant;
use tracing::warn;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::grid::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}

/// Tear down every open grid, saving pending edits first when a store is open.
pub fn shutdown(state: &mut AppState) {
    let now = Instant::now();
    for (session_id, mut session) in state.sessions.drain() {
        // A failed final save is logged by the session with its error.
        match state.db.as_mut() {
            Some(store) => {
                session.close_with_flush(store, now);
            }
            None => {
                session.close();
            }
        }
        if session.has_unsaved_changes() {
            warn!(%session_id, dirty = session.dirty_count(), "session closed with unsaved grades");
        }
    }
}
