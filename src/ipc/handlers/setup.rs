use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::settings;
use serde_json::json;

const CONTENT_IMPORT: &str = "contentImport";

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    ok(
        &req.id,
        json!({ CONTENT_IMPORT: settings::effective_section(conn) }),
    )
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    if section != CONTENT_IMPORT {
        return err(&req.id, "bad_params", "unknown section", None);
    }
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = settings::effective_section(conn);
    if let Err(msg) = settings::merge_patch(&mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, settings::SECTION_KEY, &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(section, "setup section updated");
    ok(&req.id, json!({ CONTENT_IMPORT: current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
