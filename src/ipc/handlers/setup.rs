use crate::config;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, engine_config};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let engine = match engine_config(conn, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    ok(&req.id, json!({ "engine": engine.to_json() }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut next = match engine_config(conn, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    if let Err(msg) = next.apply_patch(patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = config::save_engine_config(conn, &next) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(engine = %next.to_json(), "engine settings updated");
    ok(&req.id, json!({ "engine": next.to_json() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
