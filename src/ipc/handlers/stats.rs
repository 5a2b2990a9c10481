use crate::calc;
use crate::ipc::helpers::{calc_err, db_conn, engine_config, model_ok, parse_exam_type, CalcScope};
use crate::ipc::types::{AppState, Request};

fn handle_class_distribution(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let scope = match CalcScope::parse(req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let config = match engine_config(conn, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let exam_type = match parse_exam_type(req, config.default_exam_type) {
        Ok(t) => t,
        Err(e) => return e,
    };

    match calc::compute_class_distribution(&scope.context(conn), exam_type, &config) {
        Ok(model) => model_ok(req, model),
        Err(e) => calc_err(req, e),
    }
}

fn handle_trend(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let scope = match CalcScope::parse(req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let config = match engine_config(conn, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    match calc::compute_class_trend(&scope.context(conn), &config) {
        Ok(model) => model_ok(req, model),
        Err(e) => calc_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "stats.classDistribution" => Some(handle_class_distribution(state, req)),
        "stats.trend" => Some(handle_trend(state, req)),
        _ => None,
    }
}
