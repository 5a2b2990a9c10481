use crate::calc;
use crate::ipc::helpers::{
    calc_err, db_conn, engine_config, model_ok, parse_exam_type, required_str, CalcScope,
};
use crate::ipc::types::{AppState, Request};

fn handle_reports_student_detail(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let scope = match CalcScope::parse(req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
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

    match calc::compute_student_report(&scope.context(conn), &student_id, exam_type, &config) {
        Ok(model) => model_ok(req, model),
        Err(e) => calc_err(req, e),
    }
}

fn handle_reports_class_bulk(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    match calc::compute_class_reports(&scope.context(conn), exam_type, &config) {
        Ok(model) => model_ok(req, model),
        Err(e) => calc_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.studentDetail" => Some(handle_reports_student_detail(state, req)),
        "reports.classBulk" => Some(handle_reports_class_bulk(state, req)),
        _ => None,
    }
}
