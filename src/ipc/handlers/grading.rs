use crate::calc;
use crate::db;
use crate::division::{grade_point, round_mark};
use crate::grading::{
    grade_to_comment, normalize_rules, resolve_grading_table, score_to_grade, validate_rules,
    TableIssue,
};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{calc_err, db_conn, engine_config, optional_str, parse_context};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

/// `academicYearId` is optional here; when present it must exist.
fn parse_year_scope(
    conn: &rusqlite::Connection,
    req: &Request,
) -> Result<Option<String>, serde_json::Value> {
    let Some(year) = optional_str(req, "academicYearId") else {
        return Ok(None);
    };
    match db::academic_year_exists(conn, &year) {
        Ok(true) => Ok(Some(year)),
        Ok(false) => Err(err(&req.id, "not_found", "academic year not found", None)),
        Err(e) => Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    }
}

fn handle_grading_table(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let context = match parse_context(req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let year = match parse_year_scope(conn, req) {
        Ok(y) => y,
        Err(e) => return e,
    };
    let config = match engine_config(conn, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let resolved = match calc::resolve_table(conn, context, year.as_deref(), &config) {
        Ok(t) => t,
        Err(e) => return calc_err(req, e),
    };
    let issues = validate_rules(&resolved.table);
    ok(
        &req.id,
        json!({
            "context": resolved.context,
            "source": resolved.source,
            "preset": resolved.preset,
            "academicYearId": resolved.academic_year_id,
            "rules": resolved.table.rules(),
            "issues": issues
        }),
    )
}

/// Replaces the stored rules of exactly one scope. Malformed entries are
/// dropped and reported; an empty list clears the scope. A payload where
/// every entry is malformed is refused.
fn handle_grading_rules_replace(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let context = match parse_context(req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let year = match parse_year_scope(conn, req) {
        Ok(y) => y,
        Err(e) => return e,
    };
    let Some(raw) = req.params.get("rules").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "rules must be an array", None);
    };
    let config = match engine_config(conn, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let (rules, rejected) = normalize_rules(raw);
    // Only an explicit empty list clears the scope.
    if rules.is_empty() && !raw.is_empty() {
        return err(
            &req.id,
            "bad_params",
            "no valid rules in payload; stored rules left unchanged",
            Some(json!({ "rejected": rejected })),
        );
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute(
        "DELETE FROM grading_rules WHERE context = ? AND academic_year_id IS ?",
        (context.as_str(), year.as_deref()),
    ) {
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }
    for (i, rule) in rules.iter().enumerate() {
        if let Err(e) = tx.execute(
            "INSERT INTO grading_rules(id, context, academic_year_id, grade, min_mark, max_mark, comment, sort_order)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                context.as_str(),
                year.as_deref(),
                &rule.grade,
                rule.min_mark,
                rule.max_mark,
                &rule.comment,
                i as i64,
            ),
        ) {
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "grading_rules" })),
            );
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    tracing::info!(
        context = context.as_str(),
        academic_year_id = year.as_deref().unwrap_or("global"),
        saved = rules.len(),
        rejected = rejected.len(),
        "grading rules replaced"
    );

    let preset = config.preset_for(context);
    let issues = if rules.is_empty() {
        Vec::new()
    } else {
        validate_rules(&resolve_grading_table(rules.clone(), preset))
    };
    ok(
        &req.id,
        json!({
            "saved": rules.len(),
            "rejected": rejected,
            "issues": issues
        }),
    )
}

/// Checks either a candidate `rules` list or, without one, the table that
/// currently resolves for the scope.
fn handle_grading_rules_validate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let context = match parse_context(req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let year = match parse_year_scope(conn, req) {
        Ok(y) => y,
        Err(e) => return e,
    };
    let config = match engine_config(conn, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    if let Some(candidate) = req.params.get("rules") {
        let Some(raw) = candidate.as_array() else {
            return err(&req.id, "bad_params", "rules must be an array", None);
        };
        let (rules, rejected) = normalize_rules(raw);
        if rules.is_empty() {
            let issues = vec![TableIssue::Gap {
                from: 0.0,
                to: 100.0,
            }];
            return ok(
                &req.id,
                json!({ "valid": false, "rejected": rejected, "issues": issues }),
            );
        }
        let table = resolve_grading_table(rules, config.preset_for(context));
        let issues = validate_rules(&table);
        return ok(
            &req.id,
            json!({
                "valid": issues.is_empty() && rejected.is_empty(),
                "rejected": rejected,
                "issues": issues
            }),
        );
    }

    let resolved = match calc::resolve_table(conn, context, year.as_deref(), &config) {
        Ok(t) => t,
        Err(e) => return calc_err(req, e),
    };
    let issues = validate_rules(&resolved.table);
    ok(
        &req.id,
        json!({
            "valid": issues.is_empty(),
            "source": resolved.source,
            "rejected": [],
            "issues": issues
        }),
    )
}

fn handle_score_to_grade(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let context = match parse_context(req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(score) = req
        .params
        .get("score")
        .and_then(|v| v.as_f64())
        .filter(|s| s.is_finite())
    else {
        return err(&req.id, "bad_params", "score must be a finite number", None);
    };
    let year = match parse_year_scope(conn, req) {
        Ok(y) => y,
        Err(e) => return e,
    };
    let config = match engine_config(conn, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let resolved = match calc::resolve_table(conn, context, year.as_deref(), &config) {
        Ok(t) => t,
        Err(e) => return calc_err(req, e),
    };

    let grade = score_to_grade(round_mark(score), &resolved.table);
    let comment = grade_to_comment(&grade, &resolved.table);
    ok(
        &req.id,
        json!({
            "score": score,
            "grade": grade,
            "comment": comment,
            "gradePoint": grade_point(&grade),
            "source": resolved.source
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grading.table" => Some(handle_grading_table(state, req)),
        "grading.rules.replace" => Some(handle_grading_rules_replace(state, req)),
        "grading.rules.validate" => Some(handle_grading_rules_validate(state, req)),
        "grading.scoreToGrade" => Some(handle_score_to_grade(state, req)),
        _ => None,
    }
}
