use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, CalcScope};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Map, Value};
use std::collections::HashSet;

pub const MAX_UPSERT_ENTRIES: usize = 5000;
const SCORE_FIELDS: [&str; 5] = ["homework", "bot", "midterm", "eot", "total"];

type Scores = [Option<f64>; 5];

/// Absent key keeps `current`; explicit null clears it.
fn merge_score(entry: &Map<String, Value>, key: &str, current: Option<f64>) -> Result<Option<f64>, String> {
    match entry.get(key) {
        None => Ok(current),
        Some(Value::Null) => Ok(None),
        Some(v) => {
            let Some(n) = v.as_f64() else {
                return Err(format!("{} must be a number or null", key));
            };
            if !n.is_finite() || !(0.0..=100.0).contains(&n) {
                return Err(format!("{} must be in 0..=100", key));
            }
            Ok(Some(n))
        }
    }
}

fn merge_grade(entry: &Map<String, Value>, current: Option<String>) -> Result<Option<String>, String> {
    match entry.get("grade") {
        None => Ok(current),
        Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let t = s.trim();
            Ok(if t.is_empty() { None } else { Some(t.to_string()) })
        }
        Some(_) => Err("grade must be a string or null".to_string()),
    }
}

fn id_set(conn: &Connection, sql: &str, class_id: &str) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map([class_id], |r| r.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(ids)
}

fn handle_marks_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let scope = match CalcScope::parse(req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let Some(entries) = req.params.get("entries").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "entries must be an array", None);
    };
    if entries.len() > MAX_UPSERT_ENTRIES {
        return err(
            &req.id,
            "bad_params",
            format!("entries must contain at most {} items", MAX_UPSERT_ENTRIES),
            None,
        );
    }

    match db::class_exists(conn, &scope.class_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    match db::academic_year_exists(conn, &scope.academic_year_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "academic year not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let student_ids = match id_set(conn, "SELECT id FROM students WHERE class_id = ?", &scope.class_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let subject_ids = match id_set(conn, "SELECT id FROM subjects WHERE class_id = ?", &scope.class_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    let stamp = db::now_stamp();
    for (index, raw) in entries.iter().enumerate() {
        let bad = |message: String| {
            err(
                &req.id,
                "bad_params",
                message,
                Some(json!({ "index": index })),
            )
        };
        let Some(entry) = raw.as_object() else {
            return bad("entry must be an object".to_string());
        };
        let student_id = entry.get("studentId").and_then(|v| v.as_str()).unwrap_or("");
        let subject_id = entry.get("subjectId").and_then(|v| v.as_str()).unwrap_or("");
        if !student_ids.contains(student_id) {
            return bad("studentId is not in this class".to_string());
        }
        if !subject_ids.contains(subject_id) {
            return bad("subjectId is not in this class".to_string());
        }

        let existing: Option<(Scores, Option<String>)> = match tx
            .query_row(
                "SELECT homework, bot, midterm, eot, total, grade
                 FROM marks
                 WHERE student_id = ? AND subject_id = ? AND academic_year_id = ? AND term = ?",
                (student_id, subject_id, &scope.academic_year_id, scope.term),
                |r| {
                    Ok((
                        [r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?],
                        r.get(5)?,
                    ))
                },
            )
            .optional()
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let (current, current_grade) = existing.unwrap_or_default();

        let mut next: Scores = [None; 5];
        for (i, key) in SCORE_FIELDS.iter().enumerate() {
            next[i] = match merge_score(entry, key, current[i]) {
                Ok(v) => v,
                Err(msg) => return bad(msg),
            };
        }
        let grade = match merge_grade(entry, current_grade) {
            Ok(v) => v,
            Err(msg) => return bad(msg),
        };

        if let Err(e) = tx.execute(
            "INSERT INTO marks(student_id, subject_id, academic_year_id, term,
                               homework, bot, midterm, eot, total, grade, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, subject_id, academic_year_id, term) DO UPDATE SET
               homework = excluded.homework,
               bot = excluded.bot,
               midterm = excluded.midterm,
               eot = excluded.eot,
               total = excluded.total,
               grade = excluded.grade,
               updated_at = excluded.updated_at",
            (
                student_id,
                subject_id,
                &scope.academic_year_id,
                scope.term,
                next[0],
                next[1],
                next[2],
                next[3],
                next[4],
                &grade,
                &stamp,
            ),
        ) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "updated": entries.len() }))
}

fn handle_marks_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let scope = match CalcScope::parse(req) {
        Ok(s) => s,
        Err(e) => return e,
    };

    let mut stmt = match conn.prepare(
        "SELECT m.student_id, m.subject_id, m.homework, m.bot, m.midterm, m.eot, m.total,
                m.grade, m.updated_at
         FROM marks m
         JOIN students s ON s.id = m.student_id
         JOIN subjects sb ON sb.id = m.subject_id
         WHERE s.class_id = ? AND m.academic_year_id = ? AND m.term = ?
         ORDER BY s.sort_order, sb.sort_order",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map(
            (&scope.class_id, &scope.academic_year_id, scope.term),
            |r| {
                let student_id: String = r.get(0)?;
                let subject_id: String = r.get(1)?;
                let homework: Option<f64> = r.get(2)?;
                let bot: Option<f64> = r.get(3)?;
                let midterm: Option<f64> = r.get(4)?;
                let eot: Option<f64> = r.get(5)?;
                let total: Option<f64> = r.get(6)?;
                let grade: Option<String> = r.get(7)?;
                let updated_at: Option<String> = r.get(8)?;
                Ok(json!({
                    "studentId": student_id,
                    "subjectId": subject_id,
                    "homework": homework,
                    "bot": bot,
                    "midterm": midterm,
                    "eot": eot,
                    "total": total,
                    "grade": grade,
                    "updatedAt": updated_at
                }))
            },
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(marks) => ok(&req.id, json!({ "marks": marks })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.upsert" => Some(handle_marks_upsert(state, req)),
        "marks.list" => Some(handle_marks_list(state, req)),
        _ => None,
    }
}
