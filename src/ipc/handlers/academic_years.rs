use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn year_json(id: String, name: String, active: bool, created_at: Option<String>) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "active": active,
        "createdAt": created_at
    })
}

/// Caller owns the transaction.
fn mark_only_active(conn: &Connection, academic_year_id: &str) -> rusqlite::Result<()> {
    conn.execute("UPDATE academic_years SET is_active = 0", [])?;
    conn.execute(
        "UPDATE academic_years SET is_active = 1 WHERE id = ?",
        [academic_year_id],
    )?;
    Ok(())
}

fn set_active(conn: &Connection, academic_year_id: &str) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    mark_only_active(&tx, academic_year_id)?;
    tx.commit()
}

fn handle_years_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "academicYears": [] }));
    };
    let mut stmt = match conn.prepare(
        "SELECT id, name, is_active, created_at FROM academic_years ORDER BY name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |r| {
            Ok(year_json(
                r.get(0)?,
                r.get(1)?,
                r.get::<_, i64>(2)? != 0,
                r.get(3)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(years) => ok(&req.id, json!({ "academicYears": years })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_years_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let active = req
        .params
        .get("active")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    // Insert and activation commit or roll back together.
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let year_id = Uuid::new_v4().to_string();
    if let Err(e) = tx.execute(
        "INSERT INTO academic_years(id, name, is_active, created_at) VALUES(?, ?, 0, ?)",
        (&year_id, &name, db::now_stamp()),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "academic_years" })),
        );
    }
    if active {
        if let Err(e) = mark_only_active(&tx, &year_id) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    ok(
        &req.id,
        json!({ "academicYearId": year_id, "name": name, "active": active }),
    )
}

fn handle_years_set_active(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let year_id = match required_str(req, "academicYearId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::academic_year_exists(conn, &year_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "academic year not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    if let Err(e) = set_active(conn, &year_id) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "academicYearId": year_id }))
}

/// Lets a client resolve the active year once and pass it explicitly to every
/// computation method.
fn handle_years_active(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let row = conn
        .query_row(
            "SELECT id, name, is_active, created_at
             FROM academic_years
             WHERE is_active = 1
             ORDER BY name DESC
             LIMIT 1",
            [],
            |r| {
                Ok(year_json(
                    r.get(0)?,
                    r.get(1)?,
                    r.get::<_, i64>(2)? != 0,
                    r.get(3)?,
                ))
            },
        )
        .optional();
    match row {
        Ok(year) => ok(&req.id, json!({ "academicYear": year })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "academicYears.list" => Some(handle_years_list(state, req)),
        "academicYears.create" => Some(handle_years_create(state, req)),
        "academicYears.setActive" => Some(handle_years_set_active(state, req)),
        "academicYears.active" => Some(handle_years_active(state, req)),
        _ => None,
    }
}
