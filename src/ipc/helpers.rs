use crate::calc::{self, CalcContext, CalcError};
use crate::config::{self, EngineConfig};
use crate::division::ExamType;
use crate::grading::GradingContext;
use crate::ipc::error::{self, err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Trimmed, non-empty string param if present.
pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn calc_err(req: &Request, e: CalcError) -> serde_json::Value {
    error::calc_err(&req.id, e)
}

pub fn parse_term(req: &Request) -> Result<i64, serde_json::Value> {
    let Some(term) = req.params.get("term").and_then(|v| v.as_i64()) else {
        return Err(err(&req.id, "bad_params", "missing term", None));
    };
    calc::validate_term(term).map_err(|e| calc_err(req, e))
}

/// Missing or null `examType` falls back to `default`.
pub fn parse_exam_type(req: &Request, default: ExamType) -> Result<ExamType, serde_json::Value> {
    match req.params.get("examType") {
        None => Ok(default),
        Some(v) if v.is_null() => Ok(default),
        Some(v) => v.as_str().and_then(ExamType::parse).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "examType must be one of: homework, bot, midterm, eot, total",
                Some(json!({ "examType": v })),
            )
        }),
    }
}

pub fn parse_context(req: &Request) -> Result<GradingContext, serde_json::Value> {
    let raw = required_str(req, "context")?;
    GradingContext::parse(&raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "context must be one of: report, division",
            None,
        )
    })
}

pub fn engine_config(conn: &Connection, req: &Request) -> Result<EngineConfig, serde_json::Value> {
    config::load_engine_config(conn)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))
}

/// `classId`, `academicYearId` and `term`, the scope shared by every
/// computation method.
pub struct CalcScope {
    pub class_id: String,
    pub academic_year_id: String,
    pub term: i64,
}

impl CalcScope {
    pub fn parse(req: &Request) -> Result<Self, serde_json::Value> {
        Ok(Self {
            class_id: required_str(req, "classId")?,
            academic_year_id: required_str(req, "academicYearId")?,
            term: parse_term(req)?,
        })
    }

    pub fn context<'a>(&'a self, conn: &'a Connection) -> CalcContext<'a> {
        CalcContext {
            conn,
            class_id: &self.class_id,
            academic_year_id: &self.academic_year_id,
            term: self.term,
        }
    }
}

pub fn model_ok(req: &Request, model: impl serde::Serialize) -> serde_json::Value {
    match serde_json::to_value(model) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "serialize_failed", e.to_string(), None),
    }
}
