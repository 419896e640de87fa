use crate::db::{MarkFilter, NewMark};
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request, RequestContext};
use rusqlite::Connection;
use serde_json::json;

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    optional_str(req, key)
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Trimmed string param; blank counts as absent.
pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn db_conn<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn request_context(
    state: &AppState,
    req: &Request,
) -> Result<RequestContext, serde_json::Value> {
    optional_str(req, "schoolId")
        .or_else(|| state.school_id.clone())
        .map(|school_id| RequestContext { school_id })
        .ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "missing schoolId (pass params.schoolId or select a workspace with one)",
                None,
            )
        })
}

pub fn mark_filter(req: &Request) -> MarkFilter {
    MarkFilter {
        class: optional_str(req, "class"),
        section: optional_str(req, "section"),
        subject: optional_str(req, "subject"),
    }
}

/// Accepts a JSON number or a numeric string; rejects NaN and infinities.
pub fn marks_value(v: Option<&serde_json::Value>) -> Option<f64> {
    let parsed = match v? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|m| m.is_finite())
}

/// Validates one manually entered row. `Err` carries a message naming the bad field.
pub fn parse_new_mark(raw: &serde_json::Value) -> Result<NewMark, String> {
    let text = |key: &str| -> Result<String, String> {
        raw.get(key)
            .and_then(|v| v.as_str())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| format!("{} must be a non-empty string", key))
    };
    let student_name = text("studentName")?;
    let class = text("class")?;
    let section = text("section")?;
    let subject = text("subject")?;
    let marks = marks_value(raw.get("marks")).ok_or_else(|| "marks must be a number".to_string())?;
    Ok(NewMark {
        student_name,
        class,
        section,
        subject,
        marks,
    })
}

pub fn bad_row(req: &Request, row: Option<usize>, message: String) -> serde_json::Value {
    err(
        &req.id,
        "bad_params",
        message,
        row.map(|r| json!({ "row": r })),
    )
}
