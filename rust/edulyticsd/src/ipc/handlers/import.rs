use crate::db;
use crate::import::{self, ImportDefaults, ImportError};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_str, request_context};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn import_err(req: &Request, e: ImportError) -> serde_json::Value {
    err(&req.id, e.code(), e.to_string(), None)
}

fn handle_import_preview(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(path) = optional_str(req, "path").map(PathBuf::from) else {
        return err(&req.id, "bad_params", "missing path", None);
    };
    let outcome = match import::import_file(&path) {
        Ok(v) => v,
        Err(e) => return import_err(req, e),
    };
    ok(
        &req.id,
        json!({
            "accepted": outcome.rows.len(),
            "dropped": outcome.dropped,
            "stats": outcome.stats(),
            "rows": outcome.rows,
        }),
    )
}

fn handle_import_commit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ctx = match request_context(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(path) = optional_str(req, "path").map(PathBuf::from) else {
        return err(&req.id, "bad_params", "missing path", None);
    };
    let defaults: ImportDefaults = match req.params.get("defaults") {
        None | Some(serde_json::Value::Null) => ImportDefaults::default(),
        Some(raw) => match serde_json::from_value(raw.clone()) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "bad_params", format!("bad defaults: {}", e), None),
        },
    };

    let outcome = match import::import_file(&path) {
        Ok(v) => v,
        Err(e) => return import_err(req, e),
    };
    let (rows, issues) = import::to_new_marks(&outcome.rows, &defaults);
    if rows.is_empty() {
        return err(
            &req.id,
            "parse_error",
            "no importable rows: every row lacks a class, section, subject or numeric marks",
            Some(json!({ "issues": issues })),
        );
    }

    match db::insert_marks(conn, &ctx.school_id, &rows) {
        Ok(created) => {
            info!(
                school_id = %ctx.school_id,
                path = %path.display(),
                created = created.len(),
                dropped = outcome.dropped,
                skipped = issues.len(),
                "import committed"
            );
            ok(
                &req.id,
                json!({
                    "created": created.len(),
                    "dropped": outcome.dropped,
                    "issues": issues,
                }),
            )
        }
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "marks" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "import.preview" => Some(handle_import_preview(state, req)),
        "import.commit" => Some(handle_import_commit(state, req)),
        _ => None,
    }
}
