use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    bad_row, db_conn, mark_filter, optional_str, parse_new_mark, request_context, required_str,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use tracing::{debug, info};

fn handle_marks_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ctx = match request_context(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(raw_rows) = req.params.get("rows").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing rows", None);
    };
    if raw_rows.is_empty() {
        return err(&req.id, "bad_params", "rows must not be empty", None);
    }

    let mut rows = Vec::with_capacity(raw_rows.len());
    for (i, raw) in raw_rows.iter().enumerate() {
        match parse_new_mark(raw) {
            Ok(r) => rows.push(r),
            Err(msg) => return bad_row(req, Some(i), msg),
        }
    }

    match db::insert_marks(conn, &ctx.school_id, &rows) {
        Ok(created) => {
            debug!(school_id = %ctx.school_id, count = created.len(), "marks created");
            ok(&req.id, json!({ "created": created }))
        }
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "marks" })),
        ),
    }
}

fn handle_marks_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "marks": [] }));
    };
    let ctx = match request_context(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::list_marks(conn, &ctx.school_id, &mark_filter(req)) {
        Ok(marks) => ok(&req.id, json!({ "marks": marks })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_marks_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ctx = match request_context(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mark_id = match required_str(req, "markId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::get_mark(conn, &ctx.school_id, &mark_id) {
        Ok(Some(mark)) => ok(&req.id, json!({ "mark": mark })),
        Ok(None) => err(&req.id, "not_found", "mark not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_marks_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ctx = match request_context(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mark_id = match required_str(req, "markId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let row = match parse_new_mark(&req.params) {
        Ok(v) => v,
        Err(msg) => return bad_row(req, None, msg),
    };
    match db::replace_mark(conn, &ctx.school_id, &mark_id, &row) {
        Ok(Some(mark)) => ok(&req.id, json!({ "mark": mark })),
        Ok(None) => err(&req.id, "not_found", "mark not found", None),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_marks_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ctx = match request_context(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mark_id = match required_str(req, "markId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::delete_mark(conn, &ctx.school_id, &mark_id) {
        Ok(true) => ok(&req.id, json!({ "deleted": 1 })),
        Ok(false) => err(&req.id, "not_found", "mark not found", None),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_marks_delete_group(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ctx = match request_context(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class = match required_str(req, "class") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let section = optional_str(req, "section");
    let subject = optional_str(req, "subject");
    if subject.is_some() && section.is_none() {
        return err(
            &req.id,
            "bad_params",
            "subject deletes are scoped to a section; pass section too",
            None,
        );
    }

    match db::delete_group(
        conn,
        &ctx.school_id,
        &class,
        section.as_deref(),
        subject.as_deref(),
    ) {
        Ok(n) => {
            info!(
                school_id = %ctx.school_id,
                class = %class,
                section = section.as_deref().unwrap_or("*"),
                subject = subject.as_deref().unwrap_or("*"),
                deleted = n,
                "group deleted"
            );
            ok(&req.id, json!({ "deleted": n }))
        }
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.create" => Some(handle_marks_create(state, req)),
        "marks.list" => Some(handle_marks_list(state, req)),
        "marks.get" => Some(handle_marks_get(state, req)),
        "marks.update" => Some(handle_marks_update(state, req)),
        "marks.delete" => Some(handle_marks_delete(state, req)),
        "marks.deleteGroup" => Some(handle_marks_delete_group(state, req)),
        _ => None,
    }
}
