use crate::calc::{self, ChartMode, GroupContent, GroupKey, GroupOrder, MarkRecord};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, mark_filter, optional_str, request_context};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn load_marks(state: &AppState, req: &Request) -> Result<Vec<MarkRecord>, serde_json::Value> {
    let conn = db_conn(state, req)?;
    let ctx = request_context(state, req)?;
    db::list_marks(conn, &ctx.school_id, &mark_filter(req))
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))
}

fn parse_order(req: &Request) -> Result<GroupOrder, serde_json::Value> {
    match optional_str(req, "order") {
        None => Ok(GroupOrder::Encounter),
        Some(raw) => GroupOrder::parse(&raw).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "order must be one of: encounter, lexical",
                Some(json!({ "order": raw })),
            )
        }),
    }
}

fn parse_keys(req: &Request) -> Result<Vec<GroupKey>, serde_json::Value> {
    let Some(raw) = req.params.get("keys") else {
        return Ok(vec![GroupKey::Class, GroupKey::Section, GroupKey::Subject]);
    };
    let Some(items) = raw.as_array() else {
        return Err(err(&req.id, "bad_params", "keys must be an array", None));
    };
    let mut keys = Vec::with_capacity(items.len());
    for item in items {
        let parsed = item.as_str().and_then(GroupKey::parse);
        match parsed {
            Some(k) if !keys.contains(&k) => keys.push(k),
            Some(_) => {
                return Err(err(
                    &req.id,
                    "bad_params",
                    "keys must not repeat",
                    Some(json!({ "key": item })),
                ))
            }
            None => {
                return Err(err(
                    &req.id,
                    "bad_params",
                    "keys entries must be one of: class, section, subject",
                    Some(json!({ "key": item })),
                ))
            }
        }
    }
    Ok(keys)
}

fn leaf_json(records: &[MarkRecord]) -> serde_json::Value {
    json!({
        "count": records.len(),
        "stats": calc::calculate_statistics(records),
    })
}

fn groups_json(content: &GroupContent) -> serde_json::Value {
    match content {
        GroupContent::Records(records) => leaf_json(records),
        GroupContent::Groups(nodes) => {
            let items: Vec<serde_json::Value> = nodes
                .iter()
                .map(|n| {
                    let mut v = json!({
                        "key": n.key.as_str(),
                        "value": n.value,
                    });
                    match &n.content {
                        GroupContent::Records(records) => {
                            v["count"] = json!(records.len());
                            v["stats"] = json!(calc::calculate_statistics(records));
                        }
                        nested @ GroupContent::Groups(_) => {
                            v["groups"] = groups_json(nested);
                        }
                    }
                    v
                })
                .collect();
            json!(items)
        }
    }
}

fn handle_stats_compute(state: &mut AppState, req: &Request) -> serde_json::Value {
    // Inline marks let the UI score an unsaved sheet.
    if let Some(raw) = req.params.get("marks") {
        let Some(items) = raw.as_array() else {
            return err(&req.id, "bad_params", "marks must be an array of numbers", None);
        };
        let mut marks = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            match item.as_f64().filter(|m| m.is_finite()) {
                Some(m) => marks.push(m),
                None => {
                    return err(
                        &req.id,
                        "bad_params",
                        "marks must be an array of numbers",
                        Some(json!({ "index": i })),
                    )
                }
            }
        }
        return ok(
            &req.id,
            json!({
                "count": marks.len(),
                "stats": calc::calculate_mark_statistics(&marks),
            }),
        );
    }

    match load_marks(state, req) {
        Ok(records) => ok(&req.id, leaf_json(&records)),
        Err(e) => e,
    }
}

fn handle_reports_groups(state: &mut AppState, req: &Request) -> serde_json::Value {
    let keys = match parse_keys(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let order = match parse_order(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let records = match load_marks(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let grouped = calc::group_records_ordered(&records, &keys, order);
    let key_names: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
    ok(
        &req.id,
        json!({
            "keys": key_names,
            "total": records.len(),
            "leafCount": grouped.leaves().len(),
            "groups": groups_json(&grouped),
        }),
    )
}

fn handle_reports_keys(state: &mut AppState, req: &Request) -> serde_json::Value {
    let field = match optional_str(req, "field").as_deref().map(GroupKey::parse) {
        Some(Some(k)) => k,
        _ => {
            return err(
                &req.id,
                "bad_params",
                "field must be one of: class, section, subject",
                None,
            )
        }
    };
    let order = match parse_order(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match load_marks(state, req) {
        Ok(records) => ok(
            &req.id,
            json!({
                "field": field.as_str(),
                "keys": calc::group_keys(&records, field, order),
            }),
        ),
        Err(e) => e,
    }
}

fn handle_reports_view(state: &mut AppState, req: &Request) -> serde_json::Value {
    let mode = match optional_str(req, "chart") {
        None => ChartMode::default(),
        Some(raw) => match ChartMode::parse(&raw) {
            Some(m) => m,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "chart must be one of: byStudent, bySubjectAverage",
                    Some(json!({ "chart": raw })),
                )
            }
        },
    };
    let records = match load_marks(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    ok(
        &req.id,
        json!({
            "count": records.len(),
            "stats": calc::calculate_statistics(&records),
            "table": calc::table_rows(&records),
            "chart": calc::chart_points(&records, mode),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "stats.compute" => Some(handle_stats_compute(state, req)),
        "reports.groups" => Some(handle_reports_groups(state, req)),
        "reports.keys" => Some(handle_reports_keys(state, req)),
        "reports.view" => Some(handle_reports_view(state, req)),
        _ => None,
    }
}
