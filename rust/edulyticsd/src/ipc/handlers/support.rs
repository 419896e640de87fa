use crate::db::{self, NewTicket};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use tracing::info;

/// `local@domain.tld` with no whitespace; enough to catch typos.
fn looks_like_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

fn handle_support_create_ticket(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject = match required_str(req, "subject") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let message = match required_str(req, "message") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let user_email = match required_str(req, "userEmail") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if !looks_like_email(&user_email) {
        return err(
            &req.id,
            "bad_params",
            "userEmail must be a valid email address",
            Some(json!({ "userEmail": user_email })),
        );
    }

    let ticket = NewTicket {
        subject,
        message,
        user_email,
        user_id,
    };
    match db::insert_support_ticket(conn, &ticket) {
        Ok(ticket_id) => {
            info!(ticket_id = %ticket_id, user_id = %ticket.user_id, "support ticket opened");
            ok(
                &req.id,
                json!({ "ticketId": ticket_id, "status": db::TICKET_STATUS_OPEN }),
            )
        }
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "support_tickets" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "support.createTicket" => Some(handle_support_create_ticket(state, req)),
        _ => None,
    }
}
