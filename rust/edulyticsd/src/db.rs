use crate::calc::MarkRecord;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension, Row};
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE: &str = "edulytics.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            student_name TEXT NOT NULL,
            class TEXT NOT NULL,
            section TEXT NOT NULL,
            subject TEXT NOT NULL,
            marks REAL NOT NULL,
            date_taken TEXT NOT NULL,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_school_group ON marks(school_id, class, section, subject)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_school_sort ON marks(school_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS support_tickets(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            user_email TEXT NOT NULL,
            subject TEXT NOT NULL,
            message TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_support_tickets_user ON support_tickets(user_id)",
        [],
    )?;

    Ok(conn)
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A record as entered by a teacher, before it has an id or timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMark {
    pub student_name: String,
    pub class: String,
    pub section: String,
    pub subject: String,
    pub marks: f64,
}

#[derive(Debug, Clone, Default)]
pub struct MarkFilter {
    pub class: Option<String>,
    pub section: Option<String>,
    pub subject: Option<String>,
}

const MARK_COLUMNS: &str = "id, student_name, class, section, subject, marks, date_taken";

fn mark_from_row(row: &Row<'_>) -> rusqlite::Result<MarkRecord> {
    Ok(MarkRecord {
        id: row.get(0)?,
        student_name: row.get(1)?,
        class: row.get(2)?,
        section: row.get(3)?,
        subject: row.get(4)?,
        marks: row.get(5)?,
        date_taken: row.get(6)?,
    })
}

pub fn insert_marks(
    conn: &Connection,
    school_id: &str,
    rows: &[NewMark],
) -> anyhow::Result<Vec<MarkRecord>> {
    let tx = conn.unchecked_transaction()?;
    let mut next_sort: i64 = tx.query_row(
        "SELECT COALESCE(MAX(sort_order), 0) + 1 FROM marks WHERE school_id = ?",
        [school_id],
        |r| r.get(0),
    )?;

    let mut created = Vec::with_capacity(rows.len());
    {
        let mut stmt = tx.prepare(
            "INSERT INTO marks(id, school_id, student_name, class, section, subject, marks, date_taken, sort_order)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for r in rows {
            let rec = MarkRecord {
                id: Uuid::new_v4().to_string(),
                student_name: r.student_name.clone(),
                class: r.class.clone(),
                section: r.section.clone(),
                subject: r.subject.clone(),
                marks: r.marks,
                date_taken: now_iso(),
            };
            stmt.execute((
                &rec.id,
                school_id,
                &rec.student_name,
                &rec.class,
                &rec.section,
                &rec.subject,
                rec.marks,
                &rec.date_taken,
                next_sort,
            ))?;
            next_sort += 1;
            created.push(rec);
        }
    }
    tx.commit()?;
    Ok(created)
}

pub fn list_marks(
    conn: &Connection,
    school_id: &str,
    filter: &MarkFilter,
) -> anyhow::Result<Vec<MarkRecord>> {
    let mut sql = format!("SELECT {} FROM marks WHERE school_id = ?", MARK_COLUMNS);
    let mut bind: Vec<Value> = vec![Value::Text(school_id.to_string())];
    for (column, value) in [
        ("class", &filter.class),
        ("section", &filter.section),
        ("subject", &filter.subject),
    ] {
        if let Some(v) = value {
            sql.push_str(&format!(" AND {} = ?", column));
            bind.push(Value::Text(v.clone()));
        }
    }
    sql.push_str(" ORDER BY sort_order, rowid");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), mark_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_mark(
    conn: &Connection,
    school_id: &str,
    mark_id: &str,
) -> anyhow::Result<Option<MarkRecord>> {
    let sql = format!(
        "SELECT {} FROM marks WHERE school_id = ? AND id = ?",
        MARK_COLUMNS
    );
    let rec = conn
        .query_row(&sql, (school_id, mark_id), mark_from_row)
        .optional()?;
    Ok(rec)
}

/// Full replacement keeping id and school. Returns None when the id is unknown.
pub fn replace_mark(
    conn: &Connection,
    school_id: &str,
    mark_id: &str,
    row: &NewMark,
) -> anyhow::Result<Option<MarkRecord>> {
    let date_taken = now_iso();
    let changed = conn.execute(
        "UPDATE marks
         SET student_name = ?, class = ?, section = ?, subject = ?, marks = ?, date_taken = ?
         WHERE school_id = ? AND id = ?",
        (
            &row.student_name,
            &row.class,
            &row.section,
            &row.subject,
            row.marks,
            &date_taken,
            school_id,
            mark_id,
        ),
    )?;
    if changed == 0 {
        return Ok(None);
    }
    Ok(Some(MarkRecord {
        id: mark_id.to_string(),
        student_name: row.student_name.clone(),
        class: row.class.clone(),
        section: row.section.clone(),
        subject: row.subject.clone(),
        marks: row.marks,
        date_taken,
    }))
}

pub fn delete_mark(conn: &Connection, school_id: &str, mark_id: &str) -> anyhow::Result<bool> {
    let n = conn.execute(
        "DELETE FROM marks WHERE school_id = ? AND id = ?",
        (school_id, mark_id),
    )?;
    Ok(n > 0)
}

/// Bulk delete of a class, a class section, or one subject within a section.
pub fn delete_group(
    conn: &Connection,
    school_id: &str,
    class: &str,
    section: Option<&str>,
    subject: Option<&str>,
) -> anyhow::Result<usize> {
    let mut sql = "DELETE FROM marks WHERE school_id = ? AND class = ?".to_string();
    let mut bind: Vec<Value> = vec![
        Value::Text(school_id.to_string()),
        Value::Text(class.to_string()),
    ];
    if let Some(s) = section {
        sql.push_str(" AND section = ?");
        bind.push(Value::Text(s.to_string()));
    }
    if let Some(s) = subject {
        sql.push_str(" AND subject = ?");
        bind.push(Value::Text(s.to_string()));
    }
    let n = conn.execute(&sql, params_from_iter(bind))?;
    Ok(n)
}

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub subject: String,
    pub message: String,
    pub user_email: String,
    pub user_id: String,
}

pub const TICKET_STATUS_OPEN: &str = "open";

pub fn insert_support_ticket(conn: &Connection, t: &NewTicket) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO support_tickets(id, user_id, user_email, subject, message, status, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &t.user_id,
            &t.user_email,
            &t.subject,
            &t.message,
            TICKET_STATUS_OPEN,
            now_iso(),
        ),
    )?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_workspace(prefix: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ))
    }

    fn new_mark(name: &str, class: &str, section: &str, subject: &str, marks: f64) -> NewMark {
        NewMark {
            student_name: name.to_string(),
            class: class.to_string(),
            section: section.to_string(),
            subject: subject.to_string(),
            marks,
        }
    }

    #[test]
    fn list_keeps_insert_order_and_scopes_by_school() {
        let conn = open_db(&temp_workspace("edulytics-db-order")).expect("open db");
        insert_marks(
            &conn,
            "school-a",
            &[
                new_mark("Zed", "10", "A", "Math", 70.0),
                new_mark("Amy", "9", "A", "Math", 80.0),
            ],
        )
        .expect("insert a");
        insert_marks(&conn, "school-b", &[new_mark("Other", "10", "A", "Math", 1.0)])
            .expect("insert b");
        insert_marks(&conn, "school-a", &[new_mark("Bea", "10", "B", "Art", 90.0)])
            .expect("insert a again");

        let all = list_marks(&conn, "school-a", &MarkFilter::default()).expect("list");
        let names: Vec<&str> = all.iter().map(|m| m.student_name.as_str()).collect();
        assert_eq!(names, vec!["Zed", "Amy", "Bea"]);

        let tenth = list_marks(
            &conn,
            "school-a",
            &MarkFilter {
                class: Some("10".to_string()),
                ..Default::default()
            },
        )
        .expect("list filtered");
        assert_eq!(tenth.len(), 2);
    }

    #[test]
    fn replace_keeps_id_and_delete_group_counts() {
        let conn = open_db(&temp_workspace("edulytics-db-replace")).expect("open db");
        let created = insert_marks(
            &conn,
            "s",
            &[
                new_mark("A", "10", "A", "Math", 50.0),
                new_mark("B", "10", "A", "Science", 60.0),
                new_mark("C", "10", "B", "Math", 70.0),
            ],
        )
        .expect("insert");

        let id = created[0].id.clone();
        let replaced = replace_mark(&conn, "s", &id, &new_mark("A2", "10", "A", "Math", 55.0))
            .expect("replace")
            .expect("found");
        assert_eq!(replaced.id, id);
        let fetched = get_mark(&conn, "s", &id).expect("get").expect("exists");
        assert_eq!(fetched.student_name, "A2");
        assert_eq!(fetched.marks, 55.0);

        assert!(replace_mark(&conn, "other", &id, &new_mark("X", "1", "A", "M", 1.0))
            .expect("replace other school")
            .is_none());

        let n = delete_group(&conn, "s", "10", Some("A"), Some("Math")).expect("delete subject");
        assert_eq!(n, 1);
        let n = delete_group(&conn, "s", "10", None, None).expect("delete class");
        assert_eq!(n, 2);
        assert!(!delete_mark(&conn, "s", &id).expect("delete missing"));
    }
}
