use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_edulyticsd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn edulyticsd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

fn row(
    name: &str,
    class: &str,
    section: &str,
    subject: &str,
    marks: serde_json::Value,
) -> serde_json::Value {
    json!({
        "studentName": name,
        "class": class,
        "section": section,
        "subject": subject,
        "marks": marks,
    })
}

fn names(result: &serde_json::Value) -> Vec<String> {
    result
        .get("marks")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
        .iter()
        .filter_map(|m| m.get("studentName").and_then(|v| v.as_str()).map(|s| s.to_string()))
        .collect()
}

#[test]
fn marks_create_list_update_delete_roundtrip() {
    let workspace = temp_dir("edulytics-marks-lifecycle");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy(), "schoolId": "school-1" }),
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "marks.create",
        json!({ "rows": [
            row("Alice Johnson", "10", "A", "Mathematics", json!(88)),
            row("Bob Williams", "10", "A", "Mathematics", json!("92")),
            row("Fiona Garcia", "10", "B", "Mathematics", json!(85.5)),
            row("Ian Hernandez", "10", "B", "Science", json!(83)),
        ]}),
    );
    let created = created
        .get("created")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("created array");
    assert_eq!(created.len(), 4);
    let alice_id = created[0]
        .get("id")
        .and_then(|v| v.as_str())
        .expect("id")
        .to_string();
    assert_eq!(created[1].get("marks").and_then(|v| v.as_f64()), Some(92.0));
    assert!(created[0]
        .get("dateTaken")
        .and_then(|v| v.as_str())
        .map(|s| s.ends_with('Z'))
        .unwrap_or(false));

    let all = request_ok(&mut stdin, &mut reader, "3", "marks.list", json!({}));
    assert_eq!(
        names(&all),
        vec!["Alice Johnson", "Bob Williams", "Fiona Garcia", "Ian Hernandez"]
    );

    let section_b = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "marks.list",
        json!({ "class": "10", "section": "B" }),
    );
    assert_eq!(names(&section_b), vec!["Fiona Garcia", "Ian Hernandez"]);

    // Another school sees nothing.
    let other = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "marks.list",
        json!({ "schoolId": "school-2" }),
    );
    assert!(names(&other).is_empty());
    let hidden = request(
        &mut stdin,
        &mut reader,
        "6",
        "marks.get",
        json!({ "schoolId": "school-2", "markId": alice_id }),
    );
    assert_eq!(error_code(&hidden), Some("not_found"));

    let mut edit = row("Alice J.", "10", "A", "Mathematics", json!(91));
    edit["markId"] = json!(alice_id);
    let updated = request_ok(&mut stdin, &mut reader, "7", "marks.update", edit);
    assert_eq!(
        updated.pointer("/mark/id").and_then(|v| v.as_str()),
        Some(alice_id.as_str())
    );

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "marks.get",
        json!({ "markId": alice_id }),
    );
    assert_eq!(
        fetched.pointer("/mark/studentName").and_then(|v| v.as_str()),
        Some("Alice J.")
    );
    assert_eq!(fetched.pointer("/mark/marks").and_then(|v| v.as_f64()), Some(91.0));

    // Edits keep the record's position.
    let all = request_ok(&mut stdin, &mut reader, "9", "marks.list", json!({}));
    assert_eq!(names(&all)[0], "Alice J.");

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "marks.delete",
        json!({ "markId": alice_id }),
    );
    assert_eq!(deleted.get("deleted").and_then(|v| v.as_i64()), Some(1));
    let again = request(
        &mut stdin,
        &mut reader,
        "11",
        "marks.delete",
        json!({ "markId": alice_id }),
    );
    assert_eq!(error_code(&again), Some("not_found"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn delete_group_targets_subject_section_and_class() {
    let workspace = temp_dir("edulytics-marks-delete-group");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy(), "schoolId": "s" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "marks.create",
        json!({ "rows": [
            row("A", "10", "A", "Math", json!(1)),
            row("B", "10", "A", "Science", json!(2)),
            row("C", "10", "B", "Math", json!(3)),
            row("D", "9", "A", "Math", json!(4)),
        ]}),
    );

    let bad = request(
        &mut stdin,
        &mut reader,
        "3",
        "marks.deleteGroup",
        json!({ "class": "10", "subject": "Math" }),
    );
    assert_eq!(error_code(&bad), Some("bad_params"));

    let by_subject = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "marks.deleteGroup",
        json!({ "class": "10", "section": "A", "subject": "Math" }),
    );
    assert_eq!(by_subject.get("deleted").and_then(|v| v.as_i64()), Some(1));

    let by_section = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "marks.deleteGroup",
        json!({ "class": "10", "section": "B" }),
    );
    assert_eq!(by_section.get("deleted").and_then(|v| v.as_i64()), Some(1));

    let by_class = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "marks.deleteGroup",
        json!({ "class": "10" }),
    );
    assert_eq!(by_class.get("deleted").and_then(|v| v.as_i64()), Some(1));

    let left = request_ok(&mut stdin, &mut reader, "7", "marks.list", json!({}));
    assert_eq!(names(&left), vec!["D"]);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn create_rejects_incomplete_rows_without_writing() {
    let workspace = temp_dir("edulytics-marks-validation");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy(), "schoolId": "s" }),
    );

    let cases = [
        row("", "10", "A", "Math", json!(50)),
        row("Ann", "10", "  ", "Math", json!(50)),
        row("Ann", "10", "A", "Math", json!("fifty")),
        row("Ann", "10", "A", "Math", json!(null)),
    ];
    for (i, bad) in cases.iter().enumerate() {
        let value = request(
            &mut stdin,
            &mut reader,
            &format!("bad{}", i),
            "marks.create",
            json!({ "rows": [row("Ok", "10", "A", "Math", json!(1)), bad] }),
        );
        assert_eq!(error_code(&value), Some("bad_params"), "case {}", i);
        assert_eq!(
            value.pointer("/error/details/row").and_then(|v| v.as_i64()),
            Some(1)
        );
    }

    // Out-of-range scores are accepted as-is.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "range",
        "marks.create",
        json!({
            "rows": [
                row("Over", "10", "A", "Math", json!(120)),
                row("Under", "10", "A", "Math", json!(-4)),
            ]
        }),
    );

    let all = request_ok(&mut stdin, &mut reader, "list", "marks.list", json!({}));
    assert_eq!(names(&all), vec!["Over", "Under"]);

    drop(stdin);
    let _ = child.wait();
}
