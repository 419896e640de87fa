use crate::calc::{self, Statistics};
use crate::db::NewMark;
use calamine::{open_workbook, Data, Reader, Xlsx};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported file format: {0} (expected .csv or .xlsx)")]
    UnsupportedFormat(String),
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("malformed XLSX: {0}")]
    Xlsx(String),
    #[error("could not parse student data from the file; check the file format and headers")]
    NoRows,
}

impl ImportError {
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::Io { .. } => "io_error",
            ImportError::UnsupportedFormat(_) => "unsupported_format",
            ImportError::Csv(_) | ImportError::Xlsx(_) | ImportError::NoRows => "parse_error",
        }
    }
}

/// One accepted row. Marks stay as the text found in the file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedRow {
    pub student_name: String,
    pub marks: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportOutcome {
    pub rows: Vec<ImportedRow>,
    pub dropped: usize,
}

impl ImportOutcome {
    pub fn stats(&self) -> Statistics {
        let marks: Vec<f64> = self.rows.iter().filter_map(|r| parse_marks(&r.marks)).collect();
        calc::calculate_mark_statistics(&marks)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportDefaults {
    pub class: Option<String>,
    pub section: Option<String>,
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowIssue {
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Default)]
struct ColumnMap {
    name: Vec<usize>,
    marks: Vec<usize>,
    class: Vec<usize>,
    section: Vec<usize>,
    subject: Vec<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &[String]) -> ColumnMap {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let find = |wanted: &[&str]| -> Vec<usize> {
            let mut out = Vec::new();
            for w in wanted {
                for (i, h) in normalized.iter().enumerate() {
                    if h == w {
                        out.push(i);
                    }
                }
            }
            out
        };
        ColumnMap {
            name: find(&["studentname", "name"]),
            marks: find(&["marks", "score"]),
            class: find(&["class"]),
            section: find(&["section"]),
            subject: find(&["subject"]),
        }
    }
}

fn normalize_header(h: &str) -> String {
    h.trim()
        .chars()
        .filter(|c| *c != ' ' && *c != '_')
        .collect::<String>()
        .to_lowercase()
}

fn first_present(row: &[String], columns: &[usize]) -> Option<String> {
    columns
        .iter()
        .filter_map(|&i| row.get(i))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .map(|v| v.to_string())
}

/// Applies header matching and drops rows without both a name and marks.
pub fn normalize_rows<I>(headers: &[String], rows: I) -> ImportOutcome
where
    I: IntoIterator<Item = Vec<String>>,
{
    let map = ColumnMap::from_headers(headers);
    let mut accepted = Vec::new();
    let mut dropped = 0usize;
    for row in rows {
        let name = first_present(&row, &map.name);
        let marks = first_present(&row, &map.marks);
        match (name, marks) {
            (Some(student_name), Some(marks)) => accepted.push(ImportedRow {
                student_name,
                marks,
                class: first_present(&row, &map.class),
                section: first_present(&row, &map.section),
                subject: first_present(&row, &map.subject),
            }),
            _ => dropped += 1,
        }
    }
    ImportOutcome {
        rows: accepted,
        dropped,
    }
}

pub fn parse_marks(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn import_file(path: &Path) -> Result<ImportOutcome, ImportError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let (headers, rows) = match ext.as_str() {
        "csv" => {
            let bytes = std::fs::read(path).map_err(|source| ImportError::Io {
                path: path.to_string_lossy().to_string(),
                source,
            })?;
            read_csv(&bytes)?
        }
        "xlsx" => read_xlsx(path)?,
        other => return Err(ImportError::UnsupportedFormat(format!(".{}", other))),
    };

    let outcome = normalize_rows(&headers, rows);
    if outcome.rows.is_empty() {
        return Err(ImportError::NoRows);
    }
    Ok(outcome)
}

pub fn read_csv(bytes: &[u8]) -> Result<(Vec<String>, Vec<Vec<String>>), ImportError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(|f| f.to_string()).collect());
    }
    Ok((headers, rows))
}

pub fn read_xlsx(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>), ImportError> {
    let mut workbook: Xlsx<_> =
        open_workbook(path).map_err(|e: calamine::XlsxError| ImportError::Xlsx(e.to_string()))?;
    let Some(sheet) = workbook.sheet_names().first().cloned() else {
        return Err(ImportError::Xlsx("workbook has no worksheets".to_string()));
    };
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| ImportError::Xlsx(e.to_string()))?;

    let mut it = range.rows();
    let headers: Vec<String> = match it.next() {
        Some(first) => first.iter().map(cell_text).collect(),
        None => return Ok((Vec::new(), Vec::new())),
    };
    let rows = it
        .map(|r| r.iter().map(cell_text).collect::<Vec<String>>())
        .filter(|r| r.iter().any(|c| !c.trim().is_empty()))
        .collect();
    Ok((headers, rows))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Float(f) => number_text(*f),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => number_text(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

// Whole numbers print without a fractional part: 85.0 -> "85".
fn number_text(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

/// Turns accepted rows into storable records. Rows that still lack a key after
/// defaults, or whose marks are not numeric, are reported and skipped.
pub fn to_new_marks(
    rows: &[ImportedRow],
    defaults: &ImportDefaults,
) -> (Vec<NewMark>, Vec<RowIssue>) {
    let pick = |own: &Option<String>, fallback: &Option<String>| -> Option<String> {
        own.clone()
            .or_else(|| fallback.as_ref().map(|v| v.trim().to_string()))
            .filter(|v| !v.is_empty())
    };

    let mut out = Vec::new();
    let mut issues = Vec::new();
    for (idx, row) in rows.iter().enumerate() {
        let Some(marks) = parse_marks(&row.marks) else {
            issues.push(RowIssue {
                row: idx,
                message: format!("marks is not a number: {}", row.marks),
            });
            continue;
        };
        let class = pick(&row.class, &defaults.class);
        let section = pick(&row.section, &defaults.section);
        let subject = pick(&row.subject, &defaults.subject);
        let (Some(class), Some(section), Some(subject)) = (class, section, subject) else {
            issues.push(RowIssue {
                row: idx,
                message: "missing class, section or subject".to_string(),
            });
            continue;
        };
        out.push(NewMark {
            student_name: row.student_name.clone(),
            class,
            section,
            subject,
            marks,
        });
    }
    (out, issues)
}
