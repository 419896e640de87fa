use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRecord {
    pub id: String,
    pub student_name: String,
    pub class: String,
    pub section: String,
    pub subject: String,
    pub marks: f64,
    pub date_taken: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Statistics {
    pub mean: f64,
    pub median: f64,
    pub mode: Option<f64>,
    pub max: f64,
    pub min: f64,
}

impl Statistics {
    pub const EMPTY: Statistics = Statistics {
        mean: 0.0,
        median: 0.0,
        mode: None,
        max: 0.0,
        min: 0.0,
    };
}

/// Round-half-up to cents: `floor(100*x + 0.5) / 100`.
/// Halves round toward positive infinity, so `-2.345` becomes `-2.34`.
/// Magnitudes too large to scale have no cents and pass through.
pub fn round_off_2_decimal(x: f64) -> f64 {
    let scaled = 100.0 * x;
    if !scaled.is_finite() {
        return x;
    }
    (scaled + 0.5).floor() / 100.0
}

pub fn calculate_statistics(records: &[MarkRecord]) -> Statistics {
    let marks: Vec<f64> = records.iter().map(|r| r.marks).collect();
    calculate_mark_statistics(&marks)
}

pub fn calculate_mark_statistics(marks: &[f64]) -> Statistics {
    let Some(&first) = marks.first() else {
        return Statistics::EMPTY;
    };

    let mut max = first;
    let mut min = first;
    for &m in marks {
        if m > max {
            max = m;
        }
        if m < min {
            min = m;
        }
    }

    // Cent rounding can step just outside the extrema for sub-cent inputs.
    let mean = round_off_2_decimal(mean_of(marks)).clamp(min, max);

    Statistics {
        mean,
        median: compute_median(marks),
        mode: compute_mode(marks),
        max,
        min,
    }
}

fn mean_of(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean.is_finite() {
        mean
    } else {
        // The plain sum overflowed; scale each term first.
        values.iter().map(|v| v / n).sum()
    }
}

/// Halves each side before adding so two large marks cannot overflow.
fn midpoint(lo: f64, hi: f64) -> f64 {
    (lo / 2.0 + hi / 2.0).clamp(lo, hi)
}

fn compute_median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        midpoint(sorted[mid - 1], sorted[mid])
    }
}

/// First value to reach a new peak frequency wins; ties never displace it.
fn compute_mode(values: &[f64]) -> Option<f64> {
    let mut freq: HashMap<u64, usize> = HashMap::new();
    let mut best_freq = 0usize;
    let mut mode = None;
    for &v in values {
        let count = freq.entry(mark_key(v)).or_insert(0);
        *count += 1;
        if *count > best_freq {
            best_freq = *count;
            mode = Some(v);
        }
    }
    mode
}

// 0.0 and -0.0 count as the same mark.
fn mark_key(v: f64) -> u64 {
    if v == 0.0 {
        0.0f64.to_bits()
    } else {
        v.to_bits()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Class,
    Section,
    Subject,
}

impl GroupKey {
    pub fn parse(raw: &str) -> Option<GroupKey> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "class" => Some(GroupKey::Class),
            "section" => Some(GroupKey::Section),
            "subject" => Some(GroupKey::Subject),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GroupKey::Class => "class",
            GroupKey::Section => "section",
            GroupKey::Subject => "subject",
        }
    }

    pub fn value_of(self, record: &MarkRecord) -> &str {
        match self {
            GroupKey::Class => &record.class,
            GroupKey::Section => &record.section,
            GroupKey::Subject => &record.subject,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupOrder {
    /// First-seen key order.
    #[default]
    Encounter,
    /// Class and section levels sorted by plain string comparison, so "10" < "9".
    /// Subject levels keep first-seen order.
    Lexical,
}

impl GroupOrder {
    pub fn parse(raw: &str) -> Option<GroupOrder> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "encounter" => Some(GroupOrder::Encounter),
            "lexical" => Some(GroupOrder::Lexical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupNode {
    pub key: GroupKey,
    pub value: String,
    pub content: GroupContent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupContent {
    Groups(Vec<GroupNode>),
    Records(Vec<MarkRecord>),
}

pub fn group_records(records: &[MarkRecord], keys: &[GroupKey]) -> GroupContent {
    let Some((&key, rest)) = keys.split_first() else {
        return GroupContent::Records(records.to_vec());
    };

    let mut order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Vec<MarkRecord>> = HashMap::new();
    for r in records {
        let v = key.value_of(r);
        match buckets.get_mut(v) {
            Some(bucket) => bucket.push(r.clone()),
            None => {
                order.push(v.to_string());
                buckets.insert(v.to_string(), vec![r.clone()]);
            }
        }
    }

    let nodes = order
        .into_iter()
        .map(|value| {
            let members = buckets.remove(&value).unwrap_or_default();
            GroupNode {
                key,
                content: group_records(&members, rest),
                value,
            }
        })
        .collect();
    GroupContent::Groups(nodes)
}

pub fn group_records_ordered(
    records: &[MarkRecord],
    keys: &[GroupKey],
    order: GroupOrder,
) -> GroupContent {
    let mut grouped = group_records(records, keys);
    if order == GroupOrder::Lexical {
        grouped.sort_lexical();
    }
    grouped
}

impl GroupContent {
    pub fn sort_lexical(&mut self) {
        let GroupContent::Groups(nodes) = self else {
            return;
        };
        if nodes
            .first()
            .map(|n| n.key != GroupKey::Subject)
            .unwrap_or(false)
        {
            nodes.sort_by(|a, b| a.value.cmp(&b.value));
        }
        for n in nodes.iter_mut() {
            n.content.sort_lexical();
        }
    }

    /// Leaf groups in display order, each with its key path from the root.
    pub fn leaves(&self) -> Vec<(Vec<(GroupKey, &str)>, &[MarkRecord])> {
        let mut out = Vec::new();
        collect_leaves(self, &mut Vec::new(), &mut out);
        out
    }
}

fn collect_leaves<'a>(
    content: &'a GroupContent,
    path: &mut Vec<(GroupKey, &'a str)>,
    out: &mut Vec<(Vec<(GroupKey, &'a str)>, &'a [MarkRecord])>,
) {
    match content {
        GroupContent::Records(records) => {
            if !records.is_empty() {
                out.push((path.clone(), records.as_slice()));
            }
        }
        GroupContent::Groups(nodes) => {
            for n in nodes {
                path.push((n.key, n.value.as_str()));
                collect_leaves(&n.content, path, out);
                path.pop();
            }
        }
    }
}

/// Distinct values of one key field, for tab and accordion navigation.
pub fn group_keys(records: &[MarkRecord], key: GroupKey, order: GroupOrder) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for r in records {
        let v = key.value_of(r);
        if !seen.iter().any(|s| s == v) {
            seen.push(v.to_string());
        }
    }
    if order == GroupOrder::Lexical && key != GroupKey::Subject {
        seen.sort();
    }
    seen
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub id: String,
    pub student_name: String,
    pub marks: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChartMode {
    #[default]
    ByStudent,
    BySubjectAverage,
}

impl ChartMode {
    pub fn parse(raw: &str) -> Option<ChartMode> {
        match raw.trim() {
            "byStudent" => Some(ChartMode::ByStudent),
            "bySubjectAverage" => Some(ChartMode::BySubjectAverage),
            _ => None,
        }
    }
}

pub fn table_rows(records: &[MarkRecord]) -> Vec<TableRow> {
    records
        .iter()
        .map(|r| TableRow {
            id: r.id.clone(),
            student_name: r.student_name.clone(),
            marks: r.marks,
        })
        .collect()
}

pub fn chart_points(records: &[MarkRecord], mode: ChartMode) -> Vec<ChartPoint> {
    match mode {
        ChartMode::ByStudent => records
            .iter()
            .map(|r| ChartPoint {
                name: r.student_name.clone(),
                value: r.marks,
            })
            .collect(),
        ChartMode::BySubjectAverage => {
            let mut order: Vec<&str> = Vec::new();
            let mut by_subject: HashMap<&str, Vec<f64>> = HashMap::new();
            for r in records {
                let marks = by_subject.entry(r.subject.as_str()).or_insert_with(|| {
                    order.push(r.subject.as_str());
                    Vec::new()
                });
                marks.push(r.marks);
            }
            order
                .into_iter()
                .map(|subject| {
                    let marks = by_subject.get(subject).map(Vec::as_slice).unwrap_or(&[]);
                    ChartPoint {
                        name: subject.to_string(),
                        value: calculate_mark_statistics(marks).mean,
                    }
                })
                .collect()
        }
    }
}
