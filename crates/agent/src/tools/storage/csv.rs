//! CSV profiling for the `analyze_csv` operation
//!
//! Parses a header row plus records (RFC 4180 quoting), infers a type per
//! column and reports per-column statistics, pairwise Pearson correlations
//! between numeric columns, and data quality warnings.

use serde_json::{json, Map, Value};
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use super::StoreError;

const TOP_VALUES: usize = 10;
const NULL_WARNING_PERCENT: f64 = 20.0;
const MEMORY_WARNING_MB: f64 = 1000.0;
const CARDINALITY_WARNING_RATIO: f64 = 0.9;

#[derive(Debug, Clone, Default)]
pub struct CsvOptions {
    pub sample_size: Option<usize>,
    pub specific_columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Int,
    Float,
    Text,
}

impl ColumnType {
    fn dtype(&self) -> &'static str {
        match self {
            ColumnType::Int => "int64",
            ColumnType::Float => "float64",
            ColumnType::Text => "object",
        }
    }

    fn is_numeric(&self) -> bool {
        !matches!(self, ColumnType::Text)
    }
}

struct Column<'a> {
    name: String,
    cells: Vec<Option<&'a str>>,
    kind: ColumnType,
}

impl<'a> Column<'a> {
    fn new(name: String, cells: Vec<Option<&'a str>>) -> Self {
        let values: Vec<&str> = cells.iter().flatten().copied().collect();
        let has_nulls = values.len() < cells.len();

        let kind = if !values.is_empty() && values.iter().all(|v| v.trim().parse::<i64>().is_ok())
        {
            // a missing value forces a float column
            if has_nulls {
                ColumnType::Float
            } else {
                ColumnType::Int
            }
        } else if !values.is_empty() && values.iter().all(|v| v.trim().parse::<f64>().is_ok()) {
            ColumnType::Float
        } else {
            ColumnType::Text
        };

        Self { name, cells, kind }
    }

    fn numbers(&self) -> Vec<Option<f64>> {
        self.cells
            .iter()
            .map(|cell| cell.and_then(|v| v.trim().parse::<f64>().ok()))
            .collect()
    }

    fn null_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_none()).count()
    }

    fn unique_values(&self) -> usize {
        self.cells.iter().flatten().collect::<HashSet<_>>().len()
    }
}

/// Profile a CSV document
pub fn analyze(body: &[u8], file_size: u64, options: &CsvOptions) -> Result<Value, StoreError> {
    let text = std::str::from_utf8(body)
        .map_err(|e| StoreError::InvalidParams(format!("CSV is not valid UTF-8: {}", e)))?;
    let mut records = parse_records(text)?;

    if records.is_empty() {
        return Err(StoreError::InvalidParams(
            "No columns to parse from file".to_string(),
        ));
    }
    let header = records.remove(0);

    if let Some(limit) = options.sample_size {
        records.truncate(limit);
    }

    let mut columns: Vec<Column> = header
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let cells = records
                .iter()
                .map(|row| {
                    row.get(index)
                        .map(|cell| cell.as_ref())
                        .filter(|cell| !cell.is_empty())
                })
                .collect();
            Column::new(name.to_string(), cells)
        })
        .collect();

    if let Some(wanted) = &options.specific_columns {
        let missing: Vec<&str> = wanted
            .iter()
            .filter(|name| !columns.iter().any(|c| &c.name == *name))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(StoreError::InvalidParams(format!(
                "Columns not found: {}",
                missing.join(", ")
            )));
        }
        let mut selected = Vec::with_capacity(wanted.len());
        for name in wanted {
            if let Some(index) = columns.iter().position(|c| &c.name == name) {
                selected.push(columns.swap_remove(index));
            }
        }
        columns = selected;
    }

    let total_rows = records.len();
    let basic_info = json!({
        "file_size_bytes": file_size,
        "file_size_mb": round(file_size as f64 / (1024.0 * 1024.0), 2),
        "total_rows": total_rows,
        "total_columns": columns.len(),
        "columns": columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>(),
        "sample_size": options.sample_size.unwrap_or(total_rows),
    });

    let mut column_analysis = Map::new();
    let mut warnings = Vec::new();

    for column in &columns {
        let analysis = analyze_column(column, total_rows);

        let null_percentage = analysis["null_percentage"].as_f64().unwrap_or(0.0);
        if null_percentage > NULL_WARNING_PERCENT {
            warnings.push(format!(
                "Column '{}' has {}% null values",
                column.name, null_percentage
            ));
        }

        column_analysis.insert(column.name.clone(), analysis);
    }

    let estimated_mb = (total_rows * columns.len() * 8) as f64 / (1024.0 * 1024.0);
    if estimated_mb > MEMORY_WARNING_MB {
        warnings.push(format!(
            "Large dataset detected. Estimated memory usage: {:.2} MB",
            estimated_mb
        ));
    }

    for column in columns.iter().filter(|c| !c.kind.is_numeric()) {
        let unique = column.unique_values();
        if total_rows > 0 && unique as f64 / total_rows as f64 > CARDINALITY_WARNING_RATIO {
            warnings.push(format!(
                "Column '{}' has high cardinality ({} unique values)",
                column.name, unique
            ));
        }
    }

    Ok(json!({
        "basic_info": basic_info,
        "column_analysis": column_analysis,
        "correlations": correlations(&columns),
        "warnings": warnings,
    }))
}

fn analyze_column(column: &Column, total_rows: usize) -> Value {
    let null_count = column.null_count();
    let null_percentage = if total_rows == 0 {
        0.0
    } else {
        round(null_count as f64 / total_rows as f64 * 100.0, 2)
    };

    let mut analysis = json!({
        "dtype": column.kind.dtype(),
        "null_count": null_count,
        "null_percentage": null_percentage,
        "unique_values": column.unique_values(),
    });

    let extra = if column.kind.is_numeric() {
        numeric_stats(&column.numbers().into_iter().flatten().collect::<Vec<_>>())
    } else {
        text_stats(column)
    };

    if let (Some(target), Value::Object(extra)) = (analysis.as_object_mut(), extra) {
        target.extend(extra);
    }
    analysis
}

fn numeric_stats(values: &[f64]) -> Value {
    if values.is_empty() {
        return json!({
            "min": null, "max": null, "mean": null, "median": null, "std": null,
            "zeros_count": 0, "negative_count": 0,
        });
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let median = if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    };
    let std = (n > 1).then(|| {
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        variance.sqrt()
    });

    json!({
        "min": sorted[0],
        "max": sorted[n - 1],
        "mean": mean,
        "median": median,
        "std": std,
        "zeros_count": values.iter().filter(|v| **v == 0.0).count(),
        "negative_count": values.iter().filter(|v| **v < 0.0).count(),
    })
}

fn text_stats(column: &Column) -> Value {
    let values: Vec<&str> = column.cells.iter().flatten().copied().collect();

    let whitespace_count = values
        .iter()
        .filter(|v| v.chars().all(char::is_whitespace))
        .count();
    let avg_length = if values.is_empty() {
        None
    } else {
        Some(values.iter().map(|v| v.chars().count()).sum::<usize>() as f64 / values.len() as f64)
    };

    // first-seen order breaks ties between equal counts
    let mut counts: Vec<(&str, usize)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for &value in &values {
        match index.get(value) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(value, counts.len());
                counts.push((value, 1));
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    let top_values: Vec<Value> = counts
        .into_iter()
        .take(TOP_VALUES)
        .map(|(value, count)| json!({ "value": value, "count": count }))
        .collect();

    json!({
        "whitespace_count": whitespace_count,
        "avg_length": avg_length,
        "top_values": top_values,
    })
}

/// Pearson coefficient for each numeric column pair, keyed `"{a}_{b}"`
fn correlations(columns: &[Column]) -> Map<String, Value> {
    let numeric: Vec<(&str, Vec<Option<f64>>)> = columns
        .iter()
        .filter(|c| c.kind.is_numeric())
        .map(|c| (c.name.as_str(), c.numbers()))
        .collect();

    let mut result = Map::new();
    for (i, (left_name, left)) in numeric.iter().enumerate() {
        for (right_name, right) in numeric.iter().skip(i + 1) {
            let pairs: Vec<(f64, f64)> = left
                .iter()
                .zip(right.iter())
                .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
                .collect();
            if let Some(r) = pearson(&pairs) {
                result.insert(format!("{}_{}", left_name, right_name), json!(round(r, 3)));
            }
        }
    }
    result
}

fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in pairs {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }

    let denominator = (var_x * var_y).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        None
    } else {
        Some(cov / denominator)
    }
}

fn round(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Split text into records. Quoted fields may contain commas, newlines and
/// doubled quotes. Blank lines are skipped.
fn parse_records(text: &str) -> Result<Vec<Vec<Cow<'_, str>>>, StoreError> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let bytes = text.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        let (field, next) = parse_field(text, pos)?;
        record.push(field);
        pos = next;

        match bytes.get(pos) {
            Some(b',') => {
                pos += 1;
                if pos == bytes.len() {
                    record.push(Cow::Borrowed(""));
                }
            }
            Some(b'\r') | Some(b'\n') => {
                if bytes[pos] == b'\r' && bytes.get(pos + 1) == Some(&b'\n') {
                    pos += 1;
                }
                pos += 1;
                push_record(&mut records, std::mem::take(&mut record));
            }
            None => {}
            Some(_) => {
                return Err(StoreError::InvalidParams(format!(
                    "Malformed CSV near byte {}",
                    pos
                )))
            }
        }
    }
    push_record(&mut records, record);

    Ok(records)
}

fn push_record<'a>(records: &mut Vec<Vec<Cow<'a, str>>>, record: Vec<Cow<'a, str>>) {
    let blank = record.is_empty() || (record.len() == 1 && record[0].is_empty());
    if !blank {
        records.push(record);
    }
}

/// Returns the field text and the position just past it. Surrounding quotes
/// are stripped and doubled quotes collapse to one.
fn parse_field(text: &str, start: usize) -> Result<(Cow<'_, str>, usize), StoreError> {
    let bytes = text.as_bytes();

    if bytes.get(start) != Some(&b'"') {
        let end = bytes[start..]
            .iter()
            .position(|b| matches!(b, b',' | b'\r' | b'\n'))
            .map_or(bytes.len(), |offset| start + offset);
        return Ok((Cow::Borrowed(&text[start..end]), end));
    }

    let mut pos = start + 1;
    let mut escaped = false;
    loop {
        match bytes.get(pos) {
            Some(b'"') if bytes.get(pos + 1) == Some(&b'"') => {
                escaped = true;
                pos += 2;
            }
            Some(b'"') => {
                let raw = &text[start + 1..pos];
                let field = if escaped {
                    Cow::Owned(raw.replace("\"\"", "\""))
                } else {
                    Cow::Borrowed(raw)
                };
                return Ok((field, pos + 1));
            }
            Some(_) => pos += 1,
            None => {
                return Err(StoreError::InvalidParams(
                    "Unterminated quoted field in CSV".to_string(),
                ))
            }
        }
    }
}
