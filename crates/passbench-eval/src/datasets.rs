//! Loaders for the reference problem CSV and the prediction JSON file,
//! and the id join that pairs them for scoring.

use std::collections::HashMap;
use std::path::Path;

use passbench_core::{PassbenchError, Result};
use serde_json::Value;
use tracing::{debug, warn};

/// Keys accepted for the problem id in list-form prediction records,
/// tried in order.
pub const ID_KEYS: [&str; 4] = ["id", "ID", "sample_id", "idx"];

/// Keys accepted for the generated solution in list-form prediction
/// records, tried in order.
pub const RESPONSE_KEYS: [&str; 5] = ["response", "output", "code", "generated_code", "prediction"];

/// One row of the reference set: a problem id and its raw (still
/// encoded) assertion list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemRecord {
    pub id: i64,
    pub test_list_raw: String,
}

/// A reference row joined with its prediction, if one was supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedEntry {
    pub id: i64,
    pub test_list_raw: String,
    pub response: Option<String>,
}

/// Load the reference problem set from CSV.
///
/// Expected shape (extra columns are ignored):
/// ```csv
/// id,test_list
/// 11,"['assert remove_occ(\"hello\",\"l\") == \"heo\"', ...]"
/// ```
///
/// The header row is required. A header with zero data rows is a valid,
/// empty reference set. Malformed CSV or a non-integer id is a hard
/// error carrying the 1-based row number.
pub fn load_reference(path: impl AsRef<Path>) -> Result<Vec<ProblemRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PassbenchError::DatasetNotFound(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    let text = content.strip_prefix('\u{feff}').unwrap_or(content.as_str());
    let records = parse_csv(path, text)?;

    let Some(header) = records.first() else {
        return Err(PassbenchError::MalformedReference {
            path: path.display().to_string(),
            row: 1,
            reason: "missing header row".to_string(),
        });
    };
    let id_col = find_column(header, "id")?;
    let test_col = find_column(header, "test_list")?;

    let mut problems = Vec::with_capacity(records.len().saturating_sub(1));
    for (i, row) in records[1..].iter().enumerate() {
        let row_number = i + 2;
        if row.len() != header.len() {
            return Err(PassbenchError::MalformedReference {
                path: path.display().to_string(),
                row: row_number,
                reason: format!("expected {} fields, found {}", header.len(), row.len()),
            });
        }
        let raw_id = row[id_col].trim();
        let id = raw_id.parse::<i64>().map_err(|_| PassbenchError::MalformedReference {
            path: path.display().to_string(),
            row: row_number,
            reason: format!("id '{raw_id}' is not an integer"),
        })?;
        problems.push(ProblemRecord {
            id,
            test_list_raw: row[test_col].clone(),
        });
    }
    debug!(count = problems.len(), "loaded reference problems");
    Ok(problems)
}

/// Load predictions into an id -> response map.
///
/// Two layouts are accepted:
/// - a list of records, each carrying one of [`ID_KEYS`] and one of
///   [`RESPONSE_KEYS`]:
///   `[{"id": 11, "response": "def remove_occ(...): ..."}, ...]`
/// - a mapping from id string to response:
///   `{"11": "def remove_occ(...): ...", ...}`
///
/// Records that cannot be attributed to an integer id are skipped with
/// a warning; a later record for the same id replaces an earlier one. A
/// `null` response counts as no prediction at all.
pub fn load_predictions(path: impl AsRef<Path>) -> Result<HashMap<i64, String>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PassbenchError::DatasetNotFound(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)?;

    let mut out = HashMap::new();
    match value {
        Value::Array(records) => {
            for (index, record) in records.iter().enumerate() {
                let Value::Object(fields) = record else {
                    warn!(index, "skipping non-mapping prediction record");
                    continue;
                };
                let id_value = ID_KEYS.iter().find_map(|k| fields.get(*k));
                let resp_value = RESPONSE_KEYS.iter().find_map(|k| fields.get(*k));
                let (Some(id_value), Some(resp_value)) = (id_value, resp_value) else {
                    warn!(index, "skipping prediction record without id and response keys");
                    continue;
                };
                let Some(id) = coerce_id(id_value) else {
                    warn!(index, "skipping prediction record with non-integer id");
                    continue;
                };
                match coerce_response(resp_value) {
                    Some(text) => {
                        out.insert(id, text);
                    }
                    None => {
                        out.remove(&id);
                    }
                }
            }
        }
        Value::Object(map) => {
            for (key, val) in &map {
                let Ok(id) = key.trim().parse::<i64>() else {
                    warn!(key = %key, "skipping prediction with non-integer id");
                    continue;
                };
                match coerce_response(val) {
                    Some(text) => {
                        out.insert(id, text);
                    }
                    None => {
                        out.remove(&id);
                    }
                }
            }
        }
        _ => {
            return Err(PassbenchError::BadPredictions {
                path: path.display().to_string(),
                reason: "top-level value must be a list or a mapping".to_string(),
            });
        }
    }
    debug!(count = out.len(), "loaded predictions");
    Ok(out)
}

/// Left join: every reference row yields an entry, in reference order,
/// with the prediction attached where one exists.
pub fn merge(reference: &[ProblemRecord], predictions: &HashMap<i64, String>) -> Vec<MergedEntry> {
    reference
        .iter()
        .map(|record| MergedEntry {
            id: record.id,
            test_list_raw: record.test_list_raw.clone(),
            response: predictions.get(&record.id).cloned(),
        })
        .collect()
}

fn find_column(header: &[String], name: &str) -> Result<usize> {
    header
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| PassbenchError::MissingColumn(name.to_string()))
}

fn coerce_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i),
            None => n
                .as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64),
        },
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_response(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CsvState {
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

/// Minimal RFC-4180 reader: quoted fields may contain commas, newlines
/// and doubled quotes. Blank lines are skipped. Anything between a
/// closing quote and the next delimiter is an error.
fn parse_csv(path: &Path, content: &str) -> Result<Vec<Vec<String>>> {
    let mut records: Vec<Vec<String>> = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut state = CsvState::FieldStart;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            CsvState::FieldStart => match c {
                '"' => state = CsvState::Quoted,
                ',' => record.push(String::new()),
                '\r' | '\n' => {
                    if c == '\r' && chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    record.push(std::mem::take(&mut field));
                    push_record(&mut records, &mut record);
                }
                other => {
                    field.push(other);
                    state = CsvState::Unquoted;
                }
            },
            CsvState::Unquoted => match c {
                ',' => {
                    record.push(std::mem::take(&mut field));
                    state = CsvState::FieldStart;
                }
                '\r' | '\n' => {
                    if c == '\r' && chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    record.push(std::mem::take(&mut field));
                    push_record(&mut records, &mut record);
                    state = CsvState::FieldStart;
                }
                other => field.push(other),
            },
            CsvState::Quoted => match c {
                '"' => state = CsvState::QuoteInQuoted,
                other => field.push(other),
            },
            CsvState::QuoteInQuoted => match c {
                '"' => {
                    field.push('"');
                    state = CsvState::Quoted;
                }
                ',' => {
                    record.push(std::mem::take(&mut field));
                    state = CsvState::FieldStart;
                }
                '\r' | '\n' => {
                    if c == '\r' && chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    record.push(std::mem::take(&mut field));
                    push_record(&mut records, &mut record);
                    state = CsvState::FieldStart;
                }
                _ => {
                    return Err(PassbenchError::MalformedReference {
                        path: path.display().to_string(),
                        row: records.len() + 1,
                        reason: "unexpected character after closing quote".to_string(),
                    });
                }
            },
        }
    }

    match state {
        CsvState::Quoted => {
            return Err(PassbenchError::MalformedReference {
                path: path.display().to_string(),
                row: records.len() + 1,
                reason: "unterminated quoted field".to_string(),
            });
        }
        CsvState::Unquoted | CsvState::QuoteInQuoted => {
            record.push(std::mem::take(&mut field));
            push_record(&mut records, &mut record);
        }
        CsvState::FieldStart => {
            // A trailing comma right before EOF leaves one empty field due.
            if !record.is_empty() {
                record.push(String::new());
                push_record(&mut records, &mut record);
            }
        }
    }
    Ok(records)
}

fn push_record(records: &mut Vec<Vec<String>>, record: &mut Vec<String>) {
    let finished = std::mem::take(record);
    // A single empty field is a blank line, not data.
    if finished.len() == 1 && finished[0].is_empty() {
        return;
    }
    records.push(finished);
}
