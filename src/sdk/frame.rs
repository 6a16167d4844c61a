//! Tabular adapter: move rows between CSV and Dataverse tables.

use serde::Serialize;
use serde_json::{Number, Value};
use std::io::{Read, Write};

use crate::error::Result;
use crate::sdk::client::DataverseClient;
use crate::sdk::records::extract_id;
use crate::sdk::types::Record;

/// Column-ordered table of JSON cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordFrame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Infer a JSON value from a CSV cell.
///
/// Cells are trimmed. Only lowercase `true`/`false` become booleans; any
/// other non-numeric text stays a string.
pub fn parse_cell(raw: &str) -> Value {
    let s = raw.trim();
    if s.is_empty() {
        return Value::Null;
    }
    match s {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Some(n) = s.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(s.to_string())
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl RecordFrame {
    /// Read a frame from CSV with a header row.
    pub fn from_csv<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv::Reader::from_reader(reader);
        let columns = csv.headers()?.iter().map(|h| h.trim().to_string()).collect();

        let mut rows = Vec::new();
        for row in csv.records() {
            rows.push(row?.iter().map(parse_cell).collect());
        }

        Ok(Self { columns, rows })
    }

    /// Build a frame from records; columns are the union of keys in first-seen order.
    pub fn from_records(records: &[Record]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .iter()
            .map(|r| {
                columns
                    .iter()
                    .map(|c| r.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as records, leaving out null cells.
    pub fn to_records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .filter(|(_, v)| !v.is_null())
                    .map(|(c, v)| (c.clone(), v.clone()))
                    .collect()
            })
            .collect()
    }

    /// Write the frame as CSV with a header row.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        // no columns: nothing to write, not even a header
        if self.columns.is_empty() {
            return Ok(());
        }

        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(&self.columns)?;
        for row in &self.rows {
            csv.write_record(row.iter().map(cell_text))?;
        }
        csv.flush()?;
        Ok(())
    }
}

impl DataverseClient {
    /// Create one record per frame row.
    pub async fn create_frame(
        &self,
        entity_set: &str,
        frame: &RecordFrame,
    ) -> Result<Vec<Option<Record>>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        self.create_many(entity_set, &frame.to_records()).await
    }

    /// Create one record per frame row and return ids aligned with the rows.
    pub async fn create_frame_ids(
        &self,
        entity_set: &str,
        frame: &RecordFrame,
    ) -> Result<Vec<Option<String>>> {
        Ok(self
            .create_frame(entity_set, frame)
            .await?
            .iter()
            .map(|r| r.as_ref().and_then(|r| extract_id(r).ok()))
            .collect())
    }

    /// Run a SQL query and return the rows as a frame.
    pub async fn query_sql_frame(&self, tsql: &str) -> Result<RecordFrame> {
        let rows = self.query_sql(tsql).await?;
        Ok(RecordFrame::from_records(&rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_cell() {
        assert_eq!(parse_cell(""), Value::Null);
        assert_eq!(parse_cell("  "), Value::Null);
        assert_eq!(parse_cell("true"), json!(true));
        assert_eq!(parse_cell(" false "), json!(false));
        assert_eq!(parse_cell("TRUE"), json!("TRUE"));
        assert_eq!(parse_cell("  padded  "), json!("padded"));
        assert_eq!(parse_cell("42"), json!(42));
        assert_eq!(parse_cell("123.45"), json!(123.45));
        assert_eq!(parse_cell("X001"), json!("X001"));
        assert_eq!(parse_cell("2025-01-01"), json!("2025-01-01"));
    }

    #[test]
    fn test_from_csv() {
        let data = "new_name,new_count,new_amount,new_active\nSample A,42,123.45,true\nSample B,,7,false\n";
        let frame = RecordFrame::from_csv(data.as_bytes()).unwrap();

        assert_eq!(frame.columns, vec!["new_name", "new_count", "new_amount", "new_active"]);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.rows[0][1], json!(42));
        assert_eq!(frame.rows[1][1], Value::Null);

        let records = frame.to_records();
        assert_eq!(records[0].len(), 4);
        assert!(!records[1].contains_key("new_count"));
        assert_eq!(records[1]["new_active"], json!(false));
    }

    #[test]
    fn test_from_csv_ragged_row_is_error() {
        let data = "a,b\n1\n";
        assert!(RecordFrame::from_csv(data.as_bytes()).is_err());
    }

    #[test]
    fn test_from_records_union_columns() {
        let a = json!({"id": "1", "name": "A"}).as_object().cloned().unwrap();
        let b = json!({"id": "2", "extra": 5}).as_object().cloned().unwrap();
        let frame = RecordFrame::from_records(&[a, b]);

        assert_eq!(frame.columns, vec!["id", "name", "extra"]);
        assert_eq!(frame.rows[1], vec![json!("2"), Value::Null, json!(5)]);
    }

    #[test]
    fn test_write_csv_without_columns_is_empty() {
        let mut out = Vec::new();
        RecordFrame::from_records(&[]).write_csv(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_write_csv() {
        let frame = RecordFrame {
            columns: vec!["name".to_string(), "count".to_string(), "note".to_string()],
            rows: vec![vec![json!("A, inc"), json!(3), Value::Null]],
        };
        let mut out = Vec::new();
        frame.write_csv(&mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "name,count,note\n\"A, inc\",3,\n"
        );
    }
}
