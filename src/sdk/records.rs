//! Record CRUD against entity sets.

use regex::Regex;
use reqwest::Method;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::sdk::batch::{batch_content_type, build_batch_body, parse_batch_response};
use crate::sdk::client::{DataverseClient, Payload};
use crate::sdk::types::Record;

fn guid_pattern() -> &'static Regex {
    static GUID: OnceLock<Regex> = OnceLock::new();
    GUID.get_or_init(|| Regex::new(r"^[0-9a-fA-F-]{36}$").expect("valid GUID pattern"))
}

/// Normalise a record key into the `(key)` URL segment.
///
/// Already parenthesised keys (including alternate keys such as
/// `(accountnumber='A1')`) are passed through.
pub fn format_key(key: &str) -> String {
    let k = key.trim();
    if k.starts_with('(') && k.ends_with(')') {
        k.to_string()
    } else {
        format!("({})", k)
    }
}

/// Primary id of a created record.
///
/// Takes the first column, in response order, whose name ends with `id` and
/// whose value is a GUID-shaped string.
pub fn extract_id(record: &Record) -> Result<String> {
    record
        .iter()
        .find_map(|(k, v)| match v {
            Value::String(s)
                if k.to_lowercase().ends_with("id") && guid_pattern().is_match(s.trim()) =>
            {
                Some(s.clone())
            }
            _ => None,
        })
        .ok_or(Error::MissingRecordId)
}

fn return_representation() -> (&'static str, String) {
    ("Prefer", "return=representation".to_string())
}

fn if_match_any() -> (&'static str, String) {
    ("If-Match", "*".to_string())
}

impl DataverseClient {
    fn record_url(&self, entity_set: &str, key: &str) -> String {
        self.url(&format!("{}{}", entity_set, format_key(key)))
    }

    /// Create a single record and return its representation.
    pub async fn create(&self, entity_set: &str, record: &Record) -> Result<Record> {
        self.execute_json(
            Method::POST,
            &self.url(entity_set),
            &[return_representation()],
            &[],
            Payload::Json(Value::Object(record.clone())),
        )
        .await
    }

    /// Create a single record and return only its id.
    pub async fn create_id(&self, entity_set: &str, record: &Record) -> Result<String> {
        let created = self.create(entity_set, record).await?;
        extract_id(&created)
    }

    /// Create many records through `$batch` requests.
    ///
    /// Returns one slot per input record, in input order; a slot is `None`
    /// when the service did not return a representation for that record.
    pub async fn create_many(
        &self,
        entity_set: &str,
        records: &[Record],
    ) -> Result<Vec<Option<Record>>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = self.config().batch_size.max(1);
        let mut results = Vec::with_capacity(records.len());

        for (n, chunk) in records.chunks(batch_size).enumerate() {
            debug!(
                "Creating batch {} of {} records in {}",
                n + 1,
                chunk.len(),
                entity_set
            );
            results.extend(self.execute_batch_create(entity_set, chunk).await?);
        }

        let failed = results.iter().filter(|r| r.is_none()).count();
        if failed > 0 {
            warn!("{} of {} records were not created", failed, records.len());
        }
        info!("Created {} records in {}", records.len() - failed, entity_set);

        Ok(results)
    }

    /// Create many records and return their ids.
    ///
    /// Fails with [`Error::MissingRecordId`] if any record was not created.
    pub async fn create_many_ids(
        &self,
        entity_set: &str,
        records: &[Record],
    ) -> Result<Vec<String>> {
        self.create_many(entity_set, records)
            .await?
            .iter()
            .map(|r| r.as_ref().ok_or(Error::MissingRecordId).and_then(extract_id))
            .collect()
    }

    async fn execute_batch_create(
        &self,
        entity_set: &str,
        records: &[Record],
    ) -> Result<Vec<Option<Record>>> {
        let batch_id = Uuid::new_v4().to_string();
        let changeset_id = Uuid::new_v4().to_string();
        let body = build_batch_body(self.api_url(), entity_set, records, &batch_id, &changeset_id)?;

        let response = self
            .execute(
                Method::POST,
                &self.url("$batch"),
                &[("Content-Type", batch_content_type(&batch_id))],
                &[],
                Payload::Text(body),
            )
            .await?;

        let text = response.text().await?;
        Ok(parse_batch_response(&text, records.len()))
    }

    /// Retrieve a record, optionally restricted to a comma separated column list.
    pub async fn get(&self, entity_set: &str, key: &str, select: Option<&str>) -> Result<Record> {
        let query: Vec<(&str, String)> = select
            .filter(|s| !s.trim().is_empty())
            .map(|s| vec![("$select", s.to_string())])
            .unwrap_or_default();

        self.execute_json(
            Method::GET,
            &self.record_url(entity_set, key),
            &[],
            &query,
            Payload::Empty,
        )
        .await
    }

    /// Update a record and return its new representation.
    pub async fn update(&self, entity_set: &str, key: &str, data: &Record) -> Result<Record> {
        self.execute_json(
            Method::PATCH,
            &self.record_url(entity_set, key),
            &[if_match_any(), return_representation()],
            &[],
            Payload::Json(Value::Object(data.clone())),
        )
        .await
    }

    /// Delete a record.
    pub async fn delete(&self, entity_set: &str, key: &str) -> Result<()> {
        self.execute(
            Method::DELETE,
            &self.record_url(entity_set, key),
            &[if_match_any()],
            &[],
            Payload::Empty,
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_format_key() {
        assert_eq!(format_key("abc"), "(abc)");
        assert_eq!(
            format_key(" 00000000-0000-0000-0000-000000000001 "),
            "(00000000-0000-0000-0000-000000000001)"
        );
        assert_eq!(format_key("(name='x')"), "(name='x')");
    }

    #[test]
    fn test_extract_id_first_guid_column() {
        let rec = record(json!({
            "@odata.etag": "W/\"123\"",
            "new_name": "Sample A",
            "statuscode": 1,
            "new_sampleitemid": "a1b2c3d4-0000-1111-2222-333344445555",
            "ownerid": "ffffffff-0000-1111-2222-333344445555"
        }));
        assert_eq!(
            extract_id(&rec).unwrap(),
            "a1b2c3d4-0000-1111-2222-333344445555"
        );
    }

    #[test]
    fn test_extract_id_case_insensitive_suffix() {
        let rec = record(json!({"AccountID": "a1b2c3d4-0000-1111-2222-333344445555"}));
        assert!(extract_id(&rec).is_ok());
    }

    #[test]
    fn test_extract_id_missing() {
        let rec = record(json!({"accountid": "not-a-guid", "name": "x"}));
        assert!(matches!(extract_id(&rec), Err(Error::MissingRecordId)));
        assert!(matches!(extract_id(&Record::new()), Err(Error::MissingRecordId)));
    }
}
