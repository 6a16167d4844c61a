//! SQL queries through the Dataverse SQL Custom API.

use reqwest::Method;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::sdk::client::{DataverseClient, Payload};
use crate::sdk::types::Record;

/// Decode the `queryresult` field of a Custom API response.
///
/// The API returns the rows as a JSON-encoded string; `null` or an empty
/// string mean no rows.
pub fn parse_query_result(api_name: &str, data: &Value) -> Result<Vec<Record>> {
    let result = data.get("queryresult").ok_or_else(|| {
        Error::UnexpectedResponse(format!("{} response missing 'queryresult'.", api_name))
    })?;

    match result {
        Value::Null => Ok(Vec::new()),
        Value::String(s) if s.trim().is_empty() => Ok(Vec::new()),
        Value::String(s) => {
            let rows: Vec<Value> = serde_json::from_str(s.trim())?;
            rows.into_iter()
                .map(|row| match row {
                    Value::Object(map) => Ok(map),
                    other => Err(Error::UnexpectedResponse(format!(
                        "Unexpected row in queryresult: {}",
                        other
                    ))),
                })
                .collect()
        }
        other => Err(Error::UnexpectedResponse(format!(
            "Unexpected queryresult type: {}",
            json_type_name(other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl DataverseClient {
    /// Run a T-SQL `SELECT` and return the rows.
    pub async fn query_sql(&self, tsql: &str) -> Result<Vec<Record>> {
        let api_name = self.config().sql_api_name.clone();
        let data: Value = self
            .execute_json(
                Method::POST,
                &self.url(&api_name),
                &[],
                &[],
                Payload::Json(json!({ "querytext": tsql })),
            )
            .await?;

        parse_query_result(&api_name, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_queryresult() {
        let err = parse_query_result("McpExecuteSqlQuery", &json!({})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unexpected response: McpExecuteSqlQuery response missing 'queryresult'."
        );
    }

    #[test]
    fn test_null_and_empty() {
        assert!(parse_query_result("x", &json!({"queryresult": null}))
            .unwrap()
            .is_empty());
        assert!(parse_query_result("x", &json!({"queryresult": "  "}))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_rows_decoded() {
        let data = json!({"queryresult": "[{\"name\":\"A\",\"n\":1},{\"name\":\"B\",\"n\":2}]"});
        let rows = parse_query_result("x", &data).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["name"], "B");
    }

    #[test]
    fn test_unexpected_type() {
        let err = parse_query_result("x", &json!({"queryresult": 5})).unwrap_err();
        assert!(err.to_string().contains("number"));
    }

    #[test]
    fn test_invalid_json_string() {
        let err = parse_query_result("x", &json!({"queryresult": "not json"})).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
