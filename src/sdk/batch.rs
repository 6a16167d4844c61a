//! OData `$batch` multipart encoding for multi-record creation.
//!
//! All records of one batch go into a single changeset, so the service
//! applies them atomically. Each response part is matched back to its
//! request by position.

use serde_json::Value;

use crate::error::Result;
use crate::sdk::types::Record;

/// Boundary and header value for a batch with the given id.
pub fn batch_content_type(batch_id: &str) -> String {
    format!("multipart/mixed; boundary=batch_{}", batch_id)
}

/// Build a `$batch` body that POSTs every record to `entity_set`.
pub fn build_batch_body(
    api: &str,
    entity_set: &str,
    records: &[Record],
    batch_id: &str,
    changeset_id: &str,
) -> Result<String> {
    let mut lines: Vec<String> = Vec::with_capacity(4 + records.len() * 11);

    lines.push(format!("--batch_{}", batch_id));
    lines.push(format!(
        "Content-Type: multipart/mixed; boundary=changeset_{}",
        changeset_id
    ));
    lines.push(String::new());

    for (i, record) in records.iter().enumerate() {
        lines.push(format!("--changeset_{}", changeset_id));
        lines.push("Content-Type: application/http".to_string());
        lines.push("Content-Transfer-Encoding: binary".to_string());
        lines.push(format!("Content-ID: {}", i + 1));
        lines.push(String::new());
        lines.push(format!("POST {}/{} HTTP/1.1", api, entity_set));
        lines.push("Content-Type: application/json".to_string());
        lines.push("Prefer: return=representation".to_string());
        lines.push(String::new());
        lines.push(serde_json::to_string(record)?);
        lines.push(String::new());
    }

    lines.push(format!("--changeset_{}--", changeset_id));
    lines.push(String::new());
    lines.push(format!("--batch_{}--", batch_id));

    Ok(lines.join("\r\n"))
}

/// Parse a `$batch` response into one slot per request.
///
/// Parts that did not return `201 Created`, or whose body is not a JSON
/// object, yield `None`. The result always has `expected` entries.
pub fn parse_batch_response(text: &str, expected: usize) -> Vec<Option<Record>> {
    let mut results: Vec<Option<Record>> = text
        .split("HTTP/1.1 ")
        .skip(1)
        .map(parse_part)
        .collect();

    results.resize(expected, None);
    results
}

fn parse_part(part: &str) -> Option<Record> {
    let mut lines = part.split("\r\n");
    let status_line = lines.next()?;
    if !status_line.starts_with("201") {
        return None;
    }

    // Body starts after the first blank line (end of the part's headers).
    let body_lines: Vec<&str> = lines.skip_while(|l| !l.trim().is_empty()).skip(1).collect();
    if body_lines.is_empty() {
        return None;
    }

    let body = body_lines.join("\r\n");
    let body = body.trim();
    if !body.starts_with('{') {
        return None;
    }
    let body = match body.find("}\r\n--") {
        Some(end) => &body[..=end],
        None => body,
    };

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
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
    fn test_build_batch_body_layout() {
        let body = build_batch_body(
            "https://org/api/data/v9.2",
            "accounts",
            &[record(json!({"name": "A"})), record(json!({"name": "B"}))],
            "b1",
            "c1",
        )
        .unwrap();

        let lines: Vec<&str> = body.split("\r\n").collect();
        assert_eq!(lines[0], "--batch_b1");
        assert_eq!(lines[1], "Content-Type: multipart/mixed; boundary=changeset_c1");
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "--changeset_c1");
        assert_eq!(lines[6], "Content-ID: 1");
        assert_eq!(lines[8], "POST https://org/api/data/v9.2/accounts HTTP/1.1");
        assert_eq!(lines[12], r#"{"name":"A"}"#);
        assert_eq!(lines[17], "Content-ID: 2");
        assert_eq!(*lines.last().unwrap(), "--batch_b1--");
        assert!(body.contains("--changeset_c1--\r\n\r\n--batch_b1--"));
        assert!(!body.ends_with("\r\n"));
    }

    #[test]
    fn test_batch_content_type() {
        assert_eq!(
            batch_content_type("abc"),
            "multipart/mixed; boundary=batch_abc"
        );
    }

    fn response_part(status: &str, body: &str) -> String {
        format!(
            "--changesetresponse_x\r\nContent-Type: application/http\r\nContent-Transfer-Encoding: binary\r\n\r\nHTTP/1.1 {}\r\nContent-Type: application/json; odata.metadata=minimal\r\n\r\n{}\r\n",
            status, body
        )
    }

    #[test]
    fn test_parse_batch_response_mixed() {
        let text = format!(
            "--batchresponse_x\r\nContent-Type: multipart/mixed; boundary=changesetresponse_x\r\n\r\n{}{}--changesetresponse_x--\r\n--batchresponse_x--\r\n",
            response_part("201 Created", r#"{"accountid":"11111111-1111-1111-1111-111111111111","name":"A"}"#),
            response_part("400 Bad Request", r#"{"error":{"message":"bad"}}"#),
        );

        let results = parse_batch_response(&text, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap()["name"], "A");
        assert!(results[1].is_none());
    }

    #[test]
    fn test_parse_batch_response_pads_and_truncates() {
        let one = format!(
            "{}--x--",
            response_part("201 Created", r#"{"id":"1"}"#)
        );
        assert_eq!(parse_batch_response(&one, 3).len(), 3);
        assert!(parse_batch_response(&one, 3)[2].is_none());
        assert_eq!(parse_batch_response(&one, 0).len(), 0);
        assert!(parse_batch_response("", 2).iter().all(|r| r.is_none()));
    }

    #[test]
    fn test_parse_part_trailing_boundary() {
        let part = "201 Created\r\nContent-Type: application/json\r\n\r\n{\"a\":1}\r\n--changesetresponse_x--";
        let rec = parse_part(part).unwrap();
        assert_eq!(rec["a"], 1);
    }

    #[test]
    fn test_parse_part_invalid_json() {
        assert!(parse_part("201 Created\r\n\r\n{not json").is_none());
        assert!(parse_part("201 Created\r\n\r\n[1,2]").is_none());
        assert!(parse_part("201 Created\r\nOData-EntityId: x").is_none());
    }
}
