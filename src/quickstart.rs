//! End-to-end walkthrough of the client against a live organisation.
//!
//! Ensures a sample table exists, creates records (one alone, the rest in
//! a batch), reads, updates and queries them, then deletes the records and
//! the table. Each step reports to the supplied writer.

use futures::future::try_join_all;
use serde::Serialize;
use serde_json::{json, Value};
use std::io::Write;
use tracing::info;

use crate::error::{Error, Result};
use crate::sdk::retry::{delays_from_secs, retry_with_delays};
use crate::sdk::types::{Record, TableInfo};
use crate::sdk::DataverseClient;

/// Schema name of the sample table.
pub const SAMPLE_TABLE: &str = "new_SampleItem";

/// Columns of the sample table.
pub const SAMPLE_COLUMNS: [(&str, &str); 5] = [
    ("code", "string"),
    ("count", "int"),
    ("amount", "decimal"),
    ("when", "datetime"),
    ("active", "bool"),
];

/// Statuses retried around record operations; a freshly created table
/// can answer 400/404 until it is fully provisioned.
pub const RETRY_STATUSES: [u16; 10] = [400, 403, 404, 409, 412, 429, 500, 502, 503, 504];

const RECORD_DELAYS_SECS: [u64; 5] = [0, 2, 5, 10, 20];
const SQL_DELAYS_SECS: [u64; 3] = [0, 2, 5];

fn retry_status(err: &Error) -> bool {
    err.status().is_some_and(|s| RETRY_STATUSES.contains(&s))
}

fn retry_sql(err: &Error) -> bool {
    let msg = err.to_string();
    msg.contains("Invalid table name") || msg.contains("Invalid object name")
}

/// Column names of the sample table, derived from its logical name.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleKeys {
    pub entity_set: String,
    pub logical: String,
    pub prefix: String,
}

impl SampleKeys {
    pub fn from_table_info(info: &TableInfo) -> Result<Self> {
        let entity_set = info.entity_set_name.clone().ok_or_else(|| {
            Error::UnexpectedResponse(format!("{} has no entity set name", info.entity_schema))
        })?;
        let logical = info
            .entity_logical_name
            .clone()
            .unwrap_or_else(|| entity_set.trim_end_matches('s').to_string());
        let prefix = match logical.split_once('_') {
            Some((p, _)) => p.to_string(),
            None => logical.clone(),
        };

        Ok(Self {
            entity_set,
            logical,
            prefix,
        })
    }

    /// Attribute logical name for a sample field.
    pub fn key(&self, field: &str) -> String {
        format!("{}_{}", self.prefix, field)
    }

    /// Primary id column.
    pub fn id_key(&self) -> String {
        format!("{}id", self.logical)
    }

    /// Payload for one sample record.
    pub fn payload(
        &self,
        name: &str,
        code: &str,
        count: i64,
        amount: f64,
        when: &str,
        active: bool,
    ) -> Record {
        let mut rec = Record::new();
        rec.insert(self.key("name"), json!(name));
        rec.insert(self.key("code"), json!(code));
        rec.insert(self.key("count"), json!(count));
        rec.insert(self.key("amount"), json!(amount));
        rec.insert(self.key("when"), json!(when));
        rec.insert(self.key("active"), json!(active));
        rec
    }

    pub fn summary(&self, id: Option<String>, rec: &Record) -> Summary {
        let field = |f: &str| rec.get(&self.key(f)).cloned().unwrap_or(Value::Null);
        Summary {
            id,
            code: field("code"),
            count: field("count"),
            amount: field("amount"),
            when: field("when"),
        }
    }
}

/// One line of record output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub id: Option<String>,
    pub code: Value,
    pub count: Value,
    pub amount: Value,
    pub when: Value,
}

fn show(v: &Value) -> String {
    match v {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            " - id={} code={} count={} amount={} when={}",
            self.id.as_deref().unwrap_or("-"),
            show(&self.code),
            show(&self.count),
            show(&self.amount),
            show(&self.when)
        )
    }
}

/// Write a label followed by one line per summary.
pub fn print_line_summaries<W: Write>(
    out: &mut W,
    label: &str,
    summaries: &[Summary],
) -> Result<()> {
    writeln!(out, "{}", label)?;
    for s in summaries {
        writeln!(out, "{}", s)?;
    }
    Ok(())
}

fn as_f64(v: Option<&Value>) -> Option<f64> {
    match v? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Check an updated record against the values that were written.
pub fn verify_update(keys: &SampleKeys, rec: &Record) -> Result<()> {
    let expected = [
        (keys.key("code"), json!("X002")),
        (keys.key("count"), json!(99)),
        (keys.key("active"), json!(false)),
    ];
    for (k, v) in &expected {
        let got = rec.get(k).unwrap_or(&Value::Null);
        if got != v {
            return Err(Error::UnexpectedResponse(format!(
                "Field {} expected {}, got {}",
                k, v, got
            )));
        }
    }

    let amount_key = keys.key("amount");
    match as_f64(rec.get(&amount_key)) {
        Some(got) if (got - 543.21).abs() < 1e-6 => Ok(()),
        _ => Err(Error::UnexpectedResponse(format!(
            "Field {} expected 543.21, got {}",
            amount_key,
            rec.get(&amount_key).unwrap_or(&Value::Null)
        ))),
    }
}

/// What the walkthrough did.
#[derive(Debug, Clone, Serialize)]
pub struct QuickstartReport {
    pub table: TableInfo,
    pub existed: bool,
    pub created_ids: Vec<String>,
    pub updated: bool,
    pub sql_rows: usize,
    pub deleted_ids: Vec<String>,
    pub table_deleted: bool,
    /// Failures of non-fatal steps
    pub errors: Vec<String>,
}

/// Run the walkthrough, writing progress to `out`.
///
/// Table setup, record creation and the update check are fatal; read, SQL
/// and cleanup failures are reported and the walkthrough continues.
pub async fn run<W: Write>(client: &DataverseClient, out: &mut W) -> Result<QuickstartReport> {
    let record_delays = delays_from_secs(&RECORD_DELAYS_SECS);
    let mut errors = Vec::new();

    // 1) Table
    writeln!(out, "Ensure custom table exists (Metadata):")?;
    info!("list_tables()");
    let tables = client.list_tables().await?;
    let existing = tables
        .iter()
        .any(|t| t.get("SchemaName").and_then(Value::as_str) == Some(SAMPLE_TABLE));

    let table = if existing {
        client
            .get_table_info(SAMPLE_TABLE)
            .await?
            .ok_or_else(|| Error::TableNotFound(SAMPLE_TABLE.to_string()))?
    } else {
        info!("create_table({})", SAMPLE_TABLE);
        client.create_table(SAMPLE_TABLE, &SAMPLE_COLUMNS).await?
    };
    writeln!(
        out,
        "{}",
        json!({
            "table": table.entity_schema,
            "existed": existing,
            "entity_set": table.entity_set_name,
            "logical": table.entity_logical_name,
            "metadata_id": table.metadata_id,
        })
    )?;

    let keys = SampleKeys::from_table_info(&table)?;
    let id_key = keys.id_key();
    let set = keys.entity_set.as_str();

    // 2) Create
    writeln!(out, "Create records (OData):")?;
    let payloads = [
        keys.payload("Sample A", "X001", 42, 123.45, "2025-01-01", true),
        keys.payload("Sample B", "X002", 7, 987.65, "2025-01-02", true),
        keys.payload("Sample C", "X003", 100, 222.22, "2025-01-03", false),
    ];

    info!("create({}, single)", set);
    let first = retry_with_delays(
        &record_delays,
        || client.create(set, &payloads[0]),
        retry_status,
    )
    .await?;
    info!("create({}, batch of {})", set, payloads.len() - 1);
    let rest = retry_with_delays(
        &record_delays,
        || client.create_many(set, &payloads[1..]),
        retry_status,
    )
    .await?;

    let failed = rest.iter().filter(|r| r.is_none()).count();
    if failed > 0 {
        writeln!(
            out,
            "Create failed: {} of {} batch records were not created",
            failed,
            rest.len()
        )?;
        return Err(Error::MissingRecordId);
    }

    let created: Vec<Record> = std::iter::once(first)
        .chain(rest.into_iter().flatten())
        .collect();
    let record_ids: Vec<String> = created
        .iter()
        .filter_map(|r| r.get(&id_key).and_then(Value::as_str).map(String::from))
        .collect();
    writeln!(out, "{}", json!({ "entity": keys.logical, "created_ids": record_ids }))?;
    let summaries: Vec<Summary> = created
        .iter()
        .map(|r| {
            let id = r.get(&id_key).and_then(Value::as_str).map(String::from);
            keys.summary(id, r)
        })
        .collect();
    print_line_summaries(out, "Created record summaries:", &summaries)?;

    if record_ids.is_empty() {
        return Err(Error::MissingRecordId);
    }

    // 3) Read
    writeln!(out, "Read (OData):")?;
    let reads = try_join_all(record_ids.iter().map(|rid| {
        let record_delays = &record_delays;
        let keys = &keys;
        async move {
            info!("get({}, {})", set, rid);
            let rec =
                retry_with_delays(record_delays, || client.get(set, rid, None), retry_status)
                    .await?;
            Ok::<_, Error>(keys.summary(Some(rid.clone()), &rec))
        }
    }))
    .await;
    match reads {
        Ok(summaries) => print_line_summaries(out, "Read record summaries:", &summaries)?,
        Err(e) => {
            writeln!(out, "Get failed: {}", e)?;
            errors.push(format!("read: {}", e));
        }
    }

    // 4) Update
    writeln!(out, "Update (OData) and verify:")?;
    let mut update = Record::new();
    update.insert(keys.key("code"), json!("X002"));
    update.insert(keys.key("count"), json!(99));
    update.insert(keys.key("amount"), json!(543.21));
    update.insert(keys.key("when"), json!("2025-02-02"));
    update.insert(keys.key("active"), json!(false));
    writeln!(out, "{}", json!({ "updating_to": update }))?;

    let target = &record_ids[0];
    info!("update({}, {})", set, target);
    let updated = retry_with_delays(
        &record_delays,
        || client.update(set, target, &update),
        retry_status,
    )
    .await?;
    verify_update(&keys, &updated)?;
    writeln!(out, "{}", json!({ "entity": keys.logical, "updated": true }))?;
    print_line_summaries(
        out,
        "Updated record summary:",
        &[keys.summary(Some(target.clone()), &updated)],
    )?;

    // 5) SQL
    writeln!(out, "Query (SQL via Custom API):")?;
    let sql = format!(
        "SELECT TOP 2 * FROM {} ORDER BY {} DESC",
        keys.logical,
        keys.key("amount")
    );
    info!("query_sql({})", sql);
    let mut sql_rows = 0;
    let sql_delays = delays_from_secs(&SQL_DELAYS_SECS);
    match retry_with_delays(&sql_delays, || client.query_sql(&sql), retry_sql).await {
        Ok(rows) => {
            sql_rows = rows.len();
            let ids: Vec<&str> = rows
                .iter()
                .filter_map(|r| r.get(&id_key).and_then(Value::as_str))
                .collect();
            writeln!(
                out,
                "{}",
                json!({ "entity": keys.logical, "rows": rows.len(), "ids": ids })
            )?;
            let summaries: Vec<Summary> = rows
                .iter()
                .map(|r| {
                    let id = r.get(&id_key).and_then(Value::as_str).map(String::from);
                    keys.summary(id, r)
                })
                .collect();
            print_line_summaries(out, "TDS record summaries (top 2 by amount):", &summaries)?;
        }
        Err(e) => {
            writeln!(out, "SQL via Custom API failed: {}", e)?;
            errors.push(format!("sql: {}", e));
        }
    }

    // 6) Delete records
    writeln!(out, "Delete (OData):")?;
    let mut deleted_ids = Vec::new();
    for rid in &record_ids {
        info!("delete({}, {})", set, rid);
        match retry_with_delays(&record_delays, || client.delete(set, rid), retry_status).await {
            Ok(()) => deleted_ids.push(rid.clone()),
            Err(e) => {
                writeln!(out, "Delete failed: {}", e)?;
                errors.push(format!("delete {}: {}", rid, e));
            }
        }
    }
    writeln!(out, "{}", json!({ "entity": keys.logical, "deleted_ids": deleted_ids }))?;

    // 7) Drop table
    writeln!(out, "Cleanup (Metadata):")?;
    let mut table_deleted = false;
    match client.get_table_info(SAMPLE_TABLE).await {
        Ok(Some(_)) => match client.delete_table(SAMPLE_TABLE).await {
            Ok(()) => {
                table_deleted = true;
                writeln!(out, "{}", json!({ "table_deleted": true }))?;
            }
            Err(e) => {
                writeln!(out, "Delete table failed: {}", e)?;
                errors.push(format!("delete table: {}", e));
            }
        },
        Ok(None) => writeln!(out, "{}", json!({ "table_deleted": false, "reason": "not found" }))?,
        Err(e) => {
            writeln!(out, "Delete table failed: {}", e)?;
            errors.push(format!("delete table: {}", e));
        }
    }

    Ok(QuickstartReport {
        table,
        existed: existing,
        created_ids: record_ids,
        updated: true,
        sql_rows,
        deleted_ids,
        table_deleted,
        errors,
    })
}
