//! CLI subcommand execution.

use anyhow::{anyhow, bail, Context};
use serde::Serialize;
use serde_json::Value;
use std::io::{self, Write};
use tracing::info;

use crate::config::{Command, Config};
use crate::quickstart;
use crate::sdk::types::Record;
use crate::sdk::{DataverseClient, RecordFrame};

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Parse a JSON object argument into a record.
pub fn parse_record(json: &str) -> anyhow::Result<Record> {
    match serde_json::from_str::<Value>(json).context("invalid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("expected a JSON object, got {}", other),
    }
}

/// Parse JSON that is either one object or an array of objects.
pub fn parse_records(json: &str) -> anyhow::Result<Vec<Record>> {
    match serde_json::from_str::<Value>(json).context("invalid JSON")? {
        Value::Object(map) => Ok(vec![map]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map),
                other => Err(anyhow!("expected a JSON object, got {}", other)),
            })
            .collect(),
        other => bail!("expected a JSON object or array, got {}", other),
    }
}

/// Parse a `name:type` column argument.
pub fn parse_column(spec: &str) -> anyhow::Result<(String, String)> {
    match spec.split_once(':') {
        Some((name, dtype)) if !name.trim().is_empty() && !dtype.trim().is_empty() => {
            Ok((name.trim().to_string(), dtype.trim().to_string()))
        }
        _ => bail!("column '{}' must be given as name:type", spec),
    }
}

/// Connect to the configured organisation and run `command`.
pub async fn run(config: Config, command: Command) -> anyhow::Result<()> {
    let org_url = config
        .org_url
        .clone()
        .ok_or_else(|| anyhow!("an organisation URL is required (--org-url or DATAVERSE_URL)"))?;

    let client = DataverseClient::connect(&org_url, config.credentials, config.client)
        .await
        .context("failed to set up Dataverse client")?;
    info!("Connected to {}", client.base_url());

    match command {
        Command::Quickstart => {
            let mut out = io::stdout();
            let report = quickstart::run(&client, &mut out).await?;
            print_json(&report)?;
        }
        Command::Tables => {
            let tables = client.list_tables().await?;
            print_json(&tables)?;
        }
        Command::TableInfo { name } => match client.get_table_info(&name).await? {
            Some(info) => print_json(&info)?,
            None => bail!("table '{}' not found", name),
        },
        Command::CreateTable { name, columns } => {
            let columns = columns
                .iter()
                .map(|c| parse_column(c))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let columns: Vec<(&str, &str)> = columns
                .iter()
                .map(|(n, t)| (n.as_str(), t.as_str()))
                .collect();
            let info = client.create_table(&name, &columns).await?;
            print_json(&info)?;
        }
        Command::DeleteTable { name } => {
            client.delete_table(&name).await?;
            print_json(&serde_json::json!({ "table_deleted": name }))?;
        }
        Command::Get {
            entity_set,
            id,
            select,
        } => {
            let record = client.get(&entity_set, &id, select.as_deref()).await?;
            print_json(&record)?;
        }
        Command::Create { entity_set, json } => {
            let mut records = parse_records(&json)?;
            if records.len() == 1 {
                let record = records.remove(0);
                print_json(&client.create(&entity_set, &record).await?)?;
            } else {
                print_json(&client.create_many(&entity_set, &records).await?)?;
            }
        }
        Command::Update {
            entity_set,
            id,
            json,
        } => {
            let data = parse_record(&json)?;
            print_json(&client.update(&entity_set, &id, &data).await?)?;
        }
        Command::Delete { entity_set, id } => {
            client.delete(&entity_set, &id).await?;
            print_json(&serde_json::json!({ "deleted": id }))?;
        }
        Command::Sql { query, csv } => {
            if csv {
                let frame = client.query_sql_frame(&query).await?;
                frame.write_csv(io::stdout().lock())?;
            } else {
                print_json(&client.query_sql(&query).await?)?;
            }
        }
        Command::Import { entity_set, file } => {
            let reader = std::fs::File::open(&file)
                .with_context(|| format!("failed to open {}", file.display()))?;
            let frame = RecordFrame::from_csv(reader)?;
            info!("Importing {} rows into {}", frame.len(), entity_set);
            let ids = client.create_frame_ids(&entity_set, &frame).await?;
            print_json(&ids)?;
        }
        Command::Upload {
            entity_set,
            id,
            column,
            file,
            mode,
        } => {
            let report = client
                .upload_path(&entity_set, &id, &column, &file, mode)
                .await?;
            print_json(&report)?;
        }
        Command::Download {
            entity_set,
            id,
            column,
            output,
        } => {
            let data = client.download_file(&entity_set, &id, &column).await?;
            tokio::fs::write(&output, &data)
                .await
                .with_context(|| format!("failed to write {}", output.display()))?;
            print_json(&serde_json::json!({ "path": output, "size": data.len() }))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record() {
        let rec = parse_record(r#"{"name": "Contoso"}"#).unwrap();
        assert_eq!(rec["name"], "Contoso");
        assert!(parse_record("[1]").is_err());
        assert!(parse_record("{").is_err());
    }

    #[test]
    fn test_parse_records() {
        assert_eq!(parse_records(r#"{"a": 1}"#).unwrap().len(), 1);
        assert_eq!(parse_records(r#"[{"a": 1}, {"a": 2}]"#).unwrap().len(), 2);
        assert!(parse_records(r#"[{"a": 1}, 2]"#).is_err());
        assert!(parse_records("3").is_err());
    }

    #[test]
    fn test_parse_column() {
        assert_eq!(
            parse_column("code:string").unwrap(),
            ("code".to_string(), "string".to_string())
        );
        assert_eq!(
            parse_column(" amount : decimal ").unwrap(),
            ("amount".to_string(), "decimal".to_string())
        );
        assert!(parse_column("code").is_err());
        assert!(parse_column(":int").is_err());
    }
}
