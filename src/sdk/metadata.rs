//! Table metadata: listing, lookup, creation and deletion of custom tables.

use regex::Regex;
use reqwest::Method;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::OnceLock;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::DEFAULT_ENTITY_READY_DELAYS_SECS;
use crate::error::{Error, Result};
use crate::sdk::client::{DataverseClient, Payload};
use crate::sdk::retry::delays_from_secs;
use crate::sdk::types::{Collection, EntityDefinition, Record, TableInfo};

/// Publisher prefix used when a table name carries none.
pub const DEFAULT_PUBLISHER_PREFIX: &str = "new";

/// Type name that [`ColumnType`] does not accept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported column type '{0}'")]
pub struct UnknownColumnType(pub String);

/// Column types accepted by [`DataverseClient::create_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Integer,
    Decimal,
    Double,
    DateTime,
    Boolean,
}

impl FromStr for ColumnType {
    type Err = UnknownColumnType;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "string" | "text" => Ok(ColumnType::String),
            "int" | "integer" => Ok(ColumnType::Integer),
            "decimal" | "money" => Ok(ColumnType::Decimal),
            "float" | "double" => Ok(ColumnType::Double),
            "datetime" | "date" => Ok(ColumnType::DateTime),
            "bool" | "boolean" => Ok(ColumnType::Boolean),
            _ => Err(UnknownColumnType(s.to_string())),
        }
    }
}

/// Localised label in the metadata wire shape.
pub fn label(text: &str, language_code: u32) -> Value {
    json!({
        "@odata.type": "Microsoft.Dynamics.CRM.Label",
        "LocalizedLabels": [{
            "@odata.type": "Microsoft.Dynamics.CRM.LocalizedLabel",
            "Label": text,
            "LanguageCode": language_code,
        }],
    })
}

/// `sample item-code` -> `SampleItemCode`.
pub fn to_pascal(name: &str) -> String {
    static SPLIT: OnceLock<Regex> = OnceLock::new();
    let split = SPLIT.get_or_init(|| Regex::new(r"[^A-Za-z0-9]+").expect("valid split pattern"));

    split
        .split(name)
        .filter(|p| !p.is_empty())
        .map(|p| {
            let mut chars = p.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Schema name for a table: names containing `_` are taken as full schema
/// names, anything else is placed under the default publisher.
pub fn entity_schema_name(table: &str) -> String {
    if table.contains('_') {
        table.to_string()
    } else {
        format!("{}_{}", DEFAULT_PUBLISHER_PREFIX, to_pascal(table))
    }
}

/// Publisher prefix of a schema name (segment before the first `_`).
pub fn publisher_prefix(schema_name: &str) -> &str {
    match schema_name.split_once('_') {
        Some((prefix, _)) => prefix,
        None => DEFAULT_PUBLISHER_PREFIX,
    }
}

/// Attribute metadata payload for a column.
pub fn attribute_payload(
    schema_name: &str,
    column_type: ColumnType,
    is_primary_name: bool,
    language_code: u32,
) -> Value {
    let display = schema_name.rsplit('_').next().unwrap_or(schema_name);
    let display = label(display, language_code);
    let required = json!({ "Value": "None" });

    match column_type {
        ColumnType::String => json!({
            "@odata.type": "Microsoft.Dynamics.CRM.StringAttributeMetadata",
            "SchemaName": schema_name,
            "DisplayName": display,
            "RequiredLevel": required,
            "MaxLength": 200,
            "FormatName": { "Value": "Text" },
            "IsPrimaryName": is_primary_name,
        }),
        ColumnType::Integer => json!({
            "@odata.type": "Microsoft.Dynamics.CRM.IntegerAttributeMetadata",
            "SchemaName": schema_name,
            "DisplayName": display,
            "RequiredLevel": required,
            "Format": "None",
            "MinValue": i32::MIN,
            "MaxValue": i32::MAX,
        }),
        ColumnType::Decimal => json!({
            "@odata.type": "Microsoft.Dynamics.CRM.DecimalAttributeMetadata",
            "SchemaName": schema_name,
            "DisplayName": display,
            "RequiredLevel": required,
            "MinValue": -100_000_000_000.0,
            "MaxValue": 100_000_000_000.0,
            "Precision": 2,
        }),
        ColumnType::Double => json!({
            "@odata.type": "Microsoft.Dynamics.CRM.DoubleAttributeMetadata",
            "SchemaName": schema_name,
            "DisplayName": display,
            "RequiredLevel": required,
            "MinValue": -100_000_000_000.0,
            "MaxValue": 100_000_000_000.0,
            "Precision": 2,
        }),
        ColumnType::DateTime => json!({
            "@odata.type": "Microsoft.Dynamics.CRM.DateTimeAttributeMetadata",
            "SchemaName": schema_name,
            "DisplayName": display,
            "RequiredLevel": required,
            "Format": "DateOnly",
            "ImeMode": "Inactive",
        }),
        ColumnType::Boolean => json!({
            "@odata.type": "Microsoft.Dynamics.CRM.BooleanAttributeMetadata",
            "SchemaName": schema_name,
            "DisplayName": display,
            "RequiredLevel": required,
            "OptionSet": {
                "@odata.type": "Microsoft.Dynamics.CRM.BooleanOptionSetMetadata",
                "TrueOption": { "Value": 1, "Label": label("True", language_code) },
                "FalseOption": { "Value": 0, "Label": label("False", language_code) },
                "IsGlobal": false,
            },
        }),
    }
}

fn table_info(schema: &str, ent: &EntityDefinition, columns_created: Vec<String>) -> TableInfo {
    TableInfo {
        entity_schema: ent.schema_name.clone().unwrap_or_else(|| schema.to_string()),
        entity_logical_name: ent.logical_name.clone(),
        entity_set_name: ent.entity_set_name.clone(),
        metadata_id: ent.metadata_id.clone(),
        columns_created,
    }
}

impl DataverseClient {
    async fn get_entity_by_schema(&self, schema_name: &str) -> Result<Option<EntityDefinition>> {
        let query = [
            (
                "$select",
                "MetadataId,LogicalName,SchemaName,EntitySetName".to_string(),
            ),
            (
                "$filter",
                format!("SchemaName eq '{}'", schema_name.replace('\'', "''")),
            ),
        ];

        let defs: Collection<EntityDefinition> = self
            .execute_json(
                Method::GET,
                &self.url("EntityDefinitions"),
                &[],
                &query,
                Payload::Empty,
            )
            .await?;

        Ok(defs.value.into_iter().next())
    }

    /// Poll until the entity has an entity set name, or the schedule runs out.
    async fn wait_for_entity_ready(&self, schema_name: &str) -> Result<Option<EntityDefinition>> {
        let configured = &self.config().entity_ready_delays_secs;
        let delays = if configured.is_empty() {
            delays_from_secs(&DEFAULT_ENTITY_READY_DELAYS_SECS)
        } else {
            delays_from_secs(configured)
        };
        let mut ent = None;

        for (idx, delay) in delays.iter().enumerate() {
            if idx > 0 && !delay.is_zero() {
                sleep(*delay).await;
            }
            ent = self.get_entity_by_schema(schema_name).await?;
            if ent.as_ref().is_some_and(|e| e.entity_set_name.is_some()) {
                debug!("{} ready after {} polls", schema_name, idx + 1);
                return Ok(ent);
            }
        }

        Ok(ent)
    }

    /// List non-private tables.
    pub async fn list_tables(&self) -> Result<Vec<Record>> {
        let defs: Collection<Record> = self
            .execute_json(
                Method::GET,
                &self.url("EntityDefinitions"),
                &[],
                &[("$filter", "IsPrivate eq false".to_string())],
                Payload::Empty,
            )
            .await?;

        Ok(defs.value)
    }

    /// Look up a table by schema name.
    pub async fn get_table_info(&self, schema_name: &str) -> Result<Option<TableInfo>> {
        Ok(self
            .get_entity_by_schema(schema_name)
            .await?
            .map(|ent| table_info(schema_name, &ent, Vec::new())))
    }

    /// Create a custom table with a primary name column plus `columns`.
    ///
    /// `columns` pairs a column name with a type name accepted by
    /// [`ColumnType`]; column schema names are `{prefix}_{PascalName}`.
    pub async fn create_table(&self, table: &str, columns: &[(&str, &str)]) -> Result<TableInfo> {
        let entity_schema = entity_schema_name(table);
        if self.get_entity_by_schema(&entity_schema).await?.is_some() {
            return Err(Error::TableAlreadyExists(entity_schema));
        }

        let lang = self.config().language_code;
        let prefix = publisher_prefix(&entity_schema);

        let mut attributes = vec![attribute_payload(
            &format!("{}_Name", prefix),
            ColumnType::String,
            true,
            lang,
        )];
        let mut created = Vec::with_capacity(columns.len());
        for (name, dtype) in columns {
            let column_type: ColumnType =
                dtype
                    .parse()
                    .map_err(|UnknownColumnType(dtype)| Error::UnsupportedColumnType {
                        column: name.to_string(),
                        dtype,
                    })?;
            let attr_schema = format!("{}_{}", prefix, to_pascal(name));
            attributes.push(attribute_payload(&attr_schema, column_type, false, lang));
            created.push(attr_schema);
        }

        let payload = json!({
            "@odata.type": "Microsoft.Dynamics.CRM.EntityMetadata",
            "SchemaName": entity_schema,
            "DisplayName": label(table, lang),
            "DisplayCollectionName": label(&format!("{}s", table), lang),
            "Description": label(&format!("Custom entity for {}", table), lang),
            "OwnershipType": "UserOwned",
            "HasActivities": false,
            "HasNotes": true,
            "IsActivity": false,
            "Attributes": attributes,
        });

        self.execute(
            Method::POST,
            &self.url("EntityDefinitions"),
            &[],
            &[],
            Payload::Json(payload),
        )
        .await?;

        let ent = self
            .wait_for_entity_ready(&entity_schema)
            .await?
            .filter(|e| e.entity_set_name.is_some())
            .ok_or_else(|| {
                Error::UnexpectedResponse(format!(
                    "Failed to create or retrieve entity '{}' (EntitySetName not available).",
                    entity_schema
                ))
            })?;

        info!("Created table {} with {} columns", entity_schema, created.len());
        Ok(table_info(&entity_schema, &ent, created))
    }

    /// Delete a custom table.
    pub async fn delete_table(&self, table: &str) -> Result<()> {
        let entity_schema = entity_schema_name(table);
        let metadata_id = self
            .get_entity_by_schema(&entity_schema)
            .await?
            .and_then(|e| e.metadata_id)
            .ok_or_else(|| Error::TableNotFound(entity_schema.clone()))?;

        self.execute(
            Method::DELETE,
            &self.url(&format!("EntityDefinitions({})", metadata_id)),
            &[],
            &[],
            Payload::Empty,
        )
        .await?;

        info!("Deleted table {}", entity_schema);
        Ok(())
    }
}
