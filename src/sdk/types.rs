//! SDK-specific types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A Dataverse record: column logical name to JSON value, in response order.
pub type Record = serde_json::Map<String, Value>;

/// Summary of a table's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Schema name, e.g. `new_SampleItem`
    pub entity_schema: String,
    /// Logical name, e.g. `new_sampleitem`
    pub entity_logical_name: Option<String>,
    /// Entity set (URL segment), e.g. `new_sampleitems`
    pub entity_set_name: Option<String>,
    /// Metadata id of the entity definition
    pub metadata_id: Option<String>,
    /// Attribute schema names created with the table
    pub columns_created: Vec<String>,
}

/// `EntityDefinitions` row as returned by the metadata endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityDefinition {
    #[serde(rename = "MetadataId", default)]
    pub metadata_id: Option<String>,
    #[serde(rename = "LogicalName", default)]
    pub logical_name: Option<String>,
    #[serde(rename = "SchemaName", default)]
    pub schema_name: Option<String>,
    #[serde(rename = "EntitySetName", default)]
    pub entity_set_name: Option<String>,
}

/// OData collection wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct Collection<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}
