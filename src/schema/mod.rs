// ============================================================================
// Table Schema
// ============================================================================
//
// Mirrors the shape a table store expects in `CreateTable` (and the shape of
// a table resource's `Properties` in an infrastructure template), so a schema
// can be read from a template and handed to `create_table` unchanged.
//
// ============================================================================

pub mod binding;
pub mod provider;

pub use binding::{
    BoundSchema, CacheStats, InMemoryTemplateSource, StackResolver, StackResource,
    TABLE_RESOURCE_TYPE, TemplateSource,
};
pub use provider::{SchemaCache, SchemaProvider, StaticSchema};

use crate::core::{MapperError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KeyType {
    Hash,
    Range,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeySchemaElement {
    pub attribute_name: String,
    pub key_type: KeyType,
}

impl KeySchemaElement {
    pub fn hash(name: impl Into<String>) -> Self {
        Self {
            attribute_name: name.into(),
            key_type: KeyType::Hash,
        }
    }

    pub fn range(name: impl Into<String>) -> Self {
        Self {
            attribute_name: name.into(),
            key_type: KeyType::Range,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttributeDefinition {
    pub attribute_name: String,
    /// `S`, `N` or `B`.
    pub attribute_type: String,
}

/// A global or local secondary index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecondaryIndex {
    pub index_name: String,
    pub key_schema: Vec<KeySchemaElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioned_throughput: Option<serde_json::Value>,
}

impl SecondaryIndex {
    pub fn new(index_name: impl Into<String>, hash_key: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            key_schema: vec![KeySchemaElement::hash(hash_key)],
            projection: Some(serde_json::json!({ "ProjectionType": "ALL" })),
            provisioned_throughput: None,
        }
    }

    pub fn with_range(mut self, range_key: impl Into<String>) -> Self {
        self.key_schema.push(KeySchemaElement::range(range_key));
        self
    }

    pub fn hash_and_range(&self) -> Result<(&str, Option<&str>)> {
        hash_and_range_of(&self.index_name, &self.key_schema)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Schema {
    #[serde(default)]
    pub table_name: String,
    pub key_schema: Vec<KeySchemaElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attribute_definitions: Vec<AttributeDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub global_secondary_indexes: Vec<SecondaryIndex>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local_secondary_indexes: Vec<SecondaryIndex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioned_throughput: Option<serde_json::Value>,
    /// Remaining template properties (billing mode, streams, ...), passed through.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
    /// Non-key attributes that must be present before a save.
    #[serde(skip)]
    pub required_attributes: Vec<String>,
}

impl Schema {
    pub fn new(table_name: impl Into<String>, hash_key: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            key_schema: vec![KeySchemaElement::hash(hash_key)],
            attribute_definitions: Vec::new(),
            global_secondary_indexes: Vec::new(),
            local_secondary_indexes: Vec::new(),
            provisioned_throughput: None,
            extra: BTreeMap::new(),
            required_attributes: Vec::new(),
        }
    }

    pub fn with_range(mut self, range_key: impl Into<String>) -> Self {
        self.key_schema.push(KeySchemaElement::range(range_key));
        self
    }

    pub fn with_index(mut self, index: SecondaryIndex) -> Self {
        self.global_secondary_indexes.push(index);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, attribute_type: &str) -> Self {
        self.attribute_definitions.push(AttributeDefinition {
            attribute_name: name.into(),
            attribute_type: attribute_type.to_string(),
        });
        self
    }

    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required_attributes.push(name.into());
        self
    }

    /// Parses the `Properties` block of a table resource.
    pub fn from_properties(properties: &serde_json::Value) -> Result<Self> {
        let schema: Schema = serde_json::from_value(properties.clone()).map_err(|e| {
            MapperError::Configuration(format!("invalid table properties: {}", e))
        })?;
        Ok(schema)
    }

    /// Checks the key invariants: one hash key and at most one range key per
    /// table and per index, unique index names.
    pub fn validate(&self) -> Result<()> {
        if self.table_name.is_empty() {
            return Err(MapperError::Configuration(
                "schema has no table name".to_string(),
            ));
        }
        hash_and_range_of(&self.table_name, &self.key_schema)?;

        let mut seen = HashSet::new();
        for index in self.indexes() {
            index.hash_and_range()?;
            if !seen.insert(index.index_name.as_str()) {
                return Err(MapperError::Configuration(format!(
                    "duplicate index '{}' on table '{}'",
                    index.index_name, self.table_name
                )));
            }
        }
        Ok(())
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn hash_key(&self) -> Result<&str> {
        Ok(self.hash_and_range(None)?.0)
    }

    pub fn range_key(&self) -> Result<Option<&str>> {
        Ok(self.hash_and_range(None)?.1)
    }

    pub fn indexes(&self) -> impl Iterator<Item = &SecondaryIndex> {
        self.global_secondary_indexes
            .iter()
            .chain(self.local_secondary_indexes.iter())
    }

    pub fn index(&self, index_name: &str) -> Result<&SecondaryIndex> {
        self.indexes()
            .find(|index| index.index_name == index_name)
            .ok_or_else(|| MapperError::UnknownIndex {
                table: self.table_name.clone(),
                index: index_name.to_string(),
            })
    }

    /// Hash and range key names of the table, or of the named index.
    pub fn hash_and_range(&self, index_name: Option<&str>) -> Result<(&str, Option<&str>)> {
        match index_name {
            Some(name) => self.index(name)?.hash_and_range(),
            None => hash_and_range_of(&self.table_name, &self.key_schema),
        }
    }

    /// Key attribute names followed by the declared required attributes.
    pub fn required_attributes(&self) -> Result<Vec<String>> {
        let (hash, range) = self.hash_and_range(None)?;
        let mut names = vec![hash.to_string()];
        if let Some(range) = range {
            names.push(range.to_string());
        }
        for name in &self.required_attributes {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        Ok(names)
    }
}

fn hash_and_range_of<'a>(
    owner: &str,
    key_schema: &'a [KeySchemaElement],
) -> Result<(&'a str, Option<&'a str>)> {
    let hashes: Vec<&str> = key_schema
        .iter()
        .filter(|k| k.key_type == KeyType::Hash)
        .map(|k| k.attribute_name.as_str())
        .collect();
    let ranges: Vec<&str> = key_schema
        .iter()
        .filter(|k| k.key_type == KeyType::Range)
        .map(|k| k.attribute_name.as_str())
        .collect();

    match (hashes.as_slice(), ranges.as_slice()) {
        ([hash], []) => Ok((hash, None)),
        ([hash], [range]) => Ok((hash, Some(range))),
        _ => Err(MapperError::Configuration(format!(
            "'{}' must have exactly one hash key and at most one range key",
            owner
        ))),
    }
}
