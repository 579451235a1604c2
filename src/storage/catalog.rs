use crate::core::{Result, StoreError};
use crate::schema::Schema;
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) const RESOURCE_IN_USE: &str = "ResourceInUseException";
pub(crate) const RESOURCE_NOT_FOUND: &str = "ResourceNotFoundException";

/// Catalog holds table schemas only.
/// Immutable once built; changes produce a new Catalog (copy-on-write), so a
/// clone can be read without holding any lock.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: Arc<HashMap<String, Arc<Schema>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table - returns a NEW Catalog
    pub fn with_table(self, schema: Arc<Schema>) -> Result<Self> {
        let name = schema.table_name.clone();
        if self.tables.contains_key(&name) {
            return Err(StoreError::new(
                RESOURCE_IN_USE,
                format!("table '{}' already exists", name),
            )
            .into());
        }

        let mut new_tables = (*self.tables).clone();
        new_tables.insert(name, schema);
        Ok(Self {
            tables: Arc::new(new_tables),
        })
    }

    /// Remove a table - returns a NEW Catalog
    pub fn without_table(self, name: &str) -> Result<Self> {
        if !self.tables.contains_key(name) {
            return Err(not_found(name).into());
        }

        let mut new_tables = (*self.tables).clone();
        new_tables.remove(name);
        Ok(Self {
            tables: Arc::new(new_tables),
        })
    }

    pub fn get_table(&self, name: &str) -> Option<Arc<Schema>> {
        self.tables.get(name).cloned()
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn list_tables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

pub(crate) fn not_found(name: &str) -> StoreError {
    StoreError::new(
        RESOURCE_NOT_FOUND,
        format!("requested table '{}' not found", name),
    )
}
