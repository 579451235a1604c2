use super::catalog::{Catalog, not_found};
use super::condition::Condition;
use super::engine::{Page, SearchRequest, TableGateway, WriteOutcome};
use super::table::Table;
use crate::core::{Item, Result};
use crate::schema::Schema;
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-process table store.
///
/// Every table sits behind its own lock; a conditional write evaluates its
/// condition and writes under the same write guard, which is what makes it
/// atomic. Nothing is persisted.
#[derive(Debug, Default)]
pub struct InMemoryTables {
    /// Schemas only, copy-on-write
    catalog: RwLock<Catalog>,
    /// Tables with individual locks
    tables: RwLock<HashMap<String, Arc<RwLock<Table>>>>,
}

impl InMemoryTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a handle to a table for concurrent access
    fn get_table(&self, name: &str) -> Result<Arc<RwLock<Table>>> {
        self.tables
            .read()?
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(name).into())
    }

    pub fn drop_table(&self, name: &str) -> Result<()> {
        let mut catalog = self.catalog.write()?;
        *catalog = catalog.clone().without_table(name)?;
        self.tables.write()?.remove(name);
        debug!("Dropped table {}", name);
        Ok(())
    }

    pub fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self
            .catalog
            .read()?
            .list_tables()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    pub fn row_count(&self, name: &str) -> Result<usize> {
        let table = self.get_table(name)?;
        let count = table.read()?.row_count();
        Ok(count)
    }
}

impl TableGateway for InMemoryTables {
    fn get_item(&self, table: &str, key: &Item) -> Result<Option<Item>> {
        debug!("GetItem on {}", table);
        let handle = self.get_table(table)?;
        let guard = handle.read()?;
        guard.get(key)
    }

    fn put_item(
        &self,
        table: &str,
        item: Item,
        condition: Option<&Condition>,
    ) -> Result<WriteOutcome> {
        debug!("PutItem on {} (conditional: {})", table, condition.is_some());
        let handle = self.get_table(table)?;
        let mut guard = handle.write()?;
        guard.put(item, condition)
    }

    fn delete_item(
        &self,
        table: &str,
        key: &Item,
        condition: Option<&Condition>,
    ) -> Result<WriteOutcome> {
        debug!("DeleteItem on {} (conditional: {})", table, condition.is_some());
        let handle = self.get_table(table)?;
        let mut guard = handle.write()?;
        guard.delete(key, condition)
    }

    fn query(&self, table: &str, request: &SearchRequest) -> Result<Page> {
        debug!("Query on {} (index: {:?})", table, request.index_name);
        let handle = self.get_table(table)?;
        let guard = handle.read()?;
        guard.search(request, true)
    }

    fn scan(&self, table: &str, request: &SearchRequest) -> Result<Page> {
        debug!("Scan on {} (index: {:?})", table, request.index_name);
        let handle = self.get_table(table)?;
        let guard = handle.read()?;
        guard.search(request, false)
    }

    fn create_table(&self, schema: &Schema) -> Result<()> {
        schema.validate()?;
        let schema = Arc::new(schema.clone());

        let mut catalog = self.catalog.write()?;
        *catalog = catalog.clone().with_table(schema.clone())?;
        self.tables.write()?.insert(
            schema.table_name.clone(),
            Arc::new(RwLock::new(Table::new(schema.clone()))),
        );
        debug!("Created table {}", schema.table_name);
        Ok(())
    }

    fn describe_table(&self, table: &str) -> Result<Option<Schema>> {
        let catalog = self.catalog.read()?.clone();
        Ok(catalog.get_table(table).map(|schema| (*schema).clone()))
    }
}
