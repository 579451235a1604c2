use super::condition::{Condition, KeyCondition};
use crate::core::{Item, Result};
use crate::schema::Schema;

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The store rejected the write because its condition did not hold.
    ConditionFailed,
}

/// Parameters shared by query and scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchRequest {
    pub index_name: Option<String>,
    /// Required by query, ignored by scan.
    pub key_condition: Option<KeyCondition>,
    /// Applied after `limit` has been counted.
    pub filter: Option<Condition>,
    /// Maximum number of items evaluated, not returned.
    pub limit: Option<usize>,
    pub exclusive_start_key: Option<Item>,
}

/// One page of query or scan results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
    /// Key of the last evaluated item; present only when more items remain.
    pub last_evaluated_key: Option<Item>,
    pub scanned_count: usize,
}

/// Table gateway trait - allows pluggable table store backends
///
/// Items handed to a gateway are already in store-safe form. A gateway must
/// evaluate a write condition atomically with the write.
pub trait TableGateway: Send + Sync {
    /// Fetch one row by its full primary key
    fn get_item(&self, table: &str, key: &Item) -> Result<Option<Item>>;

    /// Replace a row, optionally guarded by a condition on the current row
    fn put_item(&self, table: &str, item: Item, condition: Option<&Condition>)
    -> Result<WriteOutcome>;

    /// Remove a row, optionally guarded by a condition on the current row
    fn delete_item(
        &self,
        table: &str,
        key: &Item,
        condition: Option<&Condition>,
    ) -> Result<WriteOutcome>;

    /// Read the rows matching a key condition, in key order
    fn query(&self, table: &str, request: &SearchRequest) -> Result<Page>;

    /// Read every row of a table or index, in key order
    fn scan(&self, table: &str, request: &SearchRequest) -> Result<Page>;

    /// Create a table; fails if it already exists
    fn create_table(&self, schema: &Schema) -> Result<()>;

    /// Schema of an existing table, `None` if there is no such table
    fn describe_table(&self, table: &str) -> Result<Option<Schema>>;

    /// Create the table unless it already exists. Returns whether it was created.
    fn ensure_table(&self, schema: &Schema) -> Result<bool> {
        if self.describe_table(&schema.table_name)?.is_some() {
            return Ok(false);
        }
        self.create_table(schema)?;
        Ok(true)
    }
}
