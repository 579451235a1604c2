use super::condition::Condition;
use super::engine::{Page, SearchRequest, WriteOutcome};
use crate::core::{Item, Result, StoreError, Value};
use crate::schema::Schema;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

pub(crate) const VALIDATION_EXCEPTION: &str = "ValidationException";

/// Key values in sort order: hash, then range if the table has one.
#[derive(Debug, Clone)]
struct RowKey(Vec<Value>);

impl PartialEq for RowKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RowKey {}

impl PartialOrd for RowKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RowKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_positions(&self.0, &other.0)
    }
}

fn compare_positions(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.sort_cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

fn validation(message: String) -> StoreError {
    StoreError::new(VALIDATION_EXCEPTION, message)
}

/// Rows of one table, ordered by primary key.
#[derive(Debug, Clone)]
pub struct Table {
    schema: Arc<Schema>,
    rows: BTreeMap<RowKey, Item>,
}

impl Table {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn key_names(&self, index_name: Option<&str>) -> Result<Vec<String>> {
        let (hash, range) = self.schema.hash_and_range(index_name)?;
        let mut names = vec![hash.to_string()];
        if let Some(range) = range {
            names.push(range.to_string());
        }
        Ok(names)
    }

    fn row_key(&self, item: &Item) -> Result<RowKey> {
        let mut key = Vec::with_capacity(2);
        for name in self.key_names(None)? {
            let value = item.get(&name).ok_or_else(|| {
                validation(format!(
                    "missing key attribute '{}' for table '{}'",
                    name, self.schema.table_name
                ))
            })?;
            if !matches!(value, Value::Text(_) | Value::Int(_) | Value::Decimal(_) | Value::Binary(_)) {
                return Err(validation(format!(
                    "key attribute '{}' must be a string, number or binary, got {}",
                    name,
                    value.type_name()
                ))
                .into());
            }
            key.push(value.clone());
        }
        Ok(RowKey(key))
    }

    pub fn get(&self, key: &Item) -> Result<Option<Item>> {
        let key = self.row_key(key)?;
        Ok(self.rows.get(&key).cloned())
    }

    pub fn put(&mut self, item: Item, condition: Option<&Condition>) -> Result<WriteOutcome> {
        let key = self.row_key(&item)?;
        if let Some(condition) = condition
            && !condition.evaluate(self.rows.get(&key))
        {
            return Ok(WriteOutcome::ConditionFailed);
        }
        self.rows.insert(key, item);
        Ok(WriteOutcome::Written)
    }

    pub fn delete(&mut self, key: &Item, condition: Option<&Condition>) -> Result<WriteOutcome> {
        let key = self.row_key(key)?;
        if let Some(condition) = condition
            && !condition.evaluate(self.rows.get(&key))
        {
            return Ok(WriteOutcome::ConditionFailed);
        }
        self.rows.remove(&key);
        Ok(WriteOutcome::Written)
    }

    /// Shared implementation of query and scan.
    ///
    /// Items are visited in (index key, table key) order, starting after
    /// `exclusive_start_key`. `limit` counts visited items; the filter is
    /// applied to each visited item afterwards.
    pub fn search(&self, request: &SearchRequest, is_query: bool) -> Result<Page> {
        let index_name = request.index_name.as_deref();
        let mut position_names = self.key_names(index_name)?;
        if index_name.is_some() {
            position_names.extend(self.key_names(None)?);
        }

        let key_filter = match (&request.key_condition, is_query) {
            (Some(key_condition), true) => {
                let (hash, range) = self.schema.hash_and_range(index_name)?;
                if key_condition.hash_name != hash {
                    return Err(validation(format!(
                        "query condition must use hash key '{}', got '{}'",
                        hash, key_condition.hash_name
                    ))
                    .into());
                }
                if let Some((name, _)) = &key_condition.range
                    && Some(name.as_str()) != range
                {
                    return Err(validation(format!(
                        "'{}' is not the range key of the queried table or index",
                        name
                    ))
                    .into());
                }
                Some(key_condition.to_condition())
            }
            (None, true) => {
                return Err(validation("query requires a key condition".to_string()).into());
            }
            (_, false) => None,
        };

        let position_of = |item: &Item| -> Option<Vec<Value>> {
            position_names
                .iter()
                .map(|name| item.get(name).cloned())
                .collect()
        };

        // Items missing an index key attribute are not part of the index.
        let mut candidates: Vec<(Vec<Value>, &Item)> = self
            .rows
            .values()
            .filter(|item| key_filter.as_ref().is_none_or(|c| c.evaluate(Some(*item))))
            .filter_map(|item| position_of(item).map(|position| (position, item)))
            .collect();
        candidates.sort_by(|a, b| compare_positions(&a.0, &b.0));

        if let Some(start) = &request.exclusive_start_key {
            let start = position_of(start).ok_or_else(|| {
                validation("exclusive start key is missing key attributes".to_string())
            })?;
            candidates.retain(|(position, _)| compare_positions(position, &start) == Ordering::Greater);
        }

        let limit = request.limit.unwrap_or(usize::MAX);
        let mut page = Page::default();
        let mut last_visited = None;
        for (_, item) in candidates.iter().take(limit) {
            page.scanned_count += 1;
            last_visited = Some(*item);
            if request
                .filter
                .as_ref()
                .is_none_or(|filter| filter.evaluate(Some(*item)))
            {
                page.items.push((*item).clone());
            }
        }

        if candidates.len() > page.scanned_count
            && let Some(item) = last_visited
        {
            page.last_evaluated_key = Some(
                position_names
                    .iter()
                    .filter_map(|name| item.get(name).map(|v| (name.clone(), v.clone())))
                    .collect(),
            );
        }
        Ok(page)
    }
}
