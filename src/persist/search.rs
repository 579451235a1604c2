use super::object::PersistentObject;
use crate::codec::{decode_token, to_store_safe};
use crate::core::{Item, MapperError, Result, Value};
use crate::schema::Schema;
use crate::storage::{Condition, KeyCondition, Page, RangeOp, SearchRequest};

/// Parameters of a query or scan.
///
/// The key condition is either given in full or through the `hash_key` and
/// `range_key` shortcuts, which are matched against the key names of the
/// table or of the chosen index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchParams {
    pub index_name: Option<String>,
    pub key_condition: Option<KeyCondition>,
    pub hash_key: Option<Value>,
    pub range_key: Option<RangeOp>,
    pub filter: Option<Condition>,
    pub limit: Option<usize>,
    /// Token from a previous page.
    pub next_token: Option<String>,
    pub exclusive_start_key: Option<Item>,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(mut self, index_name: &str) -> Self {
        self.index_name = Some(index_name.to_string());
        self
    }

    pub fn key_condition(mut self, key_condition: KeyCondition) -> Self {
        self.key_condition = Some(key_condition);
        self
    }

    pub fn hash_key(mut self, value: impl Into<Value>) -> Self {
        self.hash_key = Some(value.into());
        self
    }

    pub fn range_key(mut self, op: RangeOp) -> Self {
        self.range_key = Some(op);
        self
    }

    pub fn filter(mut self, filter: Condition) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn next_token(mut self, token: Option<String>) -> Self {
        self.next_token = token;
        self
    }

    pub fn exclusive_start_key(mut self, key: Item) -> Self {
        self.exclusive_start_key = Some(key);
        self
    }

    fn shortcut_condition(&self, schema: &Schema) -> Result<Option<KeyCondition>> {
        let index_name = self.index_name.as_deref();
        let (hash, range) = schema.hash_and_range(index_name)?;

        match (&self.hash_key, &self.range_key) {
            (None, None) => Ok(None),
            (None, Some(_)) => Err(MapperError::Validation(
                "a range key condition needs a hash key value".to_string(),
            )),
            (Some(hash_value), range_op) => {
                let mut condition = KeyCondition::hash(hash, hash_value.clone());
                if let Some(op) = range_op {
                    let range = range.ok_or_else(|| {
                        MapperError::Validation(format!(
                            "'{}' has no range key",
                            index_name.unwrap_or(&schema.table_name)
                        ))
                    })?;
                    condition = condition.range(range, op.clone());
                }
                Ok(Some(condition))
            }
        }
    }

    /// Translates the parameters into a store request against `schema`.
    pub fn to_request(&self, schema: &Schema, is_query: bool) -> Result<SearchRequest> {
        // Unknown index names fail here, before anything reaches the store.
        schema.hash_and_range(self.index_name.as_deref())?;

        let shortcut = self.shortcut_condition(schema)?;
        let key_condition = match (&self.key_condition, shortcut) {
            (Some(_), Some(_)) => {
                return Err(MapperError::Validation(
                    "give either a key condition or hash/range key values, not both".to_string(),
                ));
            }
            (Some(explicit), None) => Some(explicit.clone()),
            (None, shortcut) => shortcut,
        };
        let key_condition = key_condition
            .map(|condition| condition.map_values(&to_store_safe))
            .transpose()?;
        let mut filter = self
            .filter
            .as_ref()
            .map(|filter| filter.map_values(&to_store_safe))
            .transpose()?;

        let key_condition = if is_query {
            if key_condition.is_none() {
                return Err(MapperError::Validation(
                    "a query needs a key condition or a hash key value".to_string(),
                ));
            }
            key_condition
        } else {
            // A scan has no key condition; fold it into the filter.
            if let Some(key_condition) = key_condition {
                let keys = key_condition.to_condition();
                filter = Some(match filter {
                    Some(filter) => keys.and(filter),
                    None => keys,
                });
            }
            None
        };

        let exclusive_start_key = match (&self.next_token, &self.exclusive_start_key) {
            (Some(_), Some(_)) => {
                return Err(MapperError::Validation(
                    "give either a next token or an exclusive start key, not both".to_string(),
                ));
            }
            (Some(token), None) => Some(decode_token(token)?),
            (None, key) => key.clone(),
        };

        Ok(SearchRequest {
            index_name: self.index_name.clone(),
            key_condition,
            filter,
            limit: self.limit,
            exclusive_start_key,
        })
    }
}

/// One page of materialized results.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub items: Vec<PersistentObject>,
    /// Pass to [`SearchParams::next_token`] for the following page; `None`
    /// once the results are exhausted.
    pub next_token: Option<String>,
    pub raw: Page,
}
