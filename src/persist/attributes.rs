use crate::core::{Item, MapperError, Result, Value};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

/// Row attribute holding the optimistic-concurrency version counter.
pub const VERSION_ATTR: &str = "version_dynamap_";

lazy_static! {
    static ref RESERVED_NAME: Regex = Regex::new(r"^(_|dynamap_)|_dynamap$|_dynamap_").unwrap();
}

/// Bookkeeping names: `_x`, `dynamap_x`, `x_dynamap`, `x_dynamap_y`.
///
/// Reserved names are never part of an object's field view and never
/// persisted as user data.
pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_NAME.is_match(name)
}

/// What a read of an absent attribute produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissPolicy {
    #[default]
    ReturnNone,
    Error,
}

impl MissPolicy {
    pub fn miss<T>(self, name: &str) -> Result<Option<T>> {
        match self {
            Self::ReturnNone => Ok(None),
            Self::Error => Err(MapperError::MissingAttribute(name.to_string())),
        }
    }
}

/// Attribute storage with a mirrored field view.
///
/// Every attribute lives in the storage map; the field view lists the
/// non-reserved ones and is kept in step on every set and delete.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeBag {
    values: Item,
    fields: BTreeSet<String>,
}

impl AttributeBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_item(item: Item) -> Self {
        let fields = item
            .keys()
            .filter(|name| !is_reserved_name(name))
            .cloned()
            .collect();
        Self {
            values: item,
            fields,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: &str, value: Value) -> Option<Value> {
        if !is_reserved_name(name) {
            self.fields.insert(name.to_string());
        }
        self.values.insert(name.to_string(), value)
    }

    pub fn delete(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name);
        self.values.remove(name)
    }

    /// Non-reserved attribute names, sorted.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    /// Non-reserved attributes only.
    pub fn user_item(&self) -> Item {
        self.fields
            .iter()
            .filter_map(|name| self.values.get(name).map(|v| (name.clone(), v.clone())))
            .collect()
    }

    pub fn retain(&mut self, keep: impl Fn(&str) -> bool) {
        self.values.retain(|name, _| keep(name));
        self.fields.retain(|name| keep(name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_names() {
        for name in ["_class", "dynamap_meta", "cache_dynamap", "x_dynamap_y", VERSION_ATTR] {
            assert!(is_reserved_name(name), "{} should be reserved", name);
        }
        for name in ["email", "dynamap", "mydynamap_", "class_", "expiry"] {
            assert!(!is_reserved_name(name), "{} should not be reserved", name);
        }
    }

    #[test]
    fn test_field_view_follows_storage() {
        let mut bag = AttributeBag::new();
        bag.set("email", Value::from("a@b.c"));
        bag.set("_cache", Value::Int(1));
        assert_eq!(bag.fields().collect::<Vec<_>>(), vec!["email"]);
        assert_eq!(bag.get("_cache"), Some(&Value::Int(1)));
        assert_eq!(bag.user_item().len(), 1);

        bag.delete("email");
        assert_eq!(bag.fields().count(), 0);
        assert!(bag.get("email").is_none());
    }

    #[test]
    fn test_miss_policy() {
        assert!(MissPolicy::ReturnNone.miss::<Value>("nope").unwrap().is_none());
        match MissPolicy::Error.miss::<Value>("nope") {
            Err(MapperError::MissingAttribute(name)) => assert_eq!(name, "nope"),
            other => panic!("Expected MissingAttribute, got {:?}", other),
        }
    }
}
