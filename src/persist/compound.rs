use super::attributes::is_reserved_name;
use super::object::PersistentObject;
use crate::core::{MapperError, Result, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

pub type CompoundFn = Arc<dyn Fn(&mut PersistentObject) -> Result<Value> + Send + Sync>;

/// Attribute computed from other attributes on read.
#[derive(Clone)]
pub struct CompoundAttribute {
    pub func: CompoundFn,
    /// Include the computed value in saved rows.
    pub save: bool,
}

impl fmt::Debug for CompoundAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompoundAttribute")
            .field("save", &self.save)
            .finish_non_exhaustive()
    }
}

/// Per-type table of compound attributes.
///
/// Meant to be filled while the application starts. Lookups clone the entry
/// out of the lock, so a compound function may read other compound
/// attributes of the same object.
#[derive(Debug, Default)]
pub struct CompoundRegistry {
    attrs: RwLock<BTreeMap<String, CompoundAttribute>>,
}

impl CompoundRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&self, name: &str, save: bool, func: F) -> Result<()>
    where
        F: Fn(&mut PersistentObject) -> Result<Value> + Send + Sync + 'static,
    {
        if is_reserved_name(name) {
            return Err(MapperError::Validation(format!(
                "'{}' is a reserved name and cannot be a compound attribute",
                name
            )));
        }
        let attribute = CompoundAttribute {
            func: Arc::new(func),
            save,
        };
        self.attrs.write()?.insert(name.to_string(), attribute);
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<bool> {
        Ok(self.attrs.write()?.remove(name).is_some())
    }

    pub fn get(&self, name: &str) -> Result<Option<CompoundAttribute>> {
        Ok(self.attrs.read()?.get(name).cloned())
    }

    /// Compound attributes flagged for saving, in name order.
    pub fn saved(&self) -> Result<Vec<(String, CompoundAttribute)>> {
        Ok(self
            .attrs
            .read()?
            .iter()
            .filter(|(_, attribute)| attribute.save)
            .map(|(name, attribute)| (name.clone(), attribute.clone()))
            .collect())
    }

    pub fn names(&self) -> Result<Vec<String>> {
        Ok(self.attrs.read()?.keys().cloned().collect())
    }
}
