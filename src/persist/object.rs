// ============================================================================
// Persistent Objects
// ============================================================================
//
// A `PersistentObject` is one row seen through its type descriptor. It keeps
// the attributes as last read from the store (store-safe form), whatever the
// caller changed since, a cache of related objects resolved from reference
// attributes, and the version counter used for optimistic saves.
//
// An object built from a reference is a stub holding only the key. It stays
// `Unresolved` until something reads or writes an attribute, which reloads
// it first.
//
// ============================================================================

use super::Mapper;
use super::attributes::{AttributeBag, VERSION_ATTR};
use super::registry::TypeDescriptor;
use super::relation::build_relation_map;
use crate::codec::{Decoded, ForeignKey, decode_value, restore_item, revive, to_store_safe};
use crate::core::{Item, MapperError, Result, Value};
use crate::schema::Schema;
use log::debug;
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Only the key is known; the next attribute access reloads the row.
    Unresolved,
    Resolved,
}

/// Result of reading an attribute.
#[derive(Debug, Clone)]
pub enum Attr {
    Value(Value),
    /// The attribute held a reference; this is the referenced object.
    Object(PersistentObject),
}

impl Attr {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Object(_) => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Object(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&PersistentObject> {
        match self {
            Self::Object(object) => Some(object),
            Self::Value(_) => None,
        }
    }

    pub fn into_object(self) -> Option<PersistentObject> {
        match self {
            Self::Object(object) => Some(object),
            Self::Value(_) => None,
        }
    }
}

#[derive(Clone)]
pub struct PersistentObject {
    pub(super) mapper: Mapper,
    pub(super) descriptor: Arc<TypeDescriptor>,
    pub(super) attributes: AttributeBag,
    /// Attributes as of the last load or save.
    pub(super) persisted: Item,
    pub(super) changes: BTreeSet<String>,
    pub(super) related: HashMap<String, PersistentObject>,
    pub(super) in_db: bool,
    pub(super) version: i64,
    pub(super) state: LoadState,
}

/// Equality of store-safe forms, so `""` matches the empty-string sentinel,
/// a timestamp matches its stored text and `Int(30)` matches `Decimal("30")`.
fn same_stored_value(a: &Value, b: &Value) -> bool {
    match (to_store_safe(a), to_store_safe(b)) {
        (Ok(a), Ok(b)) => match a.compare(&b) {
            Some(ordering) => ordering == Ordering::Equal,
            None => a == b,
        },
        _ => false,
    }
}

impl PersistentObject {
    fn blank(mapper: Mapper, descriptor: Arc<TypeDescriptor>) -> Self {
        Self {
            mapper,
            descriptor,
            attributes: AttributeBag::new(),
            persisted: Item::new(),
            changes: BTreeSet::new(),
            related: HashMap::new(),
            in_db: false,
            version: 0,
            state: LoadState::Resolved,
        }
    }

    /// Builds an object from caller attributes.
    ///
    /// With `load`, the row addressed by the key attributes among `attrs` is
    /// fetched first and becomes the clean baseline. Each attribute in
    /// `attrs` then counts as a change only if it differs from the loaded
    /// value.
    pub(crate) fn construct(
        mapper: Mapper,
        descriptor: Arc<TypeDescriptor>,
        attrs: Item,
        load: bool,
    ) -> Result<Self> {
        let mut object = Self::blank(mapper, descriptor);

        if load {
            let schema = object.schema()?;
            let (hash, range) = schema.hash_and_range(None)?;
            let key: Option<Item> = std::iter::once(hash)
                .chain(range)
                .map(|name| {
                    attrs
                        .get(name)
                        .filter(|value| !value.is_empty_value())
                        .map(|value| Ok((name.to_string(), to_store_safe(value)?)))
                })
                .collect::<Option<Result<Item>>>()
                .transpose()?;

            if let Some(key) = key
                && let Some(item) = object
                    .mapper
                    .gateway()
                    .get_item(&schema.table_name, &key)?
            {
                object.apply_item(item);
            }
        }

        for (name, value) in attrs {
            if object.in_db
                && object
                    .attributes
                    .get(&name)
                    .is_some_and(|current| same_stored_value(current, &value))
            {
                continue;
            }
            object.write(&name, value)?;
        }
        Ok(object)
    }

    /// Unresolved stub for a referenced row.
    pub(crate) fn stub(mapper: Mapper, descriptor: Arc<TypeDescriptor>, key: Item) -> Self {
        let mut object = Self::blank(mapper, descriptor);
        object.attributes = AttributeBag::from_item(key);
        object.state = LoadState::Unresolved;
        object
    }

    /// Object for a row the store just returned.
    pub(crate) fn from_item(mapper: Mapper, descriptor: Arc<TypeDescriptor>, item: Item) -> Self {
        let mut object = Self::blank(mapper, descriptor);
        object.apply_item(item);
        object
    }

    /// Makes `item` the clean baseline.
    pub(super) fn apply_item(&mut self, item: Item) {
        let mut item = restore_item(item);
        self.version = item
            .remove(VERSION_ATTR)
            .and_then(|version| version.as_i64())
            .unwrap_or(0);
        self.persisted = item.clone();
        self.attributes = AttributeBag::from_item(item);
        self.changes.clear();
        self.related.clear();
        self.in_db = true;
        self.state = LoadState::Resolved;
    }

    // ------------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------------

    pub fn type_name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn schema(&self) -> Result<Arc<Schema>> {
        self.descriptor.schema(self.mapper.config())
    }

    /// Primary key in store-safe form. Never triggers a reload.
    pub fn key(&self) -> Result<Item> {
        let schema = self.schema()?;
        let (hash, range) = schema.hash_and_range(None)?;
        let mut key = Item::new();
        for name in std::iter::once(hash).chain(range) {
            let value = self
                .attributes
                .get(name)
                .filter(|value| !value.is_empty_value())
                .ok_or_else(|| {
                    MapperError::Validation(format!(
                        "{} has no value for key attribute '{}'",
                        self.type_name(),
                        name
                    ))
                })?;
            key.insert(name.to_string(), to_store_safe(value)?);
        }
        Ok(key)
    }

    /// Relation map: what another row stores to reference this one.
    pub fn foreign_key(&self) -> Result<ForeignKey> {
        build_relation_map(self.descriptor.contributors(), self)
    }

    /// Encoded reference string for this object.
    pub fn reference(&self) -> Result<String> {
        Ok(self.foreign_key()?.encode())
    }

    /// Same type, same coordinates and same primary key.
    pub fn is_same(&self, other: &PersistentObject) -> bool {
        match (self.foreign_key(), other.foreign_key()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    // ------------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------------

    pub fn version(&self) -> i64 {
        self.version
    }

    /// Whether the row is known to exist. Stubs report `false` until resolved.
    pub fn in_db(&self) -> bool {
        self.in_db
    }

    pub fn load_state(&self) -> LoadState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Names written or deleted since the last load or save.
    pub fn changes(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(String::as_str)
    }

    /// Attributes as of the last load or save.
    pub fn persisted(&self) -> &Item {
        &self.persisted
    }

    /// Names of the user attributes currently set.
    pub fn fields(&mut self) -> Result<Vec<String>> {
        self.ensure_resolved()?;
        Ok(self.attributes.fields().map(str::to_string).collect())
    }

    pub fn ensure_resolved(&mut self) -> Result<()> {
        if self.state == LoadState::Unresolved {
            debug!("Resolving stub of {}", self.type_name());
            self.reload()?;
        }
        Ok(())
    }

    /// Replaces all state with the stored row.
    ///
    /// Returns `false` if the row does not exist; the object then keeps only
    /// its key and is no longer in the database.
    pub fn reload(&mut self) -> Result<bool> {
        let schema = self.schema()?;
        let key = self.key()?;
        match self.mapper.gateway().get_item(&schema.table_name, &key)? {
            Some(item) => {
                self.apply_item(item);
                Ok(true)
            }
            None => {
                self.attributes.retain(|name| key.contains_key(name));
                self.persisted.clear();
                self.changes.clear();
                self.related.clear();
                self.in_db = false;
                self.version = 0;
                self.state = LoadState::Resolved;
                Ok(false)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Attribute access
    // ------------------------------------------------------------------------

    /// Reads an attribute.
    ///
    /// References resolve to the referenced object, `datetime:` text to a
    /// timestamp. Absent names fall back to compound attributes, then to the
    /// mapper's miss policy.
    pub fn get(&mut self, name: &str) -> Result<Option<Attr>> {
        self.ensure_resolved()?;
        if name == VERSION_ATTR {
            return Ok(Some(Attr::Value(Value::Int(self.version))));
        }

        if let Some(value) = self.attributes.get(name).cloned() {
            return match decode_value(&value) {
                Some(Decoded::Reference(reference)) => {
                    let object = self.resolve_related(name, &reference)?;
                    object.ensure_resolved()?;
                    Ok(Some(Attr::Object(object.clone())))
                }
                Some(Decoded::Constant(constant)) => Ok(Some(Attr::Value(constant))),
                None => Ok(Some(Attr::Value(revive(&value)))),
            };
        }

        if let Some(compound) = self.descriptor.compounds().get(name)? {
            let value = (compound.func)(self)?;
            return Ok(Some(Attr::Value(value)));
        }

        self.mapper.miss_policy().miss(name)
    }

    /// Reads a plain value; a reference attribute reads as its encoded text.
    pub fn get_value(&mut self, name: &str) -> Result<Option<Value>> {
        match self.get(name)? {
            Some(Attr::Object(object)) => Ok(Some(Value::Text(object.reference()?))),
            Some(Attr::Value(value)) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    /// Stored value without reference or timestamp decoding.
    pub fn raw(&mut self, name: &str) -> Result<Option<Value>> {
        self.ensure_resolved()?;
        if name == VERSION_ATTR {
            return Ok(Some(Value::Int(self.version)));
        }
        Ok(self.attributes.get(name).cloned())
    }

    /// The object referenced by `name`, from the per-object cache.
    pub fn related(&mut self, name: &str) -> Result<Option<&mut PersistentObject>> {
        self.ensure_resolved()?;
        let Some(Decoded::Reference(reference)) = self.attributes.get(name).and_then(decode_value)
        else {
            return Ok(None);
        };
        self.resolve_related(name, &reference).map(Some)
    }

    fn resolve_related(
        &mut self,
        name: &str,
        reference: &ForeignKey,
    ) -> Result<&mut PersistentObject> {
        match self.related.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                debug!(
                    "Resolving {}.{} -> {}",
                    self.descriptor.name(),
                    name,
                    reference.type_name
                );
                let object = self.mapper.from_reference(reference)?;
                Ok(entry.insert(object))
            }
        }
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.ensure_resolved()?;
        self.write(name, value.into())
    }

    /// Stores a reference to `object` and caches it for later reads.
    pub fn set_object(&mut self, name: &str, object: &PersistentObject) -> Result<()> {
        let reference = object.reference()?;
        self.set(name, reference)?;
        self.related.insert(name.to_string(), object.clone());
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> Result<Option<Value>> {
        self.ensure_resolved()?;
        self.related.remove(name);
        self.changes.insert(name.to_string());
        Ok(self.attributes.delete(name))
    }

    pub(super) fn write(&mut self, name: &str, value: Value) -> Result<()> {
        if name == VERSION_ATTR {
            self.version = value.as_i64().ok_or_else(|| {
                MapperError::Validation(format!("{} must be an integer, got {}", VERSION_ATTR, value))
            })?;
            return Ok(());
        }
        self.related.remove(name);
        self.attributes.set(name, value);
        self.changes.insert(name.to_string());
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------------

    /// User attributes plus saved compound attributes not already set.
    pub fn save_view(&mut self) -> Result<Item> {
        self.ensure_resolved()?;
        let mut view = self.attributes.user_item();
        let descriptor = self.descriptor.clone();
        for (name, compound) in descriptor.compounds().saved()? {
            if !view.contains_key(&name) {
                let value = (compound.func)(self)?;
                view.insert(name, value);
            }
        }
        Ok(view)
    }

    /// JSON rendering with `_class` and, when the key is set, `_fkey` markers.
    pub fn to_json(&mut self) -> Result<serde_json::Value> {
        let view = self.save_view()?;
        let mut object: serde_json::Map<String, serde_json::Value> = view
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        object.insert(
            "_class".to_string(),
            serde_json::Value::String(self.type_name().to_string()),
        );
        if let Ok(reference) = self.reference() {
            object.insert("_fkey".to_string(), serde_json::Value::String(reference));
        }
        Ok(serde_json::Value::Object(object))
    }
}

impl fmt::Debug for PersistentObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentObject")
            .field("type", &self.descriptor.name())
            .field("attributes", &self.attributes)
            .field("version", &self.version)
            .field("in_db", &self.in_db)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
