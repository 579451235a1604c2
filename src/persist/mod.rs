// ============================================================================
// Mapper
// ============================================================================
//
// The mapper bundles what every persistent object needs: the table gateway,
// the type registry and the configuration. It is cheap to clone; each object
// keeps its own clone.
//
// ============================================================================

pub mod attributes;
pub mod compound;
pub mod object;
pub mod registry;
pub mod relation;
pub mod save;
pub mod search;

pub use attributes::{AttributeBag, MissPolicy, VERSION_ATTR, is_reserved_name};
pub use compound::{CompoundAttribute, CompoundFn, CompoundRegistry};
pub use object::{Attr, LoadState, PersistentObject};
pub use registry::{BoundType, TypeDescriptor, TypeFactory, TypeRegistry};
pub use relation::{BaseContributor, BindingContributor, RelationContributor, build_relation_map};
pub use save::{SaveMode, SaveOptions};
pub use search::{SearchParams, SearchResult};

use crate::codec::{Binding, Decoded, ForeignKey, decode, encode_token};
use crate::core::{Item, MapperConfig, MapperError, Result, Value};
use crate::schema::Schema;
use crate::storage::TableGateway;
use log::debug;
use std::fmt;
use std::sync::Arc;

/// Anything that names a persistent type: a registered name, a name with
/// stack coordinates, or a descriptor.
pub trait TypeRef {
    fn resolve(&self, registry: &TypeRegistry) -> Result<Arc<TypeDescriptor>>;
}

impl TypeRef for &str {
    fn resolve(&self, registry: &TypeRegistry) -> Result<Arc<TypeDescriptor>> {
        registry.resolve(self, None)
    }
}

impl TypeRef for &String {
    fn resolve(&self, registry: &TypeRegistry) -> Result<Arc<TypeDescriptor>> {
        registry.resolve(self, None)
    }
}

impl TypeRef for (&str, &Binding) {
    fn resolve(&self, registry: &TypeRegistry) -> Result<Arc<TypeDescriptor>> {
        registry.resolve(self.0, Some(self.1))
    }
}

impl TypeRef for &Arc<TypeDescriptor> {
    fn resolve(&self, _registry: &TypeRegistry) -> Result<Arc<TypeDescriptor>> {
        Ok(Arc::clone(self))
    }
}

#[derive(Clone)]
pub struct Mapper {
    gateway: Arc<dyn TableGateway>,
    registry: Arc<TypeRegistry>,
    config: Arc<MapperConfig>,
}

impl Mapper {
    /// Mapper over `gateway` using the global type registry and the default
    /// configuration.
    pub fn new(gateway: Arc<dyn TableGateway>) -> Self {
        Self {
            gateway,
            registry: TypeRegistry::global().clone(),
            config: Arc::new(MapperConfig::default()),
        }
    }

    pub fn with_registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_config(mut self, config: MapperConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn gateway(&self) -> &dyn TableGateway {
        self.gateway.as_ref()
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn miss_policy(&self) -> MissPolicy {
        if self.config.strict_attributes {
            MissPolicy::Error
        } else {
            MissPolicy::ReturnNone
        }
    }

    pub fn descriptor(&self, ty: impl TypeRef) -> Result<Arc<TypeDescriptor>> {
        ty.resolve(&self.registry)
    }

    /// Schema with the physical table name.
    pub fn schema(&self, ty: impl TypeRef) -> Result<Arc<Schema>> {
        self.descriptor(ty)?.schema(&self.config)
    }

    // ------------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------------

    pub fn create_table(&self, ty: impl TypeRef) -> Result<()> {
        let schema = self.schema(ty)?;
        self.gateway.create_table(&schema)
    }

    /// Creates the table unless it exists. Returns whether it was created.
    pub fn ensure_table(&self, ty: impl TypeRef) -> Result<bool> {
        let schema = self.schema(ty)?;
        let created = self.gateway.ensure_table(&schema)?;
        if created {
            debug!("Created missing table {}", schema.table_name);
        }
        Ok(created)
    }

    // ------------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------------

    /// Builds an object, loading the row its key attributes address.
    ///
    /// Loaded attributes form the clean baseline; `attrs` are applied on top
    /// and count as changes only where they differ from what was loaded.
    pub fn new_object(&self, ty: impl TypeRef, attrs: Item) -> Result<PersistentObject> {
        let descriptor = self.descriptor(ty)?;
        PersistentObject::construct(self.clone(), descriptor, attrs, true)
    }

    /// Builds an object without reading the store; every attribute is a
    /// pending change.
    pub fn new_unloaded(&self, ty: impl TypeRef, attrs: Item) -> Result<PersistentObject> {
        let descriptor = self.descriptor(ty)?;
        PersistentObject::construct(self.clone(), descriptor, attrs, false)
    }

    /// Fetches one row, `None` if it does not exist.
    pub fn load(&self, ty: impl TypeRef, key: Item) -> Result<Option<PersistentObject>> {
        let descriptor = self.descriptor(ty)?;
        let mut object = PersistentObject::stub(self.clone(), descriptor, key);
        if object.reload()? {
            Ok(Some(object))
        } else {
            Ok(None)
        }
    }

    /// Unresolved stub for a reference; the row is read on first access.
    pub fn from_reference(&self, reference: &ForeignKey) -> Result<PersistentObject> {
        let descriptor = self
            .registry
            .resolve(&reference.type_name, reference.binding.as_ref())?;
        Ok(PersistentObject::stub(
            self.clone(),
            descriptor,
            reference.key.clone(),
        ))
    }

    /// Stub for an encoded reference, `None` if `text` is not one.
    pub fn resolve_reference(&self, text: &str) -> Result<Option<PersistentObject>> {
        match decode(text) {
            Some(Decoded::Reference(reference)) => self.from_reference(&reference).map(Some),
            _ => Ok(None),
        }
    }

    /// Rebuilds an object from [`PersistentObject::to_json`] output.
    ///
    /// With an `_fkey` marker the result is a stub for the referenced row;
    /// otherwise the object is built from `_class` and the other fields.
    pub fn from_json(&self, json: &serde_json::Value) -> Result<PersistentObject> {
        let fields = json.as_object().ok_or_else(|| {
            MapperError::Serialization(format!("expected a JSON object, got {}", json))
        })?;

        if let Some(reference) = fields.get("_fkey").and_then(serde_json::Value::as_str) {
            return match decode(reference) {
                Some(Decoded::Reference(reference)) => self.from_reference(&reference),
                _ => Err(MapperError::Serialization(format!(
                    "_fkey is not a reference: {}",
                    reference
                ))),
            };
        }

        let type_name = fields
            .get("_class")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| MapperError::Serialization("missing _class marker".to_string()))?;
        let attrs: Item = fields
            .iter()
            .filter(|(name, _)| !is_reserved_name(name))
            .map(|(name, value)| (name.clone(), Value::from_json(value)))
            .collect();
        self.new_object(type_name, attrs)
    }

    // ------------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------------

    pub fn query(&self, ty: impl TypeRef, params: &SearchParams) -> Result<SearchResult> {
        self.search(ty, params, true)
    }

    pub fn scan(&self, ty: impl TypeRef, params: &SearchParams) -> Result<SearchResult> {
        self.search(ty, params, false)
    }

    fn search(&self, ty: impl TypeRef, params: &SearchParams, is_query: bool) -> Result<SearchResult> {
        let descriptor = self.descriptor(ty)?;
        let schema = descriptor.schema(&self.config)?;
        let request = params.to_request(&schema, is_query)?;

        let page = if is_query {
            self.gateway.query(&schema.table_name, &request)?
        } else {
            self.gateway.scan(&schema.table_name, &request)?
        };

        let items = page
            .items
            .iter()
            .map(|item| PersistentObject::from_item(self.clone(), descriptor.clone(), item.clone()))
            .collect();
        let next_token = page.last_evaluated_key.as_ref().map(encode_token);
        Ok(SearchResult {
            items,
            next_token,
            raw: page,
        })
    }
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapper")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
