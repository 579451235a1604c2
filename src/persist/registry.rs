// ============================================================================
// Type Registry
// ============================================================================
//
// Rows only carry a type name (and, for bound types, stack coordinates).
// The registry turns that back into a `TypeDescriptor`: the schema, relation
// contributors and compound attributes of the type. Names nobody registered
// fail closed with `UnknownType`.
//
// ============================================================================

use super::compound::CompoundRegistry;
use super::relation::{BaseContributor, BindingContributor, RelationContributor};
use crate::codec::Binding;
use crate::core::{MapperConfig, MapperError, Result};
use crate::schema::{BoundSchema, Schema, SchemaCache, SchemaProvider, StackResolver, StaticSchema};
use lazy_static::lazy_static;
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Everything the mapper knows about one persistent type.
pub struct TypeDescriptor {
    name: String,
    schema: SchemaCache,
    contributors: Vec<Arc<dyn RelationContributor>>,
    compounds: Arc<CompoundRegistry>,
}

impl TypeDescriptor {
    /// A type whose table is declared in code.
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self::with_provider(name, Arc::new(StaticSchema::new(schema)))
    }

    pub fn with_provider(name: impl Into<String>, provider: Arc<dyn SchemaProvider>) -> Self {
        Self {
            name: name.into(),
            schema: SchemaCache::new(provider),
            contributors: vec![Arc::new(BaseContributor)],
            compounds: Arc::new(CompoundRegistry::new()),
        }
    }

    /// Appends a relation contributor; it runs after all earlier ones.
    pub fn with_contributor(mut self, contributor: Arc<dyn RelationContributor>) -> Self {
        self.contributors.push(contributor);
        self
    }

    /// Shares a compound registry with other descriptors.
    pub fn with_compounds(mut self, compounds: Arc<CompoundRegistry>) -> Self {
        self.compounds = compounds;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn binding(&self) -> Option<&Binding> {
        self.schema.binding()
    }

    pub fn contributors(&self) -> &[Arc<dyn RelationContributor>] {
        &self.contributors
    }

    pub fn compounds(&self) -> &CompoundRegistry {
        &self.compounds
    }

    /// Logical schema as declared or derived, cached.
    pub fn declared_schema(&self) -> Result<Arc<Schema>> {
        self.schema.get()
    }

    /// Schema with the physical table name under `config`.
    ///
    /// Declared tables are namespaced by application and stage; bound tables
    /// already carry their physical name.
    pub fn schema(&self, config: &MapperConfig) -> Result<Arc<Schema>> {
        let schema = self.schema.get()?;
        if self.binding().is_some() || (config.app.is_none() && config.stage.is_none()) {
            return Ok(schema);
        }
        let mut qualified = (*schema).clone();
        qualified.table_name = config.qualify_table_name(&schema.table_name);
        Ok(Arc::new(qualified))
    }

    pub fn invalidate_schema(&self) -> Result<()> {
        self.schema.invalidate()
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("binding", &self.binding())
            .field("contributors", &self.contributors.len())
            .finish_non_exhaustive()
    }
}

/// Template for types bound to infrastructure stacks.
///
/// `bind` produces one concrete descriptor per (stack, logical id). Every
/// bound descriptor keeps the template's type name, so rows written through
/// any of them reference the same registered type.
pub struct BoundType {
    name: String,
    resolver: Arc<StackResolver>,
    default_binding: Option<Binding>,
    required: Vec<String>,
    contributors: Vec<Arc<dyn RelationContributor>>,
    compounds: Arc<CompoundRegistry>,
    bound: RwLock<HashMap<Binding, Arc<TypeDescriptor>>>,
}

impl BoundType {
    pub fn new(name: impl Into<String>, resolver: Arc<StackResolver>) -> Self {
        Self {
            name: name.into(),
            resolver,
            default_binding: None,
            required: Vec::new(),
            contributors: Vec::new(),
            compounds: Arc::new(CompoundRegistry::new()),
            bound: RwLock::new(HashMap::new()),
        }
    }

    /// Coordinates used when a lookup does not name any.
    pub fn with_default_binding(mut self, binding: Binding) -> Self {
        self.default_binding = Some(binding);
        self
    }

    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    pub fn with_contributor(mut self, contributor: Arc<dyn RelationContributor>) -> Self {
        self.contributors.push(contributor);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_binding(&self) -> Option<&Binding> {
        self.default_binding.as_ref()
    }

    pub fn compounds(&self) -> &CompoundRegistry {
        &self.compounds
    }

    pub fn bind(&self, binding: &Binding) -> Result<Arc<TypeDescriptor>> {
        if let Some(descriptor) = self.bound.read()?.get(binding) {
            return Ok(descriptor.clone());
        }

        let mut bound = self.bound.write()?;
        if let Some(descriptor) = bound.get(binding) {
            return Ok(descriptor.clone());
        }

        let provider = BoundSchema::new(binding.clone(), self.resolver.clone())
            .with_required(self.required.clone());
        let mut descriptor = TypeDescriptor::with_provider(self.name.clone(), Arc::new(provider))
            .with_compounds(self.compounds.clone());
        for contributor in &self.contributors {
            descriptor = descriptor.with_contributor(contributor.clone());
        }
        let descriptor = Arc::new(
            descriptor.with_contributor(Arc::new(BindingContributor::new(binding.clone()))),
        );

        debug!(
            "Bound type {} to {}/{}",
            self.name, binding.stack, binding.logical_id
        );
        bound.insert(binding.clone(), descriptor.clone());
        Ok(descriptor)
    }

    /// Invalidates the schema of every descriptor bound so far.
    pub fn invalidate_schemas(&self) -> Result<()> {
        for descriptor in self.bound.read()?.values() {
            descriptor.invalidate_schema()?;
        }
        Ok(())
    }
}

impl fmt::Debug for BoundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundType")
            .field("name", &self.name)
            .field("default_binding", &self.default_binding)
            .finish_non_exhaustive()
    }
}

/// Produces the descriptor for a type name, given optional coordinates.
pub type TypeFactory = Arc<dyn Fn(Option<&Binding>) -> Result<Arc<TypeDescriptor>> + Send + Sync>;

/// Name to factory table used for dynamic type resolution.
#[derive(Default)]
pub struct TypeRegistry {
    factories: RwLock<HashMap<String, TypeFactory>>,
}

// Global singleton instance of TypeRegistry
lazy_static! {
    static ref GLOBAL_TYPE_REGISTRY: Arc<TypeRegistry> = Arc::new(TypeRegistry::new());
}

impl TypeRegistry {
    /// Get the global TypeRegistry instance
    ///
    /// Shared by every mapper that was not given its own registry.
    pub fn global() -> &'static Arc<TypeRegistry> {
        &GLOBAL_TYPE_REGISTRY
    }

    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `name`, replacing any earlier registration.
    pub fn register_factory(&self, name: &str, factory: TypeFactory) -> Result<()> {
        debug!("Registering type {}", name);
        self.factories.write()?.insert(name.to_string(), factory);
        Ok(())
    }

    /// Registers a type with a fixed schema. Coordinates in references to it
    /// are ignored.
    pub fn register(&self, descriptor: TypeDescriptor) -> Result<Arc<TypeDescriptor>> {
        let descriptor = Arc::new(descriptor);
        let shared = descriptor.clone();
        let factory: TypeFactory =
            Arc::new(move |_binding: Option<&Binding>| -> Result<Arc<TypeDescriptor>> {
                Ok(shared.clone())
            });
        self.register_factory(descriptor.name(), factory)?;
        Ok(descriptor)
    }

    /// Registers a bound type; lookups bind it to the requested coordinates,
    /// or to its default ones.
    pub fn register_bound(&self, bound_type: BoundType) -> Result<Arc<BoundType>> {
        let bound_type = Arc::new(bound_type);
        let shared = bound_type.clone();
        let factory: TypeFactory =
            Arc::new(move |binding: Option<&Binding>| -> Result<Arc<TypeDescriptor>> {
                let binding = binding.or(shared.default_binding()).ok_or_else(|| {
                    MapperError::Configuration(format!(
                        "type '{}' is bound to a stack but no coordinates were given",
                        shared.name()
                    ))
                })?;
                shared.bind(binding)
            });
        self.register_factory(bound_type.name(), factory)?;
        Ok(bound_type)
    }

    pub fn resolve(&self, name: &str, binding: Option<&Binding>) -> Result<Arc<TypeDescriptor>> {
        let factory = self
            .factories
            .read()?
            .get(name)
            .cloned()
            .ok_or_else(|| MapperError::UnknownType(name.to_string()))?;
        factory(binding)
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.factories.read()?.contains_key(name))
    }

    pub fn unregister(&self, name: &str) -> Result<bool> {
        Ok(self.factories.write()?.remove(name).is_some())
    }

    pub fn names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.factories.read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.names().unwrap_or_default())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::InMemoryTemplateSource;
    use serde_json::json;

    fn resolver() -> Arc<StackResolver> {
        let source = Arc::new(InMemoryTemplateSource::new());
        let template = json!({
            "Resources": {
                "Ledger": {
                    "Type": "AWS::DynamoDB::Table",
                    "Properties": {
                        "KeySchema": [{"AttributeName": "entry", "KeyType": "HASH"}]
                    }
                }
            }
        });
        source
            .put_stack("blue", template.clone(), &[("Ledger", "blue-Ledger-A1")])
            .unwrap();
        source
            .put_stack("green", template, &[("Ledger", "green-Ledger-B2")])
            .unwrap();
        Arc::new(StackResolver::new(source))
    }

    #[test]
    fn test_unregistered_type_fails_closed() {
        let registry = TypeRegistry::new();
        match registry.resolve("app.Ghost", None) {
            Err(MapperError::UnknownType(name)) => assert_eq!(name, "app.Ghost"),
            other => panic!("Expected UnknownType, got {:?}", other),
        }
    }

    #[test]
    fn test_static_type_ignores_binding() {
        let registry = TypeRegistry::new();
        let registered = registry
            .register(TypeDescriptor::new("app.User", Schema::new("users", "email")))
            .unwrap();
        let resolved = registry
            .resolve("app.User", Some(&Binding::new("s", "l")))
            .unwrap();
        assert!(Arc::ptr_eq(&registered, &resolved));
    }

    #[test]
    fn test_bound_type_binds_per_coordinates() {
        let registry = TypeRegistry::new();
        registry
            .register_bound(BoundType::new("app.Ledger", resolver()))
            .unwrap();

        let blue = registry
            .resolve("app.Ledger", Some(&Binding::new("blue", "Ledger")))
            .unwrap();
        let blue_again = registry
            .resolve("app.Ledger", Some(&Binding::new("blue", "Ledger")))
            .unwrap();
        let green = registry
            .resolve("app.Ledger", Some(&Binding::new("green", "Ledger")))
            .unwrap();

        assert!(Arc::ptr_eq(&blue, &blue_again));
        assert_eq!(blue.name(), "app.Ledger");
        assert_eq!(green.name(), "app.Ledger");
        let config = MapperConfig::new().app("shop");
        assert_eq!(blue.schema(&config).unwrap().table_name, "blue-Ledger-A1");
        assert_eq!(green.schema(&config).unwrap().table_name, "green-Ledger-B2");
    }

    #[test]
    fn test_bound_type_needs_coordinates() {
        let registry = TypeRegistry::new();
        registry
            .register_bound(BoundType::new("app.Ledger", resolver()))
            .unwrap();
        assert!(matches!(
            registry.resolve("app.Ledger", None),
            Err(MapperError::Configuration(_))
        ));

        registry
            .register_bound(
                BoundType::new("app.Ledger", resolver())
                    .with_default_binding(Binding::new("green", "Ledger")),
            )
            .unwrap();
        let descriptor = registry.resolve("app.Ledger", None).unwrap();
        assert_eq!(descriptor.binding(), Some(&Binding::new("green", "Ledger")));
    }

    #[test]
    fn test_declared_tables_are_namespaced() {
        let descriptor = TypeDescriptor::new("app.User", Schema::new("users", "email"));
        let config = MapperConfig::new().app("shop").stage("dev");
        assert_eq!(descriptor.schema(&config).unwrap().table_name, "users_shop_dev");
        assert_eq!(descriptor.declared_schema().unwrap().table_name, "users");
    }
}
