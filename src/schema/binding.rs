// ============================================================================
// Dynamically Bound Schemas
// ============================================================================
//
// A bound type does not declare its table. It names a (stack, logical id)
// pair inside an externally managed infrastructure template; the key schema
// comes from that resource's `Properties`, the table name from the stack's
// physical resource id.
//
// Template bodies are cached per stack and physical ids per (stack, logical
// id). Both caches are shared by every type bound through the same resolver.
//
// ============================================================================

use super::{Schema, SchemaProvider};
use crate::codec::Binding;
use crate::core::{MapperError, Result};
use log::{info, warn};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

pub const TABLE_RESOURCE_TYPE: &str = "AWS::DynamoDB::Table";

/// One resource of a deployed stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackResource {
    pub logical_id: String,
    pub physical_id: String,
    pub resource_type: String,
}

/// Read access to deployed infrastructure stacks.
///
/// `Ok(None)` means the stack or resource does not exist.
pub trait TemplateSource: Send + Sync {
    fn get_template(&self, stack: &str) -> Result<Option<Json>>;

    fn describe_stack_resource(&self, stack: &str, logical_id: &str)
    -> Result<Option<StackResource>>;
}

#[derive(Debug, Default)]
struct StackEntry {
    template: Json,
    physical_ids: HashMap<String, String>,
}

/// Template source backed by a map, for tests and local development.
#[derive(Debug, Default)]
pub struct InMemoryTemplateSource {
    stacks: RwLock<HashMap<String, StackEntry>>,
    template_calls: AtomicU64,
    resource_calls: AtomicU64,
}

impl InMemoryTemplateSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deploys (or replaces) a stack. `physical_ids` maps logical ids to the
    /// names the resources were given at deploy time.
    pub fn put_stack(
        &self,
        stack: &str,
        template: Json,
        physical_ids: &[(&str, &str)],
    ) -> Result<()> {
        let entry = StackEntry {
            template,
            physical_ids: physical_ids
                .iter()
                .map(|(logical, physical)| (logical.to_string(), physical.to_string()))
                .collect(),
        };
        self.stacks.write()?.insert(stack.to_string(), entry);
        Ok(())
    }

    pub fn remove_stack(&self, stack: &str) -> Result<bool> {
        Ok(self.stacks.write()?.remove(stack).is_some())
    }

    /// Number of `get_template` calls served.
    pub fn template_calls(&self) -> u64 {
        self.template_calls.load(Ordering::SeqCst)
    }

    /// Number of `describe_stack_resource` calls served.
    pub fn resource_calls(&self) -> u64 {
        self.resource_calls.load(Ordering::SeqCst)
    }
}

impl TemplateSource for InMemoryTemplateSource {
    fn get_template(&self, stack: &str) -> Result<Option<Json>> {
        self.template_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .stacks
            .read()?
            .get(stack)
            .map(|entry| entry.template.clone()))
    }

    fn describe_stack_resource(
        &self,
        stack: &str,
        logical_id: &str,
    ) -> Result<Option<StackResource>> {
        self.resource_calls.fetch_add(1, Ordering::SeqCst);
        let stacks = self.stacks.read()?;
        let Some(entry) = stacks.get(stack) else {
            return Ok(None);
        };
        let Some(physical_id) = entry.physical_ids.get(logical_id) else {
            return Ok(None);
        };
        let resource_type = entry
            .template
            .get("Resources")
            .and_then(|resources| resources.get(logical_id))
            .and_then(|resource| resource.get("Type"))
            .and_then(Json::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Some(StackResource {
            logical_id: logical_id.to_string(),
            physical_id: physical_id.clone(),
            resource_type,
        }))
    }
}

/// Hit/miss counters of a [`StackResolver`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub template_hits: u64,
    pub template_misses: u64,
    pub resource_hits: u64,
    pub resource_misses: u64,
}

/// Caching front for a [`TemplateSource`].
pub struct StackResolver {
    source: Arc<dyn TemplateSource>,
    templates: RwLock<HashMap<String, Arc<Json>>>,
    physical_ids: RwLock<HashMap<Binding, String>>,
    template_hits: AtomicU64,
    template_misses: AtomicU64,
    resource_hits: AtomicU64,
    resource_misses: AtomicU64,
}

impl StackResolver {
    pub fn new(source: Arc<dyn TemplateSource>) -> Self {
        Self {
            source,
            templates: RwLock::new(HashMap::new()),
            physical_ids: RwLock::new(HashMap::new()),
            template_hits: AtomicU64::new(0),
            template_misses: AtomicU64::new(0),
            resource_hits: AtomicU64::new(0),
            resource_misses: AtomicU64::new(0),
        }
    }

    pub fn template(&self, stack: &str) -> Result<Arc<Json>> {
        if let Some(template) = self.templates.read()?.get(stack) {
            self.template_hits.fetch_add(1, Ordering::SeqCst);
            info!("Cache hit loading template for stack {}", stack);
            return Ok(template.clone());
        }

        self.template_misses.fetch_add(1, Ordering::SeqCst);
        warn!("Cache miss loading template for stack {}", stack);
        let template = self.source.get_template(stack)?.ok_or_else(|| {
            MapperError::Configuration(format!(
                "unable to retrieve template for stack '{}'; the stack does not exist",
                stack
            ))
        })?;
        let template = Arc::new(template);
        self.templates
            .write()?
            .insert(stack.to_string(), template.clone());
        Ok(template)
    }

    pub fn physical_name(&self, binding: &Binding) -> Result<String> {
        if let Some(name) = self.physical_ids.read()?.get(binding) {
            self.resource_hits.fetch_add(1, Ordering::SeqCst);
            info!(
                "Cache hit loading resource {} of stack {}",
                binding.logical_id, binding.stack
            );
            return Ok(name.clone());
        }

        self.resource_misses.fetch_add(1, Ordering::SeqCst);
        warn!(
            "Cache miss loading resource {} of stack {}",
            binding.logical_id, binding.stack
        );
        let resource = self
            .source
            .describe_stack_resource(&binding.stack, &binding.logical_id)?
            .ok_or_else(|| {
                MapperError::Configuration(format!(
                    "stack '{}' has no resource '{}'",
                    binding.stack, binding.logical_id
                ))
            })?;
        self.physical_ids
            .write()?
            .insert(binding.clone(), resource.physical_id.clone());
        Ok(resource.physical_id)
    }

    /// Builds the schema of the table resource at `binding`.
    pub fn table_schema(&self, binding: &Binding) -> Result<Schema> {
        let template = self.template(&binding.stack)?;
        let resource = template
            .get("Resources")
            .and_then(|resources| resources.get(&binding.logical_id))
            .ok_or_else(|| {
                MapperError::Configuration(format!(
                    "stack '{}' does not contain a resource named '{}'",
                    binding.stack, binding.logical_id
                ))
            })?;

        let resource_type = resource
            .get("Type")
            .and_then(Json::as_str)
            .unwrap_or_default();
        if resource_type != TABLE_RESOURCE_TYPE {
            return Err(MapperError::Configuration(format!(
                "resource '{}' in stack '{}' is of type '{}', not '{}'",
                binding.logical_id, binding.stack, resource_type, TABLE_RESOURCE_TYPE
            )));
        }

        let properties = resource.get("Properties").ok_or_else(|| {
            MapperError::Configuration(format!(
                "resource '{}' in stack '{}' has no properties",
                binding.logical_id, binding.stack
            ))
        })?;
        let mut schema = Schema::from_properties(properties)?;
        schema.table_name = self.physical_name(binding)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn invalidate_templates(&self) -> Result<()> {
        self.templates.write()?.clear();
        Ok(())
    }

    pub fn invalidate_resources(&self) -> Result<()> {
        self.physical_ids.write()?.clear();
        Ok(())
    }

    pub fn invalidate(&self) -> Result<()> {
        self.invalidate_templates()?;
        self.invalidate_resources()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            template_hits: self.template_hits.load(Ordering::SeqCst),
            template_misses: self.template_misses.load(Ordering::SeqCst),
            resource_hits: self.resource_hits.load(Ordering::SeqCst),
            resource_misses: self.resource_misses.load(Ordering::SeqCst),
        }
    }
}

impl std::fmt::Debug for StackResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackResolver")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Schema provider for a type bound to fixed stack coordinates.
#[derive(Debug, Clone)]
pub struct BoundSchema {
    binding: Binding,
    resolver: Arc<StackResolver>,
    required: Vec<String>,
}

impl BoundSchema {
    pub fn new(binding: Binding, resolver: Arc<StackResolver>) -> Self {
        Self {
            binding,
            resolver,
            required: Vec::new(),
        }
    }

    pub fn with_required(mut self, required: Vec<String>) -> Self {
        self.required = required;
        self
    }
}

impl SchemaProvider for BoundSchema {
    fn load_schema(&self) -> Result<Schema> {
        let mut schema = self.resolver.table_schema(&self.binding)?;
        schema.required_attributes = self.required.clone();
        Ok(schema)
    }

    fn binding(&self) -> Option<&Binding> {
        Some(&self.binding)
    }
}
