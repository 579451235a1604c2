use super::Schema;
use crate::codec::Binding;
use crate::core::Result;
use std::sync::{Arc, RwLock};

/// Source of a type's table schema.
pub trait SchemaProvider: Send + Sync {
    fn load_schema(&self) -> Result<Schema>;

    /// Coordinates of a physically bound table. Bound table names are used
    /// verbatim and never namespaced.
    fn binding(&self) -> Option<&Binding> {
        None
    }
}

/// Schema declared in code.
#[derive(Debug, Clone)]
pub struct StaticSchema {
    schema: Schema,
}

impl StaticSchema {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }
}

impl SchemaProvider for StaticSchema {
    fn load_schema(&self) -> Result<Schema> {
        self.schema.validate()?;
        Ok(self.schema.clone())
    }
}

/// Computes a schema once and keeps it until invalidated.
pub struct SchemaCache {
    provider: Arc<dyn SchemaProvider>,
    cached: RwLock<Option<Arc<Schema>>>,
}

impl SchemaCache {
    pub fn new(provider: Arc<dyn SchemaProvider>) -> Self {
        Self {
            provider,
            cached: RwLock::new(None),
        }
    }

    pub fn get(&self) -> Result<Arc<Schema>> {
        if let Some(schema) = self.cached.read()?.as_ref() {
            return Ok(schema.clone());
        }

        let mut cached = self.cached.write()?;
        if let Some(schema) = cached.as_ref() {
            return Ok(schema.clone());
        }
        let schema = Arc::new(self.provider.load_schema()?);
        *cached = Some(schema.clone());
        Ok(schema)
    }

    pub fn invalidate(&self) -> Result<()> {
        *self.cached.write()? = None;
        Ok(())
    }

    pub fn binding(&self) -> Option<&Binding> {
        self.provider.binding()
    }
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCache")
            .field("binding", &self.binding())
            .finish_non_exhaustive()
    }
}
