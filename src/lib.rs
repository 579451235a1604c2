// ============================================================================
// dynamap Library
// ============================================================================
//
// Object persistence over hash/range keyed table stores: optimistic
// concurrency, references between rows, compound attributes, pagination and
// tables bound from infrastructure templates.
//
// ============================================================================

pub mod codec;
pub mod core;
pub mod persist;
pub mod prelude;
pub mod schema;
pub mod storage;

// Re-export main types for convenience
pub use codec::{Binding, ForeignKey};
pub use core::{Item, MapperConfig, MapperError, Result, StoreError, Value};
pub use persist::{
    Attr, BoundType, LoadState, Mapper, PersistentObject, SaveMode, SaveOptions, SearchParams,
    SearchResult, TypeDescriptor, TypeRef, TypeRegistry, VERSION_ATTR,
};
pub use schema::{
    CacheStats, InMemoryTemplateSource, KeySchemaElement, KeyType, Schema, SecondaryIndex,
    StackResolver, TemplateSource,
};
pub use storage::{
    Condition, InMemoryTables, KeyCondition, Page, RangeOp, SearchRequest, TableGateway,
    WriteOutcome, attr,
};

/// Builds an [`Item`] from `name => value` pairs.
///
/// # Examples
///
/// ```
/// use dynamap::{InMemoryTables, Mapper, Schema, TypeDescriptor, TypeRegistry, attrs};
/// use std::sync::Arc;
///
/// # fn main() -> dynamap::Result<()> {
/// let registry = Arc::new(TypeRegistry::new());
/// registry.register(TypeDescriptor::new("app.User", Schema::new("users", "email")))?;
///
/// let mapper = Mapper::new(Arc::new(InMemoryTables::new())).with_registry(registry);
/// mapper.ensure_table("app.User")?;
///
/// let mut user = mapper.new_object("app.User", attrs! {
///     "email" => "ada@example.com",
///     "name" => "Ada",
/// })?;
/// user.save()?;
/// assert_eq!(user.version(), 1);
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! attrs {
    () => {
        $crate::Item::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut item = $crate::Item::new();
        $(
            item.insert(::std::string::String::from($name), $crate::Value::from($value));
        )+
        item
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attrs_macro() {
        let item = attrs! { "a" => 1, "b" => "two", "c" => true };
        assert_eq!(item.len(), 3);
        assert_eq!(item["a"], Value::Int(1));
        assert_eq!(item["b"], Value::from("two"));
        assert!(attrs! {}.is_empty());
    }
}
