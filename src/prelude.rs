//! Everything an application typically needs in one import.
//!
//! ```
//! use dynamap::prelude::*;
//! ```

pub use crate::attrs;
pub use crate::codec::{Binding, ForeignKey};
pub use crate::core::{Item, MapperConfig, MapperError, Result, Value};
pub use crate::persist::{
    Attr, BoundType, Mapper, PersistentObject, SaveOptions, SearchParams, SearchResult,
    TypeDescriptor, TypeRegistry,
};
pub use crate::schema::{Schema, SecondaryIndex, StackResolver};
pub use crate::storage::{Condition, InMemoryTables, KeyCondition, RangeOp, TableGateway, attr};
