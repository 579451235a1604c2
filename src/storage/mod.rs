pub mod catalog;
pub mod condition;
pub mod engine;
pub mod memory;
pub mod table;

pub use catalog::Catalog;
pub use condition::{AttrPath, CompareOp, Condition, KeyCondition, RangeOp, attr};
pub use engine::{Page, SearchRequest, TableGateway, WriteOutcome};
pub use memory::InMemoryTables;
pub use table::Table;
