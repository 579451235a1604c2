pub mod config;
pub mod error;
pub mod value;

pub use config::MapperConfig;
pub use error::{MapperError, Result, StoreError};
pub use value::{Item, Value};
