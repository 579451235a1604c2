pub mod reference;
pub mod safe;
pub mod token;

pub use reference::{
    Binding, Decoded, FKEY_EMPTY_STRING, FKEY_PREFIX, ForeignKey, decode, decode_value,
    is_reference,
};
pub use safe::{DATETIME_FORMAT, item_to_store_safe, restore_item, revive, to_store_safe};
pub use token::{decode_token, encode_token};
