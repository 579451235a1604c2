// ============================================================================
// Foreign-Key Reference Codec
// ============================================================================
//
// A reference is `dynamap_fkey=` followed by compact JSON:
//
//     {"binding":{...},"class":"app.User","key":{"email":"a@b.com"}}
//
// Object keys are always emitted in sorted order, so two references to the
// same row are byte-identical and can be used as secondary-index values.
//
// ============================================================================

use crate::core::Value;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;

pub const FKEY_PREFIX: &str = "dynamap_fkey=";

/// Stored in place of `""`, which many table stores reject.
pub const FKEY_EMPTY_STRING: &str = "dynamap_fkey=EMPTY-STRING";

/// Physical coordinates of a dynamically bound type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Binding {
    pub stack: String,
    pub logical_id: String,
}

impl Binding {
    pub fn new(stack: impl Into<String>, logical_id: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            logical_id: logical_id.into(),
        }
    }
}

/// Everything needed to re-fetch a related row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    #[serde(rename = "class")]
    pub type_name: String,
    pub key: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<Binding>,
}

impl ForeignKey {
    pub fn new(type_name: impl Into<String>, key: BTreeMap<String, Value>) -> Self {
        Self {
            type_name: type_name.into(),
            key,
            binding: None,
        }
    }

    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn encode(&self) -> String {
        let mut object = serde_json::Map::new();
        object.insert("class".to_string(), Json::String(self.type_name.clone()));
        object.insert(
            "key".to_string(),
            Json::Object(
                self.key
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect(),
            ),
        );
        if let Some(binding) = &self.binding {
            let mut coords = serde_json::Map::new();
            coords.insert("logical_id".to_string(), Json::String(binding.logical_id.clone()));
            coords.insert("stack".to_string(), Json::String(binding.stack.clone()));
            object.insert("binding".to_string(), Json::Object(coords));
        }
        format!("{}{}", FKEY_PREFIX, Json::Object(object))
    }
}

/// Result of decoding a string that carries the reference prefix.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Reference(ForeignKey),
    Constant(Value),
}

/// Decodes `text` into a reference or a constant.
///
/// Returns `None` for anything that is not a well-formed reference; this
/// function never fails.
pub fn decode(text: &str) -> Option<Decoded> {
    if text == FKEY_EMPTY_STRING {
        return Some(Decoded::Constant(Value::Text(String::new())));
    }
    let body = text.strip_prefix(FKEY_PREFIX)?;
    serde_json::from_str::<ForeignKey>(body)
        .ok()
        .map(Decoded::Reference)
}

pub fn decode_value(value: &Value) -> Option<Decoded> {
    match value {
        Value::Text(text) => decode(text),
        _ => None,
    }
}

pub fn is_reference(value: &Value) -> bool {
    decode_value(value).is_some()
}
