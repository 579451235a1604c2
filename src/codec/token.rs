use crate::core::{Item, MapperError, Result, Value};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;

/// Turns a store continuation key into an opaque, url-safe token.
///
/// Padding is stripped; [`decode_token`] puts it back.
pub fn encode_token(last_key: &Item) -> String {
    let json = serde_json::Value::Object(
        last_key
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect(),
    );
    let encoded = URL_SAFE.encode(json.to_string().as_bytes());
    encoded.trim_end_matches('=').to_string()
}

pub fn decode_token(token: &str) -> Result<Item> {
    let mut padded = token.to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }

    let bytes = URL_SAFE
        .decode(padded.as_bytes())
        .map_err(|e| MapperError::MalformedToken(e.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|e| MapperError::MalformedToken(e.to_string()))?;
    let json: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| MapperError::MalformedToken(e.to_string()))?;

    match json {
        serde_json::Value::Object(map) => Ok(map
            .iter()
            .map(|(name, value)| (name.clone(), Value::from_json(value)))
            .collect()),
        other => Err(MapperError::MalformedToken(format!(
            "expected an object, found {}",
            other
        ))),
    }
}
