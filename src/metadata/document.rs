//! Projections of the JSON documents served for tokens and contracts.
//!
//! Bodies are decoded through lenient raw shapes (every field optional) and
//! then mapped onto the stored records. A body that is not a JSON object, or
//! whose well-known fields carry the wrong JSON type, fails to decode.

use serde::Deserialize;
use serde_json::Value;

/// Token-level metadata document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataDocument {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub external_url: Option<String>,
    pub artist: Option<String>,
    pub artist_url: Option<String>,
    pub layers: Option<Vec<String>>,
    pub kind: Option<String>,
    pub composite: bool,
    pub attributes: Vec<Attribute>,
}

/// Single trait entry; every value is stored as text whatever its JSON type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub trait_type: String,
    pub value: String,
    pub display_type: Option<String>,
}

/// Contract-level projection merged field by field into the contract entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractMetadata {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub external_link: Option<String>,
    pub artist: Option<String>,
    pub artist_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTokenMetadata {
    name: Option<String>,
    description: Option<String>,
    image: Option<String>,
    external_url: Option<String>,
    artist: Option<String>,
    artist_url: Option<String>,
    layers: Option<Vec<Value>>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    composite: Value,
    #[serde(default)]
    attributes: Value,
}

#[derive(Debug, Deserialize)]
struct RawAttribute {
    #[serde(default)]
    trait_type: Value,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    display_type: Value,
}

#[derive(Debug, Deserialize)]
struct RawContractMetadata {
    name: Option<String>,
    description: Option<String>,
    image: Option<String>,
    external_link: Option<String>,
    artist: Option<String>,
    artist_url: Option<String>,
}

impl MetadataDocument {
    pub fn from_json_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        let raw: RawTokenMetadata = serde_json::from_value(object_body(bytes)?)?;
        Ok(raw.into())
    }
}

impl ContractMetadata {
    pub fn from_json_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        let raw: RawContractMetadata = serde_json::from_value(object_body(bytes)?)?;
        Ok(Self {
            name: raw.name,
            description: raw.description,
            image: raw.image,
            external_link: raw.external_link,
            artist: raw.artist,
            artist_url: raw.artist_url,
        })
    }
}

impl From<RawTokenMetadata> for MetadataDocument {
    fn from(raw: RawTokenMetadata) -> Self {
        let attributes = match raw.attributes {
            Value::Array(entries) => entries
                .into_iter()
                .filter(Value::is_object)
                .filter_map(|entry| serde_json::from_value::<RawAttribute>(entry).ok())
                .map(Attribute::from)
                .collect(),
            _ => Vec::new(),
        };

        Self {
            name: raw.name,
            description: raw.description,
            image: raw.image,
            external_url: raw.external_url,
            artist: raw.artist,
            artist_url: raw.artist_url,
            layers: raw
                .layers
                .map(|layers| layers.iter().map(stringify).collect()),
            kind: raw.kind,
            composite: is_truthy(&raw.composite),
            attributes,
        }
    }
}

impl From<RawAttribute> for Attribute {
    fn from(raw: RawAttribute) -> Self {
        let display_type = if is_truthy(&raw.display_type) {
            Some(stringify(&raw.display_type))
        } else {
            None
        };

        Self {
            trait_type: stringify(&raw.trait_type),
            value: stringify(&raw.value),
            display_type,
        }
    }
}

// Derived structs also accept sequences, so the object shape is checked first.
fn object_body(bytes: &[u8]) -> serde_json::Result<Value> {
    let value: Value = serde_json::from_slice(bytes)?;
    if !value.is_object() {
        return Err(serde::de::Error::custom("metadata body must be a JSON object"));
    }
    Ok(value)
}

/// Strings are kept verbatim and any other JSON value is rendered as JSON text
/// (`7`, `true`, `[1,2]`). A missing or null field becomes `""`, not the
/// literal `"undefined"` a JavaScript `String(undefined)` coercion would give.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
