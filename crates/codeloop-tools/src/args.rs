//! Typed argument decoding.
//!
//! Models hallucinate: fields go missing, numbers arrive as strings, and a
//! call with no arguments may come through as `null`. Each tool declares a
//! small struct and decodes into it here so that every such mistake turns
//! into a readable validation error.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

/// Decode `params` into the tool's argument struct.
pub fn decode<T: DeserializeOwned>(tool: &str, params: Value) -> anyhow::Result<T> {
    let params = match params {
        Value::Null => Value::Object(Default::default()),
        // Some models double-encode the arguments object.
        Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        other => other,
    };
    serde_json::from_value(params).map_err(|e| anyhow::anyhow!("invalid arguments for {tool}: {e}"))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i64),
    Float(f64),
    String(String),
}

fn to_usize<E: de::Error>(value: NumberOrString) -> Result<usize, E> {
    match value {
        NumberOrString::Number(n) => {
            usize::try_from(n).map_err(|_| E::custom(format!("expected a non-negative integer, got {n}")))
        }
        NumberOrString::Float(f) if f.fract() == 0.0 && f >= 0.0 => Ok(f as usize),
        NumberOrString::Float(f) => Err(E::custom(format!("expected an integer, got {f}"))),
        NumberOrString::String(s) => s
            .trim()
            .parse::<usize>()
            .map_err(|_| E::custom(format!("expected an integer, got \"{s}\""))),
    }
}

/// Accept `5`, `5.0` and `"5"` for an integer field.
pub fn lenient_usize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    to_usize(NumberOrString::deserialize(deserializer)?)
}

/// [`lenient_usize`] for optional fields; `null` decodes as `None`.
pub fn lenient_opt_usize<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<usize>, D::Error> {
    match Option::<NumberOrString>::deserialize(deserializer)? {
        Some(value) => to_usize(value).map(Some),
        None => Ok(None),
    }
}

/// Treat an empty string the same as an absent field.
pub fn non_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.trim().is_empty()))
}
