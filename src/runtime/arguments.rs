/// Argument type registry
///
/// Maps a persisted type descriptor (`std::any::type_name`) back to a decoder
/// for that type. Decoding deserializes the raw JSON into the concrete type,
/// so malformed values fail here, then re-encodes it for the Lua side.
/// Lock-free reads through `ArcSwap`; registrations swap the whole map.

use crate::error::{Result, SchedulerError};
use crate::jobs::data::TypedArgument;
use arc_swap::ArcSwap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};

type Decoder = fn(&str) -> serde_json::Result<Value>;

fn decode_as<T: Serialize + DeserializeOwned>(raw: &str) -> serde_json::Result<Value> {
    let value: T = serde_json::from_str(raw)?;
    serde_json::to_value(value)
}

/// Descriptor -> decoder map; `serde_json::Value` is always present
#[derive(Debug)]
pub struct ArgumentTypes {
    decoders: ArcSwap<HashMap<String, Decoder>>,
}

impl Default for ArgumentTypes {
    fn default() -> Self {
        Self::new()
    }
}

impl ArgumentTypes {
    pub fn new() -> Self {
        let registry = Self {
            decoders: ArcSwap::new(Arc::new(HashMap::new())),
        };
        registry.register::<Value>();
        registry
    }

    /// Make `T` resolvable from its descriptor
    pub fn register<T: Serialize + DeserializeOwned + 'static>(&self) {
        let type_name = std::any::type_name::<T>();
        if self.is_registered(type_name) {
            return;
        }
        self.decoders.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(type_name.to_string(), decode_as::<T> as Decoder);
            next
        });
        tracing::debug!("🧾 Registered argument type: {}", type_name);
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.decoders.load().contains_key(type_name)
    }

    /// Deserialize a persisted argument through its registered type
    pub fn decode(&self, argument: &TypedArgument) -> Result<Value> {
        let decoder = self
            .decoders
            .load()
            .get(&argument.type_name)
            .copied()
            .ok_or_else(|| SchedulerError::Deserialization {
                type_name: argument.type_name.clone(),
                message: "argument type is not registered".to_string(),
            })?;

        decoder(&argument.value).map_err(|e| SchedulerError::Deserialization {
            type_name: argument.type_name.clone(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Serialize, Deserialize)]
    struct Reminder {
        value: String,
    }

    #[test]
    fn registered_types_decode_their_values() {
        let types = ArgumentTypes::new();
        types.register::<Reminder>();

        let argument = TypedArgument::of(&Reminder { value: "hi".into() }).unwrap();
        assert_eq!(types.decode(&argument).unwrap(), json!({"value": "hi"}));

        let untyped = TypedArgument::json(&json!([1, 2])).unwrap();
        assert_eq!(types.decode(&untyped).unwrap(), json!([1, 2]));
    }

    #[test]
    fn unknown_types_and_malformed_values_fail() {
        let types = ArgumentTypes::new();
        let unknown = TypedArgument {
            type_name: "app::Missing".into(),
            value: "{}".into(),
        };
        assert!(matches!(types.decode(&unknown), Err(SchedulerError::Deserialization { .. })));

        types.register::<Reminder>();
        let malformed = TypedArgument {
            type_name: std::any::type_name::<Reminder>().into(),
            value: r#"{"other": 1}"#.into(),
        };
        assert!(matches!(types.decode(&malformed), Err(SchedulerError::Deserialization { .. })));
    }
}
