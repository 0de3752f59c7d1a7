/// Scheduled job data carried by every live trigger
///
/// The trigger engine stores a flat string map per job; these are the only
/// fields it ever sees. The action's source never leaves the action store.

use crate::error::{Result, SchedulerError};
use crate::jobs::config::JobConfiguration;
use serde::Serialize;
use std::collections::BTreeMap;

/// Flat key/value map persisted with each trigger
pub type JobDataMap = BTreeMap<String, String>;

pub const ACTION_IDENTIFIER_FIELD: &str = "action_identifier";
pub const INSTANCE_KEY_FIELD: &str = "instance_key";
pub const ARGUMENT_VALUE_FIELD: &str = "argument_value";
pub const ARGUMENT_TYPE_FIELD: &str = "argument_type";
pub const CONFIGURATION_FIELD: &str = "configuration";

/// Separator between action identifier and instance key in engine job keys
pub const JOB_KEY_SEPARATOR: &str = "__";

/// Check that `identifier` keeps engine job keys unambiguous
///
/// Identifiers must be non-empty, must not contain the separator and must not
/// end in `_`. The first `__` of a job key then always ends the identifier, so
/// (`a`, `_b`) and (`a_`, `b`) cannot both map to `a___b`.
pub fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.is_empty() || identifier.contains(JOB_KEY_SEPARATOR) || identifier.ends_with('_') {
        return Err(SchedulerError::InvalidConfiguration(format!(
            "action identifier '{}' must be non-empty, must not contain '{}' and must not end in '_'",
            identifier, JOB_KEY_SEPARATOR
        )));
    }
    Ok(())
}

/// Unique engine key for one scheduled instance of an action
///
/// Injective for identifiers accepted by `validate_identifier`.
pub fn job_key(identifier: &str, instance_key: &str) -> String {
    format!("{}{}{}", identifier, JOB_KEY_SEPARATOR, instance_key)
}

/// A serialized argument together with the descriptor of its Rust type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedArgument {
    /// `std::any::type_name` of the argument
    pub type_name: String,
    /// JSON encoding of the value
    pub value: String,
}

impl TypedArgument {
    pub fn of<A: Serialize + ?Sized + 'static>(argument: &A) -> Result<Self> {
        Ok(Self {
            type_name: std::any::type_name::<A>().to_string(),
            value: serde_json::to_string(argument)?,
        })
    }

    /// Untyped JSON argument (scripts and the HTTP API)
    pub fn json(value: &serde_json::Value) -> Result<Self> {
        Self::of(value)
    }
}

/// Everything the engine stores with a trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledJobData {
    pub action_identifier: String,
    pub instance_key: String,
    pub argument: TypedArgument,
    /// Absent only for jobs written by something other than the façade
    pub configuration: Option<JobConfiguration>,
}

impl ScheduledJobData {
    pub fn job_key(&self) -> String {
        job_key(&self.action_identifier, &self.instance_key)
    }

    pub fn to_map(&self) -> Result<JobDataMap> {
        let mut map = JobDataMap::new();
        map.insert(ACTION_IDENTIFIER_FIELD.to_string(), self.action_identifier.clone());
        map.insert(INSTANCE_KEY_FIELD.to_string(), self.instance_key.clone());
        map.insert(ARGUMENT_VALUE_FIELD.to_string(), self.argument.value.clone());
        map.insert(ARGUMENT_TYPE_FIELD.to_string(), self.argument.type_name.clone());
        if let Some(configuration) = &self.configuration {
            map.insert(CONFIGURATION_FIELD.to_string(), serde_json::to_string(configuration)?);
        }
        Ok(map)
    }

    /// Read job data back from an engine map; `key` labels errors
    pub fn from_map(key: &str, map: &JobDataMap) -> Result<Self> {
        let field = |name: &str| {
            map.get(name).cloned().ok_or_else(|| SchedulerError::MissingJobData {
                key: key.to_string(),
                field: name.to_string(),
            })
        };
        let configuration = match map.get(CONFIGURATION_FIELD).filter(|c| !c.trim().is_empty()) {
            Some(json) => Some(serde_json::from_str(json)?),
            None => None,
        };

        Ok(Self {
            action_identifier: field(ACTION_IDENTIFIER_FIELD)?,
            instance_key: field(INSTANCE_KEY_FIELD)?,
            argument: TypedArgument {
                type_name: field(ARGUMENT_TYPE_FIELD)?,
                value: field(ARGUMENT_VALUE_FIELD)?,
            },
            configuration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    struct Reminder {
        value: String,
    }

    #[test]
    fn job_keys_combine_identifier_and_instance() {
        assert_eq!(job_key("reminder", "1001"), "reminder__1001");
    }

    #[test]
    fn identifiers_that_would_make_keys_ambiguous_are_rejected() {
        assert!(validate_identifier("reminder").is_ok());
        assert!(validate_identifier("send-activation_reminder").is_ok());
        assert!(validate_identifier("a_").is_err());
        assert!(validate_identifier("a__b").is_err());
        assert!(validate_identifier("").is_err());

        // the first separator always ends a valid identifier
        let key = job_key("a", "_b");
        assert_eq!(key, "a___b");
        assert_eq!(key.split_once(JOB_KEY_SEPARATOR), Some(("a", "_b")));
    }

    #[test]
    fn typed_arguments_carry_their_type_name() {
        let argument = TypedArgument::of(&Reminder { value: "hi".into() }).unwrap();
        assert!(argument.type_name.ends_with("Reminder"));
        assert_eq!(argument.value, r#"{"value":"hi"}"#);

        let json = TypedArgument::json(&serde_json::json!({"a": 1})).unwrap();
        assert_eq!(json.type_name, std::any::type_name::<serde_json::Value>());
    }

    #[test]
    fn map_form_keeps_every_field() {
        let data = ScheduledJobData {
            action_identifier: "reminder".into(),
            instance_key: "1001".into(),
            argument: TypedArgument::of(&Reminder { value: "hi".into() }).unwrap(),
            configuration: Some(JobConfiguration::interval(Duration::from_secs(5)).repeat(5)),
        };
        let map = data.to_map().unwrap();
        assert_eq!(map.len(), 5);
        assert_eq!(ScheduledJobData::from_map("reminder__1001", &map).unwrap(), data);
    }

    #[test]
    fn missing_fields_are_reported_by_name() {
        let mut map = JobDataMap::new();
        map.insert(ACTION_IDENTIFIER_FIELD.into(), "x".into());
        let err = ScheduledJobData::from_map("x__1", &map).unwrap_err();
        assert!(matches!(err, SchedulerError::MissingJobData { field, .. } if field == INSTANCE_KEY_FIELD));
    }
}
