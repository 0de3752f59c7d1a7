/// Job configuration: when a job first fires and how it recurs
///
/// Serialized alongside every scheduled trigger so rehydration can rebuild the
/// same schedule without re-deriving it. Durations are stored in milliseconds.

use crate::engine::trigger::interval_millis;
use crate::error::{Result, SchedulerError};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

/// Delay, then either a fixed interval (optionally bounded) or a cron expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfiguration {
    /// Offset from registration time to the first fire
    #[serde(rename = "delay_ms", with = "millis")]
    pub delay: Duration,
    /// Fixed period between fires; unset for cron jobs
    #[serde(rename = "recurring_interval_ms", with = "optional_millis", default)]
    pub recurring_interval: Option<Duration>,
    /// Total number of fires; unset repeats forever
    #[serde(default)]
    pub repeat_count: Option<u32>,
    /// Six or seven field cron expression (with seconds)
    #[serde(default)]
    pub cron_expression: Option<String>,
}

impl JobConfiguration {
    /// Fire every `interval`, forever unless bounded with `repeat`
    pub fn interval(interval: Duration) -> Self {
        Self {
            delay: Duration::ZERO,
            recurring_interval: Some(interval),
            repeat_count: None,
            cron_expression: None,
        }
    }

    /// Fire on a cron schedule
    pub fn cron(expression: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            recurring_interval: None,
            repeat_count: None,
            cron_expression: Some(expression.into()),
        }
    }

    /// Stop after `count` fires
    pub fn repeat(mut self, count: u32) -> Self {
        self.repeat_count = Some(count);
        self
    }

    /// Wait `delay` before the first fire
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Cron vs simple-interval discriminator
    pub fn is_cron(&self) -> bool {
        self.recurring_interval.is_none()
    }

    /// Check the exactly-one-of invariant and the individual fields
    pub fn validate(&self) -> Result<()> {
        if i64::try_from(self.delay.as_millis()).is_err() {
            return Err(SchedulerError::InvalidConfiguration(format!("delay {:?} is too large", self.delay)));
        }
        match (&self.recurring_interval, &self.cron_expression) {
            (Some(_), Some(_)) => Err(SchedulerError::InvalidConfiguration(
                "set either a recurring interval or a cron expression, not both".to_string(),
            )),
            (None, None) => Err(SchedulerError::InvalidConfiguration(
                "a recurring interval or a cron expression is required".to_string(),
            )),
            (Some(interval), None) => {
                interval_millis(*interval)?;
                if self.repeat_count == Some(0) {
                    return Err(SchedulerError::InvalidConfiguration(
                        "repeat count must be at least 1".to_string(),
                    ));
                }
                Ok(())
            }
            (None, Some(expression)) => {
                cron::Schedule::from_str(expression).map_err(|e| {
                    SchedulerError::InvalidConfiguration(format!("invalid cron expression '{}': {}", expression, e))
                })?;
                Ok(())
            }
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).map_err(serde::ser::Error::custom)?;
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod optional_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => {
                let millis = u64::try_from(duration.as_millis()).map_err(serde::ser::Error::custom)?;
                serializer.serialize_some(&millis)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
