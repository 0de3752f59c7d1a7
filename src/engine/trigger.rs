/// Trigger state: when a job fires next and when it is exhausted
///
/// Misfires are skipped, never queued: the next fire time is always the first
/// slot after "now". Skipped slots do not count towards a repeat bound.

use crate::error::{Result, SchedulerError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};
use uuid::Uuid;

/// Cron or fixed-interval schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerKind {
    Cron {
        expression: String,
    },
    Simple {
        interval_ms: u64,
        /// Total fires allowed; `None` repeats forever
        repeat_count: Option<u32>,
    },
}

/// Persisted trigger of one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// New for every schedule; guards against timers left over from a deleted job
    pub id: Uuid,
    pub kind: TriggerKind,
    pub start_at: DateTime<Utc>,
    pub times_triggered: u32,
    pub next_fire_at: Option<DateTime<Utc>>,
    pub previous_fire_at: Option<DateTime<Utc>>,
}

/// Identifies one pending fire of one trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FireToken {
    pub trigger_id: Uuid,
    pub times_triggered: u32,
}

fn parse_cron(expression: &str) -> Result<cron::Schedule> {
    cron::Schedule::from_str(expression)
        .map_err(|e| SchedulerError::InvalidConfiguration(format!("invalid cron expression '{}': {}", expression, e)))
}

fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::MAX)
}

/// Whole milliseconds of an interval, rejecting values the slot arithmetic cannot hold
pub fn interval_millis(interval: Duration) -> Result<u64> {
    let millis = i64::try_from(interval.as_millis())
        .map_err(|_| SchedulerError::InvalidConfiguration(format!("interval {:?} is too large", interval)))?;
    if millis < 1 {
        return Err(SchedulerError::InvalidConfiguration(
            "interval must be at least one millisecond".to_string(),
        ));
    }
    Ok(millis.unsigned_abs())
}

fn overflow() -> SchedulerError {
    SchedulerError::InvalidConfiguration("next fire time is out of range".to_string())
}

impl Trigger {
    /// Cron trigger whose first fire is the first cron instant after `start_at`
    pub fn cron(expression: &str, start_at: DateTime<Utc>) -> Result<Self> {
        let schedule = parse_cron(expression)?;
        let next_fire_at = schedule.after(&start_at).next();
        Ok(Self {
            id: Uuid::new_v4(),
            kind: TriggerKind::Cron {
                expression: expression.to_string(),
            },
            start_at,
            times_triggered: 0,
            next_fire_at,
            previous_fire_at: None,
        })
    }

    /// Interval trigger whose first fire is `start_at`
    pub fn simple(interval: Duration, repeat_count: Option<u32>, start_at: DateTime<Utc>) -> Result<Self> {
        let interval_ms = interval_millis(interval)?;
        Ok(Self {
            id: Uuid::new_v4(),
            kind: TriggerKind::Simple {
                interval_ms,
                repeat_count,
            },
            start_at,
            times_triggered: 0,
            next_fire_at: (repeat_count != Some(0)).then_some(start_at),
            previous_fire_at: None,
        })
    }

    pub fn is_cron(&self) -> bool {
        matches!(self.kind, TriggerKind::Cron { .. })
    }

    /// Cron triggers always recur; interval triggers only while a fire is pending
    pub fn is_reschedulable(&self) -> bool {
        self.is_cron() || self.next_fire_at.is_some()
    }

    pub fn token(&self) -> FireToken {
        FireToken {
            trigger_id: self.id,
            times_triggered: self.times_triggered,
        }
    }

    /// Record a fire at `now` and compute the following one
    ///
    /// Returns false when the trigger is exhausted.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Result<bool> {
        self.times_triggered += 1;
        self.previous_fire_at = Some(now);
        self.next_fire_at = self.first_slot_after(now)?;
        Ok(self.next_fire_at.is_some())
    }

    /// Skip fire times more than `threshold` in the past
    ///
    /// Returns true when the pending fire time was moved.
    pub fn skip_misfires(&mut self, now: DateTime<Utc>, threshold: Duration) -> Result<bool> {
        match self.next_fire_at {
            Some(next) if next.checked_add_signed(to_chrono(threshold)).is_some_and(|deadline| deadline < now) => {
                self.next_fire_at = self.first_slot_after(now)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn first_slot_after(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        match &self.kind {
            TriggerKind::Cron { expression } => Ok(parse_cron(expression)?.after(&now).next()),
            TriggerKind::Simple {
                interval_ms,
                repeat_count,
            } => {
                if repeat_count.is_some_and(|limit| self.times_triggered >= limit) {
                    return Ok(None);
                }
                let interval = i64::try_from(*interval_ms)
                    .ok()
                    .filter(|ms| *ms > 0)
                    .ok_or_else(|| SchedulerError::InvalidConfiguration(format!("invalid interval of {}ms", interval_ms)))?;
                if now < self.start_at {
                    return Ok(Some(self.start_at));
                }
                let elapsed = (now - self.start_at).num_milliseconds();
                let offset = (elapsed / interval + 1)
                    .checked_mul(interval)
                    .and_then(ChronoDuration::try_milliseconds)
                    .ok_or_else(overflow)?;
                self.start_at.checked_add_signed(offset).map(Some).ok_or_else(overflow)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn bounded_interval_trigger_fires_exactly_repeat_count_times() {
        let mut trigger = Trigger::simple(Duration::from_secs(5), Some(5), at(0)).unwrap();
        assert_eq!(trigger.next_fire_at, Some(at(0)));

        let mut fires = 0;
        while let Some(next) = trigger.next_fire_at {
            fires += 1;
            trigger.advance(next).unwrap();
        }
        assert_eq!(fires, 5);
        assert!(!trigger.is_reschedulable());
    }

    #[test]
    fn interval_slots_stay_on_the_original_grid() {
        let mut trigger = Trigger::simple(Duration::from_secs(5), None, at(0)).unwrap();
        trigger.advance(at(0)).unwrap();
        assert_eq!(trigger.next_fire_at, Some(at(5)));

        // a late fire skips the slots it missed
        trigger.advance(at(17)).unwrap();
        assert_eq!(trigger.next_fire_at, Some(at(20)));
        assert_eq!(trigger.times_triggered, 2);
    }

    #[test]
    fn misfires_beyond_the_threshold_are_skipped() {
        let mut trigger = Trigger::simple(Duration::from_secs(10), Some(3), at(0)).unwrap();
        assert!(!trigger.skip_misfires(at(1), Duration::from_secs(5)).unwrap());
        assert_eq!(trigger.next_fire_at, Some(at(0)));

        assert!(trigger.skip_misfires(at(25), Duration::from_secs(5)).unwrap());
        assert_eq!(trigger.next_fire_at, Some(at(30)));
        assert_eq!(trigger.times_triggered, 0);
    }

    #[test]
    fn cron_triggers_follow_the_expression_and_always_recur() {
        let mut trigger = Trigger::cron("0 * * * * *", at(30)).unwrap();
        let first = trigger.next_fire_at.unwrap();
        assert_eq!(first.timestamp() % 60, 0);
        assert!(first > at(30));

        trigger.advance(first).unwrap();
        assert_eq!(trigger.next_fire_at, Some(first + ChronoDuration::seconds(60)));
        assert!(trigger.is_reschedulable());
        assert!(Trigger::cron("bogus", at(0)).is_err());
    }

    #[test]
    fn degenerate_intervals_are_rejected() {
        assert!(matches!(
            Trigger::simple(Duration::from_micros(500), None, at(0)),
            Err(SchedulerError::InvalidConfiguration(_))
        ));
        assert!(Trigger::simple(Duration::MAX, None, at(0)).is_err());
        assert_eq!(interval_millis(Duration::from_millis(1)).unwrap(), 1);
    }

    #[test]
    fn corrupt_stored_intervals_fail_instead_of_panicking() {
        let mut trigger = Trigger::simple(Duration::from_secs(1), None, at(0)).unwrap();
        trigger.kind = TriggerKind::Simple {
            interval_ms: 0,
            repeat_count: None,
        };
        assert!(trigger.advance(at(1)).is_err());

        trigger.kind = TriggerKind::Simple {
            interval_ms: i64::MAX as u64,
            repeat_count: None,
        };
        assert!(trigger.advance(at(1)).is_err());
    }

    #[test]
    fn tokens_change_with_every_fire() {
        let mut trigger = Trigger::simple(Duration::from_secs(1), None, at(0)).unwrap();
        let before = trigger.token();
        trigger.advance(at(0)).unwrap();
        assert_ne!(before, trigger.token());
        assert_eq!(before.trigger_id, trigger.token().trigger_id);
    }
}
