//! Time handling for the lifecycle engine
//!
//! - [`Clock`]: injectable source of "now" so offer expiry, EMI due dates and
//!   overdue classification can be driven deterministically in tests
//! - [`Timezone`]: serde-friendly wrapper used by the worker to anchor
//!   wall-clock schedules (daily reminders, weekly recalculation)

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors that can occur during temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Local time {0} does not exist in timezone {1}")]
    NonexistentLocalTime(String, String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}

/// Source of the current instant
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by `Utc::now()`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
///
/// Clones share the same instant, so a test can hold one handle while the
/// engine holds another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Moves the clock forward by `by`
    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }

    /// Pins the clock to an exact instant
    pub fn set(&self, to: DateTime<Utc>) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Timezone wrapper with string (IANA name) serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timezone(pub Tz);

impl Default for Timezone {
    fn default() -> Self {
        Timezone(chrono_tz::UTC)
    }
}

impl Serialize for Timezone {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.name())
    }
}

impl<'de> Deserialize<'de> for Timezone {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Timezone::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl Timezone {
    pub fn new(tz: Tz) -> Self {
        Self(tz)
    }

    /// Parses an IANA timezone name such as `Asia/Kolkata`
    pub fn parse(name: &str) -> Result<Self, TemporalError> {
        Tz::from_str(name)
            .map(Timezone)
            .map_err(|_| TemporalError::InvalidTimezone(name.to_string()))
    }

    /// Returns the first instant strictly after `after` whose local time of
    /// day equals `at`
    pub fn next_daily(
        &self,
        after: DateTime<Utc>,
        at: NaiveTime,
    ) -> Result<DateTime<Utc>, TemporalError> {
        let local_date = after.with_timezone(&self.0).date_naive();
        for offset in 0..=2 {
            let candidate = self.resolve(local_date + Duration::days(offset), at)?;
            if candidate > after {
                return Ok(candidate);
            }
        }
        self.resolve(local_date + Duration::days(3), at)
    }

    /// Returns the first instant strictly after `after` falling on `weekday`
    /// at local time `at`
    pub fn next_weekly(
        &self,
        after: DateTime<Utc>,
        weekday: Weekday,
        at: NaiveTime,
    ) -> Result<DateTime<Utc>, TemporalError> {
        let local_date = after.with_timezone(&self.0).date_naive();
        for offset in 0..=7 {
            let date = local_date + Duration::days(offset);
            if date.weekday() != weekday {
                continue;
            }
            let candidate = self.resolve(date, at)?;
            if candidate > after {
                return Ok(candidate);
            }
        }
        self.resolve(local_date + Duration::days(14), at)
    }

    fn resolve(
        &self,
        date: chrono::NaiveDate,
        at: NaiveTime,
    ) -> Result<DateTime<Utc>, TemporalError> {
        let naive = date.and_time(at);
        self.0
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| {
                TemporalError::NonexistentLocalTime(naive.to_string(), self.0.name().to_string())
            })
    }
}
