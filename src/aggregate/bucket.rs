use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, Timelike, Utc};
use serde::{Serialize, Serializer};

/// An hour bucket key: the sample's local wall-clock time, truncated to the
/// hour, rendered as if it were UTC.
///
/// Bucket membership is computed by shifting a UTC instant by the sample's
/// own reported timezone offset and truncating the result. The stored value
/// is therefore NOT a real UTC instant. Keeping it behind its own type stops
/// read paths from shifting it a second time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketHour(NaiveDateTime);

impl BucketHour {
    /// Compute the hour bucket for a UTC instant and a per-record offset in
    /// minutes. An offset of 0 is a real offset, not a missing value.
    pub fn from_utc(ts: DateTime<Utc>, offset_min: i32) -> Self {
        let wall = (ts + Duration::minutes(offset_min as i64)).naive_utc();
        let truncated = wall
            .date()
            .and_hms_opt(wall.hour(), 0, 0)
            .expect("truncating to the top of an hour always yields a valid time");
        BucketHour(truncated)
    }

    /// First hour bucket of a local calendar day.
    pub fn day_start(date: NaiveDate) -> Self {
        BucketHour(
            date.and_hms_opt(0, 0, 0)
                .expect("midnight is always a valid time"),
        )
    }

    /// Last hour bucket of a local calendar day.
    pub fn day_end(date: NaiveDate) -> Self {
        BucketHour(
            date.and_hms_opt(23, 0, 0)
                .expect("23:00 is always a valid time"),
        )
    }

    /// Rebuild a key from the rendered-as-UTC value a storage backend holds.
    pub fn from_rendered_utc(ts: DateTime<Utc>) -> Self {
        BucketHour(ts.naive_utc())
    }

    /// The rendered-as-UTC value used for persistence and serialization.
    pub fn as_rendered_utc(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.0, Utc)
    }

    /// Local calendar date this hour belongs to.
    pub fn date(&self) -> NaiveDate {
        self.0.date()
    }

    /// Local hour of day (0-23).
    pub fn hour_of_day(&self) -> u32 {
        self.0.hour()
    }
}

impl fmt::Display for BucketHour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.as_rendered_utc()
                .to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}

impl Serialize for BucketHour {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A day bucket key: the local calendar date of the shifted instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketDay(NaiveDate);

impl BucketDay {
    pub fn from_utc(ts: DateTime<Utc>, offset_min: i32) -> Self {
        BucketDay((ts + Duration::minutes(offset_min as i64)).naive_utc().date())
    }

    pub fn from_date(date: NaiveDate) -> Self {
        BucketDay(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for BucketDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl Serialize for BucketDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
