use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::aggregate::bucket::{BucketDay, BucketHour};

/// The four metric kinds the pipeline ingests. Each has its own raw sample
/// table keyed by record identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Steps,
    Distance,
    HeartRate,
    Spo2,
}

impl MetricKind {
    pub fn raw_table(&self) -> &'static str {
        match self {
            MetricKind::Steps => "steps_events",
            MetricKind::Distance => "distance_events",
            MetricKind::HeartRate => "hr_samples",
            MetricKind::Spo2 => "spo2_samples",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Steps => "steps",
            MetricKind::Distance => "distance",
            MetricKind::HeartRate => "heart_rate",
            MetricKind::Spo2 => "spo2",
        }
    }

    pub const ALL: [MetricKind; 4] = [
        MetricKind::Steps,
        MetricKind::Distance,
        MetricKind::HeartRate,
        MetricKind::Spo2,
    ];
}

/// Interval metrics aggregated as plain totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SumMetric {
    Steps,
    Distance,
}

impl SumMetric {
    pub fn kind(&self) -> MetricKind {
        match self {
            SumMetric::Steps => MetricKind::Steps,
            SumMetric::Distance => MetricKind::Distance,
        }
    }

    pub fn hour_table(&self) -> &'static str {
        match self {
            SumMetric::Steps => "steps_hour",
            SumMetric::Distance => "distance_hour",
        }
    }

    pub fn day_table(&self) -> &'static str {
        match self {
            SumMetric::Steps => "steps_day",
            SumMetric::Distance => "distance_day",
        }
    }
}

/// Instant metrics aggregated as min/max/sum/count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatMetric {
    HeartRate,
    Spo2,
}

impl StatMetric {
    pub fn kind(&self) -> MetricKind {
        match self {
            StatMetric::HeartRate => MetricKind::HeartRate,
            StatMetric::Spo2 => MetricKind::Spo2,
        }
    }

    pub fn hour_table(&self) -> &'static str {
        match self {
            StatMetric::HeartRate => "hr_hour",
            StatMetric::Spo2 => "spo2_hour",
        }
    }

    pub fn day_table(&self) -> &'static str {
        match self {
            StatMetric::HeartRate => "hr_day",
            StatMetric::Spo2 => "spo2_day",
        }
    }

    /// Heart-rate extremes are conventionally whole bpm; SpO2 extremes keep
    /// fractional percentages as received.
    pub fn rounds_extremes(&self) -> bool {
        matches!(self, StatMetric::HeartRate)
    }
}

/// One immutable raw measurement, parsed and bucketed, ready for storage.
///
/// `hour_bucket`/`day_bucket` are derived once at ingest so that a bucket's
/// full raw row set can be selected directly when its aggregate is
/// recomputed.
#[derive(Debug, Clone)]
pub struct RawSampleRow {
    pub record_uid: String,
    pub patient_id: Uuid,
    pub origin_id: String,
    pub device_id: String,
    pub start_ts: Option<DateTime<Utc>>,
    pub sample_ts: DateTime<Utc>,
    pub tz_offset_min: i32,
    pub value: f64,
    pub hour_bucket: BucketHour,
    pub day_bucket: BucketDay,
}

#[derive(Debug, Clone, Serialize)]
pub struct SumHourRow {
    pub patient_id: Uuid,
    pub hour_ts: BucketHour,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SumDayRow {
    pub patient_id: Uuid,
    pub date: BucketDay,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatHourRow {
    pub patient_id: Uuid,
    pub hour_ts: BucketHour,
    pub min_value: f64,
    pub max_value: f64,
    pub sum_value: f64,
    pub sample_count: i64,
}

impl StatHourRow {
    pub fn average(&self) -> f64 {
        if self.sample_count == 0 {
            0.0
        } else {
            self.sum_value / self.sample_count as f64
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatDayRow {
    pub patient_id: Uuid,
    pub date: BucketDay,
    pub min_value: f64,
    pub max_value: f64,
    pub sum_value: f64,
    pub sample_count: i64,
}

impl StatDayRow {
    pub fn average(&self) -> f64 {
        if self.sample_count == 0 {
            0.0
        } else {
            self.sum_value / self.sample_count as f64
        }
    }
}
