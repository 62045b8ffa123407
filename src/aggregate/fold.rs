use std::collections::BTreeMap;

use uuid::Uuid;

use crate::aggregate::bucket::{BucketDay, BucketHour};
use crate::models::vitals::RawSampleRow;

/// Running total for interval metrics (steps, distance).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SumAcc {
    pub total: f64,
}

impl SumAcc {
    pub fn observe(&mut self, value: f64) {
        self.total += value;
    }
}

/// Running min/max/sum/count for instant metrics (heart rate, SpO2).
///
/// The average is always derived as `sum / count` by whoever reads the
/// accumulator; it is never stored pre-divided.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatAcc {
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub count: i64,
}

impl StatAcc {
    pub fn new() -> Self {
        StatAcc {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            count: 0,
        }
    }

    pub fn observe(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.count += 1;
    }

    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

impl Default for StatAcc {
    fn default() -> Self {
        StatAcc::new()
    }
}

/// Hour- and day-bucket accumulators for one folded batch, keyed by
/// (patient, bucket). Pure output; the caller merges it into storage.
#[derive(Debug)]
pub struct BatchFold<A> {
    pub hours: BTreeMap<(Uuid, BucketHour), A>,
    pub days: BTreeMap<(Uuid, BucketDay), A>,
}

impl<A> BatchFold<A> {
    fn empty() -> Self {
        BatchFold {
            hours: BTreeMap::new(),
            days: BTreeMap::new(),
        }
    }
}

/// Fold an interval-metric batch. Bucket membership was computed from the
/// interval's end timestamp when the row was parsed.
pub fn fold_sum(rows: &[RawSampleRow]) -> BatchFold<SumAcc> {
    let mut fold: BatchFold<SumAcc> = BatchFold::empty();
    for row in rows {
        fold.hours
            .entry((row.patient_id, row.hour_bucket))
            .or_default()
            .observe(row.value);
        fold.days
            .entry((row.patient_id, row.day_bucket))
            .or_default()
            .observe(row.value);
    }
    fold
}

/// Fold an instant-metric batch into min/max/sum/count accumulators.
pub fn fold_stat(rows: &[RawSampleRow]) -> BatchFold<StatAcc> {
    let mut fold: BatchFold<StatAcc> = BatchFold::empty();
    for row in rows {
        fold.hours
            .entry((row.patient_id, row.hour_bucket))
            .or_default()
            .observe(row.value);
        fold.days
            .entry((row.patient_id, row.day_bucket))
            .or_default()
            .observe(row.value);
    }
    fold
}
