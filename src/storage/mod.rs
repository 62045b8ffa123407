pub mod memory;
pub mod postgres;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::aggregate::bucket::{BucketDay, BucketHour};
use crate::models::patient::{
    BpReading, DeviceSyncStatus, NewBpReading, PatientRecord, PatientUpsert,
};
use crate::models::vitals::{
    MetricKind, RawSampleRow, StatDayRow, StatHourRow, StatMetric, SumDayRow, SumHourRow,
    SumMetric,
};

pub use memory::MemStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// The storage seam: one enum, two complete backends, selected from
/// configuration at startup. Handlers talk only to this type.
#[derive(Clone)]
pub enum Storage {
    Postgres(PgStore),
    Memory(MemStore),
}

macro_rules! dispatch {
    ($self:ident, $store:ident => $body:expr) => {
        match $self {
            Storage::Postgres($store) => $body,
            Storage::Memory($store) => $body,
        }
    };
}

impl Storage {
    pub fn postgres(pool: PgPool) -> Self {
        Storage::Postgres(PgStore::new(pool))
    }

    pub fn memory() -> Self {
        Storage::Memory(MemStore::new())
    }

    /// The in-memory backend, when that is what is configured. Used by tests
    /// for fault injection.
    pub fn as_memory(&self) -> Option<&MemStore> {
        match self {
            Storage::Memory(store) => Some(store),
            Storage::Postgres(_) => None,
        }
    }

    pub async fn account_role(&self, account_id: Uuid) -> Result<Option<String>, StorageError> {
        dispatch!(self, s => s.account_role(account_id).await)
    }

    pub async fn upsert_account(&self, account_id: Uuid, role: &str) -> Result<(), StorageError> {
        dispatch!(self, s => s.upsert_account(account_id, role).await)
    }

    pub async fn ensure_patient(&self, patient: &PatientUpsert) -> Result<(), StorageError> {
        dispatch!(self, s => s.ensure_patient(patient).await)
    }

    pub async fn get_patient(
        &self,
        patient_id: Uuid,
    ) -> Result<Option<PatientRecord>, StorageError> {
        dispatch!(self, s => s.get_patient(patient_id).await)
    }

    pub async fn ensure_origins(&self, origins: &[String]) -> Result<(), StorageError> {
        dispatch!(self, s => s.ensure_origins(origins).await)
    }

    pub async fn ensure_devices(
        &self,
        devices: &[String],
        patient_id: Uuid,
    ) -> Result<(), StorageError> {
        dispatch!(self, s => s.ensure_devices(devices, patient_id).await)
    }

    pub async fn device_count(&self, patient_id: Uuid) -> Result<i64, StorageError> {
        dispatch!(self, s => s.device_count(patient_id).await)
    }

    pub async fn insert_raw_ignore_duplicates(
        &self,
        metric: MetricKind,
        rows: &[RawSampleRow],
    ) -> Result<u64, StorageError> {
        dispatch!(self, s => s.insert_raw_ignore_duplicates(metric, rows).await)
    }

    pub async fn raw_row_count(
        &self,
        metric: MetricKind,
        patient_id: Uuid,
    ) -> Result<u64, StorageError> {
        dispatch!(self, s => s.raw_row_count(metric, patient_id).await)
    }

    pub async fn raw_values_in_hour(
        &self,
        metric: MetricKind,
        patient_id: Uuid,
        hour: BucketHour,
    ) -> Result<Vec<f64>, StorageError> {
        dispatch!(self, s => s.raw_values_in_hour(metric, patient_id, hour).await)
    }

    pub async fn raw_values_in_day(
        &self,
        metric: MetricKind,
        patient_id: Uuid,
        day: BucketDay,
    ) -> Result<Vec<f64>, StorageError> {
        dispatch!(self, s => s.raw_values_in_day(metric, patient_id, day).await)
    }

    pub async fn latest_raw_sample_ts(
        &self,
        metric: MetricKind,
        patient_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        dispatch!(self, s => s.latest_raw_sample_ts(metric, patient_id).await)
    }

    pub async fn upsert_sum_hour(
        &self,
        metric: SumMetric,
        row: &SumHourRow,
    ) -> Result<(), StorageError> {
        dispatch!(self, s => s.upsert_sum_hour(metric, row).await)
    }

    pub async fn upsert_sum_day(
        &self,
        metric: SumMetric,
        row: &SumDayRow,
    ) -> Result<(), StorageError> {
        dispatch!(self, s => s.upsert_sum_day(metric, row).await)
    }

    pub async fn upsert_stat_hour(
        &self,
        metric: StatMetric,
        row: &StatHourRow,
    ) -> Result<(), StorageError> {
        dispatch!(self, s => s.upsert_stat_hour(metric, row).await)
    }

    pub async fn upsert_stat_day(
        &self,
        metric: StatMetric,
        row: &StatDayRow,
    ) -> Result<(), StorageError> {
        dispatch!(self, s => s.upsert_stat_day(metric, row).await)
    }

    pub async fn latest_sum_day(
        &self,
        metric: SumMetric,
        patient_id: Uuid,
    ) -> Result<Option<SumDayRow>, StorageError> {
        dispatch!(self, s => s.latest_sum_day(metric, patient_id).await)
    }

    pub async fn latest_stat_day(
        &self,
        metric: StatMetric,
        patient_id: Uuid,
    ) -> Result<Option<StatDayRow>, StorageError> {
        dispatch!(self, s => s.latest_stat_day(metric, patient_id).await)
    }

    pub async fn sum_hours_in_range(
        &self,
        metric: SumMetric,
        patient_id: Uuid,
        from: BucketHour,
        to: BucketHour,
    ) -> Result<Vec<SumHourRow>, StorageError> {
        dispatch!(self, s => s.sum_hours_in_range(metric, patient_id, from, to).await)
    }

    pub async fn stat_hours_in_range(
        &self,
        metric: StatMetric,
        patient_id: Uuid,
        from: BucketHour,
        to: BucketHour,
    ) -> Result<Vec<StatHourRow>, StorageError> {
        dispatch!(self, s => s.stat_hours_in_range(metric, patient_id, from, to).await)
    }

    pub async fn sum_days_in_range(
        &self,
        metric: SumMetric,
        patient_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SumDayRow>, StorageError> {
        dispatch!(self, s => s.sum_days_in_range(metric, patient_id, from, to).await)
    }

    pub async fn stat_days_in_range(
        &self,
        metric: StatMetric,
        patient_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<StatDayRow>, StorageError> {
        dispatch!(self, s => s.stat_days_in_range(metric, patient_id, from, to).await)
    }

    pub async fn upsert_sync_status(
        &self,
        patient_id: Uuid,
        last_sync_ts: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        dispatch!(self, s => s.upsert_sync_status(patient_id, last_sync_ts).await)
    }

    pub async fn get_sync_status(
        &self,
        patient_id: Uuid,
    ) -> Result<Option<DeviceSyncStatus>, StorageError> {
        dispatch!(self, s => s.get_sync_status(patient_id).await)
    }

    pub async fn insert_bp_reading(
        &self,
        reading: &NewBpReading,
    ) -> Result<BpReading, StorageError> {
        dispatch!(self, s => s.insert_bp_reading(reading).await)
    }

    pub async fn latest_bp_reading(
        &self,
        patient_id: Uuid,
    ) -> Result<Option<BpReading>, StorageError> {
        dispatch!(self, s => s.latest_bp_reading(patient_id).await)
    }

    pub async fn bp_reading_since(
        &self,
        patient_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<BpReading>, StorageError> {
        dispatch!(self, s => s.bp_reading_since(patient_id, cutoff).await)
    }

    pub async fn bp_readings_in_range(
        &self,
        patient_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<BpReading>, StorageError> {
        dispatch!(self, s => s.bp_readings_in_range(patient_id, from, to).await)
    }

    pub async fn delete_patient_cascade(&self, patient_id: Uuid) -> Result<u64, StorageError> {
        dispatch!(self, s => s.delete_patient_cascade(patient_id).await)
    }
}
