use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::aggregate::bucket::{BucketDay, BucketHour};
use crate::models::patient::{
    BpReading, DeviceSyncStatus, NewBpReading, PatientRecord, PatientUpsert,
};
use crate::models::vitals::{
    MetricKind, RawSampleRow, StatDayRow, StatHourRow, StatMetric, SumDayRow, SumHourRow,
    SumMetric,
};
use crate::storage::StorageError;

#[derive(Debug, Clone, Copy)]
struct StatValues {
    min: f64,
    max: f64,
    sum: f64,
    count: i64,
}

#[derive(Default)]
struct MemInner {
    accounts: HashMap<Uuid, String>,
    patients: HashMap<Uuid, PatientRecord>,
    origins: HashSet<String>,
    devices: HashMap<String, Uuid>,
    raw: HashMap<MetricKind, HashMap<String, RawSampleRow>>,
    sum_hour: HashMap<SumMetric, BTreeMap<(Uuid, BucketHour), f64>>,
    sum_day: HashMap<SumMetric, BTreeMap<(Uuid, BucketDay), f64>>,
    stat_hour: HashMap<StatMetric, BTreeMap<(Uuid, BucketHour), StatValues>>,
    stat_day: HashMap<StatMetric, BTreeMap<(Uuid, BucketDay), StatValues>>,
    sync_status: HashMap<Uuid, DeviceSyncStatus>,
    bp_readings: HashMap<Uuid, Vec<BpReading>>,
}

/// Complete in-memory storage backend. Selected via configuration for local
/// development and used by the integration tests to exercise the full HTTP
/// pipeline without a database.
#[derive(Clone)]
pub struct MemStore {
    inner: Arc<RwLock<MemInner>>,
    raw_failures: Arc<AtomicU32>,
}

impl MemStore {
    pub fn new() -> Self {
        MemStore {
            inner: Arc::new(RwLock::new(MemInner::default())),
            raw_failures: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Make the next `n` raw-sample upserts fail, simulating a storage
    /// outage. Test hook only.
    pub fn fail_next_raw_inserts(&self, n: u32) {
        self.raw_failures.store(n, Ordering::SeqCst);
    }

    pub async fn account_role(&self, account_id: Uuid) -> Result<Option<String>, StorageError> {
        Ok(self.inner.read().await.accounts.get(&account_id).cloned())
    }

    pub async fn upsert_account(&self, account_id: Uuid, role: &str) -> Result<(), StorageError> {
        self.inner
            .write()
            .await
            .accounts
            .insert(account_id, role.to_string());
        Ok(())
    }

    pub async fn ensure_patient(&self, patient: &PatientUpsert) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        match inner.patients.get_mut(&patient.patient_id) {
            Some(existing) => {
                if let Some(first) = &patient.first_name {
                    existing.first_name = first.clone();
                }
                if let Some(last) = &patient.last_name {
                    existing.last_name = last.clone();
                }
                if let Some(dob) = patient.date_of_birth {
                    existing.date_of_birth = Some(dob);
                }
            }
            None => {
                inner.patients.insert(
                    patient.patient_id,
                    PatientRecord {
                        patient_id: patient.patient_id,
                        first_name: patient.first_name.clone().unwrap_or_else(|| "User".into()),
                        last_name: patient.last_name.clone().unwrap_or_else(|| "Patient".into()),
                        date_of_birth: patient.date_of_birth,
                        created_at: Utc::now(),
                    },
                );
            }
        }
        Ok(())
    }

    pub async fn get_patient(&self, patient_id: Uuid) -> Result<Option<PatientRecord>, StorageError> {
        Ok(self.inner.read().await.patients.get(&patient_id).cloned())
    }

    pub async fn ensure_origins(&self, origins: &[String]) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        for origin in origins {
            inner.origins.insert(origin.clone());
        }
        Ok(())
    }

    pub async fn ensure_devices(
        &self,
        devices: &[String],
        patient_id: Uuid,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        for device in devices {
            inner.devices.entry(device.clone()).or_insert(patient_id);
        }
        Ok(())
    }

    pub async fn device_count(&self, patient_id: Uuid) -> Result<i64, StorageError> {
        Ok(self
            .inner
            .read()
            .await
            .devices
            .values()
            .filter(|owner| **owner == patient_id)
            .count() as i64)
    }

    pub async fn insert_raw_ignore_duplicates(
        &self,
        metric: MetricKind,
        rows: &[RawSampleRow],
    ) -> Result<u64, StorageError> {
        if self
            .raw_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StorageError::Backend("injected raw upsert failure".into()));
        }
        let mut inner = self.inner.write().await;
        let table = inner.raw.entry(metric).or_default();
        let mut inserted = 0;
        for row in rows {
            if !table.contains_key(&row.record_uid) {
                table.insert(row.record_uid.clone(), row.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    pub async fn raw_row_count(
        &self,
        metric: MetricKind,
        patient_id: Uuid,
    ) -> Result<u64, StorageError> {
        Ok(self
            .inner
            .read()
            .await
            .raw
            .get(&metric)
            .map(|table| {
                table
                    .values()
                    .filter(|row| row.patient_id == patient_id)
                    .count() as u64
            })
            .unwrap_or(0))
    }

    pub async fn raw_values_in_hour(
        &self,
        metric: MetricKind,
        patient_id: Uuid,
        hour: BucketHour,
    ) -> Result<Vec<f64>, StorageError> {
        Ok(self
            .inner
            .read()
            .await
            .raw
            .get(&metric)
            .map(|table| {
                table
                    .values()
                    .filter(|row| row.patient_id == patient_id && row.hour_bucket == hour)
                    .map(|row| row.value)
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn raw_values_in_day(
        &self,
        metric: MetricKind,
        patient_id: Uuid,
        day: BucketDay,
    ) -> Result<Vec<f64>, StorageError> {
        Ok(self
            .inner
            .read()
            .await
            .raw
            .get(&metric)
            .map(|table| {
                table
                    .values()
                    .filter(|row| row.patient_id == patient_id && row.day_bucket == day)
                    .map(|row| row.value)
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn latest_raw_sample_ts(
        &self,
        metric: MetricKind,
        patient_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        Ok(self
            .inner
            .read()
            .await
            .raw
            .get(&metric)
            .and_then(|table| {
                table
                    .values()
                    .filter(|row| row.patient_id == patient_id)
                    .map(|row| row.sample_ts)
                    .max()
            }))
    }

    pub async fn upsert_sum_hour(
        &self,
        metric: SumMetric,
        row: &SumHourRow,
    ) -> Result<(), StorageError> {
        self.inner
            .write()
            .await
            .sum_hour
            .entry(metric)
            .or_default()
            .insert((row.patient_id, row.hour_ts), row.total);
        Ok(())
    }

    pub async fn upsert_sum_day(
        &self,
        metric: SumMetric,
        row: &SumDayRow,
    ) -> Result<(), StorageError> {
        self.inner
            .write()
            .await
            .sum_day
            .entry(metric)
            .or_default()
            .insert((row.patient_id, row.date), row.total);
        Ok(())
    }

    pub async fn upsert_stat_hour(
        &self,
        metric: StatMetric,
        row: &StatHourRow,
    ) -> Result<(), StorageError> {
        self.inner.write().await.stat_hour.entry(metric).or_default().insert(
            (row.patient_id, row.hour_ts),
            StatValues {
                min: row.min_value,
                max: row.max_value,
                sum: row.sum_value,
                count: row.sample_count,
            },
        );
        Ok(())
    }

    pub async fn upsert_stat_day(
        &self,
        metric: StatMetric,
        row: &StatDayRow,
    ) -> Result<(), StorageError> {
        self.inner.write().await.stat_day.entry(metric).or_default().insert(
            (row.patient_id, row.date),
            StatValues {
                min: row.min_value,
                max: row.max_value,
                sum: row.sum_value,
                count: row.sample_count,
            },
        );
        Ok(())
    }

    pub async fn latest_sum_day(
        &self,
        metric: SumMetric,
        patient_id: Uuid,
    ) -> Result<Option<SumDayRow>, StorageError> {
        Ok(self.inner.read().await.sum_day.get(&metric).and_then(|table| {
            table
                .range(patient_range_day(patient_id))
                .next_back()
                .map(|((_, date), total)| SumDayRow {
                    patient_id,
                    date: *date,
                    total: *total,
                })
        }))
    }

    pub async fn latest_stat_day(
        &self,
        metric: StatMetric,
        patient_id: Uuid,
    ) -> Result<Option<StatDayRow>, StorageError> {
        Ok(self.inner.read().await.stat_day.get(&metric).and_then(|table| {
            table
                .range(patient_range_day(patient_id))
                .next_back()
                .map(|((_, date), v)| stat_day_row(patient_id, *date, *v))
        }))
    }

    pub async fn sum_hours_in_range(
        &self,
        metric: SumMetric,
        patient_id: Uuid,
        from: BucketHour,
        to: BucketHour,
    ) -> Result<Vec<SumHourRow>, StorageError> {
        Ok(self
            .inner
            .read()
            .await
            .sum_hour
            .get(&metric)
            .map(|table| {
                table
                    .range((patient_id, from)..=(patient_id, to))
                    .map(|((_, hour), total)| SumHourRow {
                        patient_id,
                        hour_ts: *hour,
                        total: *total,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn stat_hours_in_range(
        &self,
        metric: StatMetric,
        patient_id: Uuid,
        from: BucketHour,
        to: BucketHour,
    ) -> Result<Vec<StatHourRow>, StorageError> {
        Ok(self
            .inner
            .read()
            .await
            .stat_hour
            .get(&metric)
            .map(|table| {
                table
                    .range((patient_id, from)..=(patient_id, to))
                    .map(|((_, hour), v)| StatHourRow {
                        patient_id,
                        hour_ts: *hour,
                        min_value: v.min,
                        max_value: v.max,
                        sum_value: v.sum,
                        sample_count: v.count,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn sum_days_in_range(
        &self,
        metric: SumMetric,
        patient_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SumDayRow>, StorageError> {
        let from = BucketDay::from_date(from);
        let to = BucketDay::from_date(to);
        Ok(self
            .inner
            .read()
            .await
            .sum_day
            .get(&metric)
            .map(|table| {
                table
                    .range((patient_id, from)..=(patient_id, to))
                    .map(|((_, date), total)| SumDayRow {
                        patient_id,
                        date: *date,
                        total: *total,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn stat_days_in_range(
        &self,
        metric: StatMetric,
        patient_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<StatDayRow>, StorageError> {
        let from = BucketDay::from_date(from);
        let to = BucketDay::from_date(to);
        Ok(self
            .inner
            .read()
            .await
            .stat_day
            .get(&metric)
            .map(|table| {
                table
                    .range((patient_id, from)..=(patient_id, to))
                    .map(|((_, date), v)| stat_day_row(patient_id, *date, *v))
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn upsert_sync_status(
        &self,
        patient_id: Uuid,
        last_sync_ts: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        inner
            .sync_status
            .entry(patient_id)
            .and_modify(|status| {
                status.last_sync_ts = status.last_sync_ts.max(last_sync_ts);
                status.updated_at = now;
            })
            .or_insert(DeviceSyncStatus {
                patient_id,
                last_sync_ts,
                updated_at: now,
            });
        Ok(())
    }

    pub async fn get_sync_status(
        &self,
        patient_id: Uuid,
    ) -> Result<Option<DeviceSyncStatus>, StorageError> {
        Ok(self.inner.read().await.sync_status.get(&patient_id).cloned())
    }

    pub async fn insert_bp_reading(
        &self,
        reading: &NewBpReading,
    ) -> Result<BpReading, StorageError> {
        let now = Utc::now();
        let row = BpReading {
            patient_id: reading.patient_id,
            reading_date: now.date_naive(),
            reading_time: now.time(),
            systolic: reading.systolic,
            diastolic: reading.diastolic,
            pulse: reading.pulse,
            created_at: now,
        };
        self.inner
            .write()
            .await
            .bp_readings
            .entry(reading.patient_id)
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    pub async fn latest_bp_reading(
        &self,
        patient_id: Uuid,
    ) -> Result<Option<BpReading>, StorageError> {
        Ok(self
            .inner
            .read()
            .await
            .bp_readings
            .get(&patient_id)
            .and_then(|readings| {
                readings
                    .iter()
                    .max_by_key(|r| r.created_at)
                    .cloned()
            }))
    }

    pub async fn bp_reading_since(
        &self,
        patient_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<BpReading>, StorageError> {
        Ok(self
            .inner
            .read()
            .await
            .bp_readings
            .get(&patient_id)
            .and_then(|readings| {
                readings
                    .iter()
                    .filter(|r| r.created_at >= cutoff)
                    .max_by_key(|r| r.created_at)
                    .cloned()
            }))
    }

    pub async fn bp_readings_in_range(
        &self,
        patient_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<BpReading>, StorageError> {
        Ok(self
            .inner
            .read()
            .await
            .bp_readings
            .get(&patient_id)
            .map(|readings| {
                let mut rows: Vec<BpReading> = readings
                    .iter()
                    .filter(|r| r.reading_date >= from && r.reading_date <= to)
                    .cloned()
                    .collect();
                rows.sort_by_key(|r| (r.reading_date, r.reading_time));
                rows
            })
            .unwrap_or_default())
    }

    pub async fn delete_patient_cascade(&self, patient_id: Uuid) -> Result<u64, StorageError> {
        let mut inner = self.inner.write().await;
        let mut deleted = 0u64;
        for table in inner.raw.values_mut() {
            let before = table.len();
            table.retain(|_, row| row.patient_id != patient_id);
            deleted += (before - table.len()) as u64;
        }
        for table in inner.sum_hour.values_mut() {
            let before = table.len();
            table.retain(|(pid, _), _| *pid != patient_id);
            deleted += (before - table.len()) as u64;
        }
        for table in inner.sum_day.values_mut() {
            let before = table.len();
            table.retain(|(pid, _), _| *pid != patient_id);
            deleted += (before - table.len()) as u64;
        }
        for table in inner.stat_hour.values_mut() {
            let before = table.len();
            table.retain(|(pid, _), _| *pid != patient_id);
            deleted += (before - table.len()) as u64;
        }
        for table in inner.stat_day.values_mut() {
            let before = table.len();
            table.retain(|(pid, _), _| *pid != patient_id);
            deleted += (before - table.len()) as u64;
        }
        let devices_before = inner.devices.len();
        inner.devices.retain(|_, owner| *owner != patient_id);
        deleted += (devices_before - inner.devices.len()) as u64;
        if inner.sync_status.remove(&patient_id).is_some() {
            deleted += 1;
        }
        if let Some(readings) = inner.bp_readings.remove(&patient_id) {
            deleted += readings.len() as u64;
        }
        if inner.patients.remove(&patient_id).is_some() {
            deleted += 1;
        }
        Ok(deleted)
    }
}

impl Default for MemStore {
    fn default() -> Self {
        MemStore::new()
    }
}

fn patient_range_day(
    patient_id: Uuid,
) -> std::ops::RangeInclusive<(Uuid, BucketDay)> {
    (patient_id, BucketDay::from_date(NaiveDate::MIN))
        ..=(patient_id, BucketDay::from_date(NaiveDate::MAX))
}

fn stat_day_row(patient_id: Uuid, date: BucketDay, v: StatValues) -> StatDayRow {
    StatDayRow {
        patient_id,
        date,
        min_value: v.min,
        max_value: v.max,
        sum_value: v.sum,
        sample_count: v.count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ensure_patient_never_blanks_existing_fields() {
        let store = MemStore::new();
        let id = Uuid::new_v4();
        store
            .ensure_patient(&PatientUpsert {
                patient_id: id,
                first_name: Some("Maria".into()),
                last_name: Some("Silva".into()),
                date_of_birth: NaiveDate::from_ymd_opt(1950, 6, 1),
            })
            .await
            .unwrap();
        store.ensure_patient(&PatientUpsert::bare(id)).await.unwrap();

        let patient = store.get_patient(id).await.unwrap().unwrap();
        assert_eq!(patient.first_name, "Maria");
        assert_eq!(patient.last_name, "Silva");
        assert_eq!(patient.date_of_birth, NaiveDate::from_ymd_opt(1950, 6, 1));
    }

    #[tokio::test]
    async fn sync_status_keeps_the_max_timestamp() {
        let store = MemStore::new();
        let id = Uuid::new_v4();
        let newer = Utc::now();
        let older = newer - chrono::Duration::hours(2);
        store.upsert_sync_status(id, newer).await.unwrap();
        store.upsert_sync_status(id, older).await.unwrap();
        let status = store.get_sync_status(id).await.unwrap().unwrap();
        assert_eq!(status.last_sync_ts, newer);
    }
}
