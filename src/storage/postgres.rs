use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
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

/// Production storage backend over Postgres. All writes are idempotent
/// upserts with explicit conflict targets, so at-least-once retries of a
/// whole ingestion request are safe.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    pub async fn account_role(&self, account_id: Uuid) -> Result<Option<String>, StorageError> {
        let role = sqlx::query_scalar::<_, String>(
            "SELECT role FROM auth_accounts WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role)
    }

    pub async fn upsert_account(&self, account_id: Uuid, role: &str) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO auth_accounts (account_id, role) VALUES ($1, $2)
             ON CONFLICT (account_id) DO UPDATE SET role = EXCLUDED.role",
        )
        .bind(account_id)
        .bind(role)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn ensure_patient(&self, patient: &PatientUpsert) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO patients (patient_id, first_name, last_name, date_of_birth)
             VALUES ($1, COALESCE($2, 'User'), COALESCE($3, 'Patient'), $4)
             ON CONFLICT (patient_id) DO UPDATE SET
                 first_name = COALESCE($2, patients.first_name),
                 last_name = COALESCE($3, patients.last_name),
                 date_of_birth = COALESCE($4, patients.date_of_birth)",
        )
        .bind(patient.patient_id)
        .bind(patient.first_name.as_deref())
        .bind(patient.last_name.as_deref())
        .bind(patient.date_of_birth)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_patient(
        &self,
        patient_id: Uuid,
    ) -> Result<Option<PatientRecord>, StorageError> {
        let row = sqlx::query(
            "SELECT patient_id, first_name, last_name, date_of_birth, created_at
             FROM patients WHERE patient_id = $1",
        )
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            Ok(PatientRecord {
                patient_id: row.try_get("patient_id")?,
                first_name: row.try_get("first_name")?,
                last_name: row.try_get("last_name")?,
                date_of_birth: row.try_get("date_of_birth")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
        .map_err(StorageError::Database)
    }

    pub async fn ensure_origins(&self, origins: &[String]) -> Result<(), StorageError> {
        for origin in origins {
            sqlx::query("INSERT INTO data_origins (origin_id) VALUES ($1) ON CONFLICT DO NOTHING")
                .bind(origin)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn ensure_devices(
        &self,
        devices: &[String],
        patient_id: Uuid,
    ) -> Result<(), StorageError> {
        for device in devices {
            sqlx::query(
                "INSERT INTO devices (device_id, patient_id) VALUES ($1, $2)
                 ON CONFLICT (device_id) DO NOTHING",
            )
            .bind(device)
            .bind(patient_id)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn device_count(&self, patient_id: Uuid) -> Result<i64, StorageError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM devices WHERE patient_id = $1",
        )
        .bind(patient_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn insert_raw_ignore_duplicates(
        &self,
        metric: MetricKind,
        rows: &[RawSampleRow],
    ) -> Result<u64, StorageError> {
        let sql = format!(
            "INSERT INTO {} (record_uid, patient_id, origin_id, device_id, start_ts, sample_ts,
                             tz_offset_min, value, hour_bucket, day_bucket)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (record_uid) DO NOTHING",
            metric.raw_table()
        );
        let mut inserted = 0;
        for row in rows {
            let result = sqlx::query(&sql)
                .bind(&row.record_uid)
                .bind(row.patient_id)
                .bind(&row.origin_id)
                .bind(&row.device_id)
                .bind(row.start_ts)
                .bind(row.sample_ts)
                .bind(row.tz_offset_min)
                .bind(row.value)
                .bind(row.hour_bucket.as_rendered_utc())
                .bind(row.day_bucket.date())
                .execute(&self.pool)
                .await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    pub async fn raw_row_count(
        &self,
        metric: MetricKind,
        patient_id: Uuid,
    ) -> Result<u64, StorageError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE patient_id = $1",
            metric.raw_table()
        );
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(patient_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    pub async fn raw_values_in_hour(
        &self,
        metric: MetricKind,
        patient_id: Uuid,
        hour: BucketHour,
    ) -> Result<Vec<f64>, StorageError> {
        let sql = format!(
            "SELECT value FROM {} WHERE patient_id = $1 AND hour_bucket = $2",
            metric.raw_table()
        );
        let values = sqlx::query_scalar::<_, f64>(&sql)
            .bind(patient_id)
            .bind(hour.as_rendered_utc())
            .fetch_all(&self.pool)
            .await?;
        Ok(values)
    }

    pub async fn raw_values_in_day(
        &self,
        metric: MetricKind,
        patient_id: Uuid,
        day: BucketDay,
    ) -> Result<Vec<f64>, StorageError> {
        let sql = format!(
            "SELECT value FROM {} WHERE patient_id = $1 AND day_bucket = $2",
            metric.raw_table()
        );
        let values = sqlx::query_scalar::<_, f64>(&sql)
            .bind(patient_id)
            .bind(day.date())
            .fetch_all(&self.pool)
            .await?;
        Ok(values)
    }

    pub async fn latest_raw_sample_ts(
        &self,
        metric: MetricKind,
        patient_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        let sql = format!(
            "SELECT MAX(sample_ts) FROM {} WHERE patient_id = $1",
            metric.raw_table()
        );
        let max = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(&sql)
            .bind(patient_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(max)
    }

    pub async fn upsert_sum_hour(
        &self,
        metric: SumMetric,
        row: &SumHourRow,
    ) -> Result<(), StorageError> {
        let sql = format!(
            "INSERT INTO {} (patient_id, hour_ts, total) VALUES ($1, $2, $3)
             ON CONFLICT (patient_id, hour_ts) DO UPDATE SET total = EXCLUDED.total",
            metric.hour_table()
        );
        sqlx::query(&sql)
            .bind(row.patient_id)
            .bind(row.hour_ts.as_rendered_utc())
            .bind(row.total)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn upsert_sum_day(
        &self,
        metric: SumMetric,
        row: &SumDayRow,
    ) -> Result<(), StorageError> {
        let sql = format!(
            "INSERT INTO {} (patient_id, date, total) VALUES ($1, $2, $3)
             ON CONFLICT (patient_id, date) DO UPDATE SET total = EXCLUDED.total",
            metric.day_table()
        );
        sqlx::query(&sql)
            .bind(row.patient_id)
            .bind(row.date.date())
            .bind(row.total)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn upsert_stat_hour(
        &self,
        metric: StatMetric,
        row: &StatHourRow,
    ) -> Result<(), StorageError> {
        let sql = format!(
            "INSERT INTO {} (patient_id, hour_ts, min_value, max_value, sum_value, sample_count)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (patient_id, hour_ts) DO UPDATE SET
                 min_value = EXCLUDED.min_value,
                 max_value = EXCLUDED.max_value,
                 sum_value = EXCLUDED.sum_value,
                 sample_count = EXCLUDED.sample_count",
            metric.hour_table()
        );
        sqlx::query(&sql)
            .bind(row.patient_id)
            .bind(row.hour_ts.as_rendered_utc())
            .bind(row.min_value)
            .bind(row.max_value)
            .bind(row.sum_value)
            .bind(row.sample_count)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn upsert_stat_day(
        &self,
        metric: StatMetric,
        row: &StatDayRow,
    ) -> Result<(), StorageError> {
        let sql = format!(
            "INSERT INTO {} (patient_id, date, min_value, max_value, sum_value, sample_count)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (patient_id, date) DO UPDATE SET
                 min_value = EXCLUDED.min_value,
                 max_value = EXCLUDED.max_value,
                 sum_value = EXCLUDED.sum_value,
                 sample_count = EXCLUDED.sample_count",
            metric.day_table()
        );
        sqlx::query(&sql)
            .bind(row.patient_id)
            .bind(row.date.date())
            .bind(row.min_value)
            .bind(row.max_value)
            .bind(row.sum_value)
            .bind(row.sample_count)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn latest_sum_day(
        &self,
        metric: SumMetric,
        patient_id: Uuid,
    ) -> Result<Option<SumDayRow>, StorageError> {
        let sql = format!(
            "SELECT date, total FROM {} WHERE patient_id = $1 ORDER BY date DESC LIMIT 1",
            metric.day_table()
        );
        let row = sqlx::query(&sql)
            .bind(patient_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| sum_day_row(patient_id, &row))
            .transpose()
            .map_err(StorageError::Database)
    }

    pub async fn latest_stat_day(
        &self,
        metric: StatMetric,
        patient_id: Uuid,
    ) -> Result<Option<StatDayRow>, StorageError> {
        let sql = format!(
            "SELECT date, min_value, max_value, sum_value, sample_count
             FROM {} WHERE patient_id = $1 ORDER BY date DESC LIMIT 1",
            metric.day_table()
        );
        let row = sqlx::query(&sql)
            .bind(patient_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| stat_day_row(patient_id, &row))
            .transpose()
            .map_err(StorageError::Database)
    }

    pub async fn sum_hours_in_range(
        &self,
        metric: SumMetric,
        patient_id: Uuid,
        from: BucketHour,
        to: BucketHour,
    ) -> Result<Vec<SumHourRow>, StorageError> {
        let sql = format!(
            "SELECT hour_ts, total FROM {}
             WHERE patient_id = $1 AND hour_ts >= $2 AND hour_ts <= $3
             ORDER BY hour_ts ASC",
            metric.hour_table()
        );
        let rows = sqlx::query(&sql)
            .bind(patient_id)
            .bind(from.as_rendered_utc())
            .bind(to.as_rendered_utc())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(SumHourRow {
                    patient_id,
                    hour_ts: BucketHour::from_rendered_utc(row.try_get("hour_ts")?),
                    total: row.try_get("total")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(StorageError::Database)
    }

    pub async fn stat_hours_in_range(
        &self,
        metric: StatMetric,
        patient_id: Uuid,
        from: BucketHour,
        to: BucketHour,
    ) -> Result<Vec<StatHourRow>, StorageError> {
        let sql = format!(
            "SELECT hour_ts, min_value, max_value, sum_value, sample_count FROM {}
             WHERE patient_id = $1 AND hour_ts >= $2 AND hour_ts <= $3
             ORDER BY hour_ts ASC",
            metric.hour_table()
        );
        let rows = sqlx::query(&sql)
            .bind(patient_id)
            .bind(from.as_rendered_utc())
            .bind(to.as_rendered_utc())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(StatHourRow {
                    patient_id,
                    hour_ts: BucketHour::from_rendered_utc(row.try_get("hour_ts")?),
                    min_value: row.try_get("min_value")?,
                    max_value: row.try_get("max_value")?,
                    sum_value: row.try_get("sum_value")?,
                    sample_count: row.try_get("sample_count")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(StorageError::Database)
    }

    pub async fn sum_days_in_range(
        &self,
        metric: SumMetric,
        patient_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SumDayRow>, StorageError> {
        let sql = format!(
            "SELECT date, total FROM {}
             WHERE patient_id = $1 AND date >= $2 AND date <= $3
             ORDER BY date ASC",
            metric.day_table()
        );
        let rows = sqlx::query(&sql)
            .bind(patient_id)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| sum_day_row(patient_id, row))
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(StorageError::Database)
    }

    pub async fn stat_days_in_range(
        &self,
        metric: StatMetric,
        patient_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<StatDayRow>, StorageError> {
        let sql = format!(
            "SELECT date, min_value, max_value, sum_value, sample_count FROM {}
             WHERE patient_id = $1 AND date >= $2 AND date <= $3
             ORDER BY date ASC",
            metric.day_table()
        );
        let rows = sqlx::query(&sql)
            .bind(patient_id)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| stat_day_row(patient_id, row))
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(StorageError::Database)
    }

    pub async fn upsert_sync_status(
        &self,
        patient_id: Uuid,
        last_sync_ts: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO device_sync_status (patient_id, last_sync_ts, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (patient_id) DO UPDATE SET
                 last_sync_ts = GREATEST(device_sync_status.last_sync_ts, EXCLUDED.last_sync_ts),
                 updated_at = now()",
        )
        .bind(patient_id)
        .bind(last_sync_ts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_sync_status(
        &self,
        patient_id: Uuid,
    ) -> Result<Option<DeviceSyncStatus>, StorageError> {
        let row = sqlx::query(
            "SELECT patient_id, last_sync_ts, updated_at FROM device_sync_status
             WHERE patient_id = $1",
        )
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            Ok(DeviceSyncStatus {
                patient_id: row.try_get("patient_id")?,
                last_sync_ts: row.try_get("last_sync_ts")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .transpose()
        .map_err(StorageError::Database)
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
        sqlx::query(
            "INSERT INTO bp_readings
                 (patient_id, reading_date, reading_time, systolic, diastolic, pulse, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(row.patient_id)
        .bind(row.reading_date)
        .bind(row.reading_time)
        .bind(row.systolic)
        .bind(row.diastolic)
        .bind(row.pulse)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn latest_bp_reading(
        &self,
        patient_id: Uuid,
    ) -> Result<Option<BpReading>, StorageError> {
        let row = sqlx::query(
            "SELECT patient_id, reading_date, reading_time, systolic, diastolic, pulse, created_at
             FROM bp_readings WHERE patient_id = $1
             ORDER BY reading_date DESC, reading_time DESC LIMIT 1",
        )
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| bp_row(&row))
            .transpose()
            .map_err(StorageError::Database)
    }

    pub async fn bp_reading_since(
        &self,
        patient_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<BpReading>, StorageError> {
        let row = sqlx::query(
            "SELECT patient_id, reading_date, reading_time, systolic, diastolic, pulse, created_at
             FROM bp_readings WHERE patient_id = $1 AND created_at >= $2
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(patient_id)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| bp_row(&row))
            .transpose()
            .map_err(StorageError::Database)
    }

    pub async fn bp_readings_in_range(
        &self,
        patient_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<BpReading>, StorageError> {
        let rows = sqlx::query(
            "SELECT patient_id, reading_date, reading_time, systolic, diastolic, pulse, created_at
             FROM bp_readings WHERE patient_id = $1 AND reading_date >= $2 AND reading_date <= $3
             ORDER BY reading_date ASC, reading_time ASC",
        )
        .bind(patient_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(bp_row)
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(StorageError::Database)
    }

    pub async fn delete_patient_cascade(&self, patient_id: Uuid) -> Result<u64, StorageError> {
        let mut deleted = 0u64;
        let mut tables: Vec<String> = MetricKind::ALL
            .iter()
            .map(|m| m.raw_table().to_string())
            .collect();
        for metric in [SumMetric::Steps, SumMetric::Distance] {
            tables.push(metric.hour_table().to_string());
            tables.push(metric.day_table().to_string());
        }
        for metric in [StatMetric::HeartRate, StatMetric::Spo2] {
            tables.push(metric.hour_table().to_string());
            tables.push(metric.day_table().to_string());
        }
        tables.push("bp_readings".to_string());
        tables.push("device_sync_status".to_string());
        tables.push("devices".to_string());
        for table in &tables {
            let result = sqlx::query(&format!("DELETE FROM {} WHERE patient_id = $1", table))
                .bind(patient_id)
                .execute(&self.pool)
                .await?;
            deleted += result.rows_affected();
        }
        let result = sqlx::query("DELETE FROM patients WHERE patient_id = $1")
            .bind(patient_id)
            .execute(&self.pool)
            .await?;
        deleted += result.rows_affected();
        Ok(deleted)
    }
}

fn sum_day_row(patient_id: Uuid, row: &PgRow) -> Result<SumDayRow, sqlx::Error> {
    Ok(SumDayRow {
        patient_id,
        date: BucketDay::from_date(row.try_get("date")?),
        total: row.try_get("total")?,
    })
}

fn stat_day_row(patient_id: Uuid, row: &PgRow) -> Result<StatDayRow, sqlx::Error> {
    Ok(StatDayRow {
        patient_id,
        date: BucketDay::from_date(row.try_get("date")?),
        min_value: row.try_get("min_value")?,
        max_value: row.try_get("max_value")?,
        sum_value: row.try_get("sum_value")?,
        sample_count: row.try_get("sample_count")?,
    })
}

fn bp_row(row: &PgRow) -> Result<BpReading, sqlx::Error> {
    Ok(BpReading {
        patient_id: row.try_get("patient_id")?,
        reading_date: row.try_get("reading_date")?,
        reading_time: row.try_get("reading_time")?,
        systolic: row.try_get("systolic")?,
        diastolic: row.try_get("diastolic")?,
        pulse: row.try_get("pulse")?,
        created_at: row.try_get("created_at")?,
    })
}
