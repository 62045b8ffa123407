use actix_web::{web, HttpResponse};
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::aggregate::bucket::{BucketDay, BucketHour};
use crate::aggregate::fold::{fold_stat, fold_sum, StatAcc, SumAcc};
use crate::error::ApiError;
use crate::models::ingest::{
    DistanceEventPayload, HrSamplePayload, IngestResponse, Spo2SamplePayload, StepsEventPayload,
};
use crate::models::patient::PatientUpsert;
use crate::models::vitals::{
    MetricKind, RawSampleRow, StatDayRow, StatHourRow, StatMetric, SumDayRow, SumHourRow,
    SumMetric,
};
use crate::storage::Storage;

/// Plausible physiological bounds; values outside them are rejected as
/// validation failures rather than silently aggregated.
const BPM_RANGE: std::ops::RangeInclusive<f64> = 20.0..=300.0;
const SPO2_RANGE: std::ops::RangeInclusive<f64> = 0.0..=100.0;

struct Measurement {
    start_ts: Option<DateTime<Utc>>,
    sample_ts: DateTime<Utc>,
    value: f64,
}

struct Profile<'a> {
    first_name: Option<&'a str>,
    last_name: Option<&'a str>,
    date_of_birth: Option<&'a str>,
}

/// The per-metric slice of the shared ingestion pipeline: identity fields
/// plus the parse of the measurement itself. `Ok(None)` marks a record with
/// unreadable time data, which is skipped and counted; `Err` rejects the
/// whole batch.
trait SamplePayload {
    fn patient_id(&self) -> Option<Uuid>;
    fn origin_id(&self) -> &str;
    fn device_id(&self) -> &str;
    fn record_uid(&self) -> &str;
    fn tz_offset_min(&self) -> i32;
    fn profile(&self) -> Profile<'_>;
    fn measurement(&self) -> Result<Option<Measurement>, String>;
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

impl SamplePayload for StepsEventPayload {
    fn patient_id(&self) -> Option<Uuid> {
        self.patient_id
    }
    fn origin_id(&self) -> &str {
        &self.origin_id
    }
    fn device_id(&self) -> &str {
        &self.device_id
    }
    fn record_uid(&self) -> &str {
        &self.record_uid
    }
    fn tz_offset_min(&self) -> i32 {
        self.tz_offset_min
    }
    fn profile(&self) -> Profile<'_> {
        Profile {
            first_name: self.first_name.as_deref(),
            last_name: self.last_name.as_deref(),
            date_of_birth: self.date_of_birth.as_deref(),
        }
    }
    fn measurement(&self) -> Result<Option<Measurement>, String> {
        if self.count < 0 {
            return Err(format!("step count out of range: {}", self.count));
        }
        let (Some(start), Some(end)) = (parse_ts(&self.start_ts), parse_ts(&self.end_ts)) else {
            return Ok(None);
        };
        if end < start {
            return Ok(None);
        }
        Ok(Some(Measurement {
            start_ts: Some(start),
            sample_ts: end,
            value: self.count as f64,
        }))
    }
}

impl SamplePayload for DistanceEventPayload {
    fn patient_id(&self) -> Option<Uuid> {
        self.patient_id
    }
    fn origin_id(&self) -> &str {
        &self.origin_id
    }
    fn device_id(&self) -> &str {
        &self.device_id
    }
    fn record_uid(&self) -> &str {
        &self.record_uid
    }
    fn tz_offset_min(&self) -> i32 {
        self.tz_offset_min
    }
    fn profile(&self) -> Profile<'_> {
        Profile {
            first_name: self.first_name.as_deref(),
            last_name: self.last_name.as_deref(),
            date_of_birth: self.date_of_birth.as_deref(),
        }
    }
    fn measurement(&self) -> Result<Option<Measurement>, String> {
        if self.meters < 0.0 || !self.meters.is_finite() {
            return Err(format!("distance out of range: {}", self.meters));
        }
        let (Some(start), Some(end)) = (parse_ts(&self.start_ts), parse_ts(&self.end_ts)) else {
            return Ok(None);
        };
        if end < start {
            return Ok(None);
        }
        Ok(Some(Measurement {
            start_ts: Some(start),
            sample_ts: end,
            value: self.meters,
        }))
    }
}

impl SamplePayload for HrSamplePayload {
    fn patient_id(&self) -> Option<Uuid> {
        self.patient_id
    }
    fn origin_id(&self) -> &str {
        &self.origin_id
    }
    fn device_id(&self) -> &str {
        &self.device_id
    }
    fn record_uid(&self) -> &str {
        &self.record_uid
    }
    fn tz_offset_min(&self) -> i32 {
        self.tz_offset_min
    }
    fn profile(&self) -> Profile<'_> {
        Profile {
            first_name: self.first_name.as_deref(),
            last_name: self.last_name.as_deref(),
            date_of_birth: self.date_of_birth.as_deref(),
        }
    }
    fn measurement(&self) -> Result<Option<Measurement>, String> {
        if !BPM_RANGE.contains(&self.bpm) {
            return Err(format!("heart rate out of range: {}", self.bpm));
        }
        let Some(ts) = parse_ts(&self.time_ts) else {
            return Ok(None);
        };
        Ok(Some(Measurement {
            start_ts: None,
            sample_ts: ts,
            value: self.bpm,
        }))
    }
}

impl SamplePayload for Spo2SamplePayload {
    fn patient_id(&self) -> Option<Uuid> {
        self.patient_id
    }
    fn origin_id(&self) -> &str {
        &self.origin_id
    }
    fn device_id(&self) -> &str {
        &self.device_id
    }
    fn record_uid(&self) -> &str {
        &self.record_uid
    }
    fn tz_offset_min(&self) -> i32 {
        self.tz_offset_min
    }
    fn profile(&self) -> Profile<'_> {
        Profile {
            first_name: self.first_name.as_deref(),
            last_name: self.last_name.as_deref(),
            date_of_birth: self.date_of_birth.as_deref(),
        }
    }
    fn measurement(&self) -> Result<Option<Measurement>, String> {
        if !SPO2_RANGE.contains(&self.spo2_pct) {
            return Err(format!("SpO2 out of range: {}", self.spo2_pct));
        }
        let Some(ts) = parse_ts(&self.time_ts) else {
            return Ok(None);
        };
        Ok(Some(Measurement {
            start_ts: None,
            sample_ts: ts,
            value: self.spo2_pct,
        }))
    }
}

struct ParsedBatch {
    patient: PatientUpsert,
    origins: Vec<String>,
    devices: Vec<String>,
    rows: Vec<RawSampleRow>,
    skipped: usize,
}

/// Validate and parse a non-empty single-metric batch. The first record's
/// patient id is authoritative; a batch mixing patient ids is rejected
/// outright rather than silently misattributed.
fn parse_batch<T: SamplePayload>(items: &[T]) -> Result<ParsedBatch, ApiError> {
    let first = &items[0];
    let patient_id = first
        .patient_id()
        .ok_or_else(|| ApiError::validation("missing patientId"))?;
    if items.iter().any(|item| item.patient_id() != Some(patient_id)) {
        return Err(ApiError::validation("mixed patient ids in batch"));
    }

    let profile = first.profile();
    let date_of_birth = profile.date_of_birth.and_then(|raw| {
        match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(e) => {
                tracing::warn!("ignoring unparsable dateOfBirth {:?}: {}", raw, e);
                None
            }
        }
    });
    let patient = PatientUpsert {
        patient_id,
        first_name: profile.first_name.map(str::to_owned),
        last_name: profile.last_name.map(str::to_owned),
        date_of_birth,
    };

    let mut origins: Vec<String> = Vec::new();
    let mut devices: Vec<String> = Vec::new();
    let mut rows = Vec::with_capacity(items.len());
    let mut skipped = 0usize;
    for item in items {
        if item.record_uid().is_empty() {
            return Err(ApiError::validation("missing recordUid"));
        }
        if item.origin_id().is_empty() || item.device_id().is_empty() {
            return Err(ApiError::validation("missing originId or deviceId"));
        }
        if !origins.iter().any(|o| o == item.origin_id()) {
            origins.push(item.origin_id().to_owned());
        }
        if !devices.iter().any(|d| d == item.device_id()) {
            devices.push(item.device_id().to_owned());
        }
        match item.measurement().map_err(ApiError::validation)? {
            Some(measurement) => {
                let offset = item.tz_offset_min();
                rows.push(RawSampleRow {
                    record_uid: item.record_uid().to_owned(),
                    patient_id,
                    origin_id: item.origin_id().to_owned(),
                    device_id: item.device_id().to_owned(),
                    start_ts: measurement.start_ts,
                    sample_ts: measurement.sample_ts,
                    tz_offset_min: offset,
                    value: measurement.value,
                    hour_bucket: BucketHour::from_utc(measurement.sample_ts, offset),
                    day_bucket: BucketDay::from_utc(measurement.sample_ts, offset),
                });
            }
            None => skipped += 1,
        }
    }

    Ok(ParsedBatch {
        patient,
        origins,
        devices,
        rows,
        skipped,
    })
}

enum AggregatePlan {
    Sum(SumMetric),
    Stat(StatMetric),
}

impl AggregatePlan {
    fn metric(&self) -> MetricKind {
        match self {
            AggregatePlan::Sum(metric) => metric.kind(),
            AggregatePlan::Stat(metric) => metric.kind(),
        }
    }
}

/// The shared ingestion pipeline: role check, referential upserts, raw
/// dedup-upsert, aggregate recompute, sync-status update.
///
/// Aggregates are always recomputed from every raw row stored for an
/// affected bucket, not merged incrementally. That re-reads raw data on
/// each request, but makes the stored aggregate independent of batching
/// and arrival order, and sidesteps the read-modify-write race between
/// concurrent batches for the same bucket.
async fn run_pipeline(
    storage: &Storage,
    plan: AggregatePlan,
    batch: ParsedBatch,
) -> Result<IngestResponse, ApiError> {
    let metric = plan.metric();
    let patient_id = batch.patient.patient_id;

    match storage
        .account_role(patient_id)
        .await
        .map_err(|e| ApiError::storage("role lookup failed", e))?
    {
        Some(role) if role == "patient" => {}
        Some(role) => {
            return Err(ApiError::authorization(format!(
                "invalid patient: role '{}' cannot submit health data",
                role
            )))
        }
        None => return Err(ApiError::authorization("invalid patient: unknown account")),
    }

    storage
        .ensure_patient(&batch.patient)
        .await
        .map_err(|e| ApiError::storage("patient upsert failed", e))?;
    storage
        .ensure_origins(&batch.origins)
        .await
        .map_err(|e| ApiError::storage("origin upsert failed", e))?;
    storage
        .ensure_devices(&batch.devices, patient_id)
        .await
        .map_err(|e| ApiError::storage("device upsert failed", e))?;

    if batch.skipped > 0 {
        tracing::warn!(
            metric = metric.as_str(),
            skipped = batch.skipped,
            "skipped records with unreadable time data"
        );
    }

    let inserted = storage
        .insert_raw_ignore_duplicates(metric, &batch.rows)
        .await
        .map_err(|e| ApiError::storage("raw sample upsert failed", e))?;

    let mut upserted_hour = 0u64;
    let mut upserted_day = 0u64;
    match plan {
        AggregatePlan::Sum(sum_metric) => {
            let fold = fold_sum(&batch.rows);
            for (pid, hour) in fold.hours.keys() {
                let values = storage
                    .raw_values_in_hour(metric, *pid, *hour)
                    .await
                    .map_err(|e| ApiError::storage("hour recompute failed", e))?;
                if values.is_empty() {
                    continue;
                }
                let mut acc = SumAcc::default();
                values.iter().for_each(|v| acc.observe(*v));
                storage
                    .upsert_sum_hour(
                        sum_metric,
                        &SumHourRow {
                            patient_id: *pid,
                            hour_ts: *hour,
                            total: acc.total,
                        },
                    )
                    .await
                    .map_err(|e| ApiError::storage("hour aggregate upsert failed", e))?;
                upserted_hour += 1;
            }
            for (pid, day) in fold.days.keys() {
                let values = storage
                    .raw_values_in_day(metric, *pid, *day)
                    .await
                    .map_err(|e| ApiError::storage("day recompute failed", e))?;
                if values.is_empty() {
                    continue;
                }
                let mut acc = SumAcc::default();
                values.iter().for_each(|v| acc.observe(*v));
                storage
                    .upsert_sum_day(
                        sum_metric,
                        &SumDayRow {
                            patient_id: *pid,
                            date: *day,
                            total: acc.total,
                        },
                    )
                    .await
                    .map_err(|e| ApiError::storage("day aggregate upsert failed", e))?;
                upserted_day += 1;
            }
        }
        AggregatePlan::Stat(stat_metric) => {
            let fold = fold_stat(&batch.rows);
            for (pid, hour) in fold.hours.keys() {
                let values = storage
                    .raw_values_in_hour(metric, *pid, *hour)
                    .await
                    .map_err(|e| ApiError::storage("hour recompute failed", e))?;
                if values.is_empty() {
                    continue;
                }
                let row = stat_hour_row(stat_metric, *pid, *hour, &values);
                storage
                    .upsert_stat_hour(stat_metric, &row)
                    .await
                    .map_err(|e| ApiError::storage("hour aggregate upsert failed", e))?;
                upserted_hour += 1;
            }
            for (pid, day) in fold.days.keys() {
                let values = storage
                    .raw_values_in_day(metric, *pid, *day)
                    .await
                    .map_err(|e| ApiError::storage("day recompute failed", e))?;
                if values.is_empty() {
                    continue;
                }
                let row = stat_day_row(stat_metric, *pid, *day, &values);
                storage
                    .upsert_stat_day(stat_metric, &row)
                    .await
                    .map_err(|e| ApiError::storage("day aggregate upsert failed", e))?;
                upserted_day += 1;
            }
        }
    }

    // Best effort: a stale last-sync display is not worth failing a batch
    // the raw and aggregate writes already committed.
    if let Some(max_ts) = batch.rows.iter().map(|row| row.sample_ts).max() {
        if let Err(e) = storage.upsert_sync_status(patient_id, max_ts).await {
            tracing::warn!("sync status upsert failed: {}", e);
        }
    }

    Ok(IngestResponse {
        inserted,
        upserted_hour,
        upserted_day,
    })
}

fn stat_hour_row(
    metric: StatMetric,
    patient_id: Uuid,
    hour_ts: BucketHour,
    values: &[f64],
) -> StatHourRow {
    let mut acc = StatAcc::new();
    values.iter().for_each(|v| acc.observe(*v));
    let (min_value, max_value) = rounded_extremes(metric, &acc);
    StatHourRow {
        patient_id,
        hour_ts,
        min_value,
        max_value,
        sum_value: acc.sum,
        sample_count: acc.count,
    }
}

fn stat_day_row(
    metric: StatMetric,
    patient_id: Uuid,
    date: BucketDay,
    values: &[f64],
) -> StatDayRow {
    let mut acc = StatAcc::new();
    values.iter().for_each(|v| acc.observe(*v));
    let (min_value, max_value) = rounded_extremes(metric, &acc);
    StatDayRow {
        patient_id,
        date,
        min_value,
        max_value,
        sum_value: acc.sum,
        sample_count: acc.count,
    }
}

fn rounded_extremes(metric: StatMetric, acc: &StatAcc) -> (f64, f64) {
    if metric.rounds_extremes() {
        (acc.min.round(), acc.max.round())
    } else {
        (acc.min, acc.max)
    }
}

async fn ingest_batch<T: SamplePayload>(
    items: &[T],
    storage: &Storage,
    plan: AggregatePlan,
) -> HttpResponse {
    if items.is_empty() {
        return HttpResponse::Ok().json(IngestResponse::empty());
    }
    let batch = match parse_batch(items) {
        Ok(batch) => batch,
        Err(e) => return e.to_response(),
    };
    match run_pipeline(storage, plan, batch).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => {
            tracing::error!("ingestion rejected: {}", e);
            e.to_response()
        }
    }
}

#[tracing::instrument(name = "Ingest steps events", skip(items, storage), fields(count = items.len()))]
pub async fn ingest_steps(
    items: web::Json<Vec<StepsEventPayload>>,
    storage: web::Data<Storage>,
) -> HttpResponse {
    ingest_batch(&items, &storage, AggregatePlan::Sum(SumMetric::Steps)).await
}

#[tracing::instrument(name = "Ingest distance events", skip(items, storage), fields(count = items.len()))]
pub async fn ingest_distance(
    items: web::Json<Vec<DistanceEventPayload>>,
    storage: web::Data<Storage>,
) -> HttpResponse {
    ingest_batch(&items, &storage, AggregatePlan::Sum(SumMetric::Distance)).await
}

#[tracing::instrument(name = "Ingest heart rate samples", skip(items, storage), fields(count = items.len()))]
pub async fn ingest_heart_rate(
    items: web::Json<Vec<HrSamplePayload>>,
    storage: web::Data<Storage>,
) -> HttpResponse {
    ingest_batch(&items, &storage, AggregatePlan::Stat(StatMetric::HeartRate)).await
}

#[tracing::instrument(name = "Ingest SpO2 samples", skip(items, storage), fields(count = items.len()))]
pub async fn ingest_spo2(
    items: web::Json<Vec<Spo2SamplePayload>>,
    storage: web::Data<Storage>,
) -> HttpResponse {
    ingest_batch(&items, &storage, AggregatePlan::Stat(StatMetric::Spo2)).await
}
