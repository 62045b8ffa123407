use std::collections::{BTreeMap, HashMap};

use actix_web::{web, HttpResponse};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::bucket::BucketHour;
use crate::error::ApiError;
use crate::models::vitals::{StatDayRow, StatMetric, SumMetric};
use crate::storage::Storage;
use crate::utils::resting_heart_rate::{resting_heart_rate, NightHour};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalsQuery {
    pub patient_id: Uuid,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub tz_offset_min: Option<i32>,
}

#[derive(Debug, Clone, Copy)]
enum Period {
    Hourly,
    Weekly,
    Monthly,
}

#[derive(Debug, Serialize)]
struct HrPoint {
    time: String,
    min: i64,
    avg: i64,
    max: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resting: Option<i64>,
}

#[derive(Debug, Serialize)]
struct Spo2Point {
    time: String,
    min: f64,
    avg: f64,
    max: f64,
}

#[derive(Debug, Serialize)]
struct StepsPoint {
    time: String,
    count: i64,
}

#[derive(Debug, Serialize)]
struct BpPoint {
    time: String,
    systolic: i32,
    diastolic: i32,
    pulse: i32,
}

#[derive(Debug, Serialize)]
struct VitalsSeries {
    hr: Vec<HrPoint>,
    spo2: Vec<Spo2Point>,
    steps: Vec<StepsPoint>,
    bp: Vec<BpPoint>,
}

#[tracing::instrument(
    name = "Patient vitals series",
    skip(query, storage),
    fields(patient_id = %query.patient_id, period = ?query.period)
)]
pub async fn patient_vitals(
    query: web::Query<VitalsQuery>,
    storage: web::Data<Storage>,
) -> HttpResponse {
    let period = match query.period.as_deref() {
        None | Some("hourly") => Period::Hourly,
        Some("weekly") => Period::Weekly,
        Some("monthly") => Period::Monthly,
        Some(other) => {
            return ApiError::validation(format!("unknown period: {}", other)).to_response()
        }
    };

    // The anchor is the intended LOCAL calendar day. Without an explicit
    // date, "today" is derived with the caller's offset - the same
    // shift-then-truncate convention the aggregator applies on write.
    let offset = query.tz_offset_min.unwrap_or(0);
    let anchor = query
        .date
        .unwrap_or_else(|| (Utc::now() + Duration::minutes(offset as i64)).date_naive());

    let result = match period {
        Period::Hourly => build_hourly(&storage, query.patient_id, anchor).await,
        Period::Weekly => {
            let start = anchor - Duration::days(6);
            build_daily(&storage, query.patient_id, start, anchor).await
        }
        Period::Monthly => {
            let (start, end) = month_range(anchor);
            build_daily(&storage, query.patient_id, start, end).await
        }
    };

    match result {
        Ok(series) => HttpResponse::Ok().json(series),
        Err(e) => e.to_response(),
    }
}

async fn build_hourly(
    storage: &Storage,
    patient_id: Uuid,
    date: NaiveDate,
) -> Result<VitalsSeries, ApiError> {
    let from = BucketHour::day_start(date);
    let to = BucketHour::day_end(date);

    let hr = storage
        .stat_hours_in_range(StatMetric::HeartRate, patient_id, from, to)
        .await?;
    let spo2 = storage
        .stat_hours_in_range(StatMetric::Spo2, patient_id, from, to)
        .await?;
    let steps = storage
        .sum_hours_in_range(SumMetric::Steps, patient_id, from, to)
        .await?;

    Ok(VitalsSeries {
        hr: hr
            .iter()
            .map(|row| HrPoint {
                time: row.hour_ts.to_string(),
                min: row.min_value.round() as i64,
                avg: row.average().round() as i64,
                max: row.max_value.round() as i64,
                count: Some(row.sample_count),
                resting: None,
            })
            .collect(),
        spo2: spo2
            .iter()
            .map(|row| Spo2Point {
                time: row.hour_ts.to_string(),
                min: row.min_value,
                avg: round1(row.average()),
                max: row.max_value,
            })
            .collect(),
        steps: steps
            .iter()
            .map(|row| StepsPoint {
                time: row.hour_ts.to_string(),
                count: row.total.round() as i64,
            })
            .collect(),
        bp: Vec::new(),
    })
}

async fn build_daily(
    storage: &Storage,
    patient_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<VitalsSeries, ApiError> {
    let hr_days = storage
        .stat_days_in_range(StatMetric::HeartRate, patient_id, start, end)
        .await?;
    let spo2_days = storage
        .stat_days_in_range(StatMetric::Spo2, patient_id, start, end)
        .await?;
    let steps_days = storage
        .sum_days_in_range(SumMetric::Steps, patient_id, start, end)
        .await?;
    let bp = storage
        .bp_readings_in_range(patient_id, start, end)
        .await?;
    let resting = resting_by_day(storage, patient_id, start, end, &hr_days).await?;

    Ok(VitalsSeries {
        hr: hr_days
            .iter()
            .map(|row| HrPoint {
                time: row.date.to_string(),
                min: row.min_value.round() as i64,
                avg: row.average().round() as i64,
                max: row.max_value.round() as i64,
                count: Some(row.sample_count),
                resting: resting.get(&row.date.date()).copied(),
            })
            .collect(),
        spo2: spo2_days
            .iter()
            .map(|row| Spo2Point {
                time: row.date.to_string(),
                min: row.min_value,
                avg: round1(row.average()),
                max: row.max_value,
            })
            .collect(),
        steps: steps_days
            .iter()
            .map(|row| StepsPoint {
                time: row.date.to_string(),
                count: row.total.round() as i64,
            })
            .collect(),
        bp: bp
            .iter()
            .map(|r| BpPoint {
                time: format!("{}T{}", r.reading_date, r.reading_time),
                systolic: r.systolic,
                diastolic: r.diastolic,
                pulse: r.pulse,
            })
            .collect(),
    })
}

/// Per-day resting-rate estimates for a date range, derived from the stored
/// hour aggregates (bucket hours are already local wall-clock hours).
async fn resting_by_day(
    storage: &Storage,
    patient_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
    hr_days: &[StatDayRow],
) -> Result<HashMap<NaiveDate, i64>, ApiError> {
    let hours = storage
        .stat_hours_in_range(
            StatMetric::HeartRate,
            patient_id,
            BucketHour::day_start(start),
            BucketHour::day_end(end),
        )
        .await?;

    let mut by_day: BTreeMap<NaiveDate, Vec<NightHour>> = BTreeMap::new();
    for row in &hours {
        by_day.entry(row.hour_ts.date()).or_default().push(NightHour {
            hour: row.hour_ts.hour_of_day(),
            avg: row.average(),
            count: row.sample_count,
        });
    }

    let mut resting = HashMap::new();
    for day in hr_days {
        let date = day.date.date();
        let night_hours = by_day.get(&date).map(Vec::as_slice).unwrap_or(&[]);
        if let Some(estimate) = resting_heart_rate(night_hours, Some(day.min_value)) {
            resting.insert(date, estimate);
        }
    }
    Ok(resting)
}

fn month_range(anchor: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = anchor
        .with_day(1)
        .expect("the first of a month is always a valid date");
    let next_month = if anchor.month() == 12 {
        NaiveDate::from_ymd_opt(anchor.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(anchor.year(), anchor.month() + 1, 1)
    }
    .expect("the first of a month is always a valid date");
    let end = next_month
        .pred_opt()
        .expect("the day before the first of a month is always a valid date");
    (start, end)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
