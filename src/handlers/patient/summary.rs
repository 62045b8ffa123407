use actix_web::{web, HttpResponse};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::vitals::{MetricKind, StatMetric, SumMetric};
use crate::storage::Storage;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryQuery {
    pub patient_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VitalsSummary {
    heart_rate: Option<i64>,
    spo2_pct: Option<f64>,
    bp_systolic: Option<i32>,
    bp_diastolic: Option<i32>,
    bp_pulse: Option<i32>,
    steps_today: Option<i64>,
    distance_today: Option<f64>,
    last_sync_ts: Option<String>,
}

#[tracing::instrument(
    name = "Patient summary",
    skip(query, storage),
    fields(patient_id = %query.patient_id)
)]
pub async fn patient_summary(
    query: web::Query<SummaryQuery>,
    storage: web::Data<Storage>,
) -> HttpResponse {
    match build_summary(&storage, query.patient_id).await {
        Ok(summary) => HttpResponse::Ok().json(json!({ "summary": summary })),
        Err(e) => e.to_response(),
    }
}

async fn build_summary(storage: &Storage, patient_id: Uuid) -> Result<VitalsSummary, ApiError> {
    let hr = storage
        .latest_stat_day(StatMetric::HeartRate, patient_id)
        .await?;
    let spo2 = storage.latest_stat_day(StatMetric::Spo2, patient_id).await?;
    let steps = storage.latest_sum_day(SumMetric::Steps, patient_id).await?;
    let distance = storage
        .latest_sum_day(SumMetric::Distance, patient_id)
        .await?;
    let bp = storage.latest_bp_reading(patient_id).await?;
    let last_sync = last_sync_ts(storage, patient_id).await?;

    Ok(VitalsSummary {
        heart_rate: hr.map(|row| row.average().round() as i64),
        spo2_pct: spo2.map(|row| (row.average() * 10.0).round() / 10.0),
        bp_systolic: bp.as_ref().map(|r| r.systolic),
        bp_diastolic: bp.as_ref().map(|r| r.diastolic),
        bp_pulse: bp.as_ref().map(|r| r.pulse),
        steps_today: steps.map(|row| row.total.round() as i64),
        distance_today: distance.map(|row| row.total),
        last_sync_ts: last_sync.map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
    })
}

/// Prefer the explicit sync-status row; fall back to the newest raw sample
/// across metrics for patients that predate sync-status tracking.
async fn last_sync_ts(
    storage: &Storage,
    patient_id: Uuid,
) -> Result<Option<DateTime<Utc>>, ApiError> {
    if let Some(status) = storage.get_sync_status(patient_id).await? {
        return Ok(Some(status.last_sync_ts));
    }
    let mut newest: Option<DateTime<Utc>> = None;
    for metric in MetricKind::ALL {
        if let Some(ts) = storage.latest_raw_sample_ts(metric, patient_id).await? {
            newest = Some(newest.map_or(ts, |current| current.max(ts)));
        }
    }
    Ok(newest)
}
