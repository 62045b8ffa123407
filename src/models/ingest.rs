use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire payload for one steps interval. Timestamps travel as RFC 3339
/// strings; the ingestion pipeline parses them and skips records whose time
/// data cannot be read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepsEventPayload {
    #[serde(default)]
    pub patient_id: Option<Uuid>,
    pub origin_id: String,
    pub device_id: String,
    pub start_ts: String,
    pub end_ts: String,
    pub count: i64,
    pub record_uid: String,
    #[serde(default)]
    pub tz_offset_min: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistanceEventPayload {
    #[serde(default)]
    pub patient_id: Option<Uuid>,
    pub origin_id: String,
    pub device_id: String,
    pub start_ts: String,
    pub end_ts: String,
    pub meters: f64,
    pub record_uid: String,
    #[serde(default)]
    pub tz_offset_min: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HrSamplePayload {
    #[serde(default)]
    pub patient_id: Option<Uuid>,
    pub origin_id: String,
    pub device_id: String,
    pub time_ts: String,
    pub bpm: f64,
    pub record_uid: String,
    #[serde(default)]
    pub tz_offset_min: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spo2SamplePayload {
    #[serde(default)]
    pub patient_id: Option<Uuid>,
    pub origin_id: String,
    pub device_id: String,
    pub time_ts: String,
    pub spo2_pct: f64,
    pub record_uid: String,
    #[serde(default)]
    pub tz_offset_min: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
}

/// Row counts for one accepted ingestion batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub inserted: u64,
    pub upserted_hour: u64,
    pub upserted_day: u64,
}

impl IngestResponse {
    pub fn empty() -> Self {
        IngestResponse {
            inserted: 0,
            upserted_hour: 0,
            upserted_day: 0,
        }
    }
}
