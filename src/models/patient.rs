use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Ensure-exists input for the patients table. `None` fields leave any
/// previously stored value untouched.
#[derive(Debug, Clone)]
pub struct PatientUpsert {
    pub patient_id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

impl PatientUpsert {
    pub fn bare(patient_id: Uuid) -> Self {
        PatientUpsert {
            patient_id,
            first_name: None,
            last_name: None,
            date_of_birth: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    pub patient_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// Last-successful-sync marker per patient, shown as staleness on the
/// dashboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSyncStatus {
    pub patient_id: Uuid,
    pub last_sync_ts: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBpReading {
    pub patient_id: Uuid,
    pub systolic: i32,
    pub diastolic: i32,
    pub pulse: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BpReading {
    pub patient_id: Uuid,
    pub reading_date: NaiveDate,
    pub reading_time: NaiveTime,
    pub systolic: i32,
    pub diastolic: i32,
    pub pulse: i32,
    pub created_at: DateTime<Utc>,
}
