use actix_web::{web, HttpResponse};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::patient::{BpReading, NewBpReading};
use crate::storage::Storage;

/// Readings closer together than this with near-identical values are
/// treated as an accidental double submit.
const DUPLICATE_WINDOW_SECONDS: i64 = 10;
const DUPLICATE_TOLERANCE: i32 = 5;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BpReadingRequest {
    #[serde(default)]
    pub patient_id: Option<Uuid>,
    #[serde(default)]
    pub systolic: Option<i32>,
    #[serde(default)]
    pub diastolic: Option<i32>,
    #[serde(default)]
    pub pulse: Option<i32>,
}

#[tracing::instrument(name = "Add manual BP reading", skip(body, storage))]
pub async fn add_bp_reading(
    body: web::Json<BpReadingRequest>,
    storage: web::Data<Storage>,
) -> HttpResponse {
    match insert_reading(&storage, &body).await {
        Ok(reading) => HttpResponse::Ok().json(json!({ "success": true, "reading": reading })),
        Err(e) => e.to_response(),
    }
}

async fn insert_reading(
    storage: &Storage,
    body: &BpReadingRequest,
) -> Result<BpReading, ApiError> {
    let patient_id = body
        .patient_id
        .ok_or_else(|| ApiError::validation("missing patientId"))?;
    let (Some(systolic), Some(diastolic), Some(pulse)) =
        (body.systolic, body.diastolic, body.pulse)
    else {
        return Err(ApiError::validation(
            "systolic, diastolic and pulse are all required",
        ));
    };
    if !(40..=300).contains(&systolic)
        || !(30..=200).contains(&diastolic)
        || !(20..=300).contains(&pulse)
    {
        return Err(ApiError::validation("blood pressure reading out of range"));
    }

    let cutoff = Utc::now() - Duration::seconds(DUPLICATE_WINDOW_SECONDS);
    if let Some(last) = storage.bp_reading_since(patient_id, cutoff).await? {
        if (last.systolic - systolic).abs() <= DUPLICATE_TOLERANCE
            && (last.diastolic - diastolic).abs() <= DUPLICATE_TOLERANCE
            && (last.pulse - pulse).abs() <= DUPLICATE_TOLERANCE
        {
            return Err(ApiError::validation(
                "duplicate reading detected; wait at least 10 seconds before recording a similar reading",
            ));
        }
    }

    storage
        .insert_bp_reading(&NewBpReading {
            patient_id,
            systolic,
            diastolic,
            pulse,
        })
        .await
        .map_err(Into::into)
}
