use actix_web::{web, HttpResponse};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::patient::PatientUpsert;
use crate::storage::Storage;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsurePatientRequest {
    #[serde(default)]
    pub patient_id: Option<Uuid>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
}

/// Idempotent patient upsert, called from login and registration flows.
/// Omitted fields never blank previously stored values.
#[tracing::instrument(name = "Ensure patient", skip(body, storage))]
pub async fn ensure_patient(
    body: web::Json<EnsurePatientRequest>,
    storage: web::Data<Storage>,
) -> HttpResponse {
    let Some(patient_id) = body.patient_id else {
        return ApiError::validation("missing patientId").to_response();
    };
    let date_of_birth = body.date_of_birth.as_deref().and_then(|raw| {
        match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(e) => {
                tracing::warn!("ignoring unparsable dateOfBirth {:?}: {}", raw, e);
                None
            }
        }
    });
    let upsert = PatientUpsert {
        patient_id,
        first_name: body.first_name.clone(),
        last_name: body.last_name.clone(),
        date_of_birth,
    };
    match storage.ensure_patient(&upsert).await {
        Ok(()) => HttpResponse::Ok().json(json!({ "ok": true })),
        Err(e) => ApiError::storage("patient upsert failed", e).to_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePatientRequest {
    #[serde(default)]
    pub patient_id: Option<Uuid>,
}

/// Explicit cascade delete across raw, aggregate, device and sync-status
/// tables. Admin use only; nothing ever deletes patient data automatically.
#[tracing::instrument(name = "Delete patient cascade", skip(body, storage))]
pub async fn delete_patient(
    body: web::Json<DeletePatientRequest>,
    storage: web::Data<Storage>,
) -> HttpResponse {
    let Some(patient_id) = body.patient_id else {
        return ApiError::validation("missing patientId").to_response();
    };
    match storage.delete_patient_cascade(patient_id).await {
        Ok(deleted) => {
            tracing::info!(%patient_id, deleted, "patient data deleted");
            HttpResponse::Ok().json(json!({ "ok": true, "deleted": deleted }))
        }
        Err(e) => ApiError::storage("cascade delete failed", e).to_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientInfoQuery {
    pub patient_id: Uuid,
}

#[tracing::instrument(
    name = "Patient info",
    skip(query, storage),
    fields(patient_id = %query.patient_id)
)]
pub async fn patient_info(
    query: web::Query<PatientInfoQuery>,
    storage: web::Data<Storage>,
) -> HttpResponse {
    let patient = match storage.get_patient(query.patient_id).await {
        Ok(Some(patient)) => patient,
        Ok(None) => {
            return HttpResponse::NotFound().json(json!({ "error": "Patient not found" }))
        }
        Err(e) => return ApiError::storage("patient lookup failed", e).to_response(),
    };
    let devices_count = match storage.device_count(query.patient_id).await {
        Ok(count) => count,
        Err(e) => return ApiError::storage("device lookup failed", e).to_response(),
    };
    HttpResponse::Ok().json(json!({
        "patient": patient,
        "devicesCount": devices_count,
    }))
}
