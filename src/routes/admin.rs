use actix_web::{get, post, web, HttpResponse};

use crate::handlers::admin::patient_admin::{
    delete_patient, ensure_patient, patient_info, DeletePatientRequest, EnsurePatientRequest,
    PatientInfoQuery,
};
use crate::storage::Storage;

#[post("/ensure-patient")]
async fn ensure_patient_route(
    body: web::Json<EnsurePatientRequest>,
    storage: web::Data<Storage>,
) -> HttpResponse {
    ensure_patient(body, storage).await
}

#[post("/delete-patient")]
async fn delete_patient_route(
    body: web::Json<DeletePatientRequest>,
    storage: web::Data<Storage>,
) -> HttpResponse {
    delete_patient(body, storage).await
}

#[get("/patient-info")]
async fn patient_info_route(
    query: web::Query<PatientInfoQuery>,
    storage: web::Data<Storage>,
) -> HttpResponse {
    patient_info(query, storage).await
}
