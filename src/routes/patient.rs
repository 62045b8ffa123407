use actix_web::{get, post, web, HttpResponse};

use crate::handlers::patient::bp::{add_bp_reading, BpReadingRequest};
use crate::handlers::patient::summary::{patient_summary, SummaryQuery};
use crate::handlers::patient::vitals::{patient_vitals, VitalsQuery};
use crate::storage::Storage;

#[get("/summary")]
async fn summary(query: web::Query<SummaryQuery>, storage: web::Data<Storage>) -> HttpResponse {
    patient_summary(query, storage).await
}

#[get("/vitals")]
async fn vitals(query: web::Query<VitalsQuery>, storage: web::Data<Storage>) -> HttpResponse {
    patient_vitals(query, storage).await
}

#[post("/bp-readings")]
async fn bp_readings(
    body: web::Json<BpReadingRequest>,
    storage: web::Data<Storage>,
) -> HttpResponse {
    add_bp_reading(body, storage).await
}
