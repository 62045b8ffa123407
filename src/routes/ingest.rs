use actix_web::{post, web, HttpResponse};

use crate::handlers::ingest::{ingest_distance, ingest_heart_rate, ingest_spo2, ingest_steps};
use crate::models::ingest::{
    DistanceEventPayload, HrSamplePayload, Spo2SamplePayload, StepsEventPayload,
};
use crate::storage::Storage;

#[post("/steps-events")]
async fn steps_events(
    items: web::Json<Vec<StepsEventPayload>>,
    storage: web::Data<Storage>,
) -> HttpResponse {
    ingest_steps(items, storage).await
}

#[post("/distance-events")]
async fn distance_events(
    items: web::Json<Vec<DistanceEventPayload>>,
    storage: web::Data<Storage>,
) -> HttpResponse {
    ingest_distance(items, storage).await
}

#[post("/hr-samples")]
async fn hr_samples(
    items: web::Json<Vec<HrSamplePayload>>,
    storage: web::Data<Storage>,
) -> HttpResponse {
    ingest_heart_rate(items, storage).await
}

#[post("/spo2-samples")]
async fn spo2_samples(
    items: web::Json<Vec<Spo2SamplePayload>>,
    storage: web::Data<Storage>,
) -> HttpResponse {
    ingest_spo2(items, storage).await
}
