use actix_web::web;

pub mod admin;
pub mod backend_health;
pub mod ingest;
pub mod patient;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(backend_health::backend_health);

    cfg.service(
        web::scope("/ingest")
            .service(ingest::steps_events)
            .service(ingest::distance_events)
            .service(ingest::hr_samples)
            .service(ingest::spo2_samples),
    );

    cfg.service(
        web::scope("/patient")
            .service(patient::summary)
            .service(patient::vitals)
            .service(patient::bp_readings),
    );

    cfg.service(
        web::scope("/admin")
            .service(admin::ensure_patient_route)
            .service(admin::delete_patient_route)
            .service(admin::patient_info_route),
    );
}
