use actix_web::{get, HttpResponse, Responder};

#[get("/health")]
async fn backend_health() -> impl Responder {
    HttpResponse::Ok().body("ok")
}
