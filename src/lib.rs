use actix_web::dev::Server;
use actix_web::{http, web, App, HttpServer};
use actix_cors::Cors;
use std::net::TcpListener;
use tracing_actix_web::TracingLogger;

pub mod aggregate;
pub mod config;
pub mod error;
mod handlers;
pub mod models;
mod routes;
pub mod storage;
pub mod sync;
pub mod telemetry;
pub mod utils;

use crate::routes::init_routes;
use crate::storage::Storage;

pub fn run(listener: TcpListener, storage: Storage) -> Result<Server, std::io::Error> {
    // Wrap using web::Data, which boils down to an Arc smart pointer
    let storage_data = web::Data::new(storage);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
            .allowed_headers(vec![
                http::header::AUTHORIZATION,
                http::header::ACCEPT,
                http::header::CONTENT_TYPE,
            ])
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(cors)
            // Get a pointer copy and attach it to the application state
            .app_data(storage_data.clone())
            .configure(init_routes)
    })
    .listen(listener)?
    .run();

    Ok(server)
}
