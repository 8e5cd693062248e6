//! Liveness endpoint

use actix_web::{get, HttpResponse};

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "square-service",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
