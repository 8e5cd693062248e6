//! Observability metrics for square-service

use actix_web::HttpResponse;
use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, Encoder, Histogram, IntCounterVec, TextEncoder,
};
use tracing::error;

lazy_static! {
    /// Total stream requests segmented by outcome (page, empty, limit_reached).
    pub static ref STREAM_REQUEST_TOTAL: IntCounterVec = register_int_counter_vec!(
        "square_stream_request_total",
        "Total stream requests segmented by outcome",
        &["outcome"]
    )
    .expect("failed to register square_stream_request_total");

    /// Number of items emitted per assembled page, seed included.
    pub static ref STREAM_PAGE_SIZE: Histogram = register_histogram!(
        "square_stream_page_size",
        "Items emitted per assembled stream page",
        vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
    )
    .expect("failed to register square_stream_page_size");

    /// Items contributed per tier across all page assemblies.
    pub static ref STREAM_TIER_ITEMS: IntCounterVec = register_int_counter_vec!(
        "square_stream_tier_items_total",
        "Items contributed to stream pages segmented by tier",
        &["tier"]
    )
    .expect("failed to register square_stream_tier_items_total");
}

/// Prometheus text exposition handler for `GET /metrics`.
pub async fn export() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return HttpResponse::InternalServerError().finish();
    }
    HttpResponse::Ok()
        .content_type(prometheus::TEXT_FORMAT)
        .body(buffer)
}
