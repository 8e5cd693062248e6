//! Stream endpoint handler

use actix_web::{get, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::models::Viewer;
use crate::services::{SquareService, StreamRequest};

#[derive(Debug, Deserialize)]
pub struct StreamQueryParams {
    pub kind: Option<String>,
    pub seed_id: Option<i64>,
    pub cursor: Option<String>,
    #[serde(default)]
    pub ext: u32,
}

pub struct SquareHandlerState {
    pub service: Arc<SquareService>,
}

/// Resolve the viewer identity populated upstream. Auth middleware is an
/// external collaborator; anonymous browsing is valid on the public square.
fn viewer_from_request(req: &HttpRequest) -> Viewer {
    let id = req
        .headers()
        .get("X-Viewer-Id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<i64>().ok());
    Viewer { id }
}

#[get("/stream")]
pub async fn get_stream(
    query: web::Query<StreamQueryParams>,
    http_req: HttpRequest,
    state: web::Data<SquareHandlerState>,
) -> Result<HttpResponse> {
    let kind = query
        .kind
        .clone()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing required parameter: kind".to_string()))?;
    let seed_id = query
        .seed_id
        .ok_or_else(|| AppError::BadRequest("Missing required parameter: seed_id".to_string()))?;
    let viewer = viewer_from_request(&http_req);

    debug!(
        kind = %kind,
        seed_id,
        ext = query.ext,
        has_cursor = query.cursor.is_some(),
        "stream request"
    );

    let request = StreamRequest {
        kind,
        seed_id,
        cursor: query.cursor.clone(),
        extension: query.ext,
        viewer,
    };
    let response = state
        .service
        .assemble(&request, &mut rand::thread_rng())
        .await?;

    Ok(HttpResponse::Ok().json(response))
}
