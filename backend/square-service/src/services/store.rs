//! External collaborator seams
//!
//! The stream engine consumes the content store and the per-item payload
//! serializer through these traits; their internals (query construction,
//! media URL signing) live behind them. Production wires the Postgres
//! repository and the registry-driven serializer; tests substitute in-memory
//! fakes.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::{ContentRecord, Subtype, Viewer};
use crate::registry::ContentSourceRegistry;

/// Read side of the content store. The visibility/authorization gate is
/// applied inside implementations, upstream of everything the engine does.
#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// Load the seed object of `kind`, if it exists and is servable.
    async fn load_seed(&self, kind: &str, id: i64) -> Result<Option<ContentRecord>>;

    /// Subtype- and visibility-filtered candidate window for `kind`, most
    /// recent first. A failed read propagates; it is never retried here.
    async fn candidates(
        &self,
        kind: &str,
        viewer: Viewer,
        subtype: Subtype,
        seed: &ContentRecord,
    ) -> Result<Vec<ContentRecord>>;
}

/// Per-item payload construction (preview and media URL resolution).
#[async_trait]
pub trait ItemSerializer: Send + Sync {
    async fn payload(&self, kind: &str, record: &ContentRecord) -> Result<serde_json::Value>;
}

/// Serializer driven by registry metadata: media blocks follow the kind's
/// declared `media_fields` order and the first non-empty field feeds the
/// preview.
pub struct RegistryPayloadSerializer {
    registry: Arc<ContentSourceRegistry>,
}

impl RegistryPayloadSerializer {
    pub fn new(registry: Arc<ContentSourceRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ItemSerializer for RegistryPayloadSerializer {
    async fn payload(&self, kind: &str, record: &ContentRecord) -> Result<serde_json::Value> {
        let source = self
            .registry
            .get(kind)
            .ok_or_else(|| AppError::Internal(format!("No source registered for kind {}", kind)))?;

        let mut media = serde_json::Map::new();
        for field in &source.media_fields {
            if let Some(urls) = record.media.get(field) {
                media.insert(field.clone(), json!(urls));
            }
        }

        let preview = source
            .media_fields
            .iter()
            .find(|field| record.has_media(field))
            .and_then(|field| {
                record
                    .media
                    .get(field)
                    .and_then(|urls| urls.first())
                    .map(|url| json!({ "source": field, "url": url }))
            })
            .unwrap_or_else(|| json!({}));

        Ok(json!({
            "owner_id": record.owner_id,
            "visibility": record.visibility,
            "published_at": record.published_at,
            "requires_conversion": source.requires_conversion,
            "media": serde_json::Value::Object(media),
            "preview": preview,
        }))
    }
}
