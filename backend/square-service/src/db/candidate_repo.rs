//! Postgres-backed candidate store
//!
//! Thin read-only repository over the content tables. Each query returns a
//! recency-bounded window ordered by `(published_at DESC, id DESC)`; the
//! cursor restriction and all tier logic stay in the engine. The visibility
//! gate (public rows, plus the viewer's own) is applied here, upstream of
//! candidate-set construction.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::warn;

use crate::error::{AppError, Result};
use crate::models::{ContentRecord, Subtype, Viewer, Visibility};
use crate::registry::ContentSourceRegistry;
use crate::services::store::CandidateStore;

pub struct PgCandidateStore {
    pool: PgPool,
    registry: Arc<ContentSourceRegistry>,
    candidate_window: i64,
}

impl PgCandidateStore {
    pub fn new(pool: PgPool, registry: Arc<ContentSourceRegistry>, candidate_window: i64) -> Self {
        Self {
            pool,
            registry,
            candidate_window,
        }
    }

    fn entity_type(&self, kind: &str) -> Result<String> {
        self.registry
            .get(kind)
            .map(|source| source.entity_type.clone())
            .ok_or_else(|| AppError::Internal(format!("No source registered for kind {}", kind)))
    }
}

#[derive(sqlx::FromRow)]
struct MomentRow {
    id: i64,
    owner_id: i64,
    visibility: String,
    published_at: DateTime<Utc>,
    video_url: Option<String>,
    image_urls: Option<Json<Vec<String>>>,
}

impl MomentRow {
    fn into_record(self) -> Option<ContentRecord> {
        let visibility = match Visibility::parse(&self.visibility) {
            Some(v) => v,
            None => {
                warn!(id = self.id, visibility = %self.visibility, "moment row with unknown visibility, skipping");
                return None;
            }
        };
        let mut media = HashMap::new();
        media.insert(
            "video_url".to_string(),
            self.video_url.into_iter().collect(),
        );
        media.insert(
            "image_urls".to_string(),
            self.image_urls.map(|urls| urls.0).unwrap_or_default(),
        );
        Some(ContentRecord {
            id: self.id,
            owner_id: self.owner_id,
            visibility,
            published_at: self.published_at,
            declared_type: None,
            media,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TestimonyRow {
    id: i64,
    author_id: i64,
    visibility: String,
    published_at: DateTime<Utc>,
    media_type: String,
    media_url: Option<String>,
    cover_url: Option<String>,
}

impl TestimonyRow {
    fn into_record(self) -> Option<ContentRecord> {
        let visibility = match Visibility::parse(&self.visibility) {
            Some(v) => v,
            None => {
                warn!(id = self.id, visibility = %self.visibility, "testimony row with unknown visibility, skipping");
                return None;
            }
        };
        let declared_type = Subtype::parse(&self.media_type);
        if declared_type.is_none() {
            warn!(id = self.id, media_type = %self.media_type, "testimony row with unknown media type");
        }
        let mut media = HashMap::new();
        media.insert(
            "media_url".to_string(),
            self.media_url.into_iter().collect(),
        );
        media.insert(
            "cover_url".to_string(),
            self.cover_url.into_iter().collect(),
        );
        Some(ContentRecord {
            id: self.id,
            owner_id: self.author_id,
            visibility,
            published_at: self.published_at,
            declared_type,
            media,
        })
    }
}

#[async_trait]
impl CandidateStore for PgCandidateStore {
    async fn load_seed(&self, kind: &str, id: i64) -> Result<Option<ContentRecord>> {
        match self.entity_type(kind)?.as_str() {
            "moments" => {
                let row = sqlx::query_as::<_, MomentRow>(
                    r#"
                    SELECT id, owner_id, visibility, published_at, video_url, image_urls
                    FROM moments
                    WHERE id = $1 AND deleted_at IS NULL
                    "#,
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
                Ok(row.and_then(MomentRow::into_record))
            }
            "testimonies" => {
                let row = sqlx::query_as::<_, TestimonyRow>(
                    r#"
                    SELECT id, author_id, visibility, published_at, media_type, media_url, cover_url
                    FROM testimonies
                    WHERE id = $1 AND deleted_at IS NULL
                    "#,
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
                Ok(row.and_then(TestimonyRow::into_record))
            }
            other => Err(AppError::Internal(format!(
                "Unsupported entity type: {}",
                other
            ))),
        }
    }

    async fn candidates(
        &self,
        kind: &str,
        viewer: Viewer,
        subtype: Subtype,
        _seed: &ContentRecord,
    ) -> Result<Vec<ContentRecord>> {
        match self.entity_type(kind)?.as_str() {
            "moments" => {
                // Moments carry no declared type; the shape follows from the
                // attached media, so only video and image windows exist.
                let media_predicate = match subtype {
                    Subtype::Video => "video_url IS NOT NULL",
                    Subtype::Image => {
                        "video_url IS NULL AND image_urls IS NOT NULL \
                         AND jsonb_array_length(image_urls) > 0"
                    }
                    Subtype::Audio | Subtype::Written => return Ok(Vec::new()),
                };
                let query = format!(
                    r#"
                    SELECT id, owner_id, visibility, published_at, video_url, image_urls
                    FROM moments
                    WHERE deleted_at IS NULL
                      AND (visibility = 'public' OR owner_id = $1)
                      AND {}
                    ORDER BY published_at DESC, id DESC
                    LIMIT $2
                    "#,
                    media_predicate
                );
                let rows = sqlx::query_as::<_, MomentRow>(&query)
                    .bind(viewer.id)
                    .bind(self.candidate_window)
                    .fetch_all(&self.pool)
                    .await?;
                Ok(rows
                    .into_iter()
                    .filter_map(MomentRow::into_record)
                    .collect())
            }
            "testimonies" => {
                let rows = sqlx::query_as::<_, TestimonyRow>(
                    r#"
                    SELECT id, author_id, visibility, published_at, media_type, media_url, cover_url
                    FROM testimonies
                    WHERE deleted_at IS NULL
                      AND (visibility = 'public' OR author_id = $1)
                      AND media_type = $2
                    ORDER BY published_at DESC, id DESC
                    LIMIT $3
                    "#,
                )
                .bind(viewer.id)
                .bind(subtype.as_str())
                .fetch_all(&self.pool)
                .await
                .map(|rows| {
                    rows.into_iter()
                        .filter_map(TestimonyRow::into_record)
                        .collect::<Vec<_>>()
                })?;
                Ok(rows)
            }
            other => Err(AppError::Internal(format!(
                "Unsupported entity type: {}",
                other
            ))),
        }
    }
}
