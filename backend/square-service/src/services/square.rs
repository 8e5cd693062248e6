//! Stream page assembly
//!
//! Owns the request-level protocol around the engine: the anti-addiction
//! extension cap, kind/seed/subtype validation, the randomized subtype
//! fallback pool, seed injection on the first page, per-item payload
//! serialization, and next-cursor computation.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::RngCore;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::metrics::{STREAM_PAGE_SIZE, STREAM_REQUEST_TOTAL};
use crate::models::{StreamEntry, StreamItem, StreamResponse, Subtype, Viewer};
use crate::registry::ContentSourceRegistry;
use crate::services::store::{CandidateStore, ItemSerializer};
use crate::stream::engine::StreamEngine;
use crate::stream::{Cursor, UsedIds, MAX_EXTENSIONS, PAGE_SIZE};

/// One validated stream request. `cursor` is the raw client token; decoding
/// is lenient and happens during assembly.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub kind: String,
    pub seed_id: i64,
    pub cursor: Option<String>,
    pub extension: u32,
    pub viewer: Viewer,
}

pub struct SquareService {
    registry: Arc<ContentSourceRegistry>,
    store: Arc<dyn CandidateStore>,
    serializer: Arc<dyn ItemSerializer>,
    engine: StreamEngine,
}

impl SquareService {
    pub fn new(
        registry: Arc<ContentSourceRegistry>,
        store: Arc<dyn CandidateStore>,
        serializer: Arc<dyn ItemSerializer>,
    ) -> Self {
        Self {
            registry,
            store,
            serializer,
            engine: StreamEngine::default(),
        }
    }

    /// Assemble one stream page. All mutable assembly state (used ids, the
    /// subtype pool, the running result list) lives inside this call and is
    /// discarded with it; concurrent requests need no coordination.
    pub async fn assemble(
        &self,
        req: &StreamRequest,
        rng: &mut dyn RngCore,
    ) -> Result<StreamResponse> {
        // The hard cap comes before everything except parameter presence:
        // no kind/seed/cursor validation, no data access.
        if req.extension >= MAX_EXTENSIONS {
            info!(ext = req.extension, "stream extension cap reached");
            STREAM_REQUEST_TOTAL
                .with_label_values(&["limit_reached"])
                .inc();
            return Ok(StreamResponse::limit_reached());
        }

        let source = self
            .registry
            .get(&req.kind)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown content kind: {}", req.kind)))?;

        let seed_record = self
            .store
            .load_seed(&source.kind, req.seed_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("{} {} does not exist", source.kind, req.seed_id))
            })?;

        let seed_subtype = source.subtype_rule.resolve(&seed_record).ok_or_else(|| {
            AppError::BadRequest(format!(
                "{} {} has no resolvable subtype",
                source.kind, req.seed_id
            ))
        })?;

        // Malformed cursors degrade to a fresh first page, never an error.
        let cursor = req.cursor.as_deref().and_then(Cursor::decode);
        let first_page = cursor.is_none();
        let effective_limit = if first_page { PAGE_SIZE - 1 } else { PAGE_SIZE };

        debug!(
            kind = %source.kind,
            seed_id = req.seed_id,
            subtype = %seed_subtype,
            ext = req.extension,
            has_cursor = !first_page,
            "assembling stream page"
        );

        let seed_item = StreamItem {
            kind: source.kind.clone(),
            record: seed_record,
        };
        let mut used = UsedIds::seeded(seed_item.id());
        let mut collected: Vec<StreamItem> = Vec::new();

        let pool = subtype_pool(seed_subtype, source.subtype_fallback, rng);
        for (idx, subtype) in pool.iter().enumerate() {
            let remaining = effective_limit.saturating_sub(collected.len());
            if remaining == 0 {
                break;
            }
            let records = match self
                .store
                .candidates(&source.kind, req.viewer, *subtype, &seed_item.record)
                .await
            {
                Ok(records) => records,
                // A broken fallback subtype degrades feed quality instead of
                // breaking the response; the seed's own subtype propagates.
                Err(e) if idx > 0 => {
                    warn!(kind = %source.kind, subtype = %subtype, "candidate read failed, skipping subtype: {}", e);
                    Vec::new()
                }
                Err(e) => return Err(e),
            };
            let base: Vec<StreamItem> = records
                .into_iter()
                .map(|record| StreamItem {
                    kind: source.kind.clone(),
                    record,
                })
                .collect();
            let page = self.engine.apply(
                base,
                &seed_item,
                req.viewer,
                cursor.as_ref(),
                remaining,
                &mut used,
            );
            collected.extend(page);
        }

        let mut emitted: Vec<StreamItem> = Vec::with_capacity(collected.len() + 1);
        if first_page {
            // The seed appears exactly once per session, on the first page.
            emitted.push(seed_item.clone());
        }
        emitted.extend(collected);

        if emitted.is_empty() {
            info!(kind = %source.kind, seed_id = req.seed_id, "stream page exhausted");
            STREAM_REQUEST_TOTAL.with_label_values(&["empty"]).inc();
            return Ok(StreamResponse::empty(seed_subtype, req.extension));
        }

        let next = emitted
            .last()
            .map(|item| Cursor::from_item(item).encode());
        let results = self.serialize_entries(&emitted).await;

        info!(
            kind = %source.kind,
            seed_id = req.seed_id,
            items = results.len(),
            ext = req.extension,
            "stream page assembled"
        );
        STREAM_REQUEST_TOTAL.with_label_values(&["page"]).inc();
        STREAM_PAGE_SIZE.observe(results.len() as f64);

        Ok(StreamResponse::page(
            next,
            results,
            seed_subtype,
            req.extension,
        ))
    }

    /// Serialize payloads per item; a failed preview degrades to an empty
    /// payload block rather than dropping the item or failing the page.
    async fn serialize_entries(&self, items: &[StreamItem]) -> Vec<StreamEntry> {
        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            let payload = match self.serializer.payload(&item.kind, &item.record).await {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(kind = %item.kind, id = item.id(), "payload serialization failed: {}", e);
                    serde_json::json!({})
                }
            };
            entries.push(StreamEntry {
                kind: item.kind.clone(),
                id: item.id(),
                published_at: item.published_at(),
                payload,
            });
        }
        entries
    }
}

/// Build the subtype pool for one assembly call: the seed's own subtype
/// first, then (for kinds with the fallback enabled) the remaining subtypes
/// in shuffled order. The shuffle is a fairness mechanism: when the seed's
/// subtype is starved, no single other subtype monopolizes the filler slots
/// across calls.
fn subtype_pool(seed_subtype: Subtype, fallback: bool, rng: &mut dyn RngCore) -> Vec<Subtype> {
    if !fallback {
        return vec![seed_subtype];
    }
    let mut rest: Vec<Subtype> = Subtype::ALL
        .iter()
        .copied()
        .filter(|s| *s != seed_subtype)
        .collect();
    rest.shuffle(rng);
    let mut pool = Vec::with_capacity(Subtype::ALL.len());
    pool.push(seed_subtype);
    pool.extend(rest);
    pool
}
