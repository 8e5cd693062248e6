//! Page assembly over the tier set
//!
//! The engine restricts the base candidate set to items strictly before the
//! cursor, sorts it under the stream order, then walks the tiers in fixed
//! order, consuming at most `tier.limit()` items per tier and at most `limit`
//! items overall, deduplicated through the caller's used-id accumulator.

use tracing::debug;

use crate::metrics::STREAM_TIER_ITEMS;
use crate::models::{StreamItem, Viewer};
use crate::stream::tiers::{default_tiers, StreamTier};
use crate::stream::{Cursor, UsedIds};

pub struct StreamEngine {
    tiers: Vec<Box<dyn StreamTier>>,
}

impl Default for StreamEngine {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
        }
    }
}

impl StreamEngine {
    pub fn new(tiers: Vec<Box<dyn StreamTier>>) -> Self {
        Self { tiers }
    }

    /// Assemble up to `limit` deduplicated items from `base`.
    ///
    /// Returning fewer than `limit` items signals tier exhaustion, not
    /// failure. Within one call no id appears twice; results are ordered
    /// within each tier but not globally across tier boundaries (a strong
    /// item may be older than a weak one).
    pub fn apply(
        &self,
        base: Vec<StreamItem>,
        seed: &StreamItem,
        viewer: Viewer,
        cursor: Option<&Cursor>,
        limit: usize,
        used: &mut UsedIds,
    ) -> Vec<StreamItem> {
        let mut window: Vec<StreamItem> = match cursor {
            Some(c) => base
                .into_iter()
                .filter(|item| c.admits(item.published_at(), item.id()))
                .collect(),
            None => base,
        };
        window.sort_by(|a, b| b.order_key().cmp(&a.order_key()));

        let mut results: Vec<StreamItem> = Vec::with_capacity(limit.min(window.len()));
        for tier in &self.tiers {
            if results.len() >= limit {
                break;
            }
            let candidates = tier.select(&window, seed, viewer, used.as_set());
            let mut taken = 0usize;
            for item in candidates {
                if results.len() >= limit || taken >= tier.limit() {
                    break;
                }
                if used.insert(item.id()) {
                    taken += 1;
                    results.push(item);
                }
            }
            if taken > 0 {
                STREAM_TIER_ITEMS
                    .with_label_values(&[tier.name()])
                    .inc_by(taken as u64);
            }
            debug!(tier = tier.name(), taken, total = results.len(), "tier consumed");
        }
        results
    }
}
