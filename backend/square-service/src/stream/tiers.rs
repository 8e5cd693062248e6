//! Relatedness tiers
//!
//! Three ordered buckets consumed by the engine: Strong (same owner, same
//! visibility scope as the seed), Weak (different owner), and Fallback (no
//! extra predicate, last-resort filler). Tiers are stateless filters over the
//! already subtype- and visibility-filtered base set; each carries its own
//! hard cap on how many items it may contribute to one page.

use std::collections::HashSet;

use crate::models::{StreamItem, Viewer};

pub const DEFAULT_STRONG_LIMIT: usize = 5;
pub const DEFAULT_WEAK_LIMIT: usize = 5;
pub const DEFAULT_FALLBACK_LIMIT: usize = 10;

/// One relatedness bucket. Implementations filter the base candidate set
/// further; they never slice to their limit (the engine does) and never
/// fail (a tier that cannot contribute returns an empty set).
pub trait StreamTier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Hard cap on items this tier may contribute to one page assembly.
    fn limit(&self) -> usize;

    /// Filter `base` down to this tier's candidates, preserving order and
    /// excluding ids already used in the current response.
    fn select(
        &self,
        base: &[StreamItem],
        seed: &StreamItem,
        viewer: Viewer,
        used: &HashSet<i64>,
    ) -> Vec<StreamItem>;
}

/// Same owning entity and same visibility scope as the seed.
pub struct StrongTier {
    limit: usize,
}

impl Default for StrongTier {
    fn default() -> Self {
        Self {
            limit: DEFAULT_STRONG_LIMIT,
        }
    }
}

impl StreamTier for StrongTier {
    fn name(&self) -> &'static str {
        "strong"
    }

    fn limit(&self) -> usize {
        self.limit
    }

    fn select(
        &self,
        base: &[StreamItem],
        seed: &StreamItem,
        _viewer: Viewer,
        used: &HashSet<i64>,
    ) -> Vec<StreamItem> {
        base.iter()
            .filter(|item| {
                !used.contains(&item.id())
                    && item.record.owner_id == seed.record.owner_id
                    && item.record.visibility == seed.record.visibility
            })
            .cloned()
            .collect()
    }
}

/// Different owning entity than the seed; subtype affinity is inherited from
/// the base set.
pub struct WeakTier {
    limit: usize,
}

impl Default for WeakTier {
    fn default() -> Self {
        Self {
            limit: DEFAULT_WEAK_LIMIT,
        }
    }
}

impl StreamTier for WeakTier {
    fn name(&self) -> &'static str {
        "weak"
    }

    fn limit(&self) -> usize {
        self.limit
    }

    fn select(
        &self,
        base: &[StreamItem],
        seed: &StreamItem,
        _viewer: Viewer,
        used: &HashSet<i64>,
    ) -> Vec<StreamItem> {
        base.iter()
            .filter(|item| {
                !used.contains(&item.id()) && item.record.owner_id != seed.record.owner_id
            })
            .cloned()
            .collect()
    }
}

/// No additional predicate beyond the base set's subtype filter.
pub struct FallbackTier {
    limit: usize,
}

impl Default for FallbackTier {
    fn default() -> Self {
        Self {
            limit: DEFAULT_FALLBACK_LIMIT,
        }
    }
}

impl StreamTier for FallbackTier {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn limit(&self) -> usize {
        self.limit
    }

    fn select(
        &self,
        base: &[StreamItem],
        _seed: &StreamItem,
        _viewer: Viewer,
        used: &HashSet<i64>,
    ) -> Vec<StreamItem> {
        base.iter()
            .filter(|item| !used.contains(&item.id()))
            .cloned()
            .collect()
    }
}

/// The fixed tier order consumed by the engine.
pub fn default_tiers() -> Vec<Box<dyn StreamTier>> {
    vec![
        Box::new(StrongTier::default()),
        Box::new(WeakTier::default()),
        Box::new(FallbackTier::default()),
    ]
}
