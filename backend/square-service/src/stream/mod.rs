//! Tiered relatedness stream engine
//!
//! Assembles deterministic, paginated sequences of related items for the
//! public square feed: multi-tier candidate selection ([`tiers`]), cursor
//! bounded page assembly ([`engine`]), and the pagination primitives shared
//! by both (cursor codec, per-request used-id accumulator, hard caps).

pub mod engine;
pub mod tiers;

use std::collections::HashSet;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::StreamItem;

/// Items per page. One slot of the first page is reserved for the seed.
pub const PAGE_SIZE: usize = 5;

/// Hard cap on client-initiated feed extensions. Together with [`PAGE_SIZE`]
/// this bounds a viewing session at 15 items; the cap is unconditional and
/// cannot be bypassed by any request parameter.
pub const MAX_EXTENSIONS: u32 = 3;

/// Pagination token denoting the last item emitted on the previous page.
///
/// Total order over items is `(published_at DESC, id DESC)` with the id as
/// tie-break for shared timestamps. Cross-page dedup relies solely on this
/// ordering key: if the content store ever rewrites `published_at` after an
/// item has been served, a later page can re-surface it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub published_at: DateTime<Utc>,
    pub id: i64,
}

impl Cursor {
    pub fn from_item(item: &StreamItem) -> Self {
        Self {
            published_at: item.published_at(),
            id: item.id(),
        }
    }

    /// Wire format: `"<rfc3339-timestamp>|<id>"`.
    pub fn encode(&self) -> String {
        format!(
            "{}|{}",
            self.published_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.id
        )
    }

    /// Lenient decode: any malformed token is treated as "no cursor", so
    /// pagination degrades to a fresh first page instead of failing.
    pub fn decode(raw: &str) -> Option<Cursor> {
        let (ts_str, id_str) = raw.split_once('|')?;
        let published_at = DateTime::parse_from_rfc3339(ts_str)
            .ok()?
            .with_timezone(&Utc);
        let id = id_str.parse::<i64>().ok()?;
        Some(Cursor { published_at, id })
    }

    /// Whether an item at `(published_at, id)` lies strictly before this
    /// cursor under `(published_at DESC, id DESC)`.
    pub fn admits(&self, published_at: DateTime<Utc>, id: i64) -> bool {
        published_at < self.published_at || (published_at == self.published_at && id < self.id)
    }
}

/// Per-request accumulator of item ids already placed in the response.
///
/// Owned by exactly one page-assembly call and passed `&mut` through the
/// subtype and tier iterations of that call; it is never carried across
/// requests.
#[derive(Debug, Default)]
pub struct UsedIds(HashSet<i64>);

impl UsedIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulator pre-seeded with the seed item's id, so the seed is never
    /// re-selected by any tier.
    pub fn seeded(id: i64) -> Self {
        let mut used = Self::default();
        used.0.insert(id);
        used
    }

    pub fn contains(&self, id: i64) -> bool {
        self.0.contains(&id)
    }

    /// Returns true when `id` was not yet used.
    pub fn insert(&mut self, id: i64) -> bool {
        self.0.insert(id)
    }

    pub fn as_set(&self) -> &HashSet<i64> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
