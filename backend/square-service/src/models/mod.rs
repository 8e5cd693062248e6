//! Data models for square-service
//!
//! Defines the media subtypes, visibility scopes, the content record shape
//! shared by all registered kinds, the per-response stream item, and the
//! wire-level response models.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stream::MAX_EXTENSIONS;

/// Media shape of a content item, resolved per item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subtype {
    Video,
    Audio,
    Image,
    Written,
}

impl Subtype {
    pub const ALL: [Subtype; 4] = [
        Subtype::Video,
        Subtype::Audio,
        Subtype::Image,
        Subtype::Written,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subtype::Video => "video",
            Subtype::Audio => "audio",
            Subtype::Image => "image",
            Subtype::Written => "written",
        }
    }

    pub fn parse(value: &str) -> Option<Subtype> {
        match value {
            "video" => Some(Subtype::Video),
            "audio" => Some(Subtype::Audio),
            "image" => Some(Subtype::Image),
            "written" => Some(Subtype::Written),
            _ => None,
        }
    }
}

impl fmt::Display for Subtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility scope of a content item. The authorization gate that decides
/// what a viewer may see runs upstream of candidate-set construction; this
/// scope is only compared between seed and candidate in tier predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Followers,
    Private,
}

impl Visibility {
    pub fn parse(value: &str) -> Option<Visibility> {
        match value {
            "public" => Some(Visibility::Public),
            "followers" => Some(Visibility::Followers),
            "private" => Some(Visibility::Private),
            _ => None,
        }
    }
}

/// Identity of the requesting viewer, resolved by upstream auth middleware.
/// Anonymous browsing is allowed on the public square.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewer {
    pub id: Option<i64>,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Self { id: None }
    }
}

/// Snapshot of one content row, shared by every registered kind.
///
/// `media` is keyed by the source field names declared in the kind's
/// `ContentSource::media_fields`; subtype resolution and payload previews
/// both read it through that metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: i64,
    pub owner_id: i64,
    pub visibility: Visibility,
    pub published_at: DateTime<Utc>,
    /// Declared media type, for kinds whose entities carry one.
    pub declared_type: Option<Subtype>,
    pub media: HashMap<String, Vec<String>>,
}

impl ContentRecord {
    pub fn has_media(&self, field: &str) -> bool {
        self.media.get(field).map(|v| !v.is_empty()).unwrap_or(false)
    }
}

/// Ephemeral per-response item flowing through the stream engine. Never
/// persisted; created when a candidate window is loaded and discarded after
/// the response is serialized.
#[derive(Debug, Clone)]
pub struct StreamItem {
    pub kind: String,
    pub record: ContentRecord,
}

impl StreamItem {
    pub fn id(&self) -> i64 {
        self.record.id
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.record.published_at
    }

    /// Ordering key under `(published_at DESC, id DESC)`; the id breaks ties
    /// between items sharing a timestamp.
    pub fn order_key(&self) -> (DateTime<Utc>, i64) {
        (self.record.published_at, self.record.id)
    }
}

/// One serialized entry of a stream page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEntry {
    pub kind: String,
    pub id: i64,
    pub published_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Stream page response. Three shapes share this struct: a normal page
/// (`next` set), a legitimately empty page (`next` null), and the
/// limit-reached shape (`limit_reached: true`, nothing else populated).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamResponse {
    pub next: Option<String>,
    pub results: Vec<StreamEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<Subtype>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_continue: Option<bool>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub limit_reached: bool,
}

impl StreamResponse {
    /// The hard-cap shape: no further pages are served this session.
    pub fn limit_reached() -> Self {
        Self {
            next: None,
            results: Vec::new(),
            subtype: None,
            extension: None,
            can_continue: None,
            limit_reached: true,
        }
    }

    pub fn empty(subtype: Subtype, extension: u32) -> Self {
        Self {
            next: None,
            results: Vec::new(),
            subtype: Some(subtype),
            extension: Some(extension),
            can_continue: Some(can_continue(extension)),
            limit_reached: false,
        }
    }

    pub fn page(next: Option<String>, results: Vec<StreamEntry>, subtype: Subtype, extension: u32) -> Self {
        Self {
            next,
            results,
            subtype: Some(subtype),
            extension: Some(extension),
            can_continue: Some(can_continue(extension)),
            limit_reached: false,
        }
    }
}

fn can_continue(extension: u32) -> bool {
    extension + 1 < MAX_EXTENSIONS
}
