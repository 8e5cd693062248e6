//! Content source registry
//!
//! Maps a content kind to its backing entity metadata and subtype resolution
//! rule. The registry is built once at process startup, validated for
//! duplicate kinds there, and shared read-only (`Arc`) with the handlers and
//! repositories for the lifetime of the process.

use std::collections::HashMap;

use thiserror::Error;

use crate::models::{ContentRecord, Subtype};

/// How a kind resolves the media shape of its items. Each kind declares its
/// rule at registration; resolution is a lookup, not a type-check cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtypeRule {
    /// The entity carries its own declared type (video/audio/written).
    Declared,
    /// The shape follows from which media attachments are present: video
    /// media wins over image media; neither means the item is unsupported.
    MediaPresence {
        video_field: String,
        image_field: String,
    },
}

impl SubtypeRule {
    /// Resolve the subtype of `record`, or `None` for an unsupported item.
    /// Callers surface `None` as a client-facing error, never a crash.
    pub fn resolve(&self, record: &ContentRecord) -> Option<Subtype> {
        match self {
            SubtypeRule::Declared => record.declared_type,
            SubtypeRule::MediaPresence {
                video_field,
                image_field,
            } => {
                if record.has_media(video_field) {
                    Some(Subtype::Video)
                } else if record.has_media(image_field) {
                    Some(Subtype::Image)
                } else {
                    None
                }
            }
        }
    }
}

/// Registry metadata for one content kind.
#[derive(Debug, Clone)]
pub struct ContentSource {
    /// Kind tag, unique across the registry ("moment", "testimony", ...).
    pub kind: String,
    /// Backing entity table in the content store.
    pub entity_type: String,
    /// Ordered media field names; the first non-empty field feeds the preview.
    pub media_fields: Vec<String>,
    /// Whether media for this kind passes through the conversion pipeline
    /// before URLs become servable.
    pub requires_conversion: bool,
    /// Column path used to resolve the owning entity, when not `owner_id`.
    pub owner_lookup: Option<String>,
    /// Subtype resolution rule for this kind's entities.
    pub subtype_rule: SubtypeRule,
    /// Whether starved pages may be filled from the kind's other subtypes.
    pub subtype_fallback: bool,
}

/// Raised for a duplicate kind at registration. Startup-fatal by design:
/// registration only happens while the process is booting.
#[derive(Debug, Error)]
#[error("content kind \"{0}\" is already registered")]
pub struct DuplicateKind(pub String);

#[derive(Debug, Default)]
pub struct ContentSourceRegistry {
    sources: HashMap<String, ContentSource>,
}

impl ContentSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: ContentSource) -> Result<(), DuplicateKind> {
        if self.sources.contains_key(&source.kind) {
            return Err(DuplicateKind(source.kind));
        }
        self.sources.insert(source.kind.clone(), source);
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<&ContentSource> {
        self.sources.get(kind)
    }

    pub fn list(&self) -> Vec<&ContentSource> {
        self.sources.values().collect()
    }
}

/// The production registry: short-form "moments" resolved by media presence,
/// long-form "testimonies" by their declared type, with the subtype fallback
/// pool enabled only for testimonies.
pub fn default_registry() -> Result<ContentSourceRegistry, DuplicateKind> {
    let mut registry = ContentSourceRegistry::new();
    registry.register(ContentSource {
        kind: "moment".to_string(),
        entity_type: "moments".to_string(),
        media_fields: vec!["video_url".to_string(), "image_urls".to_string()],
        requires_conversion: false,
        owner_lookup: None,
        subtype_rule: SubtypeRule::MediaPresence {
            video_field: "video_url".to_string(),
            image_field: "image_urls".to_string(),
        },
        subtype_fallback: false,
    })?;
    registry.register(ContentSource {
        kind: "testimony".to_string(),
        entity_type: "testimonies".to_string(),
        media_fields: vec!["media_url".to_string(), "cover_url".to_string()],
        requires_conversion: true,
        owner_lookup: Some("author_id".to_string()),
        subtype_rule: SubtypeRule::Declared,
        subtype_fallback: true,
    })?;
    Ok(registry)
}
