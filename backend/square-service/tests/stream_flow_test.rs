//! Integration tests: stream page assembly
//!
//! Drives `SquareService` end-to-end against an in-memory candidate store:
//! tier precedence, seed injection, cursor monotonicity, the subtype
//! fallback pool, the anti-addiction cap, and the HTTP surface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use actix_web::{test, web, App};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;

use square_service::error::{AppError, Result};
use square_service::handlers::{get_stream, SquareHandlerState};
use square_service::models::{ContentRecord, StreamResponse, Subtype, Viewer, Visibility};
use square_service::registry::{default_registry, ContentSourceRegistry};
use square_service::services::{
    CandidateStore, ItemSerializer, RegistryPayloadSerializer, SquareService, StreamRequest,
};
use square_service::stream::{Cursor, MAX_EXTENSIONS, PAGE_SIZE};

fn ts(secs: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, secs).unwrap()
}

fn moment(id: i64, owner_id: i64, published_at: DateTime<Utc>, images: &[&str]) -> ContentRecord {
    let mut media = HashMap::new();
    media.insert("video_url".to_string(), Vec::new());
    media.insert(
        "image_urls".to_string(),
        images.iter().map(|s| s.to_string()).collect(),
    );
    ContentRecord {
        id,
        owner_id,
        visibility: Visibility::Public,
        published_at,
        declared_type: None,
        media,
    }
}

fn testimony(id: i64, owner_id: i64, published_at: DateTime<Utc>, subtype: Subtype) -> ContentRecord {
    let mut media = HashMap::new();
    media.insert("media_url".to_string(), vec![format!("media/{}.bin", id)]);
    media.insert("cover_url".to_string(), Vec::new());
    ContentRecord {
        id,
        owner_id,
        visibility: Visibility::Public,
        published_at,
        declared_type: Some(subtype),
        media,
    }
}

/// In-memory store: filters by subtype through the registry rules and by the
/// public-or-own visibility gate, newest first, and counts every read.
struct MemoryStore {
    registry: Arc<ContentSourceRegistry>,
    records: HashMap<String, Vec<ContentRecord>>,
    calls: AtomicUsize,
    fail_subtype: Option<Subtype>,
}

impl MemoryStore {
    fn new(registry: Arc<ContentSourceRegistry>) -> Self {
        Self {
            registry,
            records: HashMap::new(),
            calls: AtomicUsize::new(0),
            fail_subtype: None,
        }
    }

    fn with_records(mut self, kind: &str, records: Vec<ContentRecord>) -> Self {
        self.records.insert(kind.to_string(), records);
        self
    }

    fn failing_for(mut self, subtype: Subtype) -> Self {
        self.fail_subtype = Some(subtype);
        self
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandidateStore for MemoryStore {
    async fn load_seed(&self, kind: &str, id: i64) -> Result<Option<ContentRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .records
            .get(kind)
            .and_then(|records| records.iter().find(|r| r.id == id))
            .cloned())
    }

    async fn candidates(
        &self,
        kind: &str,
        viewer: Viewer,
        subtype: Subtype,
        _seed: &ContentRecord,
    ) -> Result<Vec<ContentRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_subtype == Some(subtype) {
            return Err(AppError::DatabaseError("candidate window unavailable".to_string()));
        }
        let rule = &self
            .registry
            .get(kind)
            .expect("kind registered")
            .subtype_rule;
        let mut matches: Vec<ContentRecord> = self
            .records
            .get(kind)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| rule.resolve(r) == Some(subtype))
                    .filter(|r| r.visibility == Visibility::Public || viewer.id == Some(r.owner_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        matches.sort_by(|a, b| (b.published_at, b.id).cmp(&(a.published_at, a.id)));
        Ok(matches)
    }
}

/// Serializer that always fails, for the per-item degradation path.
struct BrokenSerializer;

#[async_trait]
impl ItemSerializer for BrokenSerializer {
    async fn payload(&self, _kind: &str, _record: &ContentRecord) -> Result<serde_json::Value> {
        Err(AppError::Internal("preview backend down".to_string()))
    }
}

fn request(kind: &str, seed_id: i64, cursor: Option<String>, ext: u32) -> StreamRequest {
    StreamRequest {
        kind: kind.to_string(),
        seed_id,
        cursor,
        extension: ext,
        viewer: Viewer::anonymous(),
    }
}

/// Seed moment 42 (owner 10) with three strong and two weak image candidates.
fn moment_fixture(registry: &Arc<ContentSourceRegistry>) -> Arc<MemoryStore> {
    let records = vec![
        moment(42, 10, ts(50), &["seed.jpg"]),
        // Strong: same owner, same (public) visibility.
        moment(2, 10, ts(40), &["s1.jpg"]),
        moment(3, 10, ts(30), &["s2.jpg"]),
        moment(4, 10, ts(20), &["s3.jpg"]),
        // Weak: other owners. Newer than the strong ones on purpose.
        moment(5, 20, ts(45), &["w1.jpg"]),
        moment(6, 30, ts(44), &["w2.jpg"]),
    ];
    Arc::new(MemoryStore::new(registry.clone()).with_records("moment", records))
}

fn service_over(store: Arc<MemoryStore>, registry: Arc<ContentSourceRegistry>) -> SquareService {
    let serializer = Arc::new(RegistryPayloadSerializer::new(registry.clone()));
    SquareService::new(registry, store, serializer)
}

fn result_ids(resp: &StreamResponse) -> Vec<i64> {
    resp.results.iter().map(|entry| entry.id).collect()
}

#[tokio::test]
async fn first_page_injects_seed_and_respects_tier_precedence() {
    let registry = Arc::new(default_registry().unwrap());
    let store = moment_fixture(&registry);
    let service = service_over(store, registry);

    let resp = service
        .assemble(&request("moment", 42, None, 0), &mut StdRng::seed_from_u64(1))
        .await
        .unwrap();

    // effective_limit = 4 (seed slot reserved) => 5 entries total.
    assert_eq!(result_ids(&resp), vec![42, 2, 3, 4, 5]);
    assert_eq!(resp.subtype, Some(Subtype::Image));
    assert_eq!(resp.extension, Some(0));
    assert_eq!(resp.can_continue, Some(true));
    assert!(!resp.limit_reached);

    // Next cursor derives from the last emitted item (weak candidate 5).
    let next = Cursor::decode(resp.next.as_deref().unwrap()).unwrap();
    assert_eq!(next.id, 5);
    assert_eq!(next.published_at, ts(45));
}

#[tokio::test]
async fn no_id_appears_twice_in_a_response() {
    let registry = Arc::new(default_registry().unwrap());
    let store = moment_fixture(&registry);
    let service = service_over(store, registry);

    let resp = service
        .assemble(&request("moment", 42, None, 0), &mut StdRng::seed_from_u64(1))
        .await
        .unwrap();

    let ids = result_ids(&resp);
    let unique: std::collections::HashSet<i64> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len());
    assert!(ids.len() <= PAGE_SIZE);
}

#[tokio::test]
async fn second_page_is_strictly_before_the_cursor_and_has_no_seed() {
    let registry = Arc::new(default_registry().unwrap());
    let store = moment_fixture(&registry);
    let service = service_over(store, registry);

    let first = service
        .assemble(&request("moment", 42, None, 0), &mut StdRng::seed_from_u64(1))
        .await
        .unwrap();
    let cursor_token = first.next.clone().unwrap();
    let cursor = Cursor::decode(&cursor_token).unwrap();

    let second = service
        .assemble(
            &request("moment", 42, Some(cursor_token), 1),
            &mut StdRng::seed_from_u64(1),
        )
        .await
        .unwrap();

    // The only cross-page duplicate guard is the cursor ordering key; every
    // second-page item must lie strictly before it, and the seed is gone.
    assert!(!result_ids(&second).contains(&42), "seed only on the first page");
    for entry in &second.results {
        assert!(cursor.admits(entry.published_at, entry.id));
    }
}

#[tokio::test]
async fn exhausted_cursor_yields_the_empty_shape() {
    let registry = Arc::new(default_registry().unwrap());
    // Only the seed exists; with a cursor there is nothing left to emit.
    let store = Arc::new(
        MemoryStore::new(registry.clone())
            .with_records("moment", vec![moment(42, 10, ts(50), &["seed.jpg"])]),
    );
    let service = service_over(store, registry);

    let cursor = Cursor {
        published_at: ts(50),
        id: 42,
    };
    let resp = service
        .assemble(
            &request("moment", 42, Some(cursor.encode()), 1),
            &mut StdRng::seed_from_u64(1),
        )
        .await
        .unwrap();

    assert!(resp.next.is_none());
    assert!(resp.results.is_empty());
    assert!(!resp.limit_reached);
    assert_eq!(resp.subtype, Some(Subtype::Image));
    assert_eq!(resp.extension, Some(1));
    assert_eq!(resp.can_continue, Some(true));
}

#[tokio::test]
async fn malformed_cursor_degrades_to_a_fresh_first_page() {
    let registry = Arc::new(default_registry().unwrap());
    let store = moment_fixture(&registry);
    let service = service_over(store, registry);

    let resp = service
        .assemble(
            &request("moment", 42, Some("!!not-a-cursor!!".to_string()), 0),
            &mut StdRng::seed_from_u64(1),
        )
        .await
        .unwrap();

    assert_eq!(result_ids(&resp)[0], 42);
    assert_eq!(resp.results.len(), PAGE_SIZE);
}

#[tokio::test]
async fn moment_results_are_byte_identical_across_calls() {
    let registry = Arc::new(default_registry().unwrap());
    let store = moment_fixture(&registry);
    let service = service_over(store, registry);

    let a = service
        .assemble(&request("moment", 42, None, 0), &mut StdRng::seed_from_u64(1))
        .await
        .unwrap();
    let b = service
        .assemble(&request("moment", 42, None, 0), &mut StdRng::seed_from_u64(999))
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&a).unwrap(),
        serde_json::to_value(&b).unwrap()
    );
}

#[tokio::test]
async fn extension_cap_short_circuits_before_any_data_access() {
    let registry = Arc::new(default_registry().unwrap());
    let store = moment_fixture(&registry);
    let service = service_over(store.clone(), registry);

    // Even with a bogus kind and seed, the cap wins.
    let resp = service
        .assemble(
            &request("bogus", -1, Some("junk".to_string()), MAX_EXTENSIONS),
            &mut StdRng::seed_from_u64(1),
        )
        .await
        .unwrap();

    assert!(resp.limit_reached);
    assert!(resp.next.is_none());
    assert!(resp.results.is_empty());
    assert_eq!(resp.subtype, None);
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn unknown_kind_is_rejected_without_data_access() {
    let registry = Arc::new(default_registry().unwrap());
    let store = moment_fixture(&registry);
    let service = service_over(store.clone(), registry);

    let err = service
        .assemble(&request("bogus", 42, None, 0), &mut StdRng::seed_from_u64(1))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn missing_seed_is_not_found() {
    let registry = Arc::new(default_registry().unwrap());
    let store = moment_fixture(&registry);
    let service = service_over(store, registry);

    let err = service
        .assemble(&request("moment", 777, None, 0), &mut StdRng::seed_from_u64(1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn seed_without_media_has_no_resolvable_subtype() {
    let registry = Arc::new(default_registry().unwrap());
    let store = Arc::new(
        MemoryStore::new(registry.clone()).with_records("moment", vec![moment(9, 10, ts(10), &[])]),
    );
    let service = service_over(store, registry);

    let err = service
        .assemble(&request("moment", 9, None, 0), &mut StdRng::seed_from_u64(1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn starved_testimony_subtype_falls_back_to_other_subtypes() {
    let registry = Arc::new(default_registry().unwrap());
    let records = vec![
        testimony(100, 10, ts(50), Subtype::Written), // the seed; no other written rows
        testimony(101, 20, ts(40), Subtype::Audio),
        testimony(102, 21, ts(39), Subtype::Audio),
        testimony(103, 22, ts(38), Subtype::Audio),
        testimony(104, 23, ts(37), Subtype::Audio),
    ];
    let store = Arc::new(MemoryStore::new(registry.clone()).with_records("testimony", records));
    let service = service_over(store, registry);

    let resp = service
        .assemble(&request("testimony", 100, None, 0), &mut StdRng::seed_from_u64(5))
        .await
        .unwrap();

    // All four filler slots drawn from the audio pool, seed up front.
    assert_eq!(result_ids(&resp), vec![100, 101, 102, 103, 104]);
    assert_eq!(resp.subtype, Some(Subtype::Written));
}

#[tokio::test]
async fn broken_fallback_subtype_degrades_instead_of_failing() {
    let registry = Arc::new(default_registry().unwrap());
    let records = vec![
        testimony(100, 10, ts(50), Subtype::Written),
        testimony(105, 20, ts(40), Subtype::Video),
        testimony(106, 21, ts(39), Subtype::Video),
    ];
    let store = Arc::new(
        MemoryStore::new(registry.clone())
            .with_records("testimony", records)
            .failing_for(Subtype::Audio),
    );
    let service = service_over(store, registry);

    let resp = service
        .assemble(&request("testimony", 100, None, 0), &mut StdRng::seed_from_u64(5))
        .await
        .unwrap();

    // The audio window is down; video still fills what it can.
    assert_eq!(result_ids(&resp), vec![100, 105, 106]);
}

#[tokio::test]
async fn broken_seed_subtype_read_fails_the_call() {
    let registry = Arc::new(default_registry().unwrap());
    let store = Arc::new(
        MemoryStore::new(registry.clone())
            .with_records("testimony", vec![testimony(100, 10, ts(50), Subtype::Written)])
            .failing_for(Subtype::Written),
    );
    let service = service_over(store, registry);

    let err = service
        .assemble(&request("testimony", 100, None, 0), &mut StdRng::seed_from_u64(5))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DatabaseError(_)));
}

#[tokio::test]
async fn failed_payload_serialization_keeps_the_item() {
    let registry = Arc::new(default_registry().unwrap());
    let store = moment_fixture(&registry);
    let service = SquareService::new(registry, store, Arc::new(BrokenSerializer));

    let resp = service
        .assemble(&request("moment", 42, None, 0), &mut StdRng::seed_from_u64(1))
        .await
        .unwrap();

    assert_eq!(resp.results.len(), PAGE_SIZE);
    for entry in &resp.results {
        assert_eq!(entry.payload, serde_json::json!({}));
    }
}

#[actix_web::test]
async fn stream_endpoint_serves_a_page_over_http() {
    let registry = Arc::new(default_registry().unwrap());
    let store = moment_fixture(&registry);
    let serializer = Arc::new(RegistryPayloadSerializer::new(registry.clone()));
    let service = Arc::new(SquareService::new(registry, store, serializer));
    let state = web::Data::new(SquareHandlerState { service });

    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .service(web::scope("/api/v1/square").service(get_stream)),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/v1/square/stream?kind=moment&seed_id=42")
        .to_request();
    let resp: StreamResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp.results.len(), PAGE_SIZE);
    assert_eq!(resp.results[0].id, 42);

    let missing_kind = test::TestRequest::get()
        .uri("/api/v1/square/stream?seed_id=42")
        .to_request();
    let resp = test::call_service(&app, missing_kind).await;
    assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
}
