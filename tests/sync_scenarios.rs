//! Sync controller scenarios against stores with scripted timing and
//! failures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use stash_core::models::{BookmarkDraft, BookmarkRecord};
use stash_core::pagination::{Reveal, RevealConfig};
use stash_core::store::memory::InMemoryStore;
use stash_core::store::{RecordStore, StoreError, StoreResult};
use stash::session::{Session, StaticSession};
use stash::sync::{Notice, SyncController, SyncOptions, SyncPhase};

fn record(id: i64, notes: &str) -> BookmarkRecord {
    BookmarkRecord {
        id,
        url: Some(format!("https://host{}.dev/{}", id % 3, id)),
        title: format!("page {}", id),
        notes: notes.to_string(),
        tags: String::new(),
        domain: format!("host{}.dev", id % 3),
        created_at: Utc.timestamp_opt(1_700_000_000 + id, 0).unwrap(),
    }
}

/// Newest first, like every store returns them.
fn records(n: i64) -> Vec<BookmarkRecord> {
    (1..=n).rev().map(|id| record(id, "")).collect()
}

/// A listing store whose bounded and unbounded responses are fixed up
/// front, each after its own delay.
struct ScriptedStore {
    bounded: (Duration, StoreResult<Vec<BookmarkRecord>>),
    full: (Duration, StoreResult<Vec<BookmarkRecord>>),
    calls: AtomicUsize,
    inserted: Mutex<Vec<BookmarkDraft>>,
}

impl ScriptedStore {
    fn new(
        bounded: (Duration, StoreResult<Vec<BookmarkRecord>>),
        full: (Duration, StoreResult<Vec<BookmarkRecord>>),
    ) -> Self {
        Self {
            bounded,
            full,
            calls: AtomicUsize::new(0),
            inserted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RecordStore for ScriptedStore {
    async fn insert(&self, draft: &BookmarkDraft) -> StoreResult<BookmarkRecord> {
        self.inserted.lock().unwrap().push(draft.clone());
        Err(StoreError::Transient("read-only script".into()))
    }

    async fn update(&self, id: i64, _draft: &BookmarkDraft) -> StoreResult<BookmarkRecord> {
        Err(StoreError::NotFound(id))
    }

    async fn delete(&self, _id: i64) -> StoreResult<bool> {
        Ok(false)
    }

    async fn list_newest_first(&self, limit: Option<usize>) -> StoreResult<Vec<BookmarkRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (delay, result) = match limit {
            Some(_) => &self.bounded,
            None => &self.full,
        };
        tokio::time::sleep(*delay).await;
        result.clone()
    }

    async fn search_substring(&self, _term: &str) -> StoreResult<Vec<BookmarkRecord>> {
        Ok(Vec::new())
    }
}

fn options() -> SyncOptions {
    SyncOptions {
        initial_limit: 20,
        background_delay: Duration::from_millis(5),
        debounce: Duration::from_millis(15),
        reveal: RevealConfig {
            page_size: 20,
            step: 10,
            cooldown: Duration::from_millis(150),
        },
        ..SyncOptions::default()
    }
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[tokio::test]
async fn slow_bounded_response_never_overwrites_full_set() {
    let all = records(50);
    let store = Arc::new(ScriptedStore::new(
        (ms(200), Ok(all[..20].to_vec())),
        (ms(0), Ok(all.clone())),
    ));
    let mut sync = SyncController::new(store, Arc::new(StaticSession::new("t")), options());
    sync.reload();
    sync.run_until_settled().await;

    assert_eq!(sync.phase(), SyncPhase::FullyLoaded);
    assert_eq!(sync.state().superset().len(), 50);
    assert_eq!(sync.state().superset(), all.as_slice());
}

#[tokio::test]
async fn progressive_load_shows_first_page_before_full_set() {
    let all = records(50);
    let store = Arc::new(ScriptedStore::new(
        (ms(0), Ok(all[..20].to_vec())),
        (ms(80), Ok(all.clone())),
    ));
    let mut sync = SyncController::new(store, Arc::new(StaticSession::new("t")), options());
    sync.reload();

    // The first page arrives on its own.
    while sync.state().superset().is_empty() {
        sync.process_next().await;
    }
    assert_eq!(sync.state().superset().len(), 20);
    assert!(matches!(
        sync.phase(),
        SyncPhase::InitialLoaded | SyncPhase::BackgroundLoading
    ));
    assert!(sync.is_loading());

    sync.run_until_settled().await;
    assert_eq!(sync.state().superset().len(), 50);
    assert_eq!(sync.state().visible_count(), 20);
}

#[tokio::test]
async fn background_failure_keeps_first_page() {
    let all = records(30);
    let store = Arc::new(ScriptedStore::new(
        (ms(0), Ok(all[..20].to_vec())),
        (ms(20), Err(StoreError::Transient("502 Bad Gateway".into()))),
    ));
    let session = Arc::new(StaticSession::new("t"));
    let mut sync = SyncController::new(store, session.clone(), options());
    sync.reload();
    sync.run_until_settled().await;

    assert_eq!(sync.state().superset().len(), 20);
    assert_eq!(sync.phase(), SyncPhase::InitialLoaded);
    assert!(matches!(sync.notice(), Some(Notice::Warning(_))));
    assert!(session.is_valid());
}

#[tokio::test]
async fn full_failure_before_slow_first_page_ends_settled() {
    let all = records(30);
    let store = Arc::new(ScriptedStore::new(
        (ms(80), Ok(all[..20].to_vec())),
        (ms(0), Err(StoreError::Transient("connection reset".into()))),
    ));
    let mut sync = SyncController::new(store, Arc::new(StaticSession::new("t")), options());
    sync.reload();
    sync.run_until_settled().await;

    assert_eq!(sync.phase(), SyncPhase::InitialLoaded);
    assert!(!sync.is_loading());
    assert_eq!(sync.state().superset().len(), 20);
    assert!(matches!(sync.notice(), Some(Notice::Warning(_))));
}

#[tokio::test]
async fn initial_failure_then_full_success_recovers() {
    let all = records(3);
    let store = Arc::new(ScriptedStore::new(
        (ms(0), Err(StoreError::Transient("timeout".into()))),
        (ms(30), Ok(all.clone())),
    ));
    let mut sync = SyncController::new(store, Arc::new(StaticSession::new("t")), options());
    sync.reload();
    sync.run_until_settled().await;

    assert_eq!(sync.phase(), SyncPhase::FullyLoaded);
    assert_eq!(sync.state().superset().len(), 3);
    assert!(sync.notice().is_none());
}

#[tokio::test]
async fn unauthorized_on_full_fetch_clears_state() {
    let all = records(5);
    let store = Arc::new(ScriptedStore::new(
        (ms(0), Ok(all.clone())),
        (ms(20), Err(StoreError::Unauthorized("Invalid token".into()))),
    ));
    let session = Arc::new(StaticSession::new("t"));
    let mut sync = SyncController::new(store.clone(), session.clone(), options());
    sync.reload();
    sync.run_until_settled().await;

    assert_eq!(sync.phase(), SyncPhase::Halted);
    assert!(sync.state().superset().is_empty());
    assert!(!session.is_valid());

    // Halted: a further reload issues no fetches.
    let calls = store.calls.load(Ordering::SeqCst);
    sync.reload();
    sync.run_until_settled().await;
    tokio::time::sleep(ms(30)).await;
    assert_eq!(store.calls.load(Ordering::SeqCst), calls);
}

#[tokio::test]
async fn reload_supersedes_in_flight_generation() {
    let store = Arc::new(InMemoryStore::with_records(records(4)));
    let mut sync = SyncController::new(store.clone(), Arc::new(StaticSession::new("t")), options());
    sync.reload();
    let first = sync.generation();

    store
        .insert(&BookmarkDraft::new(None, "late addition", ""))
        .await
        .unwrap();
    sync.reload();
    assert!(sync.generation() > first);
    sync.run_until_settled().await;

    assert_eq!(sync.state().superset().len(), 5);
    assert_eq!(sync.state().superset()[0].notes, "late addition");
}

#[tokio::test]
async fn search_shows_all_matches_and_disables_reveal() {
    let mut seeded = records(60);
    seeded[10].notes = "rust async runtime".into();
    seeded[45].notes = "rust borrow checker".into();
    let store = Arc::new(InMemoryStore::with_records(seeded));
    let mut sync = SyncController::new(store, Arc::new(StaticSession::new("t")), options());
    sync.reload();
    sync.run_until_settled().await;

    let now = Instant::now();
    assert_eq!(sync.reveal_more(now), Reveal::Grew(30));
    assert_eq!(sync.reveal_more(now + ms(10)), Reveal::CoolingDown);
    assert_eq!(sync.reveal_more(now + ms(200)), Reveal::Grew(40));

    sync.search_now("rust");
    assert_eq!(sync.state().visible().len(), 2);
    assert_eq!(sync.reveal_more(now + ms(400)), Reveal::Searching);

    // Clearing the query resets to the first page.
    sync.search_now("");
    assert_eq!(sync.state().visible_count(), 20);
}

#[tokio::test]
async fn notes_only_combines_with_query() {
    let store = Arc::new(InMemoryStore::new());
    store
        .insert(&BookmarkDraft::new(Some("https://recipes.dev/pasta"), "pasta night", ""))
        .await
        .unwrap();
    store
        .insert(&BookmarkDraft::new(None, "pasta shopping list", ""))
        .await
        .unwrap();
    store
        .insert(&BookmarkDraft::new(None, "dentist tuesday", ""))
        .await
        .unwrap();
    let mut sync = SyncController::new(store, Arc::new(StaticSession::new("t")), options());
    sync.reload();
    sync.run_until_settled().await;

    sync.set_notes_only(true);
    assert_eq!(sync.state().filtered().len(), 2);
    sync.search_now("pasta");
    assert_eq!(sync.state().filtered().len(), 1);
    assert_eq!(sync.state().filtered()[0].notes, "pasta shopping list");
}

#[tokio::test]
async fn debounce_applies_last_keystroke_only() {
    let store = Arc::new(InMemoryStore::with_records(vec![
        record(2, "docker compose"),
        record(1, "kubernetes"),
    ]));
    let mut sync = SyncController::new(store, Arc::new(StaticSession::new("t")), options());
    sync.reload();
    sync.run_until_settled().await;

    for partial in ["d", "do", "doc", "dock"] {
        sync.search(partial);
    }
    sync.settle_query().await;
    assert_eq!(sync.state().query(), "dock");
    assert_eq!(sync.state().filtered().len(), 1);
    assert_eq!(sync.state().filtered()[0].id, 2);
}

#[tokio::test]
async fn failed_mutation_does_not_reload() {
    let store = Arc::new(ScriptedStore::new((ms(0), Ok(Vec::new())), (ms(0), Ok(Vec::new()))));
    let mut sync = SyncController::new(store.clone(), Arc::new(StaticSession::new("t")), options());
    let err = sync
        .add(BookmarkDraft::new(None, "hello", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Transient(_)));
    assert_eq!(sync.generation(), 0);
    assert_eq!(store.inserted.lock().unwrap().len(), 1);
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}
