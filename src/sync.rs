//! Sync controller: progressive two-phase load into a [`DisplayState`].
//!
//! # Protocol
//!
//! [`SyncController::reload`] starts a new *generation* and spawns two
//! fetches against the [`RecordStore`]:
//!
//! 1. a bounded newest-first fetch (`initial_limit` records) that becomes
//!    the first superset, so the first page shows quickly;
//! 2. after `background_delay`, an unbounded fetch whose result replaces
//!    the superset wholesale. The two may overlap in flight.
//!
//! Fetch tasks never touch state. They send [`SyncEvent`]s over a channel
//! and the owner applies them with [`SyncController::handle_event`], so the
//! display state has exactly one writer.
//!
//! Events are dropped when they belong to an older generation, and a
//! bounded result that lands after the same generation's full result is
//! dropped too; the full set always wins.
//!
//! # Failures
//!
//! | Failure | Effect |
//! |---------|--------|
//! | `Unauthorized` from any call | session invalidated, controller halts |
//! | bounded fetch, other error | error notice, view left empty |
//! | unbounded fetch, other error | warning notice, partial data kept |
//!
//! There is no automatic retry; the next mutation's reload fetches again.
//!
//! Mutations validate locally, call the store, then `reload()`. There is
//! no optimistic local patching.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use stash_core::fuzzy::FuzzyOptions;
use stash_core::models::{BookmarkDraft, BookmarkRecord};
use stash_core::pagination::{Reveal, RevealConfig};
use stash_core::store::{RecordStore, StoreError, StoreResult};
use stash_core::view::DisplayState;

use crate::config::Config;
use crate::debounce::Debouncer;
use crate::progress::{LoadProgressEvent, LoadProgressReporter, NoProgress};
use crate::session::Session;

/// Where the controller is in the load protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    InitialLoading,
    /// First page visible; full fetch not yet issued.
    InitialLoaded,
    /// First page visible; full fetch in flight.
    BackgroundLoading,
    FullyLoaded,
    /// The bounded fetch failed and nothing is loaded.
    Failed,
    /// The session was rejected. Nothing runs until a new session exists.
    Halted,
}

/// A user-visible message produced by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The view is empty because loading failed.
    Error(String),
    /// Data on screen may be incomplete.
    Warning(String),
    SessionExpired,
}

/// Messages from fetch and debounce tasks to the controller.
#[derive(Debug)]
pub enum SyncEvent {
    InitialLoaded {
        generation: u64,
        result: StoreResult<Vec<BookmarkRecord>>,
    },
    BackgroundStarted {
        generation: u64,
    },
    FullLoaded {
        generation: u64,
        result: StoreResult<Vec<BookmarkRecord>>,
    },
    QueryDebounced {
        ticket: u64,
        query: String,
    },
}

/// Timing and sizing knobs.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub initial_limit: usize,
    pub background_delay: Duration,
    pub debounce: Duration,
    pub reveal: RevealConfig,
    pub fuzzy: FuzzyOptions,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            initial_limit: 20,
            background_delay: Duration::from_millis(100),
            debounce: Duration::from_millis(300),
            reveal: RevealConfig::default(),
            fuzzy: FuzzyOptions::default(),
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            initial_limit: config.sync.initial_limit,
            background_delay: config.sync.background_delay(),
            debounce: config.sync.debounce(),
            reveal: config.sync.reveal(),
            fuzzy: config.search.fuzzy_options(),
        }
    }
}

pub struct SyncController {
    store: Arc<dyn RecordStore>,
    session: Arc<dyn Session>,
    options: SyncOptions,
    progress: Box<dyn LoadProgressReporter>,
    state: DisplayState,
    phase: SyncPhase,
    notice: Option<Notice>,
    generation: u64,
    initial_pending: bool,
    full_pending: bool,
    background_started: bool,
    full_applied: bool,
    fetches: Vec<JoinHandle<()>>,
    debouncer: Debouncer,
    tx: UnboundedSender<SyncEvent>,
    rx: UnboundedReceiver<SyncEvent>,
}

impl SyncController {
    pub fn new(
        store: Arc<dyn RecordStore>,
        session: Arc<dyn Session>,
        options: SyncOptions,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            store,
            session,
            state: DisplayState::new(options.fuzzy.clone(), options.reveal),
            debouncer: Debouncer::new(options.debounce),
            options,
            progress: Box::new(NoProgress),
            phase: SyncPhase::Idle,
            notice: None,
            generation: 0,
            initial_pending: false,
            full_pending: false,
            background_started: false,
            full_applied: false,
            fetches: Vec::new(),
            tx,
            rx,
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn LoadProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> &DisplayState {
        &self.state
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True while either fetch of the current generation is outstanding.
    pub fn is_loading(&self) -> bool {
        self.initial_pending || self.full_pending
    }

    /// Starts (or restarts) the two-phase load.
    ///
    /// Does nothing but halt when there is no valid session.
    pub fn reload(&mut self) {
        self.abort_fetches();
        self.generation += 1;
        self.notice = None;
        self.full_applied = false;
        self.background_started = false;

        if !self.session.is_valid() {
            tracing::debug!("reload without a session");
            self.halt();
            return;
        }

        let generation = self.generation;
        let limit = self.options.initial_limit;
        self.phase = SyncPhase::InitialLoading;
        self.initial_pending = true;
        self.full_pending = true;
        tracing::debug!(generation, limit, "load started");
        self.progress
            .report(LoadProgressEvent::InitialLoading { limit });

        let store = self.store.clone();
        let tx = self.tx.clone();
        self.fetches.push(tokio::spawn(async move {
            let result = store.list_newest_first(Some(limit)).await;
            let _ = tx.send(SyncEvent::InitialLoaded { generation, result });
        }));

        let store = self.store.clone();
        let tx = self.tx.clone();
        let delay = self.options.background_delay;
        self.fetches.push(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SyncEvent::BackgroundStarted { generation });
            let result = store.list_all().await;
            let _ = tx.send(SyncEvent::FullLoaded { generation, result });
        }));
    }

    /// Applies one event. Returns false when the event was stale and dropped.
    pub fn handle_event(&mut self, event: SyncEvent) -> bool {
        match event {
            SyncEvent::InitialLoaded { generation, result } => {
                if !self.is_current(generation) {
                    return false;
                }
                self.initial_pending = false;
                if self.full_applied {
                    tracing::debug!(generation, "bounded result arrived after full set, dropped");
                    return false;
                }
                match result {
                    Ok(records) => {
                        let n = records.len();
                        self.state.replace_superset(records);
                        self.phase = if self.background_started && self.full_pending {
                            SyncPhase::BackgroundLoading
                        } else {
                            SyncPhase::InitialLoaded
                        };
                        tracing::debug!(generation, n, "first page loaded");
                        self.progress.report(LoadProgressEvent::InitialLoaded { n });
                    }
                    Err(err) => self.initial_failed(err),
                }
                true
            }
            SyncEvent::BackgroundStarted { generation } => {
                if !self.is_current(generation) {
                    return false;
                }
                self.background_started = true;
                if self.phase == SyncPhase::InitialLoaded {
                    self.phase = SyncPhase::BackgroundLoading;
                }
                self.progress.report(LoadProgressEvent::BackgroundLoading);
                true
            }
            SyncEvent::FullLoaded { generation, result } => {
                if !self.is_current(generation) {
                    return false;
                }
                self.full_pending = false;
                match result {
                    Ok(records) => {
                        let total = records.len();
                        self.state.replace_superset(records);
                        self.full_applied = true;
                        self.phase = SyncPhase::FullyLoaded;
                        if matches!(self.notice, Some(Notice::Error(_))) {
                            self.notice = None;
                        }
                        tracing::debug!(generation, total, "full set loaded");
                        self.progress
                            .report(LoadProgressEvent::FullyLoaded { total });
                    }
                    Err(err) => self.background_failed(err),
                }
                true
            }
            SyncEvent::QueryDebounced { ticket, query } => {
                if !self.debouncer.complete(ticket) {
                    return false;
                }
                self.state.set_query(query);
                true
            }
        }
    }

    /// Waits for the next event and applies it.
    ///
    /// Returns false if the event was stale. The controller holds a sender,
    /// so the channel never closes.
    pub async fn process_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(event) => self.handle_event(event),
            None => false,
        }
    }

    /// Processes events until both fetches of the current generation have
    /// resolved (or the controller halted).
    pub async fn run_until_settled(&mut self) {
        while self.is_loading() {
            self.process_next().await;
        }
    }

    /// Processes events until no debounced query is pending.
    pub async fn settle_query(&mut self) {
        while self.debouncer.is_pending() {
            self.process_next().await;
        }
    }

    /// Schedules `query` to apply after the debounce delay; any query
    /// scheduled earlier and not yet applied is discarded.
    pub fn search(&mut self, query: impl Into<String>) {
        let query = query.into();
        self.debouncer
            .schedule(self.tx.clone(), move |ticket| SyncEvent::QueryDebounced {
                ticket,
                query,
            });
    }

    /// Applies `query` immediately, cancelling any pending debounced one.
    pub fn search_now(&mut self, query: impl Into<String>) {
        self.debouncer.cancel();
        self.state.set_query(query);
    }

    pub fn set_notes_only(&mut self, notes_only: bool) {
        self.state.set_notes_only(notes_only);
    }

    pub fn reveal_more(&mut self, now: Instant) -> Reveal {
        self.state.reveal_more(now)
    }

    pub async fn add(&mut self, draft: BookmarkDraft) -> StoreResult<BookmarkRecord> {
        let draft = draft.normalized();
        draft.validate()?;
        let result = self.store.insert(&draft).await;
        let record = self.checked(result)?;
        self.reload();
        Ok(record)
    }

    pub async fn update(&mut self, id: i64, draft: BookmarkDraft) -> StoreResult<BookmarkRecord> {
        let draft = draft.normalized();
        draft.validate()?;
        let result = self.store.update(id, &draft).await;
        let record = self.checked(result)?;
        self.reload();
        Ok(record)
    }

    /// Deletes `id`. A missing record is reported as `NotFound`.
    pub async fn delete(&mut self, id: i64) -> StoreResult<()> {
        let result = self.store.delete(id).await;
        if !self.checked(result)? {
            return Err(StoreError::NotFound(id));
        }
        self.reload();
        Ok(())
    }

    fn is_current(&self, generation: u64) -> bool {
        if generation != self.generation || self.phase == SyncPhase::Halted {
            tracing::debug!(
                generation,
                current = self.generation,
                "stale sync event dropped"
            );
            return false;
        }
        true
    }

    /// Halts on `Unauthorized`, passes everything through.
    fn checked<T>(&mut self, result: StoreResult<T>) -> StoreResult<T> {
        if let Err(err) = &result {
            if err.is_unauthorized() {
                self.unauthorized(err);
            }
        }
        result
    }

    fn unauthorized(&mut self, err: &StoreError) {
        tracing::warn!(error = %err, "session rejected, logging out");
        self.session.invalidate();
        self.halt();
    }

    fn halt(&mut self) {
        self.abort_fetches();
        self.debouncer.cancel();
        self.generation += 1;
        self.initial_pending = false;
        self.full_pending = false;
        self.state.clear();
        self.phase = SyncPhase::Halted;
        self.notice = Some(Notice::SessionExpired);
    }

    fn initial_failed(&mut self, err: StoreError) {
        if err.is_unauthorized() {
            self.unauthorized(&err);
            return;
        }
        tracing::warn!(error = %err, "first page failed");
        self.progress.report(LoadProgressEvent::Failed {
            phase: "initial",
            message: err.to_string(),
        });
        self.state.clear();
        self.phase = SyncPhase::Failed;
        self.notice = Some(Notice::Error(err.to_string()));
    }

    fn background_failed(&mut self, err: StoreError) {
        if err.is_unauthorized() {
            self.unauthorized(&err);
            return;
        }
        tracing::warn!(error = %err, "full load failed, keeping partial data");
        self.progress.report(LoadProgressEvent::Failed {
            phase: "background",
            message: err.to_string(),
        });
        self.phase = if self.initial_pending {
            SyncPhase::InitialLoading
        } else if self.phase == SyncPhase::Failed {
            SyncPhase::Failed
        } else {
            SyncPhase::InitialLoaded
        };
        if self.notice.is_none() {
            self.notice = Some(Notice::Warning(format!(
                "showing partial results: {}",
                err
            )));
        }
    }

    fn abort_fetches(&mut self) {
        for handle in self.fetches.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.abort_fetches();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StaticSession;
    use stash_core::store::memory::InMemoryStore;

    fn options() -> SyncOptions {
        SyncOptions {
            background_delay: Duration::from_millis(5),
            debounce: Duration::from_millis(10),
            ..SyncOptions::default()
        }
    }

    async fn seeded(n: usize) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for i in 0..n {
            store
                .insert(&BookmarkDraft::new(
                    Some(format!("https://site{}.dev/{}", i % 4, i).as_str()),
                    "",
                    "",
                ))
                .await
                .unwrap();
        }
        store
    }

    fn record(id: i64) -> BookmarkRecord {
        BookmarkRecord {
            id,
            url: None,
            title: format!("note {}", id),
            notes: "n".into(),
            tags: String::new(),
            domain: "Notes".into(),
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn two_phase_load_reaches_fully_loaded() {
        let store = seeded(45).await;
        let mut sync = SyncController::new(store, Arc::new(StaticSession::new("t")), options());
        assert_eq!(sync.phase(), SyncPhase::Idle);

        sync.reload();
        assert_eq!(sync.phase(), SyncPhase::InitialLoading);
        sync.run_until_settled().await;

        assert_eq!(sync.phase(), SyncPhase::FullyLoaded);
        assert_eq!(sync.state().superset().len(), 45);
        assert_eq!(sync.state().visible_count(), 20);
        assert!(sync.notice().is_none());
    }

    #[tokio::test]
    async fn stale_generation_events_are_dropped() {
        let store = seeded(3).await;
        let mut sync = SyncController::new(store, Arc::new(StaticSession::new("t")), options());
        sync.reload();
        let old = sync.generation();
        sync.reload();

        assert!(!sync.handle_event(SyncEvent::FullLoaded {
            generation: old,
            result: Ok(vec![record(99)]),
        }));
        sync.run_until_settled().await;
        assert!(sync.state().superset().iter().all(|r| r.id != 99));
    }

    #[tokio::test]
    async fn bounded_result_after_full_is_dropped() {
        let store = seeded(0).await;
        let mut sync = SyncController::new(store, Arc::new(StaticSession::new("t")), options());
        sync.reload();
        let generation = sync.generation();

        assert!(sync.handle_event(SyncEvent::FullLoaded {
            generation,
            result: Ok(vec![record(3), record(2), record(1)]),
        }));
        assert!(!sync.handle_event(SyncEvent::InitialLoaded {
            generation,
            result: Ok(vec![record(3)]),
        }));
        assert_eq!(sync.state().superset().len(), 3);
        assert_eq!(sync.phase(), SyncPhase::FullyLoaded);
    }

    #[tokio::test]
    async fn background_failure_keeps_partial_data() {
        let store = seeded(0).await;
        let mut sync = SyncController::new(store, Arc::new(StaticSession::new("t")), options());
        sync.reload();
        let generation = sync.generation();

        sync.handle_event(SyncEvent::InitialLoaded {
            generation,
            result: Ok(vec![record(2), record(1)]),
        });
        sync.handle_event(SyncEvent::FullLoaded {
            generation,
            result: Err(StoreError::Transient("connection reset".into())),
        });

        assert_eq!(sync.state().superset().len(), 2);
        assert_eq!(sync.phase(), SyncPhase::InitialLoaded);
        assert!(matches!(sync.notice(), Some(Notice::Warning(_))));
    }

    #[tokio::test]
    async fn full_failure_before_first_page_settles_initial_loaded() {
        let store = seeded(0).await;
        let mut sync = SyncController::new(store, Arc::new(StaticSession::new("t")), options());
        sync.reload();
        let generation = sync.generation();

        sync.handle_event(SyncEvent::BackgroundStarted { generation });
        sync.handle_event(SyncEvent::FullLoaded {
            generation,
            result: Err(StoreError::Transient("502 Bad Gateway".into())),
        });
        assert_eq!(sync.phase(), SyncPhase::InitialLoading);
        assert!(sync.is_loading());

        assert!(sync.handle_event(SyncEvent::InitialLoaded {
            generation,
            result: Ok(vec![record(2), record(1)]),
        }));
        assert_eq!(sync.phase(), SyncPhase::InitialLoaded);
        assert!(!sync.is_loading());
        assert_eq!(sync.state().superset().len(), 2);
        assert!(matches!(sync.notice(), Some(Notice::Warning(_))));
    }

    #[tokio::test]
    async fn initial_failure_leaves_view_empty() {
        let store = seeded(0).await;
        let mut sync = SyncController::new(store, Arc::new(StaticSession::new("t")), options());
        sync.reload();
        let generation = sync.generation();

        sync.handle_event(SyncEvent::InitialLoaded {
            generation,
            result: Err(StoreError::Transient("timeout".into())),
        });
        assert_eq!(sync.phase(), SyncPhase::Failed);
        assert!(sync.state().superset().is_empty());
        assert!(matches!(sync.notice(), Some(Notice::Error(_))));
    }

    #[tokio::test]
    async fn unauthorized_invalidates_session_and_halts() {
        let store = seeded(0).await;
        let session = Arc::new(StaticSession::new("t"));
        let mut sync = SyncController::new(store, session.clone(), options());
        sync.reload();
        let generation = sync.generation();

        sync.handle_event(SyncEvent::InitialLoaded {
            generation,
            result: Err(StoreError::Unauthorized("Invalid token".into())),
        });
        assert_eq!(sync.phase(), SyncPhase::Halted);
        assert_eq!(sync.notice(), Some(&Notice::SessionExpired));
        assert!(!session.is_valid());
        assert!(!sync.is_loading());

        // A later event from the halted generation is ignored.
        assert!(!sync.handle_event(SyncEvent::FullLoaded {
            generation,
            result: Ok(vec![record(1)]),
        }));
    }

    #[tokio::test]
    async fn reload_without_session_halts() {
        let store = seeded(2).await;
        let session = Arc::new(StaticSession::new("t"));
        session.invalidate();
        let mut sync = SyncController::new(store, session, options());
        sync.reload();
        assert_eq!(sync.phase(), SyncPhase::Halted);
        sync.run_until_settled().await;
    }

    #[tokio::test]
    async fn debounced_search_applies_only_last_query() {
        let store = seeded(0).await;
        store
            .insert(&BookmarkDraft::new(None, "kubernetes cheat sheet", ""))
            .await
            .unwrap();
        store
            .insert(&BookmarkDraft::new(None, "groceries", ""))
            .await
            .unwrap();
        let mut sync = SyncController::new(store, Arc::new(StaticSession::new("t")), options());
        sync.reload();
        sync.run_until_settled().await;

        sync.search("gro");
        sync.search("kube");
        assert_eq!(sync.state().query(), "");
        sync.settle_query().await;
        assert_eq!(sync.state().query(), "kube");
        assert_eq!(sync.state().filtered().len(), 1);
    }

    #[tokio::test]
    async fn validation_rejects_before_store() {
        let store = seeded(0).await;
        let mut sync = SyncController::new(store.clone(), Arc::new(StaticSession::new("t")), options());
        let err = sync
            .add(BookmarkDraft::new(Some("  "), " ", "tag"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.is_empty());
        assert_eq!(sync.phase(), SyncPhase::Idle);
    }

    #[tokio::test]
    async fn mutation_reloads_and_reruns_active_search() {
        let store = seeded(5).await;
        let mut sync = SyncController::new(store, Arc::new(StaticSession::new("t")), options());
        sync.reload();
        sync.run_until_settled().await;
        sync.search_now("foo");
        assert!(sync.state().filtered().is_empty());

        let before = sync.generation();
        sync.add(BookmarkDraft::new(None, "foo fighters setlist", ""))
            .await
            .unwrap();
        assert!(sync.generation() > before);
        sync.run_until_settled().await;

        assert_eq!(sync.state().query(), "foo");
        assert_eq!(sync.state().superset().len(), 6);
        assert_eq!(sync.state().filtered().len(), 1);
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let store = seeded(1).await;
        let mut sync = SyncController::new(store, Arc::new(StaticSession::new("t")), options());
        assert_eq!(sync.delete(42).await.unwrap_err(), StoreError::NotFound(42));
        sync.delete(1).await.unwrap();
        sync.run_until_settled().await;
        assert!(sync.state().superset().is_empty());
    }
}
