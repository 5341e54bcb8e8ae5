//! Debounced, single-flight sync scheduling.
//!
//! Requests that pass the gate restart a trailing debounce window. When
//! the window elapses a cycle is queued on a single run slot. Queuing bumps
//! a generation counter, so a queued cycle that has not started yet is
//! dropped as soon as a newer one is queued. A running cycle is never
//! interrupted.

use crate::action::Action;
use crate::dispatcher::{Listener, StoreId};
use crate::error::{SyncError, SyncResult};
use crate::state::{SyncCycleResult, SyncEngine};
use crate::transport::SyncTransport;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// What observers are told about a sync cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncNotice {
    /// A cycle is about to run.
    Starting,
    /// A cycle finished successfully.
    Completed,
    /// A cycle failed with the given message.
    Failed(String),
}

/// Receives sync lifecycle notifications.
pub trait SyncObserver: Send + Sync {
    /// Called before and after every executed cycle.
    fn on_sync(&self, notice: &SyncNotice);
}

impl<F> SyncObserver for F
where
    F: Fn(&SyncNotice) + Send + Sync,
{
    fn on_sync(&self, notice: &SyncNotice) {
        self(notice)
    }
}

struct Inner<T: SyncTransport> {
    engine: Arc<SyncEngine<T>>,
    observers: RwLock<Vec<Arc<dyn SyncObserver>>>,
    debounce: Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
    slot: tokio::sync::Mutex<()>,
}

impl<T: SyncTransport + 'static> Inner<T> {
    fn notify(&self, notice: SyncNotice) {
        let observers = self.observers.read().clone();
        for observer in observers {
            observer.on_sync(&notice);
        }
    }

    fn bump(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn run_cycle(&self) -> SyncResult<SyncCycleResult> {
        self.notify(SyncNotice::Starting);
        let result = self.engine.sync().await;
        self.engine
            .dispatcher()
            .dispatch(Action::UpdateLastSyncCall(crate::now_millis()));
        match &result {
            Ok(_) => self.notify(SyncNotice::Completed),
            Err(e) => self.notify(SyncNotice::Failed(e.to_string())),
        }
        result
    }

    async fn run_queued(self: Arc<Self>, generation: u64) {
        let _slot = self.slot.lock().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "queued sync superseded");
            return;
        }
        // Failures are reported to observers and recorded in engine stats.
        let _ = self.run_cycle().await;
    }
}

/// Schedules sync cycles for one engine.
///
/// Cloning yields another handle to the same scheduler. Must be used from
/// within a tokio runtime.
pub struct SyncScheduler<T: SyncTransport + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: SyncTransport + 'static> Clone for SyncScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: SyncTransport + 'static> SyncScheduler<T> {
    /// Creates a scheduler driving `engine`.
    pub fn new(engine: Arc<SyncEngine<T>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                observers: RwLock::new(Vec::new()),
                debounce: Mutex::new(None),
                generation: AtomicU64::new(0),
                slot: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Returns the engine.
    pub fn engine(&self) -> &Arc<SyncEngine<T>> {
        &self.inner.engine
    }

    /// Registers an observer.
    pub fn subscribe(&self, observer: impl SyncObserver + 'static) {
        self.inner.observers.write().push(Arc::new(observer));
    }

    /// Requests a debounced sync after every local mutation dispatched on
    /// the engine's bus.
    ///
    /// Must be called from within a tokio runtime; requests are spawned on
    /// it. The listener does not keep the scheduler alive.
    pub fn sync_on_local_changes(&self) {
        let inner = Arc::downgrade(&self.inner);
        let runtime = tokio::runtime::Handle::current();
        let listener: Listener = Arc::new(move |action: &Action, _changed: &[StoreId]| {
            if !action.is_local_mutation() {
                return;
            }
            if let Some(inner) = inner.upgrade() {
                let _entered = runtime.enter();
                SyncScheduler { inner }.request_sync(false, None);
            }
        });
        self.inner.engine.dispatcher().subscribe(listener);
    }

    /// Requests a sync cycle.
    ///
    /// Requires push enabled and both endpoints configured. `renewal_only`
    /// further requires a prior successful sync, and `throttle` requires the
    /// last attempt to be older than the window. A rejected request cancels
    /// any pending debounced request. Returns whether a cycle was scheduled.
    pub fn request_sync(&self, renewal_only: bool, throttle: Option<Duration>) -> bool {
        let engine = &self.inner.engine;
        let app = engine.dispatcher().app();
        let mut allowed = engine.config().has_endpoints() && app.can_push_changes();
        if renewal_only {
            allowed = allowed && app.cursor() > 1;
        }
        if let Some(window) = throttle {
            let elapsed = crate::now_millis().saturating_sub(app.last_sync_call);
            let window = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
            allowed = allowed && elapsed > window;
        }

        let mut pending = self.inner.debounce.lock();
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        if !allowed {
            debug!(renewal_only, "sync request rejected");
            return false;
        }

        let inner = self.inner.clone();
        let delay = engine.config().debounce;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let generation = inner.bump();
            tokio::spawn(inner.run_queued(generation));
        }));
        true
    }

    /// Cancels the debounce timer and any queued, not yet started cycle.
    pub fn cancel_pending(&self) {
        if let Some(handle) = self.inner.debounce.lock().take() {
            handle.abort();
        }
        self.inner.bump();
    }

    /// Runs a cycle now, after any cycle already running.
    ///
    /// Supersedes queued cycles. Fails with [`SyncError::NotConfigured`]
    /// when endpoints are missing.
    pub async fn sync_now(&self) -> SyncResult<SyncCycleResult> {
        if !self.inner.engine.config().has_endpoints() {
            return Err(SyncError::NotConfigured);
        }
        self.cancel_pending();
        let _slot = self.inner.slot.lock().await;
        self.inner.run_cycle().await
    }
}

impl<T: SyncTransport + 'static> std::fmt::Debug for SyncScheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("generation", &self.inner.generation.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::dispatcher::Dispatcher;
    use crate::persist::MemoryStore;
    use crate::state::SyncState;
    use crate::transport::{MockTransport, PushOutcome};
    use tagsync_protocol::{PushBody, SyncResponse, UserResponse};

    fn scheduler(config: SyncConfig) -> SyncScheduler<MockTransport> {
        let dispatcher = Arc::new(Dispatcher::open(Arc::new(MemoryStore::new())).unwrap());
        SyncScheduler::new(Arc::new(SyncEngine::new(
            config,
            MockTransport::new(),
            dispatcher,
        )))
    }

    fn configured() -> SyncConfig {
        SyncConfig::new("http://sync", "http://user")
    }

    fn pulls(scheduler: &SyncScheduler<MockTransport>) -> usize {
        scheduler.engine().transport().pull_count()
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_coalesce_into_one_cycle() {
        let scheduler = scheduler(configured());
        for _ in 0..5 {
            assert!(scheduler.request_sync(false, None));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(pulls(&scheduler), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(pulls(&scheduler), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn local_mutations_trigger_debounced_sync() {
        let scheduler = scheduler(configured());
        scheduler.sync_on_local_changes();
        let bus = scheduler.engine().dispatcher().clone();

        bus.dispatch(Action::add_address_tag("a", "t"));
        bus.dispatch(Action::add_address_tag("a", "u"));
        bus.dispatch(Action::UpdateLastSyncCall(5));
        assert_eq!(pulls(&scheduler), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(pulls(&scheduler), 1);

        bus.dispatch(Action::UpdateLastSyncCall(6));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(pulls(&scheduler), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unconfigured_requests_are_rejected() {
        let scheduler = scheduler(SyncConfig::default());
        assert!(!scheduler.request_sync(false, None));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(scheduler.engine().transport().calls().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_push_cancels_pending_request() {
        let scheduler = scheduler(configured());
        assert!(scheduler.request_sync(false, None));
        scheduler
            .engine()
            .dispatcher()
            .dispatch(Action::TogglePushChanges(Some(false)));
        assert!(!scheduler.request_sync(false, None));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(scheduler.engine().transport().calls().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn renewal_requires_prior_sync() {
        let scheduler = scheduler(configured());
        assert!(!scheduler.request_sync(true, None));

        scheduler
            .engine()
            .dispatcher()
            .dispatch(Action::UpdateLastSyncTime(50));
        assert!(scheduler.request_sync(true, None));
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_window_uses_last_attempt() {
        let scheduler = scheduler(configured());
        scheduler
            .engine()
            .dispatcher()
            .dispatch(Action::UpdateLastSyncCall(crate::now_millis()));
        assert!(!scheduler.request_sync(false, Some(Duration::from_secs(3600))));
        assert!(scheduler.request_sync(false, None));
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_throttle_window_rejects() {
        let scheduler = scheduler(configured());
        assert!(!scheduler.request_sync(false, Some(Duration::MAX)));
    }

    #[tokio::test(start_paused = true)]
    async fn observers_see_start_and_outcome() {
        let scheduler = scheduler(configured());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        scheduler.subscribe(move |notice: &SyncNotice| sink.lock().push(notice.clone()));

        scheduler
            .engine()
            .transport()
            .fail_next_user(SyncError::transport_retryable("offline"));
        assert!(scheduler.sync_now().await.is_err());
        scheduler.sync_now().await.unwrap();

        let seen = seen.lock().clone();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], SyncNotice::Starting);
        assert!(matches!(seen[1], SyncNotice::Failed(_)));
        assert_eq!(seen[3], SyncNotice::Completed);
        assert!(scheduler.engine().dispatcher().app().last_sync_call > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_pending_drops_debounced_cycle() {
        let scheduler = scheduler(configured());
        assert!(scheduler.request_sync(false, None));
        scheduler.cancel_pending();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(pulls(&scheduler), 0);
    }

    /// Holds the first pull until the gate opens.
    struct GatedTransport {
        inner: MockTransport,
        gate: tokio::sync::Notify,
        pulls_started: AtomicU64,
    }

    #[async_trait::async_trait]
    impl SyncTransport for GatedTransport {
        async fn ensure_user(&self, user_id: &str) -> SyncResult<UserResponse> {
            self.inner.ensure_user(user_id).await
        }

        async fn pull(&self, id_user: &str, cursor: i64) -> SyncResult<SyncResponse> {
            if self.pulls_started.fetch_add(1, Ordering::SeqCst) == 0 {
                self.gate.notified().await;
            }
            self.inner.pull(id_user, cursor).await
        }

        async fn push(&self, id_user: &str, cursor: i64, body: &PushBody) -> SyncResult<PushOutcome> {
            self.inner.push(id_user, cursor, body).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn newer_request_supersedes_queued_cycle_without_preempting() {
        let dispatcher = Arc::new(Dispatcher::open(Arc::new(MemoryStore::new())).unwrap());
        let transport = GatedTransport {
            inner: MockTransport::new(),
            gate: tokio::sync::Notify::new(),
            pulls_started: AtomicU64::new(0),
        };
        let scheduler = SyncScheduler::new(Arc::new(SyncEngine::new(
            configured(),
            transport,
            dispatcher,
        )));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        scheduler.subscribe(move |notice: &SyncNotice| sink.lock().push(notice.clone()));

        assert!(scheduler.request_sync(false, None));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(scheduler.engine().state(), SyncState::Pulling);

        // Both debounce windows elapse while the first cycle is held.
        assert!(scheduler.request_sync(false, None));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(scheduler.request_sync(false, None));
        tokio::time::sleep(Duration::from_secs(1)).await;

        let transport = scheduler.engine().transport();
        assert_eq!(transport.pulls_started.load(Ordering::SeqCst), 1);
        assert_eq!(seen.lock().clone(), vec![SyncNotice::Starting]);

        transport.gate.notify_one();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(transport.pulls_started.load(Ordering::SeqCst), 2);
        assert_eq!(transport.inner.pull_count(), 2);
        assert_eq!(
            seen.lock().clone(),
            vec![
                SyncNotice::Starting,
                SyncNotice::Completed,
                SyncNotice::Starting,
                SyncNotice::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn sync_now_requires_endpoints() {
        let scheduler = scheduler(SyncConfig::default());
        assert!(matches!(
            scheduler.sync_now().await,
            Err(SyncError::NotConfigured)
        ));
    }
}
