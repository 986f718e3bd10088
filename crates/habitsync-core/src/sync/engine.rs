//! Sync orchestrator.
//!
//! One pass drains the operation queue in order, pulls remote changes since
//! the watermark, and reconciles them kind by kind. Passes are single-flight;
//! requests that arrive during a pass are coalesced into one more pass.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::gateway::{GatewayError, RemoteGateway, RemoteRecord, CLIENT_KEY_FIELD};
use super::network::NetworkMonitor;
use crate::config::SyncEngineConfig;
use crate::db::AttemptFailure;
use crate::error::{Error, Result};
use crate::models::{LocalId, OperationType, QueuedOperation, ResourceKind};
use crate::services::{Reconciled, SyncStore};
use crate::state::{EngineStatus, SyncPhase};
use crate::util::now_millis;

const MIN_SYNC_INTERVAL: Duration = Duration::from_millis(10);

/// Why a sync request did not run a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Offline,
    /// Another pass is running; it will run once more afterwards
    InFlight,
    Stopped,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Offline => "offline",
            Self::InFlight => "a sync is already running",
            Self::Stopped => "the engine is stopped",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    Skipped(SkipReason),
}

/// Counters accumulated over the passes of one sync request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub passes: usize,
    /// Operations confirmed by the remote
    pub pushed: usize,
    /// Failed push attempts (retryable or terminal)
    pub failed: usize,
    /// Operations left for a later pass (backoff, ordering, dependencies)
    pub deferred: usize,
    /// Pulled records that changed local state
    pub pulled: usize,
    /// Conflicts where local edits were newer and kept
    pub kept_local: usize,
    /// Pulled records that could not be decoded
    pub malformed: usize,
}

enum PushOutcome {
    Confirmed,
    /// Superseded locally while the call was in flight
    Cancelled,
    Deferred,
    Failed,
}

enum Outbound {
    Ready {
        payload: serde_json::Value,
        habit_server_id: Option<String>,
    },
    /// The referenced habit has not been created remotely yet
    WaitingForHabit,
    HabitMissing(LocalId),
}

/// Marks a pass as in flight; released on drop, including early returns.
struct SyncGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

struct EngineInner<G> {
    store: SyncStore,
    gateway: G,
    monitor: NetworkMonitor,
    config: SyncEngineConfig,
    in_flight: AtomicBool,
    rerun: AtomicBool,
    started: AtomicBool,
    stopped: AtomicBool,
    phase: watch::Sender<SyncPhase>,
    last_error: Mutex<Option<String>>,
    trigger: Arc<Notify>,
    /// Dropping the sender tells the background task to exit
    shutdown: Mutex<Option<watch::Sender<()>>>,
    retry_timers: Mutex<HashMap<i64, JoinHandle<()>>>,
}

/// Handle to the sync engine; clones share the same engine.
pub struct SyncEngine<G: RemoteGateway> {
    inner: Arc<EngineInner<G>>,
}

impl<G: RemoteGateway> Clone for SyncEngine<G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<G: RemoteGateway> SyncEngine<G> {
    pub fn new(
        store: SyncStore,
        gateway: G,
        monitor: NetworkMonitor,
        config: SyncEngineConfig,
    ) -> Self {
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self {
            inner: Arc::new(EngineInner {
                store,
                gateway,
                monitor,
                config,
                in_flight: AtomicBool::new(false),
                rerun: AtomicBool::new(false),
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                phase,
                last_error: Mutex::new(None),
                trigger: Arc::new(Notify::new()),
                shutdown: Mutex::new(None),
                retry_timers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn store(&self) -> &SyncStore {
        &self.inner.store
    }

    pub fn monitor(&self) -> &NetworkMonitor {
        &self.inner.monitor
    }

    pub fn config(&self) -> &SyncEngineConfig {
        &self.inner.config
    }

    pub fn phase(&self) -> SyncPhase {
        *self.inner.phase.borrow()
    }

    /// Watch pass phases as they change.
    pub fn subscribe_phase(&self) -> watch::Receiver<SyncPhase> {
        self.inner.phase.subscribe()
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// Start automatic syncing: a periodic trigger, a trigger on every
    /// offline→online transition, and retry timers for failed operations.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.stopped.store(false, Ordering::SeqCst);

        let (shutdown_tx, shutdown_rx) = watch::channel(());
        *lock(&self.inner.shutdown) = Some(shutdown_tx);

        let period = self.inner.config.sync_interval.max(MIN_SYNC_INTERVAL);
        tokio::spawn(drive(
            Arc::downgrade(&self.inner),
            Arc::clone(&self.inner.trigger),
            self.inner.monitor.subscribe(),
            shutdown_rx,
            period,
        ));
        tracing::info!("Sync engine started (interval {period:?})");
    }

    /// Stop automatic syncing and cancel every pending retry timer.
    ///
    /// A remote call already in flight is allowed to finish; later sync
    /// requests are refused with [`SkipReason::Stopped`].
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        let was_started = self.inner.started.swap(false, Ordering::SeqCst);
        lock(&self.inner.shutdown).take();

        let timers: Vec<JoinHandle<()>> = lock(&self.inner.retry_timers)
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        for timer in &timers {
            timer.abort();
        }

        if was_started {
            tracing::info!(
                "Sync engine stopped ({} retry timers cancelled)",
                timers.len()
            );
        }
    }

    /// Ask the background task for a pass. No effect unless started.
    pub fn request_sync(&self) {
        if self.is_started() {
            self.inner.trigger.notify_one();
        }
    }

    /// Run a sync pass now.
    ///
    /// Returns `Skipped` without side effects when offline, stopped, or when
    /// a pass is already running (that pass then runs once more, even if it
    /// aborted). A local store error or a failed pull aborts the pass; the
    /// error is returned when the last pass run failed. Per-item progress
    /// already committed is kept.
    pub async fn sync(&self) -> Result<SyncOutcome> {
        let inner = &self.inner;
        let mut report = SyncReport::default();
        let mut first = true;
        let mut failure = None;

        loop {
            let skip = if inner.stopped.load(Ordering::SeqCst) {
                Some(SkipReason::Stopped)
            } else if !inner.monitor.is_online() {
                Some(SkipReason::Offline)
            } else {
                None
            };
            if let Some(reason) = skip {
                if first {
                    tracing::debug!("Sync skipped: {reason}");
                    return Ok(SyncOutcome::Skipped(reason));
                }
                break;
            }

            inner.rerun.store(true, Ordering::SeqCst);
            let Some(guard) = SyncGuard::acquire(&inner.in_flight) else {
                if first {
                    tracing::debug!("Sync already in flight; coalescing request");
                    return Ok(SyncOutcome::Skipped(SkipReason::InFlight));
                }
                break;
            };
            inner.rerun.store(false, Ordering::SeqCst);
            first = false;

            let pass = self.run_pass(&mut report).await;
            drop(guard);
            failure = pass.err();

            if !inner.rerun.load(Ordering::SeqCst) {
                break;
            }
            tracing::debug!("Sync requested during pass; running again");
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(SyncOutcome::Completed(report)),
        }
    }

    /// Snapshot of connectivity, pass state, and queue health.
    pub async fn status(&self) -> Result<EngineStatus> {
        let store = &self.inner.store;
        let pending_operations = store.count_pending_operations().await?;
        let failed = store.list_failed_operations().await?;
        let last_sync_at = store.last_sync_completed_at().await?;

        let mut errors: Vec<String> = lock(&self.inner.last_error).iter().cloned().collect();
        errors.extend(failed.iter().filter_map(|operation| {
            operation.error.as_ref().map(|error| {
                format!(
                    "#{} {} {}: {error}",
                    operation.id, operation.operation_type, operation.resource_type
                )
            })
        }));

        Ok(EngineStatus {
            online: self.inner.monitor.is_online(),
            syncing: self.inner.in_flight.load(Ordering::SeqCst),
            phase: self.phase(),
            pending_operations,
            failed_operations: failed.len(),
            last_sync_at,
            errors,
        })
    }

    async fn run_pass(&self, report: &mut SyncReport) -> Result<()> {
        let result = self.run_phases(report).await;
        self.set_phase(SyncPhase::Idle);

        match &result {
            Ok(()) => {
                report.passes += 1;
                *lock(&self.inner.last_error) = None;
            }
            Err(Error::StoreClosed) => {
                tracing::warn!("Store closed during sync; dropping remaining results");
                *lock(&self.inner.last_error) = Some(Error::StoreClosed.to_string());
            }
            Err(error) => {
                tracing::error!("Sync pass aborted: {error}");
                *lock(&self.inner.last_error) = Some(error.to_string());
            }
        }
        result
    }

    async fn run_phases(&self, report: &mut SyncReport) -> Result<()> {
        let store = &self.inner.store;

        self.set_phase(SyncPhase::Draining);
        self.drain(report).await?;

        self.set_phase(SyncPhase::Pulling);
        let since = store.watermark().await?;
        let changes = self.inner.gateway.pull_changes(since).await?;
        tracing::debug!(
            "Pulled {} records (as of {})",
            changes.record_count(),
            changes.as_of
        );

        self.set_phase(SyncPhase::Reconciling);
        for kind in ResourceKind::ALL {
            let Some(records) = changes.resources.get(&kind) else {
                continue;
            };
            for record in records {
                self.reconcile(kind, record, report).await?;
            }
        }

        let watermark = store.finish_pass(changes.as_of).await?;
        tracing::info!(
            "Sync pass complete: {} pushed, {} failed, {} pulled (watermark {watermark})",
            report.pushed,
            report.failed,
            report.pulled
        );
        Ok(())
    }

    /// Push due operations in queue order. Once an operation for a resource
    /// is skipped or fails, later operations for that resource wait too.
    ///
    /// When a push was superseded while in flight the queue is read again,
    /// so the superseding operation goes out before remote changes are pulled.
    async fn drain(&self, report: &mut SyncReport) -> Result<()> {
        let mut blocked: HashSet<(ResourceKind, LocalId)> = HashSet::new();
        let mut seen: HashSet<i64> = HashSet::new();

        loop {
            let operations = self.inner.store.list_pending_operations().await?;
            let now = now_millis();
            let mut superseded = false;

            for operation in operations {
                if !seen.insert(operation.id) {
                    continue;
                }
                let resource = (operation.resource_type, operation.resource_local_id);
                if operation.failed {
                    blocked.insert(resource);
                    continue;
                }
                if blocked.contains(&resource) || !operation.is_due(now) {
                    blocked.insert(resource);
                    report.deferred += 1;
                    continue;
                }

                match self.push(&operation).await? {
                    PushOutcome::Confirmed => report.pushed += 1,
                    PushOutcome::Cancelled => superseded = true,
                    PushOutcome::Deferred => {
                        blocked.insert(resource);
                        report.deferred += 1;
                    }
                    PushOutcome::Failed => {
                        blocked.insert(resource);
                        report.failed += 1;
                    }
                }
            }

            if !superseded {
                return Ok(());
            }
        }
    }

    async fn push(&self, operation: &QueuedOperation) -> Result<PushOutcome> {
        let store = &self.inner.store;
        let gateway = &self.inner.gateway;
        let kind = operation.resource_type;

        let Some(entity) = store
            .entity_any(kind, &operation.resource_local_id)
            .await?
        else {
            tracing::debug!(
                "Dropping operation #{} for missing {kind} {}",
                operation.id,
                operation.resource_local_id
            );
            store.confirm_push(operation, None, None).await?;
            return Ok(PushOutcome::Cancelled);
        };

        let (result, habit_server_id) = if operation.operation_type == OperationType::Delete {
            let result = match entity.server_id.as_deref() {
                Some(server_id) => gateway.delete(kind, server_id).await.map(|()| None),
                // Never reached the server; nothing to delete remotely
                None => Ok(None),
            };
            (result, None)
        } else {
            let (payload, habit_server_id) = match self.outbound_payload(operation).await? {
                Outbound::Ready {
                    payload,
                    habit_server_id,
                } => (payload, habit_server_id),
                Outbound::WaitingForHabit => return Ok(PushOutcome::Deferred),
                Outbound::HabitMissing(habit_local_id) => {
                    let error =
                        GatewayError::permanent(format!("Habit {habit_local_id} no longer exists"));
                    return self.handle_failure(operation, &error).await;
                }
            };

            // Whether the resource exists remotely decides between create and update
            let result = match entity.server_id.as_deref() {
                Some(server_id) => gateway.update(kind, server_id, &payload).await,
                None => {
                    gateway
                        .create(kind, &with_client_key(payload, &entity.local_id))
                        .await
                }
            };
            (result.map(Some), habit_server_id)
        };

        match result {
            Ok(record) => self.confirm(operation, record.as_ref(), habit_server_id.as_deref()).await,
            Err(error) => self.handle_failure(operation, &error).await,
        }
    }

    async fn confirm(
        &self,
        operation: &QueuedOperation,
        record: Option<&RemoteRecord>,
        habit_server_id: Option<&str>,
    ) -> Result<PushOutcome> {
        if self
            .inner
            .store
            .confirm_push(operation, record, habit_server_id)
            .await?
        {
            tracing::debug!(
                "Pushed {} {} {} (#{})",
                operation.operation_type,
                operation.resource_type,
                operation.resource_local_id,
                operation.id
            );
            Ok(PushOutcome::Confirmed)
        } else {
            tracing::info!(
                "Operation #{} was superseded while in flight",
                operation.id
            );
            Ok(PushOutcome::Cancelled)
        }
    }

    /// Payload to send, with a completion's habit reference resolved to the
    /// habit's server id.
    async fn outbound_payload(&self, operation: &QueuedOperation) -> Result<Outbound> {
        let mut payload = operation.payload.clone();
        if operation.resource_type != ResourceKind::HabitCompletion {
            return Ok(Outbound::Ready {
                payload,
                habit_server_id: None,
            });
        }

        let habit_local_id = payload
            .get("habit_local_id")
            .and_then(serde_json::Value::as_str)
            .and_then(|value| value.parse::<LocalId>().ok());
        let Some(habit_local_id) = habit_local_id else {
            return Ok(Outbound::Ready {
                payload,
                habit_server_id: None,
            });
        };

        let habit = self
            .inner
            .store
            .entity_any(ResourceKind::Habit, &habit_local_id)
            .await?;
        let Some(habit) = habit else {
            return Ok(Outbound::HabitMissing(habit_local_id));
        };
        let Some(habit_server_id) = habit.server_id else {
            return Ok(Outbound::WaitingForHabit);
        };

        if let Some(fields) = payload.as_object_mut() {
            fields.remove("habit_local_id");
            fields.insert(
                "habit_id".to_string(),
                serde_json::Value::String(habit_server_id.clone()),
            );
        }
        Ok(Outbound::Ready {
            payload,
            habit_server_id: Some(habit_server_id),
        })
    }

    /// Apply the retry policy to a failed push.
    async fn handle_failure(
        &self,
        operation: &QueuedOperation,
        error: &GatewayError,
    ) -> Result<PushOutcome> {
        let config = &self.inner.config;
        let attempts = operation.retry_count.saturating_add(1);
        let terminal = !error.is_transient() || attempts >= config.max_retries;
        let delay = config.retry_delay(attempts);
        let now = now_millis();
        let next_attempt_at = (!terminal).then(|| {
            now.saturating_add(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX))
        });

        let failure = AttemptFailure {
            error: error.to_string(),
            attempted_at: now,
            next_attempt_at,
            terminal,
        };
        if !self
            .inner
            .store
            .record_push_failure(operation, failure)
            .await?
        {
            return Ok(PushOutcome::Cancelled);
        }

        if terminal {
            tracing::warn!(
                "{} {} {} failed permanently after {attempts} attempt(s): {error}",
                operation.operation_type,
                operation.resource_type,
                operation.resource_local_id
            );
        } else {
            tracing::warn!(
                "{} {} {} failed (attempt {attempts}/{}), retrying in {delay:?}: {error}",
                operation.operation_type,
                operation.resource_type,
                operation.resource_local_id,
                config.max_retries
            );
            self.schedule_retry(operation.id, delay);
        }
        Ok(PushOutcome::Failed)
    }

    async fn reconcile(
        &self,
        kind: ResourceKind,
        record: &RemoteRecord,
        report: &mut SyncReport,
    ) -> Result<()> {
        match self.inner.store.reconcile_record(kind, record).await {
            Ok(Reconciled::Inserted | Reconciled::Updated | Reconciled::Removed) => {
                report.pulled += 1;
            }
            Ok(Reconciled::KeptLocal) => report.kept_local += 1,
            Ok(Reconciled::Unchanged | Reconciled::Ignored) => {}
            Err(Error::Serialization(error)) => {
                tracing::warn!("Skipping malformed {kind} {}: {error}", record.server_id);
                report.malformed += 1;
            }
            Err(error) => return Err(error),
        }
        Ok(())
    }

    /// Request a pass once `delay` has elapsed. Only while started.
    fn schedule_retry(&self, operation_id: i64, delay: Duration) {
        if !self.is_started() {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                lock(&inner.retry_timers).remove(&operation_id);
                inner.trigger.notify_one();
            }
        });

        if let Some(previous) = lock(&self.inner.retry_timers).insert(operation_id, timer) {
            previous.abort();
        }
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.inner.phase.send_replace(phase);
    }

    #[cfg(test)]
    fn retry_timer_count(&self) -> usize {
        lock(&self.inner.retry_timers).len()
    }
}

/// Background trigger loop; exits when the engine is stopped or dropped.
async fn drive<G: RemoteGateway>(
    inner: Weak<EngineInner<G>>,
    trigger: Arc<Notify>,
    mut online: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<()>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
            () = trigger.notified() => {}
            changed = online.changed() => {
                if changed.is_err() {
                    break;
                }
                // Only real changes are sent; ending online means the link
                // dropped since the last check, possibly during a pass.
                if !*online.borrow_and_update() {
                    continue;
                }
                tracing::info!("Connectivity restored; syncing");
            }
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };
        let engine = SyncEngine { inner };
        match engine.sync().await {
            Ok(SyncOutcome::Completed(report)) => {
                tracing::debug!("Background sync finished: {report:?}");
            }
            Ok(SyncOutcome::Skipped(reason)) => {
                tracing::debug!("Background sync skipped: {reason}");
            }
            Err(error) => tracing::error!("Background sync failed: {error}"),
        }
    }
    tracing::debug!("Sync trigger loop exited");
}

/// Tag a create payload with the entity's local id.
fn with_client_key(mut payload: serde_json::Value, local_id: &LocalId) -> serde_json::Value {
    if let Some(fields) = payload.as_object_mut() {
        fields.insert(
            CLIENT_KEY_FIELD.to_string(),
            serde_json::Value::String(local_id.to_string()),
        );
    }
    payload
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
