//! # Sync Coordinator
//!
//! Drains the upload queue, delivers the batch and puts it back on failure.
//!
//! ## Cycle State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        One Sync Cycle                                   │
//! │                                                                         │
//! │  trigger (Timer | Capture | Manual)                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  cycle lock free? ── no ──► Busy                                       │
//! │       │ yes                                                             │
//! │       ▼                                                                 │
//! │  evict store rows older than keep_locations_for                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  gates: upload_enabled → network permitted → frequency elapsed         │
//! │       │ (only Capture checks frequency)     any fails ──► Skipped      │
//! │       ▼                                                                 │
//! │  IDLE ──► DRAINING: queue.flush()                                      │
//! │              │ empty ──────────────────────────────► Empty             │
//! │              ▼                                                          │
//! │           DELIVERING: uploader.upload(batch)                           │
//! │              │ 2xx ────────────────────────────────► Delivered(n)      │
//! │              │ cancelled (stop) ──► restore ───────► Abandoned(n)      │
//! │              ▼ failure                                                  │
//! │           RESTORING: queue.restore(batch) ─────────► Restored(n)       │
//! │              │ restore failed                                           │
//! │              ▼                                                          │
//! │           batch kept in memory ("stranded"), restored before the       │
//! │           next flush and on shutdown                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Background Task
//! `start()` spawns a loop over a timer, a trigger channel, config changes
//! and a cancellation token. `stop()` cancels the token and waits for the
//! loop. An upload cut short by `stop()` has its batch restored before the
//! task exits.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use geotrail_core::{NetworkKind, Sample};
use geotrail_db::Database;

use crate::config::{CaptureConfig, ConfigHandle};
use crate::error::{SyncError, SyncResult};
use crate::platform::Connectivity;
use crate::uploader::{UploadRequest, Uploader};

/// Timer period when `upload_frequency` is 0.
const IDLE_POLL: Duration = Duration::from_secs(60);

/// Capacity of the trigger channel. Extra triggers are dropped while a
/// cycle is already pending.
const TRIGGER_BUFFER: usize = 8;

// =============================================================================
// Public Types
// =============================================================================

/// Where the coordinator is in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    Draining,
    Delivering,
    Restoring,
}

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// Background timer, which already ticks every `upload_frequency`.
    Timer,
    /// A new sample was captured. Gated by `upload_frequency`.
    Capture,
    /// Explicit request from the host. Ignores `upload_frequency`.
    Manual,
}

/// Why a cycle did not drain the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    UploadsDisabled,
    /// The current network is not allowed by `upload_connection_type`.
    NetworkNotPermitted { network: NetworkKind },
    /// `upload_frequency` has not elapsed since the last attempt.
    TooSoon { retry_in_secs: u64 },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::UploadsDisabled => write!(f, "uploads disabled"),
            SkipReason::NetworkNotPermitted { network } => {
                write!(f, "network '{}' not permitted", network)
            }
            SkipReason::TooSoon { retry_in_secs } => {
                write!(f, "next upload allowed in {}s", retry_in_secs)
            }
        }
    }
}

/// Result of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum CycleOutcome {
    Skipped(SkipReason),
    /// Another cycle was in progress.
    Busy,
    /// The queue was empty.
    Empty,
    /// The endpoint accepted this many samples.
    Delivered(usize),
    /// Delivery failed; this many samples went back to the queue.
    Restored(usize),
    /// Shutdown interrupted delivery; this many samples went back to the queue.
    Abandoned(usize),
}

/// Current sync status for external queries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,

    /// True while the background task runs.
    pub running: bool,

    pub last_outcome: Option<CycleOutcome>,

    /// Last time a batch was delivered.
    pub last_success: Option<DateTime<Utc>>,

    /// Last error message (if any).
    pub last_error: Option<String>,

    /// Samples waiting in the upload queue.
    pub pending_count: i64,

    /// Samples held in memory after a failed restore.
    pub stranded_count: usize,
}

// =============================================================================
// Coordinator
// =============================================================================

/// Serializes flush → upload → restore cycles over one database.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    db: Database,
    uploader: Uploader,
    config: ConfigHandle,
    connectivity: Arc<dyn Connectivity>,

    /// Held for the whole cycle. `try_lock` failure means Busy.
    cycle: Mutex<CycleState>,

    status: RwLock<SyncStatus>,

    running: Mutex<Option<Running>>,
}

#[derive(Default)]
struct CycleState {
    stranded: Vec<Sample>,
    last_attempt: Option<Instant>,
}

struct Running {
    cancel: CancellationToken,
    triggers: mpsc::Sender<SyncTrigger>,
    handle: JoinHandle<()>,
}

impl SyncCoordinator {
    /// Creates a coordinator. Nothing runs until [`start`](Self::start) or
    /// [`run_cycle`](Self::run_cycle).
    pub fn new(
        db: Database,
        uploader: Uploader,
        config: ConfigHandle,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        SyncCoordinator {
            inner: Arc::new(Inner {
                db,
                uploader,
                config,
                connectivity,
                cycle: Mutex::new(CycleState::default()),
                status: RwLock::new(SyncStatus::default()),
                running: Mutex::new(None),
            }),
        }
    }

    /// Returns the current sync status.
    pub async fn status(&self) -> SyncStatus {
        match self.inner.db.upload_queue().count().await {
            Ok(pending) => self.inner.status.write().await.pending_count = pending,
            Err(e) => debug!(error = %e, "Could not refresh pending count"),
        }
        self.inner.status.read().await.clone()
    }

    /// Returns true while the background task runs.
    pub async fn is_running(&self) -> bool {
        self.inner.running.lock().await.is_some()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Spawns the background loop. Does nothing if it is already running.
    pub async fn start(&self) {
        let mut running = self.inner.running.lock().await;
        if running.is_some() {
            debug!("Sync coordinator already running");
            return;
        }

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(TRIGGER_BUFFER);
        let handle = tokio::spawn(self.clone().run_loop(cancel.clone(), rx));

        *running = Some(Running {
            cancel,
            triggers: tx,
            handle,
        });
        self.inner.status.write().await.running = true;

        info!("Sync coordinator started");
    }

    /// Stops the background loop and waits for it to exit.
    ///
    /// Any batch not yet confirmed delivered is back in the queue when this
    /// returns, unless restoring it failed (then it stays stranded and is
    /// reported in the status). Does nothing if not running.
    pub async fn stop(&self) {
        let Some(running) = self.inner.running.lock().await.take() else {
            return;
        };

        info!("Stopping sync coordinator");
        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            error!(error = %e, "Sync task ended abnormally");
        }

        let mut state = self.inner.cycle.lock().await;
        if let Err(e) = self.restore_stranded(&mut state).await {
            error!(error = %e, "Stranded batch could not be restored on shutdown");
        }

        self.inner.status.write().await.running = false;
        info!("Sync coordinator stopped");
    }

    /// Asks the background loop for a cycle. No-op when not running.
    pub async fn nudge(&self, trigger: SyncTrigger) {
        if let Some(ref running) = *self.inner.running.lock().await {
            if running.triggers.try_send(trigger).is_err() {
                debug!(?trigger, "Trigger dropped, cycle already pending");
            }
        }
    }

    async fn run_loop(self, cancel: CancellationToken, mut triggers: mpsc::Receiver<SyncTrigger>) {
        let mut config_rx = self.inner.config.subscribe();
        let mut ticker = Self::ticker(&self.inner.config.snapshot());

        loop {
            let trigger = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = config_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let config = config_rx.borrow_and_update().clone();
                    ticker = Self::ticker(&config);
                    continue;
                }
                Some(trigger) = triggers.recv() => trigger,
                _ = ticker.tick() => SyncTrigger::Timer,
            };

            if let Err(e) = self.run_cycle_with(trigger, &cancel).await {
                warn!(error = %e, ?trigger, "Sync cycle failed");
            }
        }

        debug!("Sync loop exited");
    }

    fn ticker(config: &CaptureConfig) -> tokio::time::Interval {
        let period = match config.upload_interval() {
            d if d.is_zero() => IDLE_POLL,
            d => d,
        };
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    // =========================================================================
    // Cycle
    // =========================================================================

    /// Runs one cycle now, in the caller's task.
    ///
    /// If the background loop is running, its shutdown also interrupts this
    /// cycle.
    pub async fn run_cycle(&self, trigger: SyncTrigger) -> SyncResult<CycleOutcome> {
        let cancel = match *self.inner.running.lock().await {
            Some(ref running) => running.cancel.clone(),
            None => CancellationToken::new(),
        };
        self.run_cycle_with(trigger, &cancel).await
    }

    async fn run_cycle_with(
        &self,
        trigger: SyncTrigger,
        cancel: &CancellationToken,
    ) -> SyncResult<CycleOutcome> {
        let Ok(mut state) = self.inner.cycle.try_lock() else {
            debug!(?trigger, "Sync cycle already in progress");
            return Ok(CycleOutcome::Busy);
        };

        let config = self.inner.config.snapshot();
        let result = self.cycle(&mut state, &config, trigger, cancel).await;

        let pending = self.inner.db.upload_queue().count().await.ok();
        let mut status = self.inner.status.write().await;
        status.phase = SyncPhase::Idle;
        status.stranded_count = state.stranded.len();
        if let Some(pending) = pending {
            status.pending_count = pending;
        }
        match result {
            Ok(outcome) => {
                status.last_outcome = Some(outcome);
                if let CycleOutcome::Delivered(_) = outcome {
                    status.last_success = Some(Utc::now());
                    status.last_error = None;
                }
            }
            Err(ref e) => status.last_error = Some(e.to_string()),
        }

        result
    }

    async fn cycle(
        &self,
        state: &mut CycleState,
        config: &CaptureConfig,
        trigger: SyncTrigger,
        cancel: &CancellationToken,
    ) -> SyncResult<CycleOutcome> {
        self.evict(config).await;

        if let Some(reason) = self.check_gates(state, config, trigger).await {
            debug!(?trigger, %reason, "Sync cycle skipped");
            return Ok(CycleOutcome::Skipped(reason));
        }
        state.last_attempt = Some(Instant::now());

        self.restore_stranded(state).await?;

        // DRAINING
        self.set_phase(SyncPhase::Draining).await;
        let batch = self.inner.db.upload_queue().flush().await?;
        if batch.is_empty() {
            debug!("Upload queue empty");
            return Ok(CycleOutcome::Empty);
        }
        let count = batch.len();

        // DELIVERING
        self.set_phase(SyncPhase::Delivering).await;
        let delivered = match UploadRequest::from_config(config) {
            Ok(request) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    result = self.inner.uploader.upload(&batch, &request) => Some(result),
                }
            }
            Err(e) => Some(Err(e)),
        };

        match delivered {
            Some(Ok(true)) => Ok(CycleOutcome::Delivered(count)),
            Some(Ok(false)) => {
                self.set_phase(SyncPhase::Restoring).await;
                self.restore(state, batch).await?;
                info!(count, "Delivery failed, batch restored to queue");
                Ok(CycleOutcome::Restored(count))
            }
            None => {
                self.set_phase(SyncPhase::Restoring).await;
                self.restore(state, batch).await?;
                info!(count, "Delivery abandoned on shutdown, batch restored");
                Ok(CycleOutcome::Abandoned(count))
            }
            Some(Err(e)) => {
                self.set_phase(SyncPhase::Restoring).await;
                self.restore(state, batch).await?;
                Err(e)
            }
        }
    }

    async fn check_gates(
        &self,
        state: &CycleState,
        config: &CaptureConfig,
        trigger: SyncTrigger,
    ) -> Option<SkipReason> {
        if !config.upload_enabled {
            return Some(SkipReason::UploadsDisabled);
        }

        let network = self.inner.connectivity.current_network().await;
        if !config.upload_connection_type.permits(network) {
            return Some(SkipReason::NetworkNotPermitted { network });
        }

        if trigger == SyncTrigger::Capture {
            let interval = config.upload_interval();
            if let Some(last) = state.last_attempt {
                let elapsed = last.elapsed();
                if elapsed < interval {
                    let wait = interval - elapsed;
                    return Some(SkipReason::TooSoon {
                        retry_in_secs: wait.as_secs().max(1),
                    });
                }
            }
        }

        None
    }

    async fn evict(&self, config: &CaptureConfig) {
        if let Err(e) = self
            .inner
            .db
            .locations()
            .evict_older_than(config.keep_locations_for)
            .await
        {
            warn!(error = %e, "Retention eviction failed");
        }
    }

    /// Puts a batch back in the queue, keeping it in memory if that fails.
    async fn restore(&self, state: &mut CycleState, batch: Vec<Sample>) -> SyncResult<()> {
        match self.inner.db.upload_queue().restore(&batch).await {
            Ok(_) => Ok(()),
            Err(e) => {
                error!(
                    count = batch.len(),
                    error = %e,
                    "Restore failed, holding batch in memory"
                );
                state.stranded.extend(batch);
                Err(SyncError::Storage(e))
            }
        }
    }

    async fn restore_stranded(&self, state: &mut CycleState) -> SyncResult<()> {
        if state.stranded.is_empty() {
            return Ok(());
        }

        let batch = std::mem::take(&mut state.stranded);
        let count = batch.len();
        self.restore(state, batch).await?;
        info!(count, "Stranded batch restored to queue");
        Ok(())
    }

    async fn set_phase(&self, phase: SyncPhase) {
        self.inner.status.write().await.phase = phase;
    }
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator").finish_non_exhaustive()
    }
}
