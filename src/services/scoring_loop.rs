//! Scoring loop: fast operational tick and slow semantic refresh.
//!
//! Two independently scheduled tasks share exactly one handle, the
//! [`SemanticCache`]:
//! - The fast path ticks at a fixed interval, owns the burst detector, drains
//!   pending events without waiting, reads the latest cached payload and emits
//!   an [`OrientResult`]. It never touches collaborators or heavy scorers.
//! - The slow path fetches fragments and observations, computes a new payload
//!   under a hard timeout and publishes it by replacement. On failure the
//!   previous payload is retained.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Config, ConvergencePayload, GroundSet, IndependenceConfig, LoopConfig, OrientResult,
};
use crate::domain::ports::{EmbeddingProvider, ObservationSource, PayloadSink};
use crate::services::burst_detector::BurstDetector;
use crate::services::convergence_fusion::{ConvergenceFusion, EscalationLadder, SemanticInputs};
use crate::services::independence_scorer::IndependenceScorer;
use crate::services::phase_estimator::{PhaseEstimator, PhaseModel};

/// Outcome of the most recent refresh attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RefreshOutcome {
    /// No refresh has completed yet.
    #[default]
    Pending,
    Succeeded,
    TimedOut,
    Failed(String),
}

impl RefreshOutcome {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::TimedOut => "timed_out",
            Self::Failed(_) => "failed",
        }
    }
}

/// Point-in-time view of the semantic cache.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    /// Last successfully published payload, if any.
    pub payload: Option<Arc<ConvergencePayload>>,
    pub last_refresh: RefreshOutcome,
    /// Number of payloads published so far.
    pub generation: u64,
}

/// Single-writer, multi-reader cache of the latest semantic payload.
///
/// Publishing swaps one `Arc`; readers clone it and never observe a partial
/// payload. Only the slow path writes.
#[derive(Debug)]
pub struct SemanticCache {
    tx: watch::Sender<CacheSnapshot>,
}

impl SemanticCache {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(CacheSnapshot::default());
        Self { tx }
    }

    pub fn latest(&self) -> Option<Arc<ConvergencePayload>> {
        self.tx.borrow().payload.clone()
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        self.tx.borrow().clone()
    }

    /// Replace the cached payload and return the published handle.
    pub fn publish(&self, payload: ConvergencePayload) -> Arc<ConvergencePayload> {
        let payload = Arc::new(payload);
        let published = Arc::clone(&payload);
        self.tx.send_modify(move |snapshot| {
            snapshot.payload = Some(payload);
            snapshot.last_refresh = RefreshOutcome::Succeeded;
            snapshot.generation += 1;
        });
        published
    }

    /// Record a failed attempt without touching the cached payload.
    pub fn record_outcome(&self, outcome: RefreshOutcome) {
        self.tx.send_modify(|snapshot| snapshot.last_refresh = outcome);
    }

    pub fn subscribe(&self) -> watch::Receiver<CacheSnapshot> {
        self.tx.subscribe()
    }
}

impl Default for SemanticCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic time axis for event arrivals, in seconds since loop creation.
#[derive(Debug, Clone, Copy)]
pub struct LoopClock {
    origin: Instant,
}

impl LoopClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_secs(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Counters shared by both paths. Atomics only; the fast path never locks.
#[derive(Debug, Default)]
struct LoopMetrics {
    running: AtomicBool,
    ticks: AtomicU64,
    refreshes: AtomicU64,
    refresh_failures: AtomicU64,
    refresh_timeouts: AtomicU64,
    consecutive_failures: AtomicU32,
    dropped_events: AtomicU64,
}

/// Status of a scoring loop.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoopStatus {
    pub running: bool,
    pub ticks: u64,
    pub refreshes: u64,
    pub refresh_failures: u64,
    pub refresh_timeouts: u64,
    pub consecutive_failures: u32,
    pub dropped_events: u64,
    pub generation: u64,
    pub last_refresh: String,
}

/// Event-source entry point feeding the fast path.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<f64>,
    clock: LoopClock,
    metrics: Arc<LoopMetrics>,
}

impl EventSender {
    /// Queue an event at `time` seconds on the loop clock.
    ///
    /// Returns `false` when the buffer is full or the loop has stopped.
    pub fn record(&self, time: f64) -> bool {
        match self.tx.try_send(time) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.dropped_events.fetch_add(1, Ordering::Relaxed);
                warn!(time, "event buffer full; dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Queue an event at the current loop time.
    pub fn record_now(&self) -> bool {
        self.record(self.clock.now_secs())
    }

    pub fn clock(&self) -> LoopClock {
        self.clock
    }
}

/// Collaborators consumed by the slow path.
#[derive(Clone)]
pub struct Collaborators {
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub observations: Arc<dyn ObservationSource>,
    pub sink: Arc<dyn PayloadSink>,
}

/// Slow-path worker computing and publishing semantic payloads.
pub struct SemanticRefresher {
    key: String,
    independence: IndependenceConfig,
    estimator: Arc<PhaseEstimator>,
    fusion: Arc<ConvergenceFusion>,
    collaborators: Collaborators,
    cache: Arc<SemanticCache>,
    timeout: Duration,
    metrics: Arc<LoopMetrics>,
}

impl SemanticRefresher {
    /// Run one refresh under the hard timeout.
    ///
    /// On timeout or failure the outcome is logged and recorded, and the
    /// cached payload is left as it was.
    pub async fn refresh_once(&self) -> RefreshOutcome {
        let started = Instant::now();
        let outcome = match time::timeout(self.timeout, self.compute()).await {
            Ok(Ok(payload)) => {
                let payload = self.cache.publish(payload);
                self.metrics.refreshes.fetch_add(1, Ordering::Relaxed);
                self.metrics.consecutive_failures.store(0, Ordering::Relaxed);
                info!(
                    key = %self.key,
                    semantic_score = payload.semantic_score,
                    rank = payload.matroid_rank_current,
                    rank_delta = payload.matroid_rank_delta,
                    phase = %payload.estimated_adversary_phase,
                    recommended = %payload.recommended_phase,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "semantic payload refreshed"
                );
                self.persist(&payload).await;
                return RefreshOutcome::Succeeded;
            }
            Ok(Err(err)) => {
                self.metrics.refresh_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    key = %self.key,
                    error = %err,
                    "semantic refresh failed; keeping previous payload"
                );
                RefreshOutcome::Failed(err.to_string())
            }
            Err(_) => {
                self.metrics.refresh_timeouts.fetch_add(1, Ordering::Relaxed);
                let err = DomainError::RefreshTimedOut {
                    timeout_ms: self.timeout.as_millis() as u64,
                };
                warn!(key = %self.key, error = %err, "keeping previous payload");
                RefreshOutcome::TimedOut
            }
        };

        self.metrics
            .consecutive_failures
            .fetch_add(1, Ordering::Relaxed);
        self.cache.record_outcome(outcome.clone());
        outcome
    }

    async fn compute(&self) -> DomainResult<ConvergencePayload> {
        let (fragments, observations) = tokio::try_join!(
            self.collaborators.embeddings.fragments(&self.key),
            self.collaborators.observations.observations(&self.key),
        )?;
        let ground_set = GroundSet::new(fragments)?;
        let previous = self.cache.latest();
        let estimator = Arc::clone(&self.estimator);
        let fusion = Arc::clone(&self.fusion);
        let independence = self.independence.clone();

        tokio::task::spawn_blocking(move || {
            let scorer =
                IndependenceScorer::with_tolerance(ground_set, independence.rank_tolerance);
            let subset = scorer
                .ground_set()
                .recent_indices(independence.subset_window);
            let inputs = SemanticInputs {
                scorer: &scorer,
                estimator: &estimator,
                subset: &subset,
                observations: &observations,
                max_basis: independence.max_basis,
            };
            fusion.compute_payload(inputs, previous.as_deref(), Utc::now())
        })
        .await
        .map_err(|e| DomainError::ExecutionFailed(format!("semantic scoring task failed: {e}")))
    }

    async fn persist(&self, payload: &ConvergencePayload) {
        match time::timeout(self.timeout, self.collaborators.sink.persist(&self.key, payload)).await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(key = %self.key, error = %err, "failed to persist payload"),
            Err(_) => warn!(key = %self.key, "payload persistence timed out"),
        }
    }
}

/// Fast-path state, owned exclusively by the tick task.
struct FastPath {
    key: String,
    detector: BurstDetector,
    burst_threshold: f64,
    events: mpsc::Receiver<f64>,
    cache: Arc<SemanticCache>,
    fusion: Arc<ConvergenceFusion>,
    orient_tx: watch::Sender<Option<OrientResult>>,
    clock: LoopClock,
    metrics: Arc<LoopMetrics>,
    ladder: EscalationLadder,
    bursting: bool,
}

impl FastPath {
    fn tick(&mut self) -> OrientResult {
        while let Ok(time) = self.events.try_recv() {
            self.detector.record_event(time);
        }

        let now = self.clock.now_secs();
        self.detector.prune(now);
        let h1 = self.detector.h1_score(now);

        let bursting = self.detector.is_bursting(now, self.burst_threshold);
        if bursting != self.bursting {
            debug!(key = %self.key, bursting, h1, "burst state changed");
            self.bursting = bursting;
        }

        let payload = self.cache.latest();
        let result = self
            .fusion
            .orient(h1, payload.as_deref(), &mut self.ladder, Utc::now());
        if result.escalate {
            info!(
                key = %self.key,
                level = %result.level,
                h1 = result.h1,
                h2 = result.h2,
                "vertical escalation gate opened"
            );
        }

        self.metrics.ticks.fetch_add(1, Ordering::Relaxed);
        result
    }

    async fn run(mut self, tick_interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            let result = self.tick();
            self.orient_tx.send_replace(Some(result));
        }
        debug!(key = %self.key, "fast path stopped");
    }
}

async fn run_slow_path(
    refresher: SemanticRefresher,
    refresh_interval: Duration,
    trigger: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
            () = trigger.notified() => {}
        }

        // Dropping the in-flight refresh before it publishes leaves the cache intact.
        tokio::select! {
            _ = shutdown.changed() => {
                debug!(key = %refresher.key, "in-flight refresh cancelled");
                break;
            }
            _ = refresher.refresh_once() => {}
        }
    }
    debug!(key = %refresher.key, "slow path stopped");
}

/// A scoring session ready to be spawned.
pub struct ScoringLoop {
    config: LoopConfig,
    fast: FastPath,
    refresher: SemanticRefresher,
    handle: LoopHandle,
}

impl ScoringLoop {
    /// Build a loop for `key` from configuration.
    ///
    /// Malformed phase models, Hawkes parameters or fusion policies are
    /// rejected here, before anything runs.
    pub fn new(
        key: impl Into<String>,
        config: &Config,
        collaborators: Collaborators,
    ) -> DomainResult<Self> {
        let estimator = Arc::new(PhaseEstimator::new(PhaseModel::from_config(
            &config.phase_model,
        )?));
        let fusion = Arc::new(ConvergenceFusion::new(config.fusion.clone())?);
        let detector = BurstDetector::from_config(&config.hawkes)?;
        Ok(Self::with_components(
            key,
            config,
            detector,
            estimator,
            fusion,
            collaborators,
        ))
    }

    /// Build a loop from prebuilt, already validated components.
    pub fn with_components(
        key: impl Into<String>,
        config: &Config,
        detector: BurstDetector,
        estimator: Arc<PhaseEstimator>,
        fusion: Arc<ConvergenceFusion>,
        collaborators: Collaborators,
    ) -> Self {
        let key = key.into();
        let loop_config = config.scoring_loop.clone();
        let metrics = Arc::new(LoopMetrics::default());
        let cache = Arc::new(SemanticCache::new());
        let clock = LoopClock::start();
        let (events_tx, events_rx) = mpsc::channel(loop_config.event_buffer.max(1));
        let (orient_tx, orient_rx) = watch::channel(None);
        let (shutdown_tx, _) = watch::channel(false);

        let handle = LoopHandle {
            key: key.clone(),
            cache: Arc::clone(&cache),
            orient: orient_rx,
            events: EventSender {
                tx: events_tx,
                clock,
                metrics: Arc::clone(&metrics),
            },
            refresh_trigger: Arc::new(Notify::new()),
            shutdown: Arc::new(shutdown_tx),
            metrics: Arc::clone(&metrics),
        };

        let fast = FastPath {
            key: key.clone(),
            detector,
            burst_threshold: config.hawkes.burst_threshold,
            events: events_rx,
            cache: Arc::clone(&cache),
            fusion: Arc::clone(&fusion),
            orient_tx,
            clock,
            metrics: Arc::clone(&metrics),
            ladder: EscalationLadder::new(),
            bursting: false,
        };

        let refresher = SemanticRefresher {
            key,
            independence: config.independence.clone(),
            estimator,
            fusion,
            collaborators,
            cache,
            timeout: loop_config.refresh_timeout(),
            metrics,
        };

        Self {
            config: loop_config,
            fast,
            refresher,
            handle,
        }
    }

    /// Get a handle to query and control the loop.
    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Slow-path worker, for running refreshes without spawning the loop.
    pub fn refresher(&self) -> &SemanticRefresher {
        &self.refresher
    }

    /// Spawn both paths on the current runtime.
    pub fn spawn(self) -> RunningLoop {
        let Self {
            config,
            fast,
            refresher,
            handle,
        } = self;

        handle.metrics.running.store(true, Ordering::Release);
        info!(
            key = %handle.key,
            tick_ms = config.tick_interval_ms,
            refresh_ms = config.refresh_interval_ms,
            timeout_ms = config.refresh_timeout_ms,
            "scoring loop started"
        );

        let fast_task = tokio::spawn(fast.run(config.tick_interval(), handle.shutdown.subscribe()));
        let slow_task = tokio::spawn(run_slow_path(
            refresher,
            config.refresh_interval(),
            Arc::clone(&handle.refresh_trigger),
            handle.shutdown.subscribe(),
        ));

        RunningLoop {
            handle,
            fast: fast_task,
            slow: slow_task,
        }
    }
}

/// Cloneable handle to query and control a scoring loop.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    key: String,
    cache: Arc<SemanticCache>,
    orient: watch::Receiver<Option<OrientResult>>,
    events: EventSender,
    refresh_trigger: Arc<Notify>,
    shutdown: Arc<watch::Sender<bool>>,
    metrics: Arc<LoopMetrics>,
}

impl LoopHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn semantic(&self) -> CacheSnapshot {
        self.cache.snapshot()
    }

    pub fn latest_payload(&self) -> Option<Arc<ConvergencePayload>> {
        self.cache.latest()
    }

    pub fn latest_orient(&self) -> Option<OrientResult> {
        *self.orient.borrow()
    }

    /// Receiver notified after every fast-path tick.
    pub fn subscribe_orient(&self) -> watch::Receiver<Option<OrientResult>> {
        self.orient.clone()
    }

    /// Receiver notified after every cache change.
    pub fn subscribe_semantic(&self) -> watch::Receiver<CacheSnapshot> {
        self.cache.subscribe()
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }

    /// Ask the slow path to refresh now instead of waiting for its interval.
    pub fn request_refresh(&self) {
        self.refresh_trigger.notify_one();
    }

    /// Request both paths to stop.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn status(&self) -> LoopStatus {
        let snapshot = self.cache.snapshot();
        LoopStatus {
            running: self.metrics.running.load(Ordering::Acquire),
            ticks: self.metrics.ticks.load(Ordering::Relaxed),
            refreshes: self.metrics.refreshes.load(Ordering::Relaxed),
            refresh_failures: self.metrics.refresh_failures.load(Ordering::Relaxed),
            refresh_timeouts: self.metrics.refresh_timeouts.load(Ordering::Relaxed),
            consecutive_failures: self.metrics.consecutive_failures.load(Ordering::Relaxed),
            dropped_events: self.metrics.dropped_events.load(Ordering::Relaxed),
            generation: snapshot.generation,
            last_refresh: snapshot.last_refresh.as_str().to_string(),
        }
    }
}

/// A spawned scoring loop.
pub struct RunningLoop {
    handle: LoopHandle,
    fast: JoinHandle<()>,
    slow: JoinHandle<()>,
}

impl RunningLoop {
    pub fn handle(&self) -> &LoopHandle {
        &self.handle
    }

    /// Stop both paths and wait for them to finish.
    pub async fn shutdown(self) {
        self.handle.stop();
        if let Err(err) = self.fast.await {
            warn!(key = %self.handle.key, error = %err, "fast path task ended abnormally");
        }
        if let Err(err) = self.slow.await {
            warn!(key = %self.handle.key, error = %err, "slow path task ended abnormally");
        }
        self.handle.metrics.running.store(false, Ordering::Release);
        info!(key = %self.handle.key, "scoring loop stopped");
    }
}
