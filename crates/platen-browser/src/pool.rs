//! Elastic pool of warm render engines.
//!
//! Engines are expensive to start, so the pool keeps them warm between
//! renders, bounded by a per-engine use count and age so renderer defects
//! cannot accumulate forever. Under contention the pool grows (gated to one
//! scale event per interval); when idle it shrinks back toward the minimum.

use crate::config::PoolConfig;
use crate::engine::{EngineLauncher, RenderEngine};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Failures surfaced by [`EnginePool::acquire`].
#[derive(Error, Debug)]
pub enum PoolError {
    /// No engine became available before the acquire deadline.
    #[error("engine pool exhausted: no engine available within {0:?}")]
    Exhausted(Duration),

    /// The pool has been shut down.
    #[error("engine pool is shut down")]
    Closed,

    /// Launching a new engine failed.
    #[error("failed to launch render engine: {0}")]
    Launch(anyhow::Error),
}

/// One pooled engine plus its usage metadata.
///
/// Identity is the monotonically increasing `id` assigned at creation; the
/// busy set is keyed by it, never by object identity.
struct EngineHandle {
    id: u64,
    engine: Arc<dyn RenderEngine>,
    usage_count: u32,
    created_at: Instant,
    last_used: Instant,
}

impl EngineHandle {
    fn new(id: u64, engine: Arc<dyn RenderEngine>) -> Self {
        let now = Instant::now();
        Self {
            id,
            engine,
            usage_count: 0,
            created_at: now,
            last_used: now,
        }
    }

    /// Counts one render against this engine.
    fn mark_used(&mut self) {
        self.usage_count += 1;
        self.last_used = Instant::now();
    }

    fn expired(&self, config: &PoolConfig) -> bool {
        self.usage_count >= config.max_uses || self.created_at.elapsed() >= config.max_age
    }
}

/// Everything mutable lives behind one mutex; the lock is never held across
/// engine launch, close, or render.
struct PoolState {
    /// Warm engines, oldest first, so reuse naturally rotates into expiry.
    available: VecDeque<EngineHandle>,
    /// Engines out with workers, keyed by handle id.
    busy: HashMap<u64, EngineHandle>,
    /// Slots reserved for launches in flight, counted against the maximum.
    launching: usize,
    next_handle_id: u64,
    peak_instances: usize,
    scale_up_events: u64,
    scale_down_events: u64,
    last_scale_up: Option<DateTime<Utc>>,
    last_scale_down: Option<DateTime<Utc>>,
    scale_up_gate: Option<Instant>,
    scale_down_gate: Option<Instant>,
    total_wait: Duration,
    wait_count: u64,
    shutting_down: bool,
}

impl PoolState {
    fn new() -> Self {
        Self {
            available: VecDeque::new(),
            busy: HashMap::new(),
            launching: 0,
            next_handle_id: 1,
            peak_instances: 0,
            scale_up_events: 0,
            scale_down_events: 0,
            last_scale_up: None,
            last_scale_down: None,
            scale_up_gate: None,
            scale_down_gate: None,
            total_wait: Duration::ZERO,
            wait_count: 0,
            shutting_down: false,
        }
    }

    /// Live engines plus reserved launch slots.
    fn total(&self) -> usize {
        self.available.len() + self.busy.len() + self.launching
    }

    fn live(&self) -> usize {
        self.available.len() + self.busy.len()
    }

    fn new_handle(&mut self, engine: Arc<dyn RenderEngine>) -> EngineHandle {
        let id = self.next_handle_id;
        self.next_handle_id += 1;
        EngineHandle::new(id, engine)
    }

    fn update_peak(&mut self) {
        if self.live() > self.peak_instances {
            self.peak_instances = self.live();
        }
    }

    fn record_wait(&mut self, waited: Duration) {
        self.total_wait += waited;
        self.wait_count += 1;
    }

    /// Removes expired handles from `available`; the caller closes them
    /// after dropping the lock.
    fn drain_expired(&mut self, config: &PoolConfig) -> Vec<EngineHandle> {
        let mut expired = Vec::new();
        let mut keep = VecDeque::with_capacity(self.available.len());
        while let Some(handle) = self.available.pop_front() {
            if handle.expired(config) {
                expired.push(handle);
            } else {
                keep.push_back(handle);
            }
        }
        self.available = keep;
        expired
    }
}

/// Point-in-time snapshot of the pool, shaped for the stats endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub current_instances: usize,
    pub available_instances: usize,
    pub busy_instances: usize,
    pub min_instances: usize,
    pub max_instances: usize,
    pub peak_instances: usize,
    pub scale_up_events: u64,
    pub scale_down_events: u64,
    /// Mean time acquirers spent waiting, in seconds.
    pub average_wait_time: f64,
    pub last_scale_up: Option<DateTime<Utc>>,
    pub last_scale_down: Option<DateTime<Utc>>,
}

/// Elastic collection of render engines with acquire/release semantics.
pub struct EnginePool {
    launcher: Arc<dyn EngineLauncher>,
    config: PoolConfig,
    state: Mutex<PoolState>,
}

enum AcquireStep {
    Acquired(Arc<dyn RenderEngine>, u64),
    Launch,
    Wait,
}

impl EnginePool {
    /// Creates an empty pool.
    ///
    /// Engines are launched on demand; the pool grows toward the minimum as
    /// traffic arrives, and the minimum acts as the floor scale-down will
    /// not go below.
    pub fn new(launcher: Arc<dyn EngineLauncher>, config: PoolConfig) -> Self {
        info!(
            min = config.min_instances,
            max = config.max_instances,
            max_uses = config.max_uses,
            max_age_secs = config.max_age.as_secs(),
            "Engine pool initialized"
        );

        Self {
            launcher,
            config,
            state: Mutex::new(PoolState::new()),
        }
    }

    /// Checks out a non-expired engine, serving the oldest warm one first.
    ///
    /// When none is warm the pool launches a new engine up to the maximum;
    /// at the maximum the caller waits for a release, polling until the
    /// acquire deadline elapses.
    pub async fn acquire(&self) -> Result<(Arc<dyn RenderEngine>, u64), PoolError> {
        let started = Instant::now();
        let mut waited = false;

        loop {
            let (step, expired) = {
                let mut state = self.state.lock().await;
                if state.shutting_down {
                    return Err(PoolError::Closed);
                }
                let expired = state.drain_expired(&self.config);
                let step = if let Some(mut handle) = state.available.pop_front() {
                    handle.mark_used();
                    let engine = Arc::clone(&handle.engine);
                    let id = handle.id;
                    state.busy.insert(id, handle);
                    if waited {
                        state.record_wait(started.elapsed());
                    }
                    AcquireStep::Acquired(engine, id)
                } else if state.total() < self.config.max_instances {
                    state.launching += 1;
                    AcquireStep::Launch
                } else {
                    AcquireStep::Wait
                };
                (step, expired)
            };

            for handle in expired {
                debug!(handle_id = handle.id, "Closing expired engine");
                handle.engine.close().await;
            }

            match step {
                AcquireStep::Acquired(engine, id) => {
                    debug!(handle_id = id, "Engine acquired from pool");
                    return Ok((engine, id));
                }
                AcquireStep::Launch => match self.launcher.launch().await {
                    Ok(engine) => {
                        let mut state = self.state.lock().await;
                        state.launching -= 1;
                        let mut handle = state.new_handle(engine);
                        handle.mark_used();
                        let engine = Arc::clone(&handle.engine);
                        let id = handle.id;
                        state.busy.insert(id, handle);
                        state.update_peak();
                        if waited {
                            state.record_wait(started.elapsed());
                        }
                        debug!(handle_id = id, total = state.live(), "Launched engine on demand");
                        return Ok((engine, id));
                    }
                    Err(e) => {
                        let mut state = self.state.lock().await;
                        state.launching -= 1;
                        return Err(PoolError::Launch(e));
                    }
                },
                AcquireStep::Wait => {
                    // At the maximum with nothing warm: signal a gated
                    // scale-up (a no-op while total stays at max) and wait
                    // for a release until the deadline runs out.
                    self.scale_up_check().await;

                    if started.elapsed() >= self.config.acquire_timeout {
                        let mut state = self.state.lock().await;
                        state.record_wait(started.elapsed());
                        warn!(
                            waited_ms = started.elapsed().as_millis() as u64,
                            busy = state.busy.len(),
                            "Engine pool exhausted"
                        );
                        return Err(PoolError::Exhausted(self.config.acquire_timeout));
                    }

                    waited = true;
                    tokio::time::sleep(self.config.acquire_poll_interval).await;
                }
            }
        }
    }

    /// Returns an engine to the pool. Expired engines are closed instead of
    /// re-entering `available`; the drop in capacity is made up on demand.
    pub async fn release(&self, id: u64) {
        let retire = {
            let mut state = self.state.lock().await;
            match state.busy.remove(&id) {
                Some(handle) if state.shutting_down || handle.expired(&self.config) => Some(handle),
                Some(handle) => {
                    state.available.push_back(handle);
                    None
                }
                None => {
                    warn!(handle_id = id, "Release for unknown engine handle");
                    None
                }
            }
        };

        if let Some(handle) = retire {
            debug!(
                handle_id = handle.id,
                uses = handle.usage_count,
                "Retiring engine on release"
            );
            handle.engine.close().await;
        }
    }

    /// Launches one extra engine in response to contention.
    ///
    /// At most one scale-up is attempted per `min_scale_interval`; failures
    /// are logged, never propagated to the acquirer that signalled them.
    pub async fn scale_up_check(&self) {
        let should_launch = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let gate_open = state
                .scale_up_gate
                .map_or(true, |t| now.duration_since(t) >= self.config.min_scale_interval);
            if state.shutting_down || !gate_open || state.total() >= self.config.max_instances {
                false
            } else {
                state.launching += 1;
                state.scale_up_gate = Some(now);
                true
            }
        };

        if !should_launch {
            return;
        }

        match self.launcher.launch().await {
            Ok(engine) => {
                let mut state = self.state.lock().await;
                state.launching -= 1;
                let handle = state.new_handle(engine);
                let id = handle.id;
                state.available.push_back(handle);
                state.scale_up_events += 1;
                state.last_scale_up = Some(Utc::now());
                state.update_peak();
                info!(
                    handle_id = id,
                    total = state.live(),
                    events = state.scale_up_events,
                    "Scaled up engine pool"
                );
            }
            Err(e) => {
                let mut state = self.state.lock().await;
                state.launching -= 1;
                warn!(error = %e, "Scale-up launch failed");
            }
        }
    }

    /// Retires one idle engine above the minimum.
    ///
    /// Invoked periodically by the housekeeper; gated to one scale-down per
    /// `min_scale_interval`.
    pub async fn scale_down_check(&self) {
        let retire = {
            let mut state = self.state.lock().await;
            if state.shutting_down {
                return;
            }
            let now = Instant::now();
            let gate_open = state
                .scale_down_gate
                .map_or(true, |t| now.duration_since(t) >= self.config.min_scale_interval);
            if !gate_open || state.total() <= self.config.min_instances {
                None
            } else if let Some(pos) = state
                .available
                .iter()
                .position(|h| h.last_used.elapsed() >= self.config.scale_down_idle)
            {
                let handle = state.available.remove(pos);
                if handle.is_some() {
                    state.scale_down_gate = Some(now);
                    state.scale_down_events += 1;
                    state.last_scale_down = Some(Utc::now());
                }
                handle
            } else {
                None
            }
        };

        if let Some(handle) = retire {
            info!(
                handle_id = handle.id,
                idle_secs = handle.last_used.elapsed().as_secs(),
                "Scaling down idle engine"
            );
            handle.engine.close().await;
        }
    }

    /// Closes every engine and refuses further acquires. Idempotent.
    pub async fn shutdown(&self) {
        let handles = {
            let mut state = self.state.lock().await;
            state.shutting_down = true;
            let mut handles: Vec<EngineHandle> = state.available.drain(..).collect();
            handles.extend(state.busy.drain().map(|(_, handle)| handle));
            handles
        };

        if handles.is_empty() {
            return;
        }

        info!(count = handles.len(), "Shutting down engine pool");
        for handle in handles {
            handle.engine.close().await;
        }
    }

    pub async fn stats(&self) -> PoolStats {
        let state = self.state.lock().await;
        let average_wait_time = if state.wait_count > 0 {
            state.total_wait.as_secs_f64() / state.wait_count as f64
        } else {
            0.0
        };

        PoolStats {
            current_instances: state.live(),
            available_instances: state.available.len(),
            busy_instances: state.busy.len(),
            min_instances: self.config.min_instances,
            max_instances: self.config.max_instances,
            peak_instances: state.peak_instances,
            scale_up_events: state.scale_up_events,
            scale_down_events: state.scale_down_events,
            average_wait_time,
            last_scale_up: state.last_scale_up,
            last_scale_down: state.last_scale_down,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct StubEngine {
        closed: AtomicBool,
    }

    #[async_trait]
    impl RenderEngine for StubEngine {
        async fn render_pdf(&self, _url: &str, _output: &Path) -> anyhow::Result<()> {
            Ok(())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct StubLauncher {
        launched: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl EngineLauncher for StubLauncher {
        async fn launch(&self) -> anyhow::Result<Arc<dyn RenderEngine>> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("launch refused");
            }
            self.launched.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(StubEngine::default()))
        }
    }

    fn fast_config() -> PoolConfig {
        PoolConfig {
            min_instances: 0,
            max_instances: 2,
            acquire_timeout: Duration::from_millis(200),
            acquire_poll_interval: Duration::from_millis(10),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn pool_starts_empty_and_fills_on_demand() {
        let launcher = Arc::new(StubLauncher::default());
        let config = PoolConfig {
            min_instances: 3,
            max_instances: 20,
            ..Default::default()
        };
        let pool = EnginePool::new(launcher.clone(), config);

        let stats = pool.stats().await;
        assert_eq!(stats.current_instances, 0);
        assert_eq!(launcher.launched.load(Ordering::SeqCst), 0);

        let (_, _id) = pool.acquire().await.unwrap();
        let stats = pool.stats().await;
        assert_eq!(stats.busy_instances, 1);
        assert_eq!(stats.peak_instances, 1);
        assert_eq!(launcher.launched.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn acquire_serves_oldest_warm_engine_first() {
        let launcher = Arc::new(StubLauncher::default());
        let config = PoolConfig {
            max_instances: 4,
            ..fast_config()
        };
        let pool = EnginePool::new(launcher.clone(), config);

        let (_, first) = pool.acquire().await.unwrap();
        let (_, second) = pool.acquire().await.unwrap();
        assert!(first < second);

        // Released in creation order, so the oldest sits at the front.
        pool.release(first).await;
        pool.release(second).await;

        let (_, next) = pool.acquire().await.unwrap();
        assert_eq!(next, first, "oldest warm engine must be served first");
        assert_eq!(launcher.launched.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn release_makes_engine_reusable_without_relaunch() {
        let launcher = Arc::new(StubLauncher::default());
        let pool = EnginePool::new(launcher.clone(), fast_config());

        let (_, id) = pool.acquire().await.unwrap();
        pool.release(id).await;

        let stats = pool.stats().await;
        assert_eq!(stats.available_instances, 1);
        assert_eq!(stats.busy_instances, 0);

        let (_, id2) = pool.acquire().await.unwrap();
        assert_eq!(id, id2);
        assert_eq!(launcher.launched.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn serial_reuse_retires_engine_at_use_cap() {
        let launcher = Arc::new(StubLauncher::default());
        let config = PoolConfig {
            max_instances: 20,
            ..fast_config()
        };
        let pool = EnginePool::new(launcher.clone(), config);

        // Three serial renders all land on the same engine.
        let mut first_engine = None;
        for _ in 0..3 {
            let (_, id) = pool.acquire().await.unwrap();
            let first = *first_engine.get_or_insert(id);
            assert_eq!(id, first);
            pool.release(id).await;
        }

        // The third release hit max_uses, so the engine is gone.
        let stats = pool.stats().await;
        assert_eq!(stats.current_instances, 0);

        // A fourth render runs on a freshly launched engine.
        let (_, id) = pool.acquire().await.unwrap();
        assert_ne!(Some(id), first_engine);
        assert_eq!(launcher.launched.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cold_start_launch_is_not_a_scale_up() {
        let launcher = Arc::new(StubLauncher::default());
        let pool = EnginePool::new(launcher.clone(), fast_config());

        // An uncontended acquire on an empty pool creates an engine through
        // the direct below-max path; only the explicit scale-up check may
        // bump the event counter.
        let (_, _id) = pool.acquire().await.unwrap();

        let stats = pool.stats().await;
        assert_eq!(stats.busy_instances, 1);
        assert_eq!(stats.scale_up_events, 0);
        assert!(stats.last_scale_up.is_none());
        assert_eq!(launcher.launched.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn acquire_times_out_when_max_busy() {
        let launcher = Arc::new(StubLauncher::default());
        let config = PoolConfig {
            max_instances: 1,
            ..fast_config()
        };
        let pool = EnginePool::new(launcher, config);

        let (_, _held) = pool.acquire().await.unwrap();
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, PoolError::Exhausted(_)));

        let stats = pool.stats().await;
        assert!(stats.average_wait_time > 0.0);
    }

    #[tokio::test]
    async fn waiter_gets_engine_released_by_peer() {
        let launcher = Arc::new(StubLauncher::default());
        let config = PoolConfig {
            max_instances: 1,
            acquire_timeout: Duration::from_secs(2),
            ..fast_config()
        };
        let pool = Arc::new(EnginePool::new(launcher.clone(), config));

        let (_, held) = pool.acquire().await.unwrap();

        let releaser = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                pool.release(held).await;
            })
        };

        let (_, id) = pool.acquire().await.unwrap();
        assert_eq!(id, held);
        assert_eq!(launcher.launched.load(Ordering::SeqCst), 1);
        releaser.await.unwrap();
    }

    #[tokio::test]
    async fn expired_engine_is_retired_on_release() {
        let launcher = Arc::new(StubLauncher::default());
        let config = PoolConfig {
            max_uses: 1,
            max_instances: 4,
            ..fast_config()
        };
        let pool = EnginePool::new(launcher.clone(), config);

        let (_, id) = pool.acquire().await.unwrap();
        pool.release(id).await;

        let stats = pool.stats().await;
        assert_eq!(stats.current_instances, 0, "spent engine must not return");

        // The next acquire has to launch a replacement.
        let (_, id2) = pool.acquire().await.unwrap();
        assert_ne!(id, id2);
        assert_eq!(launcher.launched.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn scale_up_is_gated_by_interval() {
        let launcher = Arc::new(StubLauncher::default());
        let pool = EnginePool::new(launcher.clone(), fast_config());

        pool.scale_up_check().await;
        pool.scale_up_check().await;

        let stats = pool.stats().await;
        assert_eq!(stats.scale_up_events, 1);
        assert_eq!(stats.available_instances, 1);
    }

    #[tokio::test]
    async fn scale_down_retires_idle_engine_above_minimum() {
        let launcher = Arc::new(StubLauncher::default());
        let config = PoolConfig {
            scale_down_idle: Duration::from_millis(20),
            ..fast_config()
        };
        let pool = EnginePool::new(launcher, config);

        pool.scale_up_check().await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        pool.scale_down_check().await;

        let stats = pool.stats().await;
        assert_eq!(stats.scale_down_events, 1);
        assert_eq!(stats.current_instances, 0);
        assert!(stats.last_scale_down.is_some());
    }

    #[tokio::test]
    async fn scale_down_never_drops_below_minimum() {
        let launcher = Arc::new(StubLauncher::default());
        let config = PoolConfig {
            min_instances: 1,
            max_instances: 2,
            scale_down_idle: Duration::from_millis(10),
            ..Default::default()
        };
        let pool = EnginePool::new(launcher, config);

        let (_, id) = pool.acquire().await.unwrap();
        pool.release(id).await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        pool.scale_down_check().await;

        let stats = pool.stats().await;
        assert_eq!(stats.current_instances, 1);
        assert_eq!(stats.scale_down_events, 0);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_closes_everything() {
        let launcher = Arc::new(StubLauncher::default());
        let config = PoolConfig {
            max_instances: 4,
            ..fast_config()
        };
        let pool = EnginePool::new(launcher, config);

        // One engine out with a worker, one warm in the pool.
        let (_, held) = pool.acquire().await.unwrap();
        let (_, released) = pool.acquire().await.unwrap();
        pool.release(released).await;
        let _ = held;

        pool.shutdown().await;
        let stats = pool.stats().await;
        assert_eq!(stats.current_instances, 0);

        // Second call is a no-op, and acquires are refused.
        pool.shutdown().await;
        assert!(matches!(pool.acquire().await, Err(PoolError::Closed)));
    }

    #[tokio::test]
    async fn launch_failure_propagates_out_of_acquire() {
        let launcher = Arc::new(StubLauncher::default());
        launcher.fail.store(true, Ordering::SeqCst);
        let pool = EnginePool::new(launcher, fast_config());

        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, PoolError::Launch(_)));
    }
}
