//! Trace Registry
//!
//! Keeps one loaded [`TraceModel`] per trace URL for as long as some active
//! client references it. Client activity and time are injected so sweeping
//! can be driven deterministically.

use crate::backend::{ProgressCallback, TraceBackend};
use crate::cache::DEFAULT_RENDER_CACHE_BYTES;
use crate::config::TraceScopeConfig;
use crate::error::TraceError;
use crate::model::TraceModel;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Source of the ids of clients that are still attached.
pub trait ClientLiveness: Send + Sync {
    fn active_clients(&self) -> HashSet<String>;
}

impl<F> ClientLiveness for F
where
    F: Fn() -> HashSet<String> + Send + Sync,
{
    fn active_clients(&self) -> HashSet<String> {
        self()
    }
}

/// Monotonic clock used to pace sweeps.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

type LoadCell = Arc<OnceCell<Arc<TraceModel>>>;

#[derive(Default)]
struct RegistryState {
    traces: HashMap<String, LoadCell>,
    /// client id -> trace url it has open
    clients: HashMap<String, String>,
}

/// Loaded traces keyed by URL, with liveness-based eviction.
pub struct TraceRegistry {
    state: Mutex<RegistryState>,
    liveness: Arc<dyn ClientLiveness>,
    clock: Arc<dyn Clock>,
    sweep_interval: Duration,
    last_sweep: Mutex<Option<Instant>>,
    cache_bytes: usize,
}

impl TraceRegistry {
    pub fn new(
        liveness: Arc<dyn ClientLiveness>,
        clock: Arc<dyn Clock>,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            liveness,
            clock,
            sweep_interval,
            last_sweep: Mutex::new(None),
            cache_bytes: DEFAULT_RENDER_CACHE_BYTES,
        }
    }

    /// Registry configured from [`TraceScopeConfig`], using the system clock.
    pub fn from_config(config: &TraceScopeConfig, liveness: Arc<dyn ClientLiveness>) -> Self {
        Self::new(liveness, Arc::new(SystemClock), config.sweep_interval())
            .with_cache_bytes(config.render_cache_bytes)
    }

    /// Render cache budget for traces loaded from now on.
    pub fn with_cache_bytes(mut self, cache_bytes: usize) -> Self {
        self.cache_bytes = cache_bytes;
        self
    }

    /// Load the trace at `trace_url` for `client_id`, reusing an already
    /// loaded (or loading) model for the same URL.
    ///
    /// A failed load is not cached; the next call retries.
    pub async fn load_trace(
        &self,
        client_id: &str,
        trace_url: &str,
        backend: Arc<dyn TraceBackend>,
        progress: ProgressCallback,
    ) -> Result<Arc<TraceModel>, TraceError> {
        let cell = {
            let mut state = self.state.lock();
            state
                .clients
                .insert(client_id.to_string(), trace_url.to_string());
            Arc::clone(state.traces.entry(trace_url.to_string()).or_default())
        };

        let cache_bytes = self.cache_bytes;
        let model = cell
            .get_or_try_init(|| async move {
                info!(trace = %trace_url, client = %client_id, "Loading trace into registry");
                TraceModel::load_with_cache(backend, progress, cache_bytes)
                    .await
                    .map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(model))
    }

    /// Already loaded model for a URL.
    pub fn get(&self, trace_url: &str) -> Option<Arc<TraceModel>> {
        let state = self.state.lock();
        state.traces.get(trace_url)?.get().cloned()
    }

    /// Trace URL a client has open.
    pub fn trace_for_client(&self, client_id: &str) -> Option<String> {
        self.state.lock().clients.get(client_id).cloned()
    }

    /// URLs of every registered trace, sorted.
    pub fn trace_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.state.lock().traces.keys().cloned().collect();
        urls.sort();
        urls
    }

    /// Sweep if at least one sweep interval has passed since the last one.
    /// Returns whether a sweep ran.
    pub fn maybe_sweep(&self) -> bool {
        let now = self.clock.now();
        {
            let mut last_sweep = self.last_sweep.lock();
            if let Some(last) = *last_sweep {
                if now.saturating_duration_since(last) < self.sweep_interval {
                    return false;
                }
            }
            *last_sweep = Some(now);
        }
        self.sweep();
        true
    }

    /// Forget detached clients, then drop every trace no remaining client
    /// references. Returns the evicted URLs.
    pub fn sweep(&self) -> Vec<String> {
        let active = self.liveness.active_clients();
        let mut state = self.state.lock();
        state.clients.retain(|client, _| active.contains(client));
        let referenced: HashSet<String> = state.clients.values().cloned().collect();

        let mut evicted: Vec<String> = state
            .traces
            .keys()
            .filter(|url| !referenced.contains(*url))
            .cloned()
            .collect();
        evicted.sort();
        for url in &evicted {
            if let Some(cell) = state.traces.remove(url) {
                if let Some(model) = cell.get() {
                    model.storage().render_cache().clear();
                }
            }
        }
        if evicted.is_empty() {
            debug!(clients = state.clients.len(), "Registry sweep evicted nothing");
        } else {
            info!(evicted = ?evicted, remaining = state.traces.len(), "Evicted unreferenced traces");
        }
        evicted
    }
}
