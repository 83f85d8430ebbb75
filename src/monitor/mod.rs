//! Polling orchestration over one daemon connection.
//!
//! The [`Fetcher`] is the facade presentation layers consume. Each refresh
//! lists containers, samples statistics for a bounded number of running ones
//! with bounded concurrency, and aggregates a [`MetricsSnapshot`]. Refreshes
//! inside the minimum interval are served from cache, and failures pass
//! through a [`FailureGate`] that can mask a single blip behind the last good
//! result.

mod gate;
mod metrics;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures_util::{StreamExt, stream};
use serde::Serialize;
use tokio::time::Instant;

pub use self::gate::{DEFAULT_FAILURE_THRESHOLD, FailureGate};
pub use self::metrics::{HealthStatus, MetricsSnapshot, aggregate};
use crate::engine::{ContainerApi, ContainerRecord, ContainerState, ContainerStatsSample, RemoveOptions};
use crate::error::DaemonResult;

/// Tunables for a [`Fetcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetcherSettings {
    /// Refreshes closer together than this are served from cache.
    pub min_interval: Duration,
    /// Most running containers sampled per refresh.
    pub max_stats_containers: usize,
    /// Most statistics requests in flight at once.
    pub stats_concurrency: usize,
    /// Consecutive failures masked before surfacing.
    pub failure_threshold: u32,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(2),
            max_stats_containers: 10,
            stats_concurrency: 10,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

/// Outcome of one refresh: either entirely fresh or entirely the prior
/// cached value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResult {
    /// Containers as listed.
    pub containers: Vec<ContainerRecord>,
    /// Samples for the running containers that were sampled.
    pub stats_by_container_id: HashMap<String, ContainerStatsSample>,
    /// Totals over the refresh.
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Default)]
struct FetchState {
    last_completed: Option<Instant>,
    cached: Option<FetchResult>,
}

/// Rate-limited, failure-gated access to one daemon.
#[derive(Debug)]
pub struct Fetcher<A> {
    api: A,
    settings: FetcherSettings,
    gate: FailureGate,
    refresh: tokio::sync::Mutex<()>,
    state: Mutex<FetchState>,
}

impl<A: ContainerApi> Fetcher<A> {
    /// Create a fetcher over `api`.
    #[must_use]
    pub fn new(api: A, settings: FetcherSettings) -> Self {
        Self {
            api,
            settings,
            gate: FailureGate::new(settings.failure_threshold),
            refresh: tokio::sync::Mutex::new(()),
            state: Mutex::new(FetchState::default()),
        }
    }

    /// The underlying API.
    #[must_use]
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// The settings in use.
    #[must_use]
    pub const fn settings(&self) -> &FetcherSettings {
        &self.settings
    }

    /// The failure gate guarding refreshes.
    #[must_use]
    pub const fn gate(&self) -> &FailureGate {
        &self.gate
    }

    /// Refresh containers and, if `include_stats`, their statistics.
    ///
    /// Concurrent calls are serialised. A call within the minimum interval of
    /// the last completed refresh, successful or not, returns the cached
    /// result without contacting the daemon, whatever its arguments.
    ///
    /// # Errors
    ///
    /// Returns the listing error when the failure gate surfaces it or there
    /// is no cached result to fall back on. Statistics failures for single
    /// containers are logged and omitted, never returned.
    pub async fn fetch(&self, include_stats: bool, all: bool) -> DaemonResult<FetchResult> {
        let _refresh = self.refresh.lock().await;
        if let Some(cached) = self.fresh_cached() {
            tracing::debug!("serving rate-limited refresh from cache");
            return Ok(cached);
        }

        let outcome = self.collect(include_stats, all).await;
        self.lock_state().last_completed = Some(Instant::now());
        match outcome {
            Ok(result) => {
                self.gate.record_success();
                self.lock_state().cached = Some(result.clone());
                Ok(result)
            }
            Err(error) => {
                let prior = self.cached();
                if self.gate.should_surface(prior.is_some()) {
                    return Err(error);
                }
                match prior {
                    Some(cached) => {
                        tracing::warn!(error = %error, "refresh failed, serving cached result");
                        Ok(cached)
                    }
                    None => Err(error),
                }
            }
        }
    }

    /// The last successful result, if any, regardless of age.
    #[must_use]
    pub fn cached(&self) -> Option<FetchResult> {
        self.lock_state().cached.clone()
    }

    /// Make the next [`fetch`](Self::fetch) contact the daemon even inside
    /// the minimum interval. The cached result stays available as fallback.
    pub fn invalidate(&self) {
        self.lock_state().last_completed = None;
    }

    /// Check the daemon answers.
    ///
    /// # Errors
    ///
    /// Returns the ping failure.
    pub async fn test_connection(&self) -> DaemonResult<()> {
        self.api.ping().await
    }

    /// Start a container.
    ///
    /// # Errors
    ///
    /// Returns the daemon's failure unchanged.
    pub async fn start(&self, container_id: &str) -> DaemonResult<()> {
        self.api.start(container_id).await
    }

    /// Stop a container.
    ///
    /// # Errors
    ///
    /// Returns the daemon's failure unchanged.
    pub async fn stop(&self, container_id: &str, timeout: Option<u32>) -> DaemonResult<()> {
        self.api.stop(container_id, timeout).await
    }

    /// Restart a container.
    ///
    /// # Errors
    ///
    /// Returns the daemon's failure unchanged.
    pub async fn restart(&self, container_id: &str, timeout: Option<u32>) -> DaemonResult<()> {
        self.api.restart(container_id, timeout).await
    }

    /// Remove a container.
    ///
    /// # Errors
    ///
    /// Returns the daemon's failure unchanged.
    pub async fn remove(&self, container_id: &str, options: RemoveOptions) -> DaemonResult<()> {
        self.api.remove(container_id, options).await
    }

    fn fresh_cached(&self) -> Option<FetchResult> {
        let state = self.lock_state();
        let last = state.last_completed?;
        (last.elapsed() < self.settings.min_interval)
            .then(|| state.cached.clone())
            .flatten()
    }

    async fn collect(&self, include_stats: bool, all: bool) -> DaemonResult<FetchResult> {
        let containers = self.api.list_containers(all).await?;
        let stats_by_container_id = if include_stats {
            self.collect_stats(&containers).await
        } else {
            HashMap::new()
        };
        let metrics = aggregate(&containers, &stats_by_container_id, Utc::now());
        Ok(FetchResult {
            containers,
            stats_by_container_id,
            metrics,
        })
    }

    async fn collect_stats(
        &self,
        containers: &[ContainerRecord],
    ) -> HashMap<String, ContainerStatsSample> {
        let running = containers
            .iter()
            .filter(|container| container.state == ContainerState::Running)
            .map(|container| container.id.as_str())
            .take(self.settings.max_stats_containers);

        stream::iter(running)
            .map(|container_id| async move { (container_id, self.api.get_stats(container_id).await) })
            .buffer_unordered(self.settings.stats_concurrency.max(1))
            .filter_map(|(container_id, result)| async move {
                match result {
                    Ok(sample) => Some((container_id.to_owned(), sample)),
                    Err(error) => {
                        tracing::warn!(
                            container_id = %container_id,
                            error = %error,
                            "skipping statistics for container"
                        );
                        None
                    }
                }
            })
            .collect()
            .await
    }

    fn lock_state(&self) -> MutexGuard<'_, FetchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
