//! In-memory daemon whose listing can be switched to fail.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use containerbar::engine::api::ApiFuture;
use containerbar::engine::{ContainerApi, ContainerRecord, ContainerStatsSample, RemoveOptions};
use containerbar::error::DaemonError;
use serde_json::json;

/// Daemon double. Clones share their switches and counters.
#[derive(Debug, Clone, Default)]
pub struct FakeDaemon {
    running: usize,
    failing: Arc<AtomicBool>,
    list_calls: Arc<AtomicUsize>,
}

impl FakeDaemon {
    pub fn with_running(running: usize) -> Self {
        Self {
            running,
            ..Self::default()
        }
    }

    pub fn start_failing(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn listing(&self) -> Result<Vec<ContainerRecord>, DaemonError> {
        (0..self.running)
            .map(|n| {
                serde_json::from_value(json!({
                    "Id": format!("run{n}"),
                    "Names": [format!("/run{n}")],
                    "State": "running"
                }))
                .map_err(|e| DaemonError::InvalidResponse {
                    message: e.to_string(),
                })
            })
            .collect()
    }
}

fn unreachable_daemon() -> DaemonError {
    DaemonError::ConnectionFailed {
        message: String::from("connection reset by peer"),
    }
}

impl ContainerApi for FakeDaemon {
    fn ping(&self) -> ApiFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn list_containers(&self, _all: bool) -> ApiFuture<'_, Vec<ContainerRecord>> {
        Box::pin(async move {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(unreachable_daemon());
            }
            self.listing()
        })
    }

    fn get_stats(&self, _container_id: &str) -> ApiFuture<'_, ContainerStatsSample> {
        Box::pin(async { Err(unreachable_daemon()) })
    }

    fn start(&self, _container_id: &str) -> ApiFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn stop(&self, _container_id: &str, _timeout: Option<u32>) -> ApiFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn restart(&self, _container_id: &str, _timeout: Option<u32>) -> ApiFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn remove(&self, _container_id: &str, _options: RemoveOptions) -> ApiFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}
