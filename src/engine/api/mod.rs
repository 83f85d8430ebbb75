//! Daemon API client.
//!
//! [`DaemonClient`] maps container operations onto HTTP requests against a
//! versioned daemon API, sent over a single lazily established transport.
//! Requests are serialised by a client-level lock, so at most one transport
//! exists at a time. When a request fails on a reused connection with a
//! connection-level error, the client tears the transport down, opens a new
//! one, and retries exactly once.

mod logs;
mod models;
mod stats;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use chrono::Utc;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

pub use self::logs::{LogFrame, LogStream, MULTIPLEXED_CONTENT_TYPE, decode_log_body, demux_frames, looks_multiplexed};
pub use self::models::{
    ContainerDetails, ContainerRecord, ContainerState, DaemonInfo, InspectConfig, InspectHealth,
    InspectState, PortMapping, StateBucket,
};
pub use self::stats::{ContainerStatsSample, cpu_percent, decode_stats, memory_percent};
use crate::engine::http::{self, HttpRequest, HttpResponse};
use crate::engine::transport::{Transport, TransportProvider};
use crate::error::{DaemonError, DaemonResult};

/// Boxed future type returned by [`ContainerApi`] implementors.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = DaemonResult<T>> + Send + 'a>>;

/// Daemon API version baked into every request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApiVersion {
    major: u32,
    minor: u32,
}

impl ApiVersion {
    /// Version used when none is configured.
    pub const DEFAULT: Self = Self::new(1, 43);

    /// Version `v{major}.{minor}`.
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse `v1.43` or `1.43`.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::InvalidConfiguration` for anything else.
    pub fn parse(value: &str) -> DaemonResult<Self> {
        let trimmed = value.trim();
        let digits = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let parsed = digits.split_once('.').and_then(|(major, minor)| {
            Some(Self {
                major: major.parse().ok()?,
                minor: minor.parse().ok()?,
            })
        });
        parsed.ok_or_else(|| {
            DaemonError::invalid_configuration(format!(
                "invalid API version '{value}': expected a form like v1.43"
            ))
        })
    }
}

impl Default for ApiVersion {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}", self.major, self.minor)
    }
}

impl FromStr for ApiVersion {
    type Err = DaemonError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

/// Options for fetching container logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Only return this many trailing lines.
    pub tail: Option<u32>,
    /// Prefix each line with its timestamp.
    pub timestamps: bool,
}

/// Options for removing a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Kill the container first if it is running.
    pub force: bool,
    /// Also remove anonymous volumes.
    pub volumes: bool,
}

/// The daemon operations the fetcher and its callers depend on.
///
/// Implemented by [`DaemonClient`]; tests substitute mocks.
pub trait ContainerApi: Send + Sync {
    /// Check the daemon answers.
    fn ping(&self) -> ApiFuture<'_, ()>;

    /// List containers, including stopped ones when `all` is set.
    fn list_containers(&self, all: bool) -> ApiFuture<'_, Vec<ContainerRecord>>;

    /// Take one statistics sample for a container.
    fn get_stats(&self, container_id: &str) -> ApiFuture<'_, ContainerStatsSample>;

    /// Start a container.
    fn start(&self, container_id: &str) -> ApiFuture<'_, ()>;

    /// Stop a container, waiting `timeout` seconds before killing it.
    fn stop(&self, container_id: &str, timeout: Option<u32>) -> ApiFuture<'_, ()>;

    /// Restart a container.
    fn restart(&self, container_id: &str, timeout: Option<u32>) -> ApiFuture<'_, ()>;

    /// Remove a container.
    fn remove(&self, container_id: &str, options: RemoveOptions) -> ApiFuture<'_, ()>;
}

/// Client for one daemon connection.
pub struct DaemonClient {
    provider: Box<dyn TransportProvider>,
    api_version: ApiVersion,
    transport: Mutex<Option<Box<dyn Transport>>>,
}

impl fmt::Debug for DaemonClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaemonClient")
            .field("api_version", &self.api_version)
            .field("host", &self.provider.host_header())
            .finish_non_exhaustive()
    }
}

impl DaemonClient {
    /// Create a client that opens transports through `provider`.
    ///
    /// No connection is made until the first request.
    #[must_use]
    pub fn new(provider: Box<dyn TransportProvider>, api_version: ApiVersion) -> Self {
        Self {
            provider,
            api_version,
            transport: Mutex::new(None),
        }
    }

    /// The API version in use.
    #[must_use]
    pub const fn api_version(&self) -> &ApiVersion {
        &self.api_version
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Check the daemon answers `GET /_ping` with 200.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::ConnectionFailed` for any other status, and
    /// transport errors as they occur.
    pub async fn ping(&self) -> DaemonResult<()> {
        let response = self.execute(HttpRequest::get(self.endpoint("_ping"))).await?;
        if response.status_code() == 200 {
            Ok(())
        } else {
            Err(DaemonError::connection(format!(
                "ping answered with HTTP {}",
                response.status_code()
            )))
        }
    }

    /// List containers.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::DecodingError` when the listing is malformed,
    /// mapped status errors, and transport errors.
    pub async fn list_containers(&self, all: bool) -> DaemonResult<Vec<ContainerRecord>> {
        let path = self.endpoint(&format!("containers/json?all={all}"));
        let response = self.call(HttpRequest::get(path), &[200]).await?;
        decode_json(response.body())
    }

    /// Inspect one container.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::NotFound` for an unknown container,
    /// `DaemonError::InvalidConfiguration` for an unusable id, and as for
    /// [`Self::list_containers`].
    pub async fn get_container(&self, container_id: &str) -> DaemonResult<ContainerDetails> {
        let id = validate_container_id(container_id)?;
        let response = self
            .call(HttpRequest::get(self.endpoint(&format!("containers/{id}/json"))), &[200])
            .await?;
        decode_json(response.body())
    }

    /// Take one statistics sample.
    ///
    /// # Errors
    ///
    /// As for [`Self::get_container`].
    pub async fn get_stats(&self, container_id: &str) -> DaemonResult<ContainerStatsSample> {
        let id = validate_container_id(container_id)?;
        let response = self
            .call(
                HttpRequest::get(self.endpoint(&format!("containers/{id}/stats?stream=false"))),
                &[200],
            )
            .await?;
        let raw: bollard::models::ContainerStatsResponse = decode_json(response.body())?;
        Ok(decode_stats(id, &raw, Utc::now()))
    }

    /// Start a container; starting a running container succeeds.
    ///
    /// # Errors
    ///
    /// Mapped status errors and transport errors.
    pub async fn start(&self, container_id: &str) -> DaemonResult<()> {
        let id = validate_container_id(container_id)?;
        self.call(HttpRequest::post(self.endpoint(&format!("containers/{id}/start"))), &[204, 304])
            .await
            .map(drop)
    }

    /// Stop a container; stopping a stopped container succeeds.
    ///
    /// # Errors
    ///
    /// Mapped status errors and transport errors.
    pub async fn stop(&self, container_id: &str, timeout: Option<u32>) -> DaemonResult<()> {
        let id = validate_container_id(container_id)?;
        let path = format!("containers/{id}/stop{}", timeout_query(timeout));
        self.call(HttpRequest::post(self.endpoint(&path)), &[204, 304])
            .await
            .map(drop)
    }

    /// Restart a container.
    ///
    /// # Errors
    ///
    /// Mapped status errors and transport errors.
    pub async fn restart(&self, container_id: &str, timeout: Option<u32>) -> DaemonResult<()> {
        let id = validate_container_id(container_id)?;
        let path = format!("containers/{id}/restart{}", timeout_query(timeout));
        self.call(HttpRequest::post(self.endpoint(&path)), &[204])
            .await
            .map(drop)
    }

    /// Remove a container.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::Conflict` when the container is running and
    /// `force` is not set, other mapped status errors, and transport errors.
    pub async fn remove(&self, container_id: &str, options: RemoveOptions) -> DaemonResult<()> {
        let id = validate_container_id(container_id)?;
        let path = format!(
            "containers/{id}?force={}&v={}",
            options.force, options.volumes
        );
        self.call(HttpRequest::delete(self.endpoint(&path)), &[204])
            .await
            .map(drop)
    }

    /// Fetch a container's stdout and stderr as text.
    ///
    /// # Errors
    ///
    /// As for [`Self::get_container`].
    pub async fn get_logs(&self, container_id: &str, options: LogOptions) -> DaemonResult<String> {
        let id = validate_container_id(container_id)?;
        let mut path = format!("containers/{id}/logs?stdout=true&stderr=true");
        if let Some(tail) = options.tail {
            path.push_str(&format!("&tail={tail}"));
        }
        if options.timestamps {
            path.push_str("&timestamps=true");
        }
        let response = self.call(HttpRequest::get(self.endpoint(&path)), &[200]).await?;
        Ok(decode_log_body(response.header("content-type"), response.body()))
    }

    /// Fetch daemon-wide information.
    ///
    /// # Errors
    ///
    /// As for [`Self::list_containers`].
    pub async fn get_system_info(&self) -> DaemonResult<DaemonInfo> {
        let response = self.call(HttpRequest::get(self.endpoint("info")), &[200]).await?;
        decode_json(response.body())
    }

    /// Close the transport and release provider resources such as an SSH
    /// tunnel. The client reconnects on its next request.
    pub async fn close(&self) {
        let mut slot = self.transport.lock().await;
        Self::teardown(&mut slot).await;
        self.provider.shutdown();
    }

    // =========================================================================
    // Request plumbing
    // =========================================================================

    fn endpoint(&self, path: &str) -> String {
        format!("/{}/{path}", self.api_version)
    }

    async fn call(&self, request: HttpRequest, allowed: &[u16]) -> DaemonResult<HttpResponse> {
        let response = self.execute(request).await?;
        check_status(response, allowed)
    }

    /// Send a request, reconnecting once if a reused transport turns out to
    /// be stale.
    async fn execute(&self, request: HttpRequest) -> DaemonResult<HttpResponse> {
        let mut slot = self.transport.lock().await;
        let reused = slot.is_some();
        match self.exchange(&mut slot, &request).await {
            Err(error) if reused && error.is_connection_failure() => {
                tracing::debug!(error = %error, "daemon connection went stale, reconnecting");
                self.exchange(&mut slot, &request).await
            }
            other => other,
        }
    }

    /// The transport leaves the slot for the duration of the round trip and
    /// only returns after a complete keep-alive response. A cancelled
    /// exchange drops it along with any unread response bytes.
    async fn exchange(
        &self,
        slot: &mut Option<Box<dyn Transport>>,
        request: &HttpRequest,
    ) -> DaemonResult<HttpResponse> {
        if slot.is_none() {
            let opened = self.provider.open().await?;
            tracing::debug!(host = self.provider.host_header(), "established daemon connection");
            *slot = Some(opened);
        }
        let mut transport = slot
            .take()
            .ok_or_else(|| DaemonError::connection("no transport available"))?;

        let result = http::round_trip(transport.as_mut(), request, self.provider.host_header()).await;
        if result.as_ref().is_ok_and(HttpResponse::keeps_alive) {
            *slot = Some(transport);
        } else if let Err(error) = transport.disconnect().await {
            tracing::debug!(error = %error, "error while closing daemon transport");
        }
        result
    }

    async fn teardown(slot: &mut Option<Box<dyn Transport>>) {
        if let Some(mut transport) = slot.take()
            && let Err(error) = transport.disconnect().await
        {
            tracing::debug!(error = %error, "error while closing daemon transport");
        }
    }
}

impl ContainerApi for DaemonClient {
    fn ping(&self) -> ApiFuture<'_, ()> {
        Box::pin(Self::ping(self))
    }

    fn list_containers(&self, all: bool) -> ApiFuture<'_, Vec<ContainerRecord>> {
        Box::pin(Self::list_containers(self, all))
    }

    fn get_stats(&self, container_id: &str) -> ApiFuture<'_, ContainerStatsSample> {
        let id = container_id.to_owned();
        Box::pin(async move { Self::get_stats(self, &id).await })
    }

    fn start(&self, container_id: &str) -> ApiFuture<'_, ()> {
        let id = container_id.to_owned();
        Box::pin(async move { Self::start(self, &id).await })
    }

    fn stop(&self, container_id: &str, timeout: Option<u32>) -> ApiFuture<'_, ()> {
        let id = container_id.to_owned();
        Box::pin(async move { Self::stop(self, &id, timeout).await })
    }

    fn restart(&self, container_id: &str, timeout: Option<u32>) -> ApiFuture<'_, ()> {
        let id = container_id.to_owned();
        Box::pin(async move { Self::restart(self, &id, timeout).await })
    }

    fn remove(&self, container_id: &str, options: RemoveOptions) -> ApiFuture<'_, ()> {
        let id = container_id.to_owned();
        Box::pin(async move { Self::remove(self, &id, options).await })
    }
}

/// Reject ids that would escape their path segment.
fn validate_container_id(container_id: &str) -> DaemonResult<&str> {
    let valid = container_id
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_alphanumeric())
        && container_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(container_id)
    } else {
        Err(DaemonError::invalid_configuration(format!(
            "invalid container id '{container_id}'"
        )))
    }
}

fn timeout_query(timeout: Option<u32>) -> String {
    timeout.map(|seconds| format!("?t={seconds}")).unwrap_or_default()
}

/// Map a status outside `allowed` onto a semantic error.
fn check_status(response: HttpResponse, allowed: &[u16]) -> DaemonResult<HttpResponse> {
    let code = response.status_code();
    if allowed.contains(&code) {
        return Ok(response);
    }
    Err(match code {
        401 => DaemonError::Unauthorized,
        404 => DaemonError::NotFound {
            message: daemon_message(&response),
        },
        409 => DaemonError::Conflict {
            message: daemon_message(&response),
        },
        500..=599 => DaemonError::ServerError {
            message: response.body_text(),
        },
        _ => DaemonError::UnexpectedStatus { code },
    })
}

/// The daemon's `{"message": ...}` explanation, or the raw body.
fn daemon_message(response: &HttpResponse) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        message: String,
    }

    serde_json::from_slice::<ErrorBody>(response.body())
        .map(|body| body.message)
        .unwrap_or_else(|_| response.body_text().trim().to_owned())
}

fn decode_json<T: DeserializeOwned>(body: &[u8]) -> DaemonResult<T> {
    serde_json::from_slice(body).map_err(|error| DaemonError::DecodingError {
        message: error.to_string(),
    })
}
