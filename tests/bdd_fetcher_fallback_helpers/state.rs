//! Scenario state for fetcher fallback scenarios.

use std::sync::Arc;

use containerbar::monitor::Fetcher;
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;
use tokio::runtime::Runtime;

use super::fake_daemon::FakeDaemon;

/// Step result type for BDD tests.
pub type StepResult<T> = Result<T, String>;

/// What the most recent refresh returned.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// The refresh returned this many containers.
    Containers(usize),
    /// The refresh failed; `connection` records whether the daemon was
    /// unreachable.
    Failed { connection: bool, message: String },
}

/// State shared across fetcher fallback scenarios.
#[derive(Default, ScenarioState)]
pub struct FetcherFallbackState {
    /// Runtime driving the async fetcher.
    pub runtime: Slot<Arc<Runtime>>,
    /// Fake daemon backing the fetcher.
    pub daemon: Slot<FakeDaemon>,
    /// Fetcher under test.
    pub fetcher: Slot<Arc<Fetcher<FakeDaemon>>>,
    /// Outcome of the most recent refresh.
    pub outcome: Slot<RefreshOutcome>,
}

/// Fixture providing a fresh fetcher fallback state.
#[fixture]
pub fn fetcher_fallback_state() -> FetcherFallbackState {
    FetcherFallbackState::default()
}

impl FetcherFallbackState {
    /// Returns the runtime, or an error if it was not created.
    pub fn runtime(&self) -> StepResult<Arc<Runtime>> {
        self.runtime
            .get()
            .ok_or_else(|| String::from("runtime should be created"))
    }

    /// Returns the daemon, or an error if it was not created.
    pub fn daemon(&self) -> StepResult<FakeDaemon> {
        self.daemon
            .get()
            .ok_or_else(|| String::from("daemon should be created"))
    }

    /// Returns the fetcher, or an error if it was not created.
    pub fn fetcher(&self) -> StepResult<Arc<Fetcher<FakeDaemon>>> {
        self.fetcher
            .get()
            .ok_or_else(|| String::from("fetcher should be created"))
    }
}
