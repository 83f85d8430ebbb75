//! Given and When step definitions for fetcher fallback scenarios.

use std::sync::Arc;
use std::time::Duration;

use containerbar::error::DaemonError;
use containerbar::monitor::{Fetcher, FetcherSettings};
use rstest_bdd_macros::{given, when};

use super::fake_daemon::FakeDaemon;
use super::state::{FetcherFallbackState, RefreshOutcome, StepResult};

const WINDOW: Duration = Duration::from_secs(2);

fn paused_runtime() -> StepResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .map_err(|e| format!("failed to create tokio runtime: {e}"))
}

/// Run one refresh, optionally after advancing the paused clock.
fn refresh(state: &FetcherFallbackState, advance: Option<Duration>) -> StepResult<()> {
    let runtime = state.runtime()?;
    let fetcher = state.fetcher()?;
    let result = runtime.block_on(async {
        if let Some(step) = advance {
            tokio::time::advance(step).await;
        }
        fetcher.fetch(false, false).await
    });
    let outcome = match result {
        Ok(fetched) => RefreshOutcome::Containers(fetched.containers.len()),
        Err(error) => RefreshOutcome::Failed {
            connection: matches!(error, DaemonError::ConnectionFailed { .. }),
            message: error.to_string(),
        },
    };
    state.outcome.set(outcome);
    Ok(())
}

#[given("a daemon with {count} running containers")]
fn daemon_with_running(fetcher_fallback_state: &FetcherFallbackState, count: usize) -> StepResult<()> {
    let daemon = FakeDaemon::with_running(count);
    let settings = FetcherSettings {
        min_interval: WINDOW,
        ..FetcherSettings::default()
    };
    fetcher_fallback_state
        .fetcher
        .set(Arc::new(Fetcher::new(daemon.clone(), settings)));
    fetcher_fallback_state.daemon.set(daemon);
    fetcher_fallback_state
        .runtime
        .set(Arc::new(paused_runtime()?));
    Ok(())
}

#[given("the fetcher has refreshed once")]
fn fetcher_refreshed_once(fetcher_fallback_state: &FetcherFallbackState) -> StepResult<()> {
    refresh(fetcher_fallback_state, None)
}

#[given("the daemon starts failing")]
fn daemon_starts_failing(fetcher_fallback_state: &FetcherFallbackState) -> StepResult<()> {
    fetcher_fallback_state.daemon()?.start_failing();
    Ok(())
}

#[when("the fetcher refreshes again at once")]
fn fetcher_refreshes_at_once(fetcher_fallback_state: &FetcherFallbackState) -> StepResult<()> {
    refresh(fetcher_fallback_state, Some(Duration::from_millis(100)))
}

#[when("the window passes and the fetcher refreshes")]
fn window_passes_and_fetcher_refreshes(
    fetcher_fallback_state: &FetcherFallbackState,
) -> StepResult<()> {
    refresh(fetcher_fallback_state, Some(WINDOW + Duration::from_millis(1)))
}

#[when("the fetcher is invalidated and refreshes")]
fn fetcher_invalidated_and_refreshes(
    fetcher_fallback_state: &FetcherFallbackState,
) -> StepResult<()> {
    fetcher_fallback_state.fetcher()?.invalidate();
    refresh(fetcher_fallback_state, None)
}
