//! Then step definitions for fetcher fallback scenarios.

use rstest_bdd_macros::then;

use super::state::{FetcherFallbackState, RefreshOutcome, StepResult};

fn outcome(state: &FetcherFallbackState) -> StepResult<RefreshOutcome> {
    state
        .outcome
        .get()
        .ok_or_else(|| String::from("a refresh should have run"))
}

#[then("the refresh returns {count} containers")]
fn refresh_returns_containers(
    fetcher_fallback_state: &FetcherFallbackState,
    count: usize,
) -> StepResult<()> {
    match outcome(fetcher_fallback_state)? {
        RefreshOutcome::Containers(actual) => {
            assert_eq!(actual, count, "unexpected container count");
            Ok(())
        }
        RefreshOutcome::Failed { message, .. } => {
            Err(format!("expected {count} containers, refresh failed: {message}"))
        }
    }
}

#[then("the refresh fails with a connection error")]
fn refresh_fails_with_connection_error(
    fetcher_fallback_state: &FetcherFallbackState,
) -> StepResult<()> {
    match outcome(fetcher_fallback_state)? {
        RefreshOutcome::Failed { connection, message } => {
            assert!(connection, "expected a connection error, got: {message}");
            Ok(())
        }
        RefreshOutcome::Containers(count) => {
            Err(format!("expected a failure, refresh returned {count} containers"))
        }
    }
}

#[then("the daemon listing count is {count}")]
fn daemon_listing_count(fetcher_fallback_state: &FetcherFallbackState, count: usize) -> StepResult<()> {
    let calls = fetcher_fallback_state.daemon()?.list_calls();
    assert_eq!(calls, count, "unexpected number of listings");
    Ok(())
}
