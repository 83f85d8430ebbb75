//! Behavioural step helpers for fetcher fallback scenarios.

mod assertions;
mod fake_daemon;
mod state;
mod steps;

pub use state::{FetcherFallbackState, fetcher_fallback_state};
