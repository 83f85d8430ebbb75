//! Connectivity core for a container runtime monitor.
//!
//! `containerbar` talks to Docker-compatible daemons over a local Unix
//! socket, an SSH-forwarded remote socket, or mutual TLS, speaking a small
//! HTTP/1.1 dialect directly over the stream. On top of the daemon client
//! sits a polling [`monitor::Fetcher`] that rate-limits refreshes, bounds
//! statistics sampling, and masks single transient failures behind the last
//! good result.
//!
//! # Modules
//!
//! - [`config`]: Layered configuration (CLI > env > file > defaults)
//! - [`engine`]: Transports, HTTP codec, SSH tunnels and the daemon client
//! - [`error`]: Semantic error types
//! - [`monitor`]: Rate-limited, failure-gated polling and aggregate metrics

pub mod config;
pub mod engine;
pub mod error;
pub mod monitor;
