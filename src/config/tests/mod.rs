//! Unit tests for containerbar configuration.
//!
//! - [`helpers`] - Shared fixtures and helper functions
//! - [`types_tests`] - Defaults and TOML deserialisation
//! - [`validation`] - Value checks and connection descriptor conversion
//! - [`layer_precedence_tests`] - `MergeComposer` layer precedence

mod helpers;
mod layer_precedence_tests;
mod types_tests;
mod validation;
