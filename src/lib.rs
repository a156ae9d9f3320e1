//! gh-deps: remove "blocked by" / "blocks" dependency edges between GitHub
//! issues, safely.
//!
//! A removal is validated against a fresh (or briefly cached) snapshot of the
//! source issue's dependencies before anything is deleted, then previewed,
//! confirmed or executed. Transient API failures are retried with bounded
//! linear backoff.

pub mod cache;
pub mod config;
pub mod error;
pub mod github;
pub mod issue;
pub mod remove;
pub mod report;
pub mod retry;
