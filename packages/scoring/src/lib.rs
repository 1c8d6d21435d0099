#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Investment scoring core.
//!
//! Turns precomputed per-area sub-scores into weighted totals, classifies
//! the totals into quantile buckets, and ranks or compares areas. Every
//! function in [`scale`], [`weights`], [`aggregate`], and [`classify`] is
//! pure and total over its input domain. Only the orchestration in
//! [`ranking`] can fail, and only on caller intent (unknown area,
//! oversized comparison set).

pub mod aggregate;
pub mod classify;
pub mod ranking;
pub mod scale;
pub mod weights;

use thiserror::Error;

/// Maximum number of areas a single comparison may contain.
pub const MAX_COMPARE_AREAS: usize = 5;

/// Errors surfaced by the ranking and lookup operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScoringError {
    /// A single-area request named an area with no snapshot.
    #[error("Area not found: {area_id}")]
    NotFound {
        /// The requested area.
        area_id: String,
    },

    /// The request was rejected before any computation ran.
    #[error("Invalid request: {message}")]
    Validation {
        /// Description of what went wrong.
        message: String,
    },
}
