//! Session-scoped dataset cache and view pipeline for a columnar-file dashboard.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │   Registry   │────►│    Loader    │────►│    Filter    │
//! │ (dir/upload) │     │  (memoized)  │     │ (time window)│
//! └──────────────┘     └──────────────┘     └──────────────┘
//!        ▲                                         │
//!        │                                         ▼
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Upload cache │     │   Session    │────►│    Chart     │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! A UI layer owns one [`session::Session`] per user and calls
//! [`render::render`] once per interaction.

pub mod cache;
pub mod chart;
pub mod config;
pub mod error;
pub mod filter;
pub mod loader;
pub mod logging;
pub mod model;
pub mod registry;
pub mod render;
pub mod session;
pub mod summary;

#[cfg(test)]
pub(crate) mod fixtures;

pub use error::{DashError, Result};
