// SPDX-License-Identifier: MIT OR Apache-2.0

//! Editing engine for per-subject read/write authorization.
//!
//! A subject (user or group) holds a sparse policy which only records explicit grants. This
//! crate expands such a policy against a catalog of devices, helpers, ownerless entities and
//! dashboards into a fully materialized [`SelectionTree`](tree::SelectionTree), keeps the
//! tri-state rollups of that tree consistent while an operator toggles entries (optionally
//! restricted to a search-scoped subset), and collapses the result back into the sparse policy
//! for persistence.
//!
//! The [`Session`](session::Session) ties these pieces together and talks to an external
//! [`AuthBackend`](traits::AuthBackend) which owns transport and storage.
pub mod catalog;
pub mod codec;
pub mod config;
mod grant;
pub mod memory;
pub mod policy;
pub mod search;
pub mod session;
pub mod subject;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
#[cfg(test)]
mod tests;
pub mod traits;
pub mod tree;
mod tristate;

pub use config::Config;
pub use grant::Grant;
pub use tristate::{Field, TriState, rollup};
