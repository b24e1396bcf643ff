// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration of an editing session.
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default delay between the last search keystroke and applying the search term.
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Default id prefix of operator-created groups.
pub const DEFAULT_CUSTOM_GROUP_PREFIX: &str = "custom-";

/// Configuration parameters for a [`Session`](crate::session::Session).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Quiet period after the last search term change before the term is applied.
    pub search_debounce: Duration,

    /// Groups with ids starting with this prefix were created by an operator. They are flagged
    /// as needing attention while they hold no grants.
    pub custom_group_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
            custom_group_prefix: DEFAULT_CUSTOM_GROUP_PREFIX.to_owned(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_debounce(mut self, debounce: Duration) -> Self {
        self.search_debounce = debounce;
        self
    }

    pub fn with_custom_group_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.custom_group_prefix = prefix.into();
        self
    }

    pub fn is_custom_group(&self, group_id: &str) -> bool {
        group_id.starts_with(&self.custom_group_prefix)
    }
}
