// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sparse authorization policy documents.
//!
//! A policy only records explicit grants. Keys and sub-documents this crate does not know about
//! are carried along untouched, so a policy read from the backend and written back again keeps
//! everything which was not edited.
use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::Grant;

/// Policy document of a subject.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default, deserialize_with = "lenient")]
    pub entities: EntityPolicy,

    /// Other policy categories, kept as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `entities` category of a policy.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityPolicy {
    /// Grants per entity id. Values are interpreted with [`Grant::from_value`].
    #[serde(default, deserialize_with = "lenient")]
    pub entity_ids: BTreeMap<String, Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Policy {
    /// Grant recorded for an entity, `Denied` when there is none.
    pub fn grant(&self, entity_id: &str) -> Grant {
        self.entities
            .entity_ids
            .get(entity_id)
            .map(Grant::from_value)
            .unwrap_or_default()
    }

    /// Record a grant for an entity. `Denied` removes the entry.
    pub fn set_grant(&mut self, entity_id: &str, grant: Grant) {
        match grant.to_value() {
            Some(value) => {
                self.entities.entity_ids.insert(entity_id.to_owned(), value);
            }
            None => {
                self.entities.entity_ids.remove(entity_id);
            }
        }
    }

    /// Number of entries which actually grant something.
    pub fn explicit_grants(&self) -> usize {
        self.entities
            .entity_ids
            .values()
            .filter(|value| Grant::from_value(value).can_read())
            .count()
    }
}

/// Visibility of one dashboard and, optionally, of its views.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardPolicy {
    #[serde(default)]
    pub visible: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub views: Option<BTreeMap<String, bool>>,
}

impl DashboardPolicy {
    /// Stored visibility of a view.
    ///
    /// Views missing from an existing `views` map are hidden. Without a `views` map every view
    /// follows the dashboard.
    pub fn view_visible(&self, view_id: &str) -> bool {
        match &self.views {
            Some(views) => views.get(view_id).copied().unwrap_or(false),
            None => self.visible,
        }
    }
}

/// Dashboard visibility of a group, keyed by dashboard id.
pub type DashboardPolicies = BTreeMap<String, DashboardPolicy>;

/// Deserialize a value, substituting the default when it has an unexpected shape.
///
/// Upstream documents are written by other tools and may contain anything. A sub-document we
/// can not read is treated as absent instead of failing the whole document.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    match serde_json::from_value(value) {
        Ok(parsed) => Ok(parsed),
        Err(err) => {
            debug!(%err, "replacing malformed policy value with default");
            Ok(T::default())
        }
    }
}
