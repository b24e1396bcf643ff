// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interfaces for selection tree leaves and the backend collaborator.
use std::error::Error;

use crate::Field;
use crate::catalog::{CatalogDashboard, CatalogDevice, CatalogEntity};
use crate::subject::{AuthData, Subject, SubjectKind};

/// An individually toggleable entry of the selection tree.
pub trait Leaf {
    fn id(&self) -> &str;

    /// Name shown to the operator.
    fn name(&self) -> &str;

    /// Secondary name which is also considered when searching.
    fn fallback_name(&self) -> Option<&str> {
        None
    }

    /// Current value of a flag. Flags a leaf does not carry are always `false`.
    fn flag(&self, field: Field) -> bool;

    /// Set a flag. Setting a flag the leaf does not carry has no effect.
    fn set_flag(&mut self, field: Field, value: bool);

    /// Returns `true` if `needle` is a substring of the name, fallback name or id.
    ///
    /// `needle` must already be lowercase.
    fn matches(&self, needle: &str) -> bool {
        self.name().to_lowercase().contains(needle)
            || self
                .fallback_name()
                .is_some_and(|name| name.to_lowercase().contains(needle))
            || self.id().to_lowercase().contains(needle)
    }
}

/// Requests the session sends to the system which owns users, the catalog and policy storage.
///
/// Every call is a single asynchronous round-trip. Implementations decide how transport
/// failures surface; the session only propagates them.
pub trait AuthBackend {
    type Error: Error;

    /// Users which can be selected for editing.
    fn list_users(&self) -> impl Future<Output = Result<Vec<Subject>, Self::Error>>;

    /// All devices with their entities, including the sentinel device for entities without one.
    fn list_devices(&self) -> impl Future<Output = Result<Vec<CatalogDevice>, Self::Error>>;

    /// Helper entities.
    fn list_helpers(&self) -> impl Future<Output = Result<Vec<CatalogEntity>, Self::Error>>;

    /// Dashboards and their views.
    fn list_dashboards(&self) -> impl Future<Output = Result<Vec<CatalogDashboard>, Self::Error>>;

    /// Stored users and groups with their policies.
    fn list_auths(&self) -> impl Future<Output = Result<AuthData, Self::Error>>;

    /// Persist a subject and return all stored users and groups afterwards.
    fn set_auths(
        &self,
        kind: SubjectKind,
        subject: Subject,
    ) -> impl Future<Output = Result<AuthData, Self::Error>>;

    /// Ask the system to restart so that stored policies take effect.
    fn restart_system(&self) -> impl Future<Output = Result<(), Self::Error>>;
}
