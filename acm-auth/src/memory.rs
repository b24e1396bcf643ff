// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory backend.
//!
//! This does not persist data permanently, all changes are lost when the backend is dropped. Use
//! this only in development or test contexts.
use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use tracing::debug;

use crate::catalog::{CatalogDashboard, CatalogDevice, CatalogEntity};
use crate::subject::{AuthData, Subject, SubjectKind};
use crate::traits::AuthBackend;

#[derive(Debug, Default)]
struct MemoryState {
    users: Vec<Subject>,
    devices: Vec<CatalogDevice>,
    helpers: Vec<CatalogEntity>,
    dashboards: Vec<CatalogDashboard>,
    auths: AuthData,
    restarts: usize,
}

/// Backend holding users, catalog and stored policies in memory.
///
/// Clones share the same state.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(self, users: Vec<Subject>) -> Self {
        self.state.borrow_mut().users = users;
        self
    }

    pub fn with_devices(self, devices: Vec<CatalogDevice>) -> Self {
        self.state.borrow_mut().devices = devices;
        self
    }

    pub fn with_helpers(self, helpers: Vec<CatalogEntity>) -> Self {
        self.state.borrow_mut().helpers = helpers;
        self
    }

    pub fn with_dashboards(self, dashboards: Vec<CatalogDashboard>) -> Self {
        self.state.borrow_mut().dashboards = dashboards;
        self
    }

    pub fn with_auths(self, auths: AuthData) -> Self {
        self.state.borrow_mut().auths = auths;
        self
    }

    /// Snapshot of the stored users and groups.
    pub fn auths(&self) -> AuthData {
        self.state.borrow().auths.clone()
    }

    /// Replace stored users and groups, as if another operator had saved in the meantime.
    pub fn replace_auths(&self, auths: AuthData) {
        self.state.borrow_mut().auths = auths;
    }

    /// Number of times a restart was requested.
    pub fn restarts(&self) -> usize {
        self.state.borrow().restarts
    }
}

impl AuthBackend for MemoryBackend {
    type Error = Infallible;

    async fn list_users(&self) -> Result<Vec<Subject>, Infallible> {
        tokio::task::yield_now().await;
        Ok(self.state.borrow().users.clone())
    }

    async fn list_devices(&self) -> Result<Vec<CatalogDevice>, Infallible> {
        tokio::task::yield_now().await;
        Ok(self.state.borrow().devices.clone())
    }

    async fn list_helpers(&self) -> Result<Vec<CatalogEntity>, Infallible> {
        tokio::task::yield_now().await;
        Ok(self.state.borrow().helpers.clone())
    }

    async fn list_dashboards(&self) -> Result<Vec<CatalogDashboard>, Infallible> {
        tokio::task::yield_now().await;
        Ok(self.state.borrow().dashboards.clone())
    }

    async fn list_auths(&self) -> Result<AuthData, Infallible> {
        tokio::task::yield_now().await;
        Ok(self.state.borrow().auths.clone())
    }

    async fn set_auths(&self, kind: SubjectKind, subject: Subject) -> Result<AuthData, Infallible> {
        tokio::task::yield_now().await;
        let mut state = self.state.borrow_mut();
        let id = subject.id.clone();
        let updated = state.auths.upsert(kind, subject);
        debug!(%kind, %id, updated, "stored subject");
        Ok(state.auths.clone())
    }

    async fn restart_system(&self) -> Result<(), Infallible> {
        tokio::task::yield_now().await;
        self.state.borrow_mut().restarts += 1;
        Ok(())
    }
}
