// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixtures and backend wrappers for tests.
use std::cell::Cell;
use std::rc::Rc;

use serde_json::json;
use thiserror::Error;

use crate::catalog::{Catalog, CatalogDashboard, CatalogDevice, CatalogEntity, CatalogView};
use crate::memory::MemoryBackend;
use crate::policy::Policy;
use crate::subject::{AuthData, Subject, SubjectKind};
use crate::traits::AuthBackend;

pub fn entity(id: &str, name: &str) -> CatalogEntity {
    CatalogEntity::new(id).with_name(name)
}

/// Device named after its id, owning entities named after their ids.
pub fn device(id: &str, entity_ids: &[&str]) -> CatalogDevice {
    entity_ids
        .iter()
        .fold(CatalogDevice::new(id, id), |device, entity_id| {
            device.with_entity(CatalogEntity::new(*entity_id))
        })
}

/// Policy granting the given values, keyed by entity id.
pub fn policy(entity_ids: serde_json::Value) -> Policy {
    serde_json::from_value(json!({ "entities": { "entity_ids": entity_ids } })).unwrap_or_default()
}

/// Two devices, the sentinel device and two helpers.
///
/// `input_boolean.guest` is reported both as a helper and under the sentinel device.
pub fn sample_catalog() -> Catalog {
    Catalog::new(
        vec![
            CatalogDevice::without_devices(vec![
                entity("sun.sun", "Sun"),
                entity("input_boolean.guest", "Guest mode"),
            ]),
            CatalogDevice::new("kitchen", "Kitchen")
                .with_entity(entity("light.kitchen", "Kitchen light"))
                .with_entity(
                    CatalogEntity::new("sensor.kitchen_temperature")
                        .with_original_name("Temperature"),
                ),
            CatalogDevice::new("hall", "Hall").with_entity(entity("light.hall", "Hall light")),
        ],
        vec![
            entity("input_boolean.guest", "Guest mode"),
            entity("light.downstairs", "Downstairs").with_platform("group"),
        ],
    )
}

pub fn sample_dashboards() -> Vec<CatalogDashboard> {
    vec![
        CatalogDashboard {
            id: "lovelace".into(),
            name: Some("Overview".into()),
            visible: true,
            views: vec![
                CatalogView {
                    path: Some("home".into()),
                    title: Some("Home".into()),
                    ..Default::default()
                },
                CatalogView {
                    path: Some("energy".into()),
                    title: Some("Energy".into()),
                    ..Default::default()
                },
            ],
        },
        CatalogDashboard {
            id: "map".into(),
            name: Some("Map".into()),
            visible: true,
            views: vec![],
        },
    ]
}

/// Users `u1` and `u2`, built-in groups and two custom groups.
///
/// `u1` may read and write the kitchen light, `custom-guests` may read the hall light and
/// `custom-kids` holds no grant.
pub fn sample_backend() -> MemoryBackend {
    let catalog = sample_catalog();
    MemoryBackend::new()
        .with_users(vec![
            Subject::new("u1").with_name("Ada"),
            Subject::new("u2").with_name("Grace"),
        ])
        .with_devices(catalog.devices)
        .with_helpers(catalog.helpers)
        .with_dashboards(sample_dashboards())
        .with_auths(AuthData {
            users: vec![
                Subject::new("u1")
                    .with_name("Ada")
                    .with_policy(policy(json!({ "light.kitchen": true }))),
            ],
            groups: vec![
                Subject::new("system-admin"),
                Subject::new("system-users"),
                Subject::new("system-read-only"),
                Subject::new("custom-kids"),
                Subject::new("custom-guests")
                    .with_policy(policy(json!({ "light.hall": { "read": true } }))),
            ],
        })
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TestBackendError {
    #[error("injected failure")]
    Injected,
}

/// Backend wrapper counting persist calls and failing on request.
#[derive(Clone, Debug, Default)]
pub struct TestBackend {
    inner: MemoryBackend,
    set_auths_calls: Rc<Cell<usize>>,
    fail_set_auths: Rc<Cell<bool>>,
    fail_restart: Rc<Cell<bool>>,
}

impl TestBackend {
    pub fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    pub fn set_auths_calls(&self) -> usize {
        self.set_auths_calls.get()
    }

    pub fn fail_set_auths(&self, fail: bool) {
        self.fail_set_auths.set(fail);
    }

    pub fn fail_restart(&self, fail: bool) {
        self.fail_restart.set(fail);
    }
}

impl AuthBackend for TestBackend {
    type Error = TestBackendError;

    async fn list_users(&self) -> Result<Vec<Subject>, TestBackendError> {
        let Ok(users) = self.inner.list_users().await;
        Ok(users)
    }

    async fn list_devices(&self) -> Result<Vec<CatalogDevice>, TestBackendError> {
        let Ok(devices) = self.inner.list_devices().await;
        Ok(devices)
    }

    async fn list_helpers(&self) -> Result<Vec<CatalogEntity>, TestBackendError> {
        let Ok(helpers) = self.inner.list_helpers().await;
        Ok(helpers)
    }

    async fn list_dashboards(&self) -> Result<Vec<CatalogDashboard>, TestBackendError> {
        let Ok(dashboards) = self.inner.list_dashboards().await;
        Ok(dashboards)
    }

    async fn list_auths(&self) -> Result<AuthData, TestBackendError> {
        let Ok(auths) = self.inner.list_auths().await;
        Ok(auths)
    }

    async fn set_auths(
        &self,
        kind: SubjectKind,
        subject: Subject,
    ) -> Result<AuthData, TestBackendError> {
        self.set_auths_calls.set(self.set_auths_calls.get() + 1);
        if self.fail_set_auths.get() {
            tokio::task::yield_now().await;
            return Err(TestBackendError::Injected);
        }
        let Ok(auths) = self.inner.set_auths(kind, subject).await;
        Ok(auths)
    }

    async fn restart_system(&self) -> Result<(), TestBackendError> {
        if self.fail_restart.get() {
            return Err(TestBackendError::Injected);
        }
        let Ok(()) = self.inner.restart_system().await;
        Ok(())
    }
}

pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}
