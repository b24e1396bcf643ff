// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resource catalog as reported by the backend.
//!
//! The catalog is fetched once and describes which entities exist, how they are grouped under
//! devices, which of them are helpers and which dashboards and views are available. It carries
//! no grants; those are applied per subject by the [`codec`](crate::codec).
use std::collections::HashSet;
use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::policy::lenient;

/// Id of the sentinel device which collects entities without an owning device.
pub const WITHOUT_DEVICES_ID: &str = "withoutDevices";

/// Display name of the sentinel device.
pub const WITHOUT_DEVICES_NAME: &str = "Entities without Devices";

/// Id of the group node holding all helpers.
pub const HELPERS_ID: &str = "helpers";

/// Display name of the helpers group node.
pub const HELPERS_NAME: &str = "Helpers";

/// Name of a device which did not report one.
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown";

const INPUT_DOMAIN_PREFIX: &str = "input_";
const SCHEDULE_DOMAIN: &str = "schedule";
const LIGHT_GROUP_PLATFORM: &str = "group";

#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("unknown helper type: {0}")]
    UnknownHelperKind(String),
}

/// Kind of a helper entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum HelperKind {
    /// A light which groups other lights.
    LightGroup,

    /// A schedule.
    Schedule,

    /// An `input_*` helper, holding its full domain (for example `input_boolean`).
    Input(String),
}

impl HelperKind {
    /// Decide whether an entity is a helper, given its id and the platform which provides it.
    pub fn classify(entity_id: &str, platform: Option<&str>) -> Option<Self> {
        let domain = domain_of(entity_id);

        if domain == "light" && platform == Some(LIGHT_GROUP_PLATFORM) {
            return Some(HelperKind::LightGroup);
        }

        if domain == SCHEDULE_DOMAIN {
            return Some(HelperKind::Schedule);
        }

        if domain.starts_with(INPUT_DOMAIN_PREFIX) {
            return Some(HelperKind::Input(domain.to_owned()));
        }

        None
    }
}

impl Display for HelperKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HelperKind::LightGroup => write!(f, "light_group"),
            HelperKind::Schedule => write!(f, "{SCHEDULE_DOMAIN}"),
            HelperKind::Input(domain) => write!(f, "{domain}"),
        }
    }
}

impl FromStr for HelperKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light_group" => Ok(HelperKind::LightGroup),
            SCHEDULE_DOMAIN => Ok(HelperKind::Schedule),
            input if input.starts_with(INPUT_DOMAIN_PREFIX) => {
                Ok(HelperKind::Input(input.to_owned()))
            }
            other => Err(CatalogError::UnknownHelperKind(other.to_owned())),
        }
    }
}

impl From<HelperKind> for String {
    fn from(kind: HelperKind) -> Self {
        kind.to_string()
    }
}

impl TryFrom<String> for HelperKind {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Domain part of an entity id (`light` for `light.kitchen`).
pub fn domain_of(entity_id: &str) -> &str {
    entity_id
        .split_once('.')
        .map(|(domain, _)| domain)
        .unwrap_or(entity_id)
}

/// An entity of the catalog.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntity {
    #[serde(rename = "entity_id", alias = "id")]
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub original_name: Option<String>,

    #[serde(default)]
    pub platform: Option<String>,

    #[serde(default)]
    pub device_id: Option<String>,

    /// Set by the backend for entities returned from `list_helpers`.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub helper_type: Option<HelperKind>,
}

impl CatalogEntity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_original_name(mut self, name: impl Into<String>) -> Self {
        self.original_name = Some(name.into());
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// `name`, else `original_name`, else the entity id.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.original_name.as_deref())
            .unwrap_or(&self.id)
    }

    pub fn domain(&self) -> &str {
        domain_of(&self.id)
    }

    /// Helper kind reported by the backend, or derived from id and platform.
    pub fn helper_kind(&self) -> Option<HelperKind> {
        self.helper_type
            .clone()
            .or_else(|| HelperKind::classify(&self.id, self.platform.as_deref()))
    }
}

/// A device and the entities it owns.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDevice {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub entities: Vec<CatalogEntity>,
}

impl CatalogDevice {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
            entities: Vec::new(),
        }
    }

    /// Sentinel device collecting entities which have no owning device.
    pub fn without_devices(entities: Vec<CatalogEntity>) -> Self {
        Self {
            id: WITHOUT_DEVICES_ID.to_owned(),
            name: Some(WITHOUT_DEVICES_NAME.to_owned()),
            entities,
        }
    }

    pub fn with_entity(mut self, entity: CatalogEntity) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_DEVICE_NAME)
    }

    pub fn is_sentinel(&self) -> bool {
        self.id == WITHOUT_DEVICES_ID
    }
}

/// A dashboard view as reported by the backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogView {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub visible: bool,
}

impl CatalogView {
    /// View id: `path`, else `id`, else derived from the dashboard id and the view position.
    pub fn view_id(&self, dashboard_id: &str, index: usize) -> String {
        self.path
            .clone()
            .or_else(|| self.id.clone())
            .unwrap_or_else(|| format!("{dashboard_id}-view-{index}"))
    }

    /// View name: `name`, else `title`, else `path`, else a numbered label.
    pub fn view_name(&self, index: usize) -> String {
        self.name
            .clone()
            .or_else(|| self.title.clone())
            .or_else(|| self.path.clone())
            .unwrap_or_else(|| format!("View {}", index + 1))
    }
}

/// A dashboard as reported by the backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDashboard {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub visible: bool,

    #[serde(default, deserialize_with = "lenient")]
    pub views: Vec<CatalogView>,
}

/// A view in the dashboard template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateView {
    pub id: String,
    pub name: String,
}

/// A dashboard in the dashboard template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDashboard {
    pub id: String,
    pub name: String,
    pub views: Vec<TemplateView>,
}

/// Shape of all dashboards and their views.
///
/// The template is decoded once and shared by every group whose dashboard visibility is
/// edited; only the visibility flags are subject specific.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardTemplate {
    dashboards: Vec<TemplateDashboard>,
}

impl DashboardTemplate {
    pub fn new(dashboards: Vec<CatalogDashboard>) -> Self {
        let mut seen = HashSet::new();
        let dashboards = dashboards
            .into_iter()
            .filter(|dashboard| !dashboard.id.is_empty() && seen.insert(dashboard.id.clone()))
            .map(|dashboard| {
                let mut view_ids = HashSet::new();
                let views = dashboard
                    .views
                    .iter()
                    .enumerate()
                    .map(|(index, view)| TemplateView {
                        id: view.view_id(&dashboard.id, index),
                        name: view.view_name(index),
                    })
                    .filter(|view| view_ids.insert(view.id.clone()))
                    .collect();

                TemplateDashboard {
                    name: dashboard.name.unwrap_or_else(|| dashboard.id.clone()),
                    id: dashboard.id,
                    views,
                }
            })
            .collect();

        Self { dashboards }
    }

    pub fn dashboards(&self) -> &[TemplateDashboard] {
        &self.dashboards
    }
}

/// Devices and helpers as fetched from the backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub devices: Vec<CatalogDevice>,
    pub helpers: Vec<CatalogEntity>,
}

impl Catalog {
    pub fn new(devices: Vec<CatalogDevice>, helpers: Vec<CatalogEntity>) -> Self {
        Self { devices, helpers }
    }

    /// Split the catalog into devices, helpers and ownerless entities.
    ///
    /// Every entity id ends up in exactly one collection. Helpers claim their ids first: the
    /// listed ones, then every device entity classified as a helper. Real devices follow in
    /// catalog order, then the sentinel device's entities become the ownerless collection.
    pub fn partition(&self) -> Partition {
        let mut claimed: HashSet<&str> = HashSet::new();
        let mut dropped = 0;

        let mut helpers: Vec<CatalogEntity> = self
            .helpers
            .iter()
            .filter(|helper| claimed.insert(&helper.id))
            .cloned()
            .collect();

        let listed = helpers.len();
        let classified = self
            .devices
            .iter()
            .flat_map(|device| device.entities.iter())
            .filter_map(|entity| entity.helper_kind().map(|kind| (entity, kind)));
        for (entity, kind) in classified {
            if claimed.insert(&entity.id) {
                helpers.push(CatalogEntity {
                    helper_type: Some(kind),
                    ..entity.clone()
                });
            }
        }
        if helpers.len() > listed {
            debug!(
                classified = helpers.len() - listed,
                "moved device entities to helpers"
            );
        }

        let mut devices = Vec::new();
        for device in self.devices.iter().filter(|device| !device.is_sentinel()) {
            let entities = device
                .entities
                .iter()
                .filter(|entity| {
                    let fresh = claimed.insert(&entity.id);
                    dropped += usize::from(!fresh);
                    fresh
                })
                .cloned()
                .collect();
            devices.push(CatalogDevice {
                id: device.id.clone(),
                name: device.name.clone(),
                entities,
            });
        }

        let mut ownerless = Vec::new();
        for device in self.devices.iter().filter(|device| device.is_sentinel()) {
            for entity in &device.entities {
                if claimed.insert(&entity.id) {
                    ownerless.push(entity.clone());
                } else {
                    dropped += 1;
                }
            }
        }

        if dropped > 0 {
            debug!(dropped, "removed entities already claimed by another collection");
        }

        Partition {
            devices,
            helpers,
            ownerless,
        }
    }
}

/// The catalog split into disjoint collections.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Partition {
    pub devices: Vec<CatalogDevice>,
    pub helpers: Vec<CatalogEntity>,
    pub ownerless: Vec<CatalogEntity>,
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde_json::json;

    use super::{
        Catalog, CatalogDashboard, CatalogDevice, CatalogEntity, CatalogView, DashboardTemplate,
        HelperKind,
    };

    #[test]
    fn classify_helpers() {
        assert_eq!(
            HelperKind::classify("input_boolean.guest_mode", None),
            Some(HelperKind::Input("input_boolean".into()))
        );
        assert_eq!(
            HelperKind::classify("schedule.heating", Some("schedule")),
            Some(HelperKind::Schedule)
        );
        assert_eq!(
            HelperKind::classify("light.downstairs", Some("group")),
            Some(HelperKind::LightGroup)
        );
        assert_eq!(HelperKind::classify("light.kitchen", Some("hue")), None);
        assert_eq!(HelperKind::classify("sensor.input_power", None), None);
    }

    #[test]
    fn helper_kind_wire_format() {
        let entity: CatalogEntity = serde_json::from_value(json!({
            "entity_id": "input_number.target",
            "name": "Target",
            "helper_type": "input_number",
        }))
        .unwrap();
        assert_eq!(
            entity.helper_kind(),
            Some(HelperKind::Input("input_number".into()))
        );

        let entity: CatalogEntity = serde_json::from_value(json!({
            "entity_id": "light.all",
            "platform": "group",
            "helper_type": "something_else",
        }))
        .unwrap();
        assert_eq!(entity.helper_type, None);
        assert_eq!(entity.helper_kind(), Some(HelperKind::LightGroup));

        assert_eq!(
            serde_json::to_value(HelperKind::LightGroup).unwrap(),
            json!("light_group")
        );
    }

    #[test]
    fn display_names() {
        let entity = CatalogEntity::new("light.kitchen");
        assert_eq!(entity.display_name(), "light.kitchen");
        let entity = entity.with_original_name("Ceiling");
        assert_eq!(entity.display_name(), "Ceiling");
        let entity = entity.with_name("Kitchen");
        assert_eq!(entity.display_name(), "Kitchen");

        let device: CatalogDevice = serde_json::from_value(json!({ "id": "d1" })).unwrap();
        assert_eq!(device.display_name(), "Unknown");
        assert!(device.entities.is_empty());
    }

    #[test]
    fn partition_is_disjoint() {
        let catalog = Catalog::new(
            vec![
                CatalogDevice::without_devices(vec![
                    CatalogEntity::new("sun.sun"),
                    CatalogEntity::new("input_boolean.guest"),
                    CatalogEntity::new("light.hall"),
                ]),
                CatalogDevice::new("d1", "Hue bridge")
                    .with_entity(CatalogEntity::new("light.hall"))
                    .with_entity(CatalogEntity::new("light.desk")),
                CatalogDevice::new("d2", "Plug")
                    .with_entity(CatalogEntity::new("light.desk"))
                    .with_entity(CatalogEntity::new("switch.plug")),
            ],
            vec![
                CatalogEntity::new("input_boolean.guest"),
                CatalogEntity::new("input_boolean.guest"),
            ],
        );

        let partition = catalog.partition();

        let ids = |entities: &[CatalogEntity]| {
            entities.iter().map(|e| e.id.clone()).collect::<Vec<_>>()
        };
        assert_eq!(ids(&partition.helpers), vec!["input_boolean.guest"]);
        assert_eq!(partition.devices.len(), 2);
        assert_eq!(
            ids(&partition.devices[0].entities),
            vec!["light.hall", "light.desk"]
        );
        assert_eq!(ids(&partition.devices[1].entities), vec!["switch.plug"]);
        assert_eq!(ids(&partition.ownerless), vec!["sun.sun"]);

        let mut all = HashSet::new();
        for entity in partition
            .helpers
            .iter()
            .chain(partition.ownerless.iter())
            .chain(partition.devices.iter().flat_map(|d| d.entities.iter()))
        {
            assert!(all.insert(entity.id.clone()), "{} listed twice", entity.id);
        }
    }

    #[test]
    fn classified_helpers_leave_devices() {
        let catalog = Catalog::new(
            vec![
                CatalogDevice::without_devices(vec![
                    CatalogEntity::new("schedule.heating"),
                    CatalogEntity::new("sun.sun"),
                ]),
                CatalogDevice::new("d1", "Hue bridge")
                    .with_entity(CatalogEntity::new("light.desk"))
                    .with_entity(CatalogEntity::new("light.upstairs").with_platform("group"))
                    .with_entity(CatalogEntity::new("input_boolean.x")),
            ],
            vec![CatalogEntity::new("input_number.target")],
        );

        let partition = catalog.partition();

        let ids = |entities: &[CatalogEntity]| {
            entities.iter().map(|e| e.id.clone()).collect::<Vec<_>>()
        };
        assert_eq!(
            ids(&partition.helpers),
            vec![
                "input_number.target",
                "schedule.heating",
                "light.upstairs",
                "input_boolean.x"
            ]
        );
        assert_eq!(ids(&partition.devices[0].entities), vec!["light.desk"]);
        assert_eq!(ids(&partition.ownerless), vec!["sun.sun"]);
        assert_eq!(
            partition.helpers[2].helper_type,
            Some(HelperKind::LightGroup)
        );
    }

    #[test]
    fn template_view_identity() {
        let template = DashboardTemplate::new(vec![
            CatalogDashboard {
                id: "lovelace".into(),
                name: Some("Overview".into()),
                visible: false,
                views: vec![
                    CatalogView {
                        path: Some("home".into()),
                        title: Some("Home".into()),
                        ..Default::default()
                    },
                    CatalogView {
                        id: Some("energy".into()),
                        ..Default::default()
                    },
                    CatalogView::default(),
                ],
            },
            CatalogDashboard {
                id: "lovelace".into(),
                ..Default::default()
            },
            CatalogDashboard {
                id: "map".into(),
                ..Default::default()
            },
        ]);

        let dashboards = template.dashboards();
        assert_eq!(dashboards.len(), 2);
        assert_eq!(dashboards[0].name, "Overview");
        let views: Vec<_> = dashboards[0]
            .views
            .iter()
            .map(|v| (v.id.as_str(), v.name.as_str()))
            .collect();
        assert_eq!(
            views,
            vec![
                ("home", "Home"),
                ("energy", "View 2"),
                ("lovelace-view-2", "View 3")
            ]
        );
        assert_eq!(dashboards[1].name, "map");
        assert!(dashboards[1].views.is_empty());
    }
}
