// SPDX-License-Identifier: MIT OR Apache-2.0

//! Materialized selection tree of one subject.
//!
//! The tree holds every catalog entity exactly once, grouped under devices, the helpers node or
//! the ownerless node, plus one node per dashboard holding its views. Leaves carry plain booleans;
//! group nodes carry a [`TriState`] per field which is derived from their children.
//!
//! The shape of the tree is fixed when it is built. Toggles only change flags.
use serde::Serialize;

use crate::catalog::{
    CatalogEntity, HELPERS_ID, HELPERS_NAME, WITHOUT_DEVICES_ID, WITHOUT_DEVICES_NAME,
};
use crate::traits::Leaf;
use crate::{Field, Grant, TriState, rollup};

/// Entity leaf with read and write flags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub fallback_name: Option<String>,
    pub read: bool,
    pub write: bool,
}

impl Entity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            fallback_name: None,
            read: false,
            write: false,
        }
    }

    pub fn from_catalog(entity: &CatalogEntity, grant: Grant) -> Self {
        let (read, write) = grant.flags();
        Self {
            id: entity.id.clone(),
            name: entity.display_name().to_owned(),
            fallback_name: entity.original_name.clone(),
            read,
            write,
        }
    }

    pub fn with_grant(mut self, grant: Grant) -> Self {
        (self.read, self.write) = grant.flags();
        self
    }

    /// Grant expressed by the current flags.
    pub fn grant(&self) -> Grant {
        Grant::from_flags(self.read, self.write)
    }
}

impl Leaf for Entity {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn fallback_name(&self) -> Option<&str> {
        self.fallback_name.as_deref()
    }

    fn flag(&self, field: Field) -> bool {
        match field {
            Field::Read => self.read,
            Field::Write => self.write,
            Field::Visible => false,
        }
    }

    fn set_flag(&mut self, field: Field, value: bool) {
        match field {
            Field::Read => self.read = value,
            Field::Write => self.write = value,
            Field::Visible => (),
        }
    }
}

/// Dashboard view leaf with a visibility flag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct View {
    pub id: String,
    pub name: String,
    pub visible: bool,
}

impl View {
    pub fn new(id: impl Into<String>, name: impl Into<String>, visible: bool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            visible,
        }
    }
}

impl Leaf for View {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn flag(&self, field: Field) -> bool {
        match field {
            Field::Visible => self.visible,
            Field::Read | Field::Write => false,
        }
    }

    fn set_flag(&mut self, field: Field, value: bool) {
        if let Field::Visible = field {
            self.visible = value;
        }
    }
}

/// A device, dashboard or flat collection owning an ordered list of leaves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GroupNode<L> {
    id: String,
    name: String,
    children: Vec<L>,
    read: TriState,
    write: TriState,
    visible: TriState,
}

impl<L> GroupNode<L>
where
    L: Leaf,
{
    /// Create a group node with states derived from its children.
    pub fn new(id: impl Into<String>, name: impl Into<String>, children: Vec<L>) -> Self {
        let mut group = Self {
            id: id.into(),
            name: name.into(),
            children,
            read: TriState::Off,
            write: TriState::Off,
            visible: TriState::Off,
        };
        group.refresh_all();
        group
    }

    /// Set the stored state of a field. It only sticks while the group has no children.
    pub fn with_default(mut self, field: Field, state: TriState) -> Self {
        *self.slot_mut(field) = state;
        self.refresh(field);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> &[L] {
        &self.children
    }

    pub fn leaf(&self, leaf_id: &str) -> Option<&L> {
        self.children.iter().find(|leaf| leaf.id() == leaf_id)
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn state(&self, field: Field) -> TriState {
        match field {
            Field::Read => self.read,
            Field::Write => self.write,
            Field::Visible => self.visible,
        }
    }

    fn slot_mut(&mut self, field: Field) -> &mut TriState {
        match field {
            Field::Read => &mut self.read,
            Field::Write => &mut self.write,
            Field::Visible => &mut self.visible,
        }
    }

    /// Recompute the state of a field over all children.
    pub fn refresh(&mut self, field: Field) -> TriState {
        let prior = self.state(field);
        let state = rollup(self.children.iter().map(|leaf| leaf.flag(field)), prior);
        *self.slot_mut(field) = state;
        state
    }

    fn refresh_all(&mut self) {
        for field in [Field::Read, Field::Write, Field::Visible] {
            self.refresh(field);
        }
    }

    /// Top-down toggle: set the field on every child and on the group itself.
    pub fn toggle(&mut self, field: Field, value: bool) {
        for leaf in &mut self.children {
            leaf.set_flag(field, value);
        }
        *self.slot_mut(field) = value.into();
    }

    /// Bottom-up toggle: set the field on one child and recompute the group over all children.
    ///
    /// Returns `false` and changes nothing if no child has the given id.
    pub fn toggle_leaf(&mut self, leaf_id: &str, field: Field, value: bool) -> bool {
        let Some(leaf) = self.children.iter_mut().find(|leaf| leaf.id() == leaf_id) else {
            return false;
        };
        leaf.set_flag(field, value);
        self.refresh(field);
        true
    }

    /// Set the field on every child accepted by `scope`, then recompute the group over all
    /// children. A group without children takes the value directly.
    ///
    /// Returns the number of children which were set.
    pub fn toggle_where<F>(&mut self, scope: F, field: Field, value: bool) -> usize
    where
        F: Fn(&L) -> bool,
    {
        if self.children.is_empty() {
            *self.slot_mut(field) = value.into();
            return 0;
        }

        let mut touched = 0;
        for leaf in self.children.iter_mut().filter(|leaf| scope(leaf)) {
            leaf.set_flag(field, value);
            touched += 1;
        }
        self.refresh(field);
        touched
    }
}

/// Top-level collections of a selection tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Devices,
    Helpers,
    Ownerless,
    Dashboards,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Devices,
        Section::Helpers,
        Section::Ownerless,
        Section::Dashboards,
    ];
}

/// Complete selection state of one subject.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectionTree {
    devices: Vec<GroupNode<Entity>>,
    helpers: GroupNode<Entity>,
    ownerless: GroupNode<Entity>,
    dashboards: Vec<GroupNode<View>>,
}

impl SelectionTree {
    pub fn new(
        devices: Vec<GroupNode<Entity>>,
        helpers: Vec<Entity>,
        ownerless: Vec<Entity>,
        dashboards: Vec<GroupNode<View>>,
    ) -> Self {
        Self {
            devices,
            helpers: GroupNode::new(HELPERS_ID, HELPERS_NAME, helpers),
            ownerless: GroupNode::new(WITHOUT_DEVICES_ID, WITHOUT_DEVICES_NAME, ownerless),
            dashboards,
        }
    }

    pub fn devices(&self) -> &[GroupNode<Entity>] {
        &self.devices
    }

    pub fn helpers(&self) -> &GroupNode<Entity> {
        &self.helpers
    }

    pub fn ownerless(&self) -> &GroupNode<Entity> {
        &self.ownerless
    }

    pub fn dashboards(&self) -> &[GroupNode<View>] {
        &self.dashboards
    }

    /// Entity group nodes of a section. Empty for dashboards.
    pub fn entity_groups(&self, section: Section) -> &[GroupNode<Entity>] {
        match section {
            Section::Devices => &self.devices,
            Section::Helpers => std::slice::from_ref(&self.helpers),
            Section::Ownerless => std::slice::from_ref(&self.ownerless),
            Section::Dashboards => &[],
        }
    }

    pub(crate) fn entity_groups_mut(&mut self, section: Section) -> &mut [GroupNode<Entity>] {
        match section {
            Section::Devices => &mut self.devices,
            Section::Helpers => std::slice::from_mut(&mut self.helpers),
            Section::Ownerless => std::slice::from_mut(&mut self.ownerless),
            Section::Dashboards => &mut [],
        }
    }

    pub(crate) fn dashboards_mut(&mut self) -> &mut [GroupNode<View>] {
        &mut self.dashboards
    }

    /// Every entity leaf of the tree: device entities, helpers, then ownerless entities.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.devices
            .iter()
            .chain([&self.helpers, &self.ownerless])
            .flat_map(|group| group.children().iter())
    }

    pub fn entity(&self, entity_id: &str) -> Option<&Entity> {
        self.entities().find(|entity| entity.id == entity_id)
    }

    /// Aggregate state of a group node, `None` if there is no such group.
    pub fn group_state(&self, section: Section, group_id: &str, field: Field) -> Option<TriState> {
        match section {
            Section::Dashboards => find(&self.dashboards, group_id).map(|g| g.state(field)),
            _ => find(self.entity_groups(section), group_id).map(|g| g.state(field)),
        }
    }

    /// Top-down toggle of one group node. Returns `false` if there is no such group.
    pub fn toggle_group(
        &mut self,
        section: Section,
        group_id: &str,
        field: Field,
        value: bool,
    ) -> bool {
        match section {
            Section::Dashboards => find_mut(&mut self.dashboards, group_id)
                .map(|group| group.toggle(field, value))
                .is_some(),
            _ => find_mut(self.entity_groups_mut(section), group_id)
                .map(|group| group.toggle(field, value))
                .is_some(),
        }
    }

    /// Bottom-up toggle of one leaf. Returns `false` if there is no such group or leaf.
    pub fn toggle_leaf(
        &mut self,
        section: Section,
        group_id: &str,
        leaf_id: &str,
        field: Field,
        value: bool,
    ) -> bool {
        match section {
            Section::Dashboards => find_mut(&mut self.dashboards, group_id)
                .is_some_and(|group| group.toggle_leaf(leaf_id, field, value)),
            _ => find_mut(self.entity_groups_mut(section), group_id)
                .is_some_and(|group| group.toggle_leaf(leaf_id, field, value)),
        }
    }
}

pub(crate) fn find<'a, L: Leaf>(groups: &'a [GroupNode<L>], id: &str) -> Option<&'a GroupNode<L>> {
    groups.iter().find(|group| group.id() == id)
}

pub(crate) fn find_mut<'a, L: Leaf>(
    groups: &'a mut [GroupNode<L>],
    id: &str,
) -> Option<&'a mut GroupNode<L>> {
    groups.iter_mut().find(|group| group.id() == id)
}
