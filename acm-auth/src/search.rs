// SPDX-License-Identifier: MIT OR Apache-2.0

//! Search projection over a selection tree.
//!
//! A [`ScopedView`] records which groups and leaves match the current search term. It never
//! changes flags itself, but bounds which leaves take part in a select-all and in the tri-state
//! shown for it. The per-group states stay computed over all children of a group, so a group can
//! show `Mixed` while every visible child is uniform.
use std::collections::BTreeSet;

use serde::Serialize;

use crate::traits::Leaf;
use crate::tree::{GroupNode, Section, SelectionTree, find};
use crate::{Field, TriState, rollup};

/// A group which is part of the scoped view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GroupScope {
    pub group_id: String,

    /// The whole group is in scope, because the term is empty or matched the group's name.
    pub whole_group: bool,

    /// Ids of the visible leaves.
    pub leaves: Vec<String>,

    /// The group is shown expanded because some of its leaves matched the term.
    pub auto_expanded: bool,
}

impl GroupScope {
    pub fn contains(&self, leaf_id: &str) -> bool {
        self.leaves.iter().any(|id| id == leaf_id)
    }
}

/// Groups and leaves of a tree which match a search term.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScopedView {
    term: String,
    devices: Vec<GroupScope>,
    helpers: Vec<GroupScope>,
    ownerless: Vec<GroupScope>,
    dashboards: Vec<GroupScope>,
}

impl ScopedView {
    /// Project a tree onto a search term.
    ///
    /// Matching is a case-insensitive substring test against a leaf's name, fallback name and
    /// id. A device or dashboard whose name matches shows all of its leaves; otherwise it shows
    /// only matching leaves, and is left out when there are none. Helpers and ownerless entities
    /// have no owning group, so only their leaves are matched. An empty term matches everything.
    pub fn project(tree: &SelectionTree, term: &str) -> Self {
        let needle = term.to_lowercase();
        Self {
            term: term.to_owned(),
            devices: project_groups(tree.entity_groups(Section::Devices), &needle, true),
            helpers: project_groups(tree.entity_groups(Section::Helpers), &needle, false),
            ownerless: project_groups(tree.entity_groups(Section::Ownerless), &needle, false),
            dashboards: project_groups(tree.dashboards(), &needle, true),
        }
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn groups(&self, section: Section) -> &[GroupScope] {
        match section {
            Section::Devices => &self.devices,
            Section::Helpers => &self.helpers,
            Section::Ownerless => &self.ownerless,
            Section::Dashboards => &self.dashboards,
        }
    }

    pub fn group(&self, section: Section, group_id: &str) -> Option<&GroupScope> {
        self.groups(section)
            .iter()
            .find(|scope| scope.group_id == group_id)
    }

    pub fn is_visible(&self, section: Section, group_id: &str, leaf_id: &str) -> bool {
        self.group(section, group_id)
            .is_some_and(|scope| scope.contains(leaf_id))
    }

    /// Returns `true` if nothing in any section matches.
    pub fn is_empty(&self) -> bool {
        Section::ALL
            .iter()
            .all(|section| self.groups(*section).is_empty())
    }

    /// Set `field` on every group and leaf of a section which is in scope.
    ///
    /// Leaves outside the view keep their value; group states are recomputed over all children.
    /// Returns the number of leaves which were set.
    pub fn select_all(
        &self,
        tree: &mut SelectionTree,
        section: Section,
        field: Field,
        value: bool,
    ) -> usize {
        let scopes = self.groups(section);
        match section {
            Section::Dashboards => select_groups(tree.dashboards_mut(), scopes, field, value),
            _ => select_groups(tree.entity_groups_mut(section), scopes, field, value),
        }
    }

    /// State of the select-all checkbox of a section, aggregated over the scoped leaves only.
    ///
    /// Groups in scope without any children contribute their own state.
    pub fn select_all_state(&self, tree: &SelectionTree, section: Section, field: Field) -> TriState {
        let scopes = self.groups(section);
        match section {
            Section::Dashboards => scoped_state(tree.dashboards(), scopes, field),
            _ => scoped_state(tree.entity_groups(section), scopes, field),
        }
    }
}

fn project_groups<L: Leaf>(
    groups: &[GroupNode<L>],
    needle: &str,
    match_group_name: bool,
) -> Vec<GroupScope> {
    groups
        .iter()
        .filter_map(|group| {
            let all_ids = || group.children().iter().map(|leaf| leaf.id().to_owned());

            if needle.is_empty() {
                return Some(GroupScope {
                    group_id: group.id().to_owned(),
                    whole_group: true,
                    leaves: all_ids().collect(),
                    auto_expanded: false,
                });
            }

            let matching: Vec<String> = group
                .children()
                .iter()
                .filter(|leaf| leaf.matches(needle))
                .map(|leaf| leaf.id().to_owned())
                .collect();
            let name_matched = match_group_name && group.name().to_lowercase().contains(needle);

            if !name_matched && matching.is_empty() {
                return None;
            }

            Some(GroupScope {
                group_id: group.id().to_owned(),
                whole_group: name_matched,
                auto_expanded: !matching.is_empty(),
                leaves: if name_matched {
                    all_ids().collect()
                } else {
                    matching
                },
            })
        })
        .collect()
}

fn select_groups<L: Leaf>(
    groups: &mut [GroupNode<L>],
    scopes: &[GroupScope],
    field: Field,
    value: bool,
) -> usize {
    let mut touched = 0;
    for group in groups.iter_mut() {
        let Some(scope) = scopes.iter().find(|scope| scope.group_id == group.id()) else {
            continue;
        };

        if scope.whole_group {
            touched += group.children().len();
            group.toggle(field, value);
        } else {
            touched += group.toggle_where(|leaf| scope.contains(leaf.id()), field, value);
        }
    }
    touched
}

fn scoped_state<L: Leaf>(groups: &[GroupNode<L>], scopes: &[GroupScope], field: Field) -> TriState {
    let mut flags = Vec::new();
    for scope in scopes {
        let Some(group) = find(groups, &scope.group_id) else {
            continue;
        };

        if group.is_empty() {
            flags.push(group.state(field).is_on());
            continue;
        }

        flags.extend(
            group
                .children()
                .iter()
                .filter(|leaf| scope.contains(leaf.id()))
                .map(|leaf| leaf.flag(field)),
        );
    }
    rollup(flags, TriState::Off)
}

/// Groups the operator expanded or collapsed by hand.
///
/// Expansion is independent of selection; toggling it never changes a flag.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpandState {
    expanded: BTreeSet<(Section, String)>,
}

impl ExpandState {
    /// Flip the expansion of a group and return whether it is now expanded.
    pub fn toggle(&mut self, section: Section, group_id: &str) -> bool {
        let key = (section, group_id.to_owned());
        if self.expanded.remove(&key) {
            false
        } else {
            self.expanded.insert(key);
            true
        }
    }

    pub fn collapse_all(&mut self) {
        self.expanded.clear();
    }

    /// A group is shown expanded if it was expanded by hand or the view auto-expands it.
    pub fn is_expanded(&self, view: &ScopedView, section: Section, group_id: &str) -> bool {
        self.expanded.contains(&(section, group_id.to_owned()))
            || view
                .group(section, group_id)
                .is_some_and(|scope| scope.auto_expanded)
    }
}
