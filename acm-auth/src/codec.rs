// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversion between sparse policies and materialized selection trees.
//!
//! Absence of an entity in a policy means the subject holds no grant on it, and encoding a
//! tree removes the key of every leaf which is not readable. There is no separate encoding for
//! an explicit denial. Keys for entities which are not part of the catalog are never touched.
use tracing::trace;

use crate::catalog::{CatalogEntity, DashboardTemplate, Partition};
use crate::policy::{DashboardPolicies, DashboardPolicy, Policy};
use crate::subject::{Subject, SubjectKind};
use crate::traits::Leaf;
use crate::tree::{Entity, GroupNode, SelectionTree, View};
use crate::{Field, Grant, TriState};

/// Grant a subject holds on an entity.
///
/// Built-in subjects hold a fixed grant on everything, regardless of their stored policy.
pub fn decode_grant(subject: &Subject, policy: &Policy, entity_id: &str) -> Grant {
    match subject.builtin() {
        Some(builtin) => builtin.grant(),
        None => policy.grant(entity_id),
    }
}

/// Build the selection tree of a subject.
///
/// Dashboards are only decoded for groups, and only when the template is known.
pub fn decode(
    partition: &Partition,
    template: Option<&DashboardTemplate>,
    kind: SubjectKind,
    subject: &Subject,
) -> SelectionTree {
    let policy = subject.policy();
    let leaf = |entity: &CatalogEntity| {
        Entity::from_catalog(entity, decode_grant(subject, &policy, &entity.id))
    };

    let devices = partition
        .devices
        .iter()
        .map(|device| {
            GroupNode::new(
                device.id.clone(),
                device.display_name(),
                device.entities.iter().map(leaf).collect(),
            )
        })
        .collect();
    let helpers = partition.helpers.iter().map(leaf).collect();
    let ownerless = partition.ownerless.iter().map(leaf).collect();

    let dashboards = match (kind, template) {
        (SubjectKind::Group, Some(template)) => decode_dashboards(template, subject),
        _ => Vec::new(),
    };

    let tree = SelectionTree::new(devices, helpers, ownerless, dashboards);
    trace!(subject = %subject.id, entities = tree.entities().count(), "decoded selection tree");
    tree
}

/// Apply a group's dashboard visibility to the shared template.
pub fn decode_dashboards(template: &DashboardTemplate, subject: &Subject) -> Vec<GroupNode<View>> {
    let everything = subject.builtin().is_some();
    let stored = subject.dashboards.as_ref();

    template
        .dashboards()
        .iter()
        .map(|dashboard| {
            let policy = stored.and_then(|policies| policies.get(&dashboard.id));
            let visible = |view_id: &str| {
                everything || policy.is_some_and(|policy| policy.view_visible(view_id))
            };

            let views = dashboard
                .views
                .iter()
                .map(|view| View::new(view.id.clone(), view.name.clone(), visible(&view.id)))
                .collect();
            let default = everything || policy.is_some_and(|policy| policy.visible);

            GroupNode::new(dashboard.id.clone(), dashboard.name.clone(), views)
                .with_default(Field::Visible, default.into())
        })
        .collect()
}

/// Write the grants of every entity in the tree into `policy`.
pub fn encode_policy(tree: &SelectionTree, mut policy: Policy) -> Policy {
    for entity in tree.entities() {
        policy.set_grant(&entity.id, entity.grant());
    }
    policy
}

/// Visibility documents of every dashboard in the tree.
///
/// A dashboard counts as visible when at least one of its views is.
pub fn encode_dashboards(tree: &SelectionTree) -> DashboardPolicies {
    tree.dashboards()
        .iter()
        .map(|dashboard| {
            let views = (!dashboard.is_empty()).then(|| {
                dashboard
                    .children()
                    .iter()
                    .map(|view| (view.id().to_owned(), view.visible))
                    .collect()
            });
            let policy = DashboardPolicy {
                visible: dashboard.state(Field::Visible) != TriState::Off,
                views,
            };
            (dashboard.id().to_owned(), policy)
        })
        .collect()
}

/// Produce the subject to persist from its current tree.
///
/// Dashboards of groups are merged into the stored ones so that entries for dashboards which are
/// no longer part of the template are kept.
pub fn encode(tree: &SelectionTree, kind: SubjectKind, subject: &Subject) -> Subject {
    let mut encoded = subject.clone();
    encoded.policy = Some(encode_policy(tree, subject.policy()));

    if kind.is_group() && !tree.dashboards().is_empty() {
        let mut dashboards = subject.dashboards.clone().unwrap_or_default();
        dashboards.extend(encode_dashboards(tree));
        encoded.dashboards = Some(dashboards);
    }

    encoded
}
