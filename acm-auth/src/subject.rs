// SPDX-License-Identifier: MIT OR Apache-2.0

//! Users and groups which policies are assigned to.
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Grant;
use crate::policy::{DashboardPolicies, Policy, lenient};

/// Identifier of the built-in group every regular user belongs to.
pub const SYSTEM_USERS: &str = "system-users";

/// Identifier of the built-in administrators group.
pub const SYSTEM_ADMIN: &str = "system-admin";

/// Identifier of the built-in read-only group.
pub const SYSTEM_READ_ONLY: &str = "system-read-only";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    User,
    Group,
}

impl SubjectKind {
    pub fn is_user(&self) -> bool {
        matches!(self, SubjectKind::User)
    }

    pub fn is_group(&self) -> bool {
        matches!(self, SubjectKind::Group)
    }
}

impl Display for SubjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubjectKind::User => "user",
            SubjectKind::Group => "group",
        };

        write!(f, "{}", s)
    }
}

/// Identity of a subject: which list it lives in and its id within that list.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectRef {
    pub kind: SubjectKind,
    pub id: String,
}

impl SubjectRef {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::User,
            id: id.into(),
        }
    }

    pub fn group(id: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::Group,
            id: id.into(),
        }
    }
}

impl Display for SubjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Groups whose effective grants are fixed, whatever their stored policy says.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinSubject {
    Users,
    Admin,
    ReadOnly,
}

impl BuiltinSubject {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            SYSTEM_USERS => Some(BuiltinSubject::Users),
            SYSTEM_ADMIN => Some(BuiltinSubject::Admin),
            SYSTEM_READ_ONLY => Some(BuiltinSubject::ReadOnly),
            _ => None,
        }
    }

    /// Grant this subject holds on every entity.
    pub fn grant(&self) -> Grant {
        match self {
            BuiltinSubject::Users | BuiltinSubject::Admin => Grant::ReadWrite,
            BuiltinSubject::ReadOnly => Grant::ReadOnly,
        }
    }
}

/// A user or group as stored by the backend.
///
/// Fields which are not interpreted here (`is_owner`, `system_generated`, ...) are kept in
/// `extra` so that saving a subject never drops them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Groups a user belongs to. Never set for groups.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub group_ids: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub policy: Option<Policy>,

    /// Dashboard visibility, only meaningful for groups.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub dashboards: Option<DashboardPolicies>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Subject {
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

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Name to show for this subject: `name`, else `username`, else the id.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or_else(|| self.extra.get("username").and_then(Value::as_str))
            .unwrap_or(&self.id)
    }

    /// Policy of this subject, empty when none is stored.
    pub fn policy(&self) -> Policy {
        self.policy.clone().unwrap_or_default()
    }

    pub fn builtin(&self) -> Option<BuiltinSubject> {
        BuiltinSubject::from_id(&self.id)
    }

    /// Overwrite this subject's fields with the ones set on `update`.
    ///
    /// Unset optional fields of `update` leave the current value in place; unknown fields are
    /// merged key by key.
    pub fn merge(&mut self, update: Subject) {
        if update.name.is_some() {
            self.name = update.name;
        }
        if update.group_ids.is_some() {
            self.group_ids = update.group_ids;
        }
        if update.policy.is_some() {
            self.policy = update.policy;
        }
        if update.dashboards.is_some() {
            self.dashboards = update.dashboards;
        }
        self.extra.extend(update.extra);
    }
}

/// All users and groups with their policies, as returned by `list_auths` and `set_auths`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthData {
    #[serde(default, deserialize_with = "lenient")]
    pub users: Vec<Subject>,

    #[serde(default, deserialize_with = "lenient")]
    pub groups: Vec<Subject>,
}

impl AuthData {
    pub fn subjects(&self, kind: SubjectKind) -> &[Subject] {
        match kind {
            SubjectKind::User => &self.users,
            SubjectKind::Group => &self.groups,
        }
    }

    fn subjects_mut(&mut self, kind: SubjectKind) -> &mut Vec<Subject> {
        match kind {
            SubjectKind::User => &mut self.users,
            SubjectKind::Group => &mut self.groups,
        }
    }

    pub fn find(&self, subject: &SubjectRef) -> Option<&Subject> {
        self.subjects(subject.kind)
            .iter()
            .find(|candidate| candidate.id == subject.id)
    }

    /// Merge `subject` into the existing entry with the same id, or append it.
    ///
    /// Returns `true` if an existing entry was updated.
    pub fn upsert(&mut self, kind: SubjectKind, subject: Subject) -> bool {
        let subjects = self.subjects_mut(kind);
        match subjects.iter_mut().find(|existing| existing.id == subject.id) {
            Some(existing) => {
                existing.merge(subject);
                true
            }
            None => {
                subjects.push(subject);
                false
            }
        }
    }
}
