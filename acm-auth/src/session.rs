// SPDX-License-Identifier: MIT OR Apache-2.0

//! Editing session over one backend.
//!
//! A [`Session`] decides which subject is being edited and owns the selection tree of that
//! subject. The tree is rebuilt from scratch whenever the subject, the catalog or the stored
//! policies change, and each rebuild gets a new revision number.
//!
//! All state lives on a single task. Backend calls are the only suspension points, and no
//! borrow of the session state is held across them, so continuations always see the state as it
//! is when the response arrives.
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::error::Error;

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::catalog::{Catalog, DashboardTemplate, Partition};
use crate::codec::{decode, encode};
use crate::config::Config;
use crate::search::{ExpandState, ScopedView};
use crate::subject::{AuthData, Subject, SubjectKind, SubjectRef};
use crate::traits::AuthBackend;
use crate::tree::{Section, SelectionTree};
use crate::{Field, TriState};

#[derive(Debug, Error)]
pub enum SessionError<E>
where
    E: Error,
{
    #[error("backend request failed: {0}")]
    Backend(E),
}

/// Which subject the operator has chosen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    None,
    User(String),
    Group(String),
}

impl Selection {
    pub fn subject_ref(&self) -> Option<SubjectRef> {
        match self {
            Selection::None => None,
            Selection::User(id) => Some(SubjectRef::user(id.clone())),
            Selection::Group(id) => Some(SubjectRef::group(id.clone())),
        }
    }
}

impl From<&SubjectRef> for Selection {
    fn from(subject: &SubjectRef) -> Self {
        match subject.kind {
            SubjectKind::User => Selection::User(subject.id.clone()),
            SubjectKind::Group => Selection::Group(subject.id.clone()),
        }
    }
}

/// The subject being edited together with its decoded tree.
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveSubject {
    pub subject_ref: SubjectRef,

    /// Subject as it was when the tree was decoded.
    pub subject: Subject,

    pub tree: SelectionTree,

    /// Increases with every decode during the lifetime of the session.
    pub revision: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The subject's tree was decoded and is now active.
    Loaded,

    /// The dashboard template is not known yet. The group becomes active once it is loaded.
    Deferred,

    /// No subject with this id exists. Nothing changed.
    NotFound,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The subject was stored and its tree decoded again from the response.
    Saved { revision: u64 },

    /// Another save was still in flight. Nothing was sent.
    Skipped,

    /// The subject was stored, but another subject became active before the response arrived.
    /// The response updated the stored subjects only.
    Discarded,

    /// No subject is selected.
    NoSubject,
}

#[derive(Debug, Default)]
struct SessionState {
    users: Vec<Subject>,
    auths: AuthData,
    partition: Partition,
    template: Option<DashboardTemplate>,
    selection: Selection,
    active: Option<ActiveSubject>,
    pending_group: Option<String>,
    revision: u64,
    saving: bool,
    search_term: String,
    search_generation: u64,
    loading: bool,
    view: ScopedView,
    expand: ExpandState,
    attention: BTreeSet<String>,
}

impl SessionState {
    /// Stored subject for `subject`, falling back to the listed user when none is stored yet.
    fn resolve(&self, subject: &SubjectRef) -> Option<Subject> {
        if let Some(stored) = self.auths.find(subject) {
            return Some(stored.clone());
        }
        if !subject.kind.is_user() {
            return None;
        }
        self.users.iter().find(|user| user.id == subject.id).cloned()
    }

    fn activate(&mut self, subject_ref: SubjectRef, subject: Subject) -> u64 {
        let tree = decode(
            &self.partition,
            self.template.as_ref(),
            subject_ref.kind,
            &subject,
        );
        self.revision += 1;
        debug!(subject = %subject_ref, revision = self.revision, "activated subject");

        self.selection = Selection::from(&subject_ref);
        self.active = Some(ActiveSubject {
            subject_ref,
            subject,
            tree,
            revision: self.revision,
        });
        self.project();
        self.revision
    }

    /// Decode the active subject again from the current stored subjects.
    ///
    /// The tree is kept as it is when the subject is gone.
    fn redecode(&mut self) -> Option<u64> {
        let subject_ref = self.selection.subject_ref()?;
        match self.resolve(&subject_ref) {
            Some(subject) => Some(self.activate(subject_ref, subject)),
            None => {
                warn!(subject = %subject_ref, "active subject no longer exists, keeping its tree");
                None
            }
        }
    }

    fn project(&mut self) {
        self.view = match &self.active {
            Some(active) => ScopedView::project(&active.tree, &self.search_term),
            None => ScopedView::default(),
        };
    }

    fn flag_attention(&mut self, config: &Config) {
        self.attention = self
            .auths
            .groups
            .iter()
            .filter(|group| {
                config.is_custom_group(&group.id) && group.policy().explicit_grants() == 0
            })
            .map(|group| group.id.clone())
            .collect();
        if !self.attention.is_empty() {
            trace!(groups = ?self.attention, "groups without any grant");
        }
    }

    fn apply_auths(&mut self, auths: AuthData, config: &Config) {
        self.auths = auths;
        self.flag_attention(config);
    }
}

/// Editing session for the authorization of users and groups.
#[derive(Debug)]
pub struct Session<B> {
    backend: B,
    config: Config,
    state: RefCell<SessionState>,
}

impl<B> Session<B>
where
    B: AuthBackend,
{
    pub fn new(backend: B, config: Config) -> Self {
        Self {
            backend,
            config,
            state: RefCell::new(SessionState::default()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetch users, stored policies and the entity catalog.
    ///
    /// The active subject, if any, is decoded again against the fresh data.
    pub async fn load(&self) -> Result<(), SessionError<B::Error>> {
        let users = self.backend.list_users().await.map_err(SessionError::Backend)?;
        let auths = self.backend.list_auths().await.map_err(SessionError::Backend)?;
        let devices = self.backend.list_devices().await.map_err(SessionError::Backend)?;
        let helpers = self.backend.list_helpers().await.map_err(SessionError::Backend)?;

        let mut state = self.state.borrow_mut();
        state.users = users;
        state.partition = Catalog::new(devices, helpers).partition();
        state.apply_auths(auths, &self.config);
        debug!(
            users = state.users.len(),
            groups = state.auths.groups.len(),
            devices = state.partition.devices.len(),
            "loaded catalog and policies"
        );
        state.redecode();
        Ok(())
    }

    /// Fetch the dashboard template unless it is already known.
    ///
    /// Returns the outcome of selecting the pending group, if one was waiting for the template.
    pub async fn load_dashboards(&self) -> Result<Option<SelectOutcome>, SessionError<B::Error>> {
        if self.state.borrow().template.is_some() {
            return Ok(None);
        }

        let dashboards = self
            .backend
            .list_dashboards()
            .await
            .map_err(SessionError::Backend)?;

        let pending = {
            let mut state = self.state.borrow_mut();
            // Another call may have finished first.
            if state.template.is_some() {
                return Ok(None);
            }
            let template = DashboardTemplate::new(dashboards);
            debug!(dashboards = template.dashboards().len(), "loaded dashboard template");
            state.template = Some(template);
            state.pending_group.take()
        };

        Ok(pending.map(|group_id| {
            debug!(group = %group_id, "resolving pending group selection");
            self.select_group(&group_id)
        }))
    }

    /// Make a user the active subject. Dashboards are never part of a user's tree.
    pub fn select_user(&self, user_id: &str) -> SelectOutcome {
        let subject_ref = SubjectRef::user(user_id);
        let mut state = self.state.borrow_mut();
        let Some(subject) = state.resolve(&subject_ref) else {
            debug!(subject = %subject_ref, "unknown subject selected");
            return SelectOutcome::NotFound;
        };

        state.pending_group = None;
        state.activate(subject_ref, subject);
        SelectOutcome::Loaded
    }

    /// Make a group the active subject.
    ///
    /// Without a dashboard template the group is remembered instead, replacing any group which
    /// was already waiting, and selected as soon as [`Session::load_dashboards`] completes.
    pub fn select_group(&self, group_id: &str) -> SelectOutcome {
        let subject_ref = SubjectRef::group(group_id);
        let mut state = self.state.borrow_mut();
        let Some(subject) = state.resolve(&subject_ref) else {
            debug!(subject = %subject_ref, "unknown subject selected");
            return SelectOutcome::NotFound;
        };

        if state.template.is_none() {
            debug!(subject = %subject_ref, "deferring group selection until dashboards are loaded");
            state.pending_group = Some(subject_ref.id);
            return SelectOutcome::Deferred;
        }

        state.pending_group = None;
        state.activate(subject_ref, subject);
        SelectOutcome::Loaded
    }

    /// Return to the initial state without an active subject.
    pub fn clear_selection(&self) {
        let mut state = self.state.borrow_mut();
        state.selection = Selection::None;
        state.active = None;
        state.pending_group = None;
        state.project();
    }

    pub fn selection(&self) -> Selection {
        self.state.borrow().selection.clone()
    }

    pub fn pending_group(&self) -> Option<String> {
        self.state.borrow().pending_group.clone()
    }

    /// Run `f` against a snapshot of the active subject.
    ///
    /// No session state is borrowed while `f` runs, so it may call back into the session.
    pub fn with_active<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&ActiveSubject) -> R,
    {
        self.active().map(|active| f(&active))
    }

    /// Snapshot of the active subject.
    pub fn active(&self) -> Option<ActiveSubject> {
        self.state.borrow().active.clone()
    }

    pub fn users(&self) -> Vec<Subject> {
        self.state.borrow().users.clone()
    }

    pub fn auths(&self) -> AuthData {
        self.state.borrow().auths.clone()
    }

    pub fn template(&self) -> Option<DashboardTemplate> {
        self.state.borrow().template.clone()
    }

    /// Top-down toggle of a group node of the active tree.
    pub fn toggle_group(&self, section: Section, group_id: &str, field: Field, value: bool) -> bool {
        self.state
            .borrow_mut()
            .active
            .as_mut()
            .is_some_and(|active| active.tree.toggle_group(section, group_id, field, value))
    }

    /// Bottom-up toggle of a leaf of the active tree.
    pub fn toggle_leaf(
        &self,
        section: Section,
        group_id: &str,
        leaf_id: &str,
        field: Field,
        value: bool,
    ) -> bool {
        self.state.borrow_mut().active.as_mut().is_some_and(|active| {
            active
                .tree
                .toggle_leaf(section, group_id, leaf_id, field, value)
        })
    }

    /// Set a field on everything in a section which matches the current search term.
    pub fn select_all(&self, section: Section, field: Field, value: bool) -> usize {
        let mut state = self.state.borrow_mut();
        let SessionState { active, view, .. } = &mut *state;
        match active {
            Some(active) => view.select_all(&mut active.tree, section, field, value),
            None => 0,
        }
    }

    /// State of the select-all checkbox of a section under the current search term.
    pub fn select_all_state(&self, section: Section, field: Field) -> Option<TriState> {
        let state = self.state.borrow();
        state
            .active
            .as_ref()
            .map(|active| state.view.select_all_state(&active.tree, section, field))
    }

    /// Change the search term.
    ///
    /// The view is projected again right away and the loading indicator is raised. Returns the
    /// generation to pass to [`Session::settle_search`].
    pub fn set_search_term(&self, term: &str) -> u64 {
        let mut state = self.state.borrow_mut();
        state.search_term = term.to_owned();
        state.search_generation += 1;
        state.loading = true;
        state.project();
        state.search_generation
    }

    /// Wait for the debounce period and clear the loading indicator, unless the term changed
    /// again in the meantime.
    ///
    /// Returns `true` if this call cleared the indicator.
    pub async fn settle_search(&self, generation: u64) -> bool {
        tokio::time::sleep(self.config.search_debounce).await;

        let mut state = self.state.borrow_mut();
        if state.search_generation != generation {
            return false;
        }
        state.loading = false;
        true
    }

    pub fn search_term(&self) -> String {
        self.state.borrow().search_term.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn scoped_view(&self) -> ScopedView {
        self.state.borrow().view.clone()
    }

    /// Flip the manual expansion of a group. Never changes any flag.
    pub fn toggle_expanded(&self, section: Section, group_id: &str) -> bool {
        self.state.borrow_mut().expand.toggle(section, group_id)
    }

    pub fn is_expanded(&self, section: Section, group_id: &str) -> bool {
        let state = self.state.borrow();
        state.expand.is_expanded(&state.view, section, group_id)
    }

    /// Persist the active subject.
    ///
    /// Only one save can be in flight; further calls return [`SaveOutcome::Skipped`] until it
    /// completes. The response replaces the stored subjects and the active tree is decoded again
    /// from it, as long as the same subject is still active.
    pub async fn save(&self) -> Result<SaveOutcome, SessionError<B::Error>> {
        let (subject_ref, encoded) = {
            let mut state = self.state.borrow_mut();
            if state.saving {
                debug!("save already in flight, skipping");
                return Ok(SaveOutcome::Skipped);
            }
            let Some(active) = &state.active else {
                return Ok(SaveOutcome::NoSubject);
            };
            let encoded = encode(&active.tree, active.subject_ref.kind, &active.subject);
            let subject_ref = active.subject_ref.clone();
            state.saving = true;
            (subject_ref, encoded)
        };

        debug!(subject = %subject_ref, "saving subject");
        let result = self.backend.set_auths(subject_ref.kind, encoded).await;

        let mut state = self.state.borrow_mut();
        state.saving = false;
        let auths = result.map_err(SessionError::Backend)?;
        state.apply_auths(auths, &self.config);

        let still_active = state
            .active
            .as_ref()
            .is_some_and(|active| active.subject_ref == subject_ref);
        if !still_active {
            debug!(subject = %subject_ref, "subject changed while saving, discarding response");
            return Ok(SaveOutcome::Discarded);
        }

        Ok(match state.redecode() {
            Some(revision) => SaveOutcome::Saved { revision },
            None => SaveOutcome::Discarded,
        })
    }

    pub fn is_saving(&self) -> bool {
        self.state.borrow().saving
    }

    /// Apply stored subjects fetched elsewhere and decode the active subject again.
    ///
    /// Returns the new revision, or `None` if there is no active subject or it no longer exists,
    /// in which case its tree is kept as it is.
    pub fn refresh(&self, auths: AuthData) -> Option<u64> {
        let mut state = self.state.borrow_mut();
        state.apply_auths(auths, &self.config);
        state.redecode()
    }

    /// Fetch the stored subjects again and [`refresh`](Session::refresh) from them.
    pub async fn reload_auths(&self) -> Result<Option<u64>, SessionError<B::Error>> {
        let auths = self.backend.list_auths().await.map_err(SessionError::Backend)?;
        Ok(self.refresh(auths))
    }

    /// Returns `true` if an operator-created group holds no grant at all.
    pub fn needs_attention(&self, group_id: &str) -> bool {
        self.state.borrow().attention.contains(group_id)
    }

    /// Ids of all groups which need attention.
    pub fn attention(&self) -> Vec<String> {
        self.state.borrow().attention.iter().cloned().collect()
    }

    /// Ask the backend to restart the system.
    pub async fn restart(&self) -> Result<(), SessionError<B::Error>> {
        self.backend.restart_system().await.map_err(|err| {
            warn!(%err, "restart request failed");
            SessionError::Backend(err)
        })
    }
}
