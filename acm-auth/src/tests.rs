// SPDX-License-Identifier: MIT OR Apache-2.0

use serde_json::json;

use crate::catalog::Catalog;
use crate::codec::{decode, encode_policy};
use crate::memory::MemoryBackend;
use crate::session::{SaveOutcome, SelectOutcome, Selection, Session, SessionError};
use crate::subject::{AuthData, Subject, SubjectKind};
use crate::test_utils::{
    TestBackend, TestBackendError, device, policy, sample_backend, setup_logging,
};
use crate::traits::Leaf;
use crate::tree::Section;
use crate::{Config, Field, Grant, TriState};

fn session() -> Session<TestBackend> {
    Session::new(TestBackend::new(sample_backend()), Config::default())
}

fn grant_of(session: &Session<TestBackend>, entity_id: &str) -> Option<Grant> {
    session
        .with_active(|active| active.tree.entity(entity_id).map(|entity| entity.grant()))
        .flatten()
}

#[test]
fn device_toggle_round_trip() {
    let catalog = Catalog::new(vec![device("D", &["e1", "e2"])], vec![]);
    let subject = Subject::new("u1").with_policy(policy(json!({ "e1": true })));

    let mut tree = decode(&catalog.partition(), None, SubjectKind::User, &subject);
    assert_eq!(tree.entity("e1").unwrap().grant(), Grant::ReadWrite);
    assert_eq!(tree.entity("e2").unwrap().grant(), Grant::Denied);
    assert_eq!(
        tree.group_state(Section::Devices, "D", Field::Read),
        Some(TriState::Mixed)
    );
    assert_eq!(
        tree.group_state(Section::Devices, "D", Field::Write),
        Some(TriState::Mixed)
    );

    assert!(tree.toggle_group(Section::Devices, "D", Field::Write, true));
    assert!(tree.entity("e1").unwrap().write);
    assert!(tree.entity("e2").unwrap().write);
    assert_eq!(
        tree.group_state(Section::Devices, "D", Field::Write),
        Some(TriState::On)
    );
    assert_eq!(
        tree.group_state(Section::Devices, "D", Field::Read),
        Some(TriState::Mixed)
    );

    // e2 is writable but not readable, which is no grant at all.
    let encoded = encode_policy(&tree, subject.policy());
    assert_eq!(
        serde_json::to_value(&encoded.entities.entity_ids).unwrap(),
        json!({ "e1": true })
    );
}

#[tokio::test]
async fn unlisted_helpers_are_classified() {
    let backend = MemoryBackend::new()
        .with_users(vec![Subject::new("u1")])
        .with_devices(vec![device("d1", &["light.desk", "input_boolean.x"])]);
    let session = Session::new(backend, Config::default());
    session.load().await.unwrap();
    session.select_user("u1");

    session
        .with_active(|active| {
            let helper_ids: Vec<&str> =
                active.tree.helpers().children().iter().map(|e| e.id()).collect();
            assert_eq!(helper_ids, vec!["input_boolean.x"]);
            assert_eq!(active.tree.devices()[0].children().len(), 1);
        })
        .unwrap();
}

#[tokio::test]
async fn partition_through_session() {
    setup_logging();
    let session = session();
    session.load().await.unwrap();
    session.select_user("u1");

    session
        .with_active(|active| {
            let tree = &active.tree;
            let helper_ids: Vec<&str> = tree.helpers().children().iter().map(|e| e.id()).collect();
            assert_eq!(helper_ids, vec!["input_boolean.guest", "light.downstairs"]);

            let ownerless: Vec<&str> = tree.ownerless().children().iter().map(|e| e.id()).collect();
            assert_eq!(ownerless, vec!["sun.sun"]);

            assert_eq!(tree.devices().len(), 2);
            assert_eq!(tree.entities().count(), 6);
            assert_eq!(
                tree.entity("sensor.kitchen_temperature").unwrap().name,
                "Temperature"
            );

            // Dashboards are a group-only concept.
            assert!(tree.dashboards().is_empty());
        })
        .unwrap();

    assert_eq!(grant_of(&session, "light.kitchen"), Some(Grant::ReadWrite));
    assert_eq!(grant_of(&session, "light.hall"), Some(Grant::Denied));
}

#[tokio::test]
async fn save_guard() {
    setup_logging();
    let session = session();
    session.load().await.unwrap();
    assert_eq!(session.select_user("u1"), SelectOutcome::Loaded);

    let (first, second) = tokio::join!(session.save(), session.save());
    assert!(matches!(first.unwrap(), SaveOutcome::Saved { .. }));
    assert_eq!(second.unwrap(), SaveOutcome::Skipped);
    assert_eq!(session.backend().set_auths_calls(), 1);
    assert!(!session.is_saving());

    assert!(matches!(session.save().await.unwrap(), SaveOutcome::Saved { .. }));
    assert_eq!(session.backend().set_auths_calls(), 2);
}

#[tokio::test]
async fn save_guard_cleared_on_failure() {
    let session = session();
    session.load().await.unwrap();
    session.select_user("u1");
    let revision = session.with_active(|active| active.revision).unwrap();

    session.backend().fail_set_auths(true);
    let result = session.save().await;
    assert!(matches!(
        result,
        Err(SessionError::Backend(TestBackendError::Injected))
    ));
    assert!(!session.is_saving());
    // The tree is left alone on failure.
    assert_eq!(
        session.with_active(|active| active.revision),
        Some(revision)
    );

    session.backend().fail_set_auths(false);
    assert!(matches!(session.save().await.unwrap(), SaveOutcome::Saved { .. }));
}

#[tokio::test]
async fn save_persists_edits() {
    let session = session();
    session.load().await.unwrap();
    session.select_user("u1");

    assert!(session.toggle_leaf(Section::Devices, "hall", "light.hall", Field::Read, true));
    assert!(session.toggle_leaf(
        Section::Devices,
        "kitchen",
        "light.kitchen",
        Field::Write,
        false
    ));

    let outcome = session.save().await.unwrap();
    let SaveOutcome::Saved { revision } = outcome else {
        panic!("expected a saved outcome, got {outcome:?}");
    };
    assert_eq!(
        session.with_active(|active| active.revision),
        Some(revision)
    );

    let stored = session.backend().inner().auths();
    let u1 = &stored.users[0];
    assert_eq!(
        serde_json::to_value(&u1.policy.as_ref().unwrap().entities.entity_ids).unwrap(),
        json!({
            "light.hall": { "read": true },
            "light.kitchen": { "read": true },
        })
    );
    assert_eq!(grant_of(&session, "light.hall"), Some(Grant::ReadOnly));
}

#[tokio::test]
async fn stale_save_is_discarded() {
    setup_logging();
    let session = session();
    session.load().await.unwrap();
    session.select_user("u1");
    session.toggle_leaf(Section::Devices, "hall", "light.hall", Field::Read, true);

    let (saved, selected) = tokio::join!(session.save(), async { session.select_user("u2") });
    assert_eq!(saved.unwrap(), SaveOutcome::Discarded);
    assert_eq!(selected, SelectOutcome::Loaded);

    // u2 stays active with its own (empty) grants.
    assert_eq!(session.selection(), Selection::User("u2".into()));
    assert_eq!(grant_of(&session, "light.hall"), Some(Grant::Denied));

    // The save itself went through.
    let u1 = session
        .auths()
        .users
        .into_iter()
        .find(|user| user.id == "u1")
        .unwrap();
    assert_eq!(u1.policy().grant("light.hall"), Grant::ReadOnly);
}

#[tokio::test]
async fn pending_group_selection() {
    let session = session();
    session.load().await.unwrap();

    assert_eq!(session.select_group("custom-kids"), SelectOutcome::Deferred);
    assert_eq!(session.select_group("custom-guests"), SelectOutcome::Deferred);
    assert_eq!(session.pending_group().as_deref(), Some("custom-guests"));
    assert_eq!(session.selection(), Selection::None);

    // Unknown groups do not touch the pending slot.
    assert_eq!(session.select_group("nope"), SelectOutcome::NotFound);
    assert_eq!(session.pending_group().as_deref(), Some("custom-guests"));

    assert_eq!(
        session.load_dashboards().await.unwrap(),
        Some(SelectOutcome::Loaded)
    );
    assert_eq!(session.pending_group(), None);
    assert_eq!(session.selection(), Selection::Group("custom-guests".into()));
    assert_eq!(
        session.with_active(|active| active.tree.dashboards().len()),
        Some(2)
    );
    assert_eq!(grant_of(&session, "light.hall"), Some(Grant::ReadOnly));
}

#[tokio::test]
async fn later_selection_drops_pending_group() {
    let session = session();
    session.load().await.unwrap();

    assert_eq!(session.select_group("custom-kids"), SelectOutcome::Deferred);
    assert_eq!(session.select_user("u1"), SelectOutcome::Loaded);
    assert_eq!(session.pending_group(), None);

    assert_eq!(session.load_dashboards().await.unwrap(), None);
    assert_eq!(session.selection(), Selection::User("u1".into()));

    // Once the template is known groups load right away.
    assert_eq!(session.select_group("custom-kids"), SelectOutcome::Loaded);
}

#[tokio::test]
async fn builtin_groups() {
    let session = session();
    session.load().await.unwrap();
    session.load_dashboards().await.unwrap();

    session.select_group("system-read-only");
    session
        .with_active(|active| {
            assert!(active.tree.entities().all(|e| e.grant() == Grant::ReadOnly));
            assert!(
                active
                    .tree
                    .dashboards()
                    .iter()
                    .all(|d| d.state(Field::Visible) == TriState::On)
            );
        })
        .unwrap();

    session.select_group("system-users");
    assert_eq!(grant_of(&session, "sun.sun"), Some(Grant::ReadWrite));
}

#[tokio::test]
async fn dashboards_saved_for_groups() {
    let session = session();
    session.load().await.unwrap();
    session.load_dashboards().await.unwrap();
    session.select_group("custom-kids");

    assert_eq!(
        session.select_all_state(Section::Dashboards, Field::Visible),
        Some(TriState::Off)
    );
    assert!(session.toggle_leaf(Section::Dashboards, "lovelace", "home", Field::Visible, true));
    assert!(session.toggle_group(Section::Dashboards, "map", Field::Visible, true));

    session.save().await.unwrap();

    let stored = session.backend().inner().auths();
    let kids = stored.groups.iter().find(|g| g.id == "custom-kids").unwrap();
    assert_eq!(
        serde_json::to_value(kids.dashboards.as_ref().unwrap()).unwrap(),
        json!({
            "lovelace": { "visible": true, "views": { "home": true, "energy": false } },
            "map": { "visible": true },
        })
    );
    assert_eq!(
        session.with_active(|active| {
            active
                .tree
                .group_state(Section::Dashboards, "lovelace", Field::Visible)
        }),
        Some(Some(TriState::Mixed))
    );
}

#[tokio::test]
async fn refresh_keeps_missing_subject() {
    let session = session();
    session.load().await.unwrap();
    session.load_dashboards().await.unwrap();
    session.select_group("custom-guests");

    // Another operator grants write access in the meantime.
    let mut auths = session.backend().inner().auths();
    for group in auths.groups.iter_mut().filter(|g| g.id == "custom-guests") {
        group.policy = Some(policy(json!({ "light.hall": true })));
    }
    session.backend().inner().replace_auths(auths);

    assert!(session.reload_auths().await.unwrap().is_some());
    assert_eq!(grant_of(&session, "light.hall"), Some(Grant::ReadWrite));

    // The group is removed: its last tree stays.
    let revision = session.with_active(|active| active.revision);
    assert_eq!(session.refresh(AuthData::default()), None);
    assert_eq!(session.with_active(|active| active.revision), revision);
    assert_eq!(grant_of(&session, "light.hall"), Some(Grant::ReadWrite));
    assert_eq!(session.selection(), Selection::Group("custom-guests".into()));
}

#[tokio::test]
async fn attention_for_empty_custom_groups() {
    let session = session();
    session.load().await.unwrap();
    session.load_dashboards().await.unwrap();

    assert_eq!(session.attention(), vec!["custom-kids".to_string()]);
    assert!(session.needs_attention("custom-kids"));
    assert!(!session.needs_attention("custom-guests"));
    assert!(!session.needs_attention("system-users"));

    session.select_group("custom-kids");
    session.toggle_leaf(Section::Ownerless, "withoutDevices", "sun.sun", Field::Read, true);
    session.save().await.unwrap();
    assert!(session.attention().is_empty());

    let prefixed = Session::new(
        TestBackend::new(sample_backend()),
        Config::new().with_custom_group_prefix("system-"),
    );
    prefixed.load().await.unwrap();
    assert_eq!(prefixed.attention().len(), 3);
}

#[tokio::test]
async fn scoped_select_all() {
    let session = session();
    session.load().await.unwrap();
    session.select_user("u1");

    session.set_search_term("LIGHT");
    let view = session.scoped_view();
    assert!(view.is_visible(Section::Devices, "kitchen", "light.kitchen"));
    assert!(!view.is_visible(Section::Devices, "kitchen", "sensor.kitchen_temperature"));
    assert!(session.is_expanded(Section::Devices, "kitchen"));

    assert_eq!(session.select_all(Section::Devices, Field::Read, true), 2);
    assert_eq!(
        session.select_all_state(Section::Devices, Field::Read),
        Some(TriState::On)
    );

    session
        .with_active(|active| {
            let tree = &active.tree;
            assert!(tree.entity("light.hall").unwrap().read);
            assert!(!tree.entity("sensor.kitchen_temperature").unwrap().read);
            // Helpers are a different section.
            assert!(!tree.entity("light.downstairs").unwrap().read);
            assert_eq!(
                tree.group_state(Section::Devices, "kitchen", Field::Read),
                Some(TriState::Mixed)
            );
        })
        .unwrap();

    // Clearing the term brings everything back into scope.
    session.set_search_term("");
    assert_eq!(
        session.select_all_state(Section::Devices, Field::Read),
        Some(TriState::Mixed)
    );
    assert!(!session.is_expanded(Section::Devices, "kitchen"));
    assert!(session.toggle_expanded(Section::Devices, "kitchen"));
    assert!(session.is_expanded(Section::Devices, "kitchen"));
}

#[tokio::test(start_paused = true)]
async fn search_loading_is_debounced() {
    let session = session();
    session.load().await.unwrap();
    session.select_user("u1");

    let first = session.set_search_term("kitchen");
    assert!(session.is_loading());
    // Filtering does not wait for the debounce.
    assert_eq!(session.scoped_view().groups(Section::Devices).len(), 1);

    let second = session.set_search_term("hall");
    assert_eq!(
        session.scoped_view().groups(Section::Devices)[0].group_id,
        "hall"
    );

    let (stale, settled) = tokio::join!(
        session.settle_search(first),
        session.settle_search(second)
    );
    assert!(!stale);
    assert!(settled);
    assert!(!session.is_loading());
    assert_eq!(session.search_term(), "hall");
}

#[tokio::test]
async fn restart_reports_failures() {
    let session = session();
    session.restart().await.unwrap();
    assert_eq!(session.backend().inner().restarts(), 1);

    session.backend().fail_restart(true);
    assert!(session.restart().await.is_err());
    assert_eq!(session.backend().inner().restarts(), 1);
}
