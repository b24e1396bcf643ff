// SPDX-License-Identifier: MIT OR Apache-2.0

//! Edit the grants of a group against an in-memory backend.
//!
//! Run with `RUST_LOG=acm_auth=debug` to see what the session does.
use acm_auth::catalog::{CatalogDashboard, CatalogDevice, CatalogEntity, CatalogView};
use acm_auth::memory::MemoryBackend;
use acm_auth::session::Session;
use acm_auth::subject::{AuthData, Subject};
use acm_auth::tree::Section;
use acm_auth::{Config, Field};
use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

pub fn setup_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();
}

fn backend() -> MemoryBackend {
    MemoryBackend::new()
        .with_users(vec![Subject::new("u1").with_name("Ada")])
        .with_devices(vec![
            CatalogDevice::without_devices(vec![CatalogEntity::new("sun.sun").with_name("Sun")]),
            CatalogDevice::new("kitchen", "Kitchen")
                .with_entity(CatalogEntity::new("light.kitchen").with_name("Kitchen light"))
                .with_entity(CatalogEntity::new("switch.kettle").with_name("Kettle")),
        ])
        .with_helpers(vec![
            CatalogEntity::new("input_boolean.guest_mode").with_name("Guest mode"),
        ])
        .with_dashboards(vec![CatalogDashboard {
            id: "lovelace".into(),
            name: Some("Overview".into()),
            visible: true,
            views: vec![CatalogView {
                path: Some("home".into()),
                title: Some("Home".into()),
                ..Default::default()
            }],
        }])
        .with_auths(AuthData {
            users: vec![],
            groups: vec![Subject::new("custom-kids").with_name("Kids")],
        })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    setup_logging();

    let backend = backend();
    let session = Session::new(backend.clone(), Config::default());
    session.load().await?;
    session.load_dashboards().await?;

    for group_id in session.attention() {
        println!("{group_id} has no grants yet");
    }

    session.select_group("custom-kids");

    // Let the kids read everything with "light" in its name and see the home view.
    session.set_search_term("light");
    let touched = session.select_all(Section::Devices, Field::Read, true);
    println!("granted read access to {touched} entities");
    session.set_search_term("");

    session.toggle_leaf(Section::Dashboards, "lovelace", "home", Field::Visible, true);

    let outcome = session.save().await?;
    println!("save: {outcome:?}");

    let stored = backend.auths();
    for group in &stored.groups {
        println!(
            "{}: {}",
            group.display_name(),
            serde_json::to_string_pretty(&group.policy())?
        );
    }

    if session.attention().is_empty() {
        println!("every custom group holds at least one grant");
    }

    Ok(())
}
