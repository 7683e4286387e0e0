//! Link connections, chains and link persistence.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use storyrunner_controller::application::page::link_key;
use storyrunner_controller::domain::events::LinkEvent;
use storyrunner_core::error::StoryError;
use storyrunner_core::ledger::LedgerPage;
use storyrunner_core::link::{LinkConnectionType, LinkPath};
use storyrunner_core::module::{ModuleSource, ModuleSurface, Noun};
use storyrunner_test_support::DelayedPage;

use common::{controller_on_delayed_page, harness, harness_builder, intent, path, start_in_shell};

#[tokio::test]
async fn test_write_through_one_module_is_read_by_another() {
    // Arrange
    let h = harness();
    start_in_shell(&h.controller, &[], "X", "mod://x").await.unwrap();
    h.controller
        .start_module(
            path(&[]),
            "Y",
            intent("mod://y")
                .with_noun("shared", Noun::Link(LinkPath::new(path(&["X"]), "shared"))),
            ModuleSurface::Headless,
            ModuleSource::Internal,
        )
        .await
        .unwrap();
    let x = h.launcher.context(&path(&["X"])).unwrap();
    let y = h.launcher.context(&path(&["Y"])).unwrap();
    let writer = x.connect_link("shared", LinkConnectionType::ReadWrite).await.unwrap();

    // Act
    writer.set(json!({"count": 1})).await.unwrap();
    let reader = y
        .connect_chain_link("shared", LinkConnectionType::ReadOnly)
        .await
        .unwrap();

    // Assert
    assert_eq!(reader.path(), writer.path());
    assert_eq!(reader.get(), json!({"count": 1}));
}

#[tokio::test]
async fn test_read_only_connection_rejects_writes() {
    // Arrange
    let h = harness();
    let reader = h
        .controller
        .connect_link(LinkPath::story("shared"), LinkConnectionType::ReadOnly)
        .await
        .unwrap();

    // Act
    let result = reader.set(json!(1)).await;

    // Assert
    assert_eq!(result, Err(StoryError::ReadOnlyLink(LinkPath::story("shared"))));
    assert_eq!(reader.get(), serde_json::Value::Null);
}

#[tokio::test]
async fn test_connection_observes_writes_from_other_connections() {
    // Arrange
    let h = harness();
    let writer = h
        .controller
        .connect_link(LinkPath::story("shared"), LinkConnectionType::ReadWrite)
        .await
        .unwrap();
    let mut reader = h
        .controller
        .connect_link(LinkPath::story("shared"), LinkConnectionType::ReadOnly)
        .await
        .unwrap();

    // Act
    writer.set(json!("hello")).await.unwrap();

    // Assert
    assert_eq!(reader.changed().await.unwrap(), json!("hello"));
}

#[tokio::test]
async fn test_written_value_is_persisted_to_ledger() {
    // Arrange
    let h = harness();
    let link = LinkPath::new(path(&["A"]), "query");
    let writer = h
        .controller
        .connect_link(link.clone(), LinkConnectionType::ReadWrite)
        .await
        .unwrap();

    // Act
    writer.set(json!({"q": "pizza"})).await.unwrap();

    // Assert
    let stored = h.page.get(&link_key(&link)).await.unwrap();
    assert_eq!(stored, Some(json!({"q": "pizza"})));
}

#[tokio::test]
async fn test_link_is_restored_from_ledger_on_connect() {
    // Arrange
    let h = harness();
    let link = LinkPath::new(path(&["A"]), "query");
    h.page.put(&link_key(&link), json!("saved")).await.unwrap();

    // Act
    let connection = h
        .controller
        .get_link(path(&["A"]), "query")
        .await
        .unwrap();

    // Assert
    assert_eq!(connection.get(), json!("saved"));
    assert_eq!(connection.connection_type(), LinkConnectionType::ReadWrite);
}

#[tokio::test]
async fn test_json_slot_seeds_module_link() {
    // Arrange
    let h = harness();

    // Act
    h.controller
        .start_module(
            path(&[]),
            "Z",
            intent("mod://z").with_noun("query", Noun::Json(json!("pizza"))),
            ModuleSurface::Headless,
            ModuleSource::Internal,
        )
        .await
        .unwrap();

    // Assert
    let seeded = LinkPath::new(path(&["Z"]), "query");
    let active = h.controller.active_links().await.unwrap();
    assert_eq!(active.links, vec![seeded.clone()]);
    assert_eq!(h.page.get(&link_key(&seeded)).await.unwrap(), Some(json!("pizza")));
    let context = h.launcher.context(&path(&["Z"])).unwrap();
    let connection = context
        .connect_chain_link("query", LinkConnectionType::ReadOnly)
        .await
        .unwrap();
    assert_eq!(connection.get(), json!("pizza"));
}

#[tokio::test]
async fn test_persisted_value_wins_over_json_slot() {
    // Arrange
    let h = harness();
    let seeded = LinkPath::new(path(&["Z"]), "query");
    h.page.put(&link_key(&seeded), json!("earlier")).await.unwrap();

    // Act
    h.controller
        .start_module(
            path(&[]),
            "Z",
            intent("mod://z").with_noun("query", Noun::Json(json!("pizza"))),
            ModuleSurface::Headless,
            ModuleSource::Internal,
        )
        .await
        .unwrap();

    // Assert
    let connection = h.controller.connect_link(seeded, LinkConnectionType::ReadOnly).await.unwrap();
    assert_eq!(connection.get(), json!("earlier"));
}

#[tokio::test]
async fn test_unknown_chain_key_falls_back_to_module_link() {
    // Arrange
    let h = harness();
    start_in_shell(&h.controller, &[], "X", "mod://x").await.unwrap();

    // Act
    let resolved = h
        .controller
        .link_path_for_chain_key(path(&["X"]), "notes")
        .await
        .unwrap();

    // Assert
    assert_eq!(resolved, LinkPath::new(path(&["X"]), "notes"));
}

#[tokio::test]
async fn test_dropping_last_connection_removes_link() {
    // Arrange
    let h = harness();
    let connection = h
        .controller
        .connect_link(LinkPath::story("temp"), LinkConnectionType::ReadWrite)
        .await
        .unwrap();
    let mut links = h.controller.active_links().await.unwrap();
    assert_eq!(links.links, vec![LinkPath::story("temp")]);

    // Act
    drop(connection);
    h.controller.sync().await.unwrap();

    // Assert
    assert_eq!(links.events.recv().await.unwrap(), LinkEvent::Removed(LinkPath::story("temp")));
    assert!(h.controller.active_links().await.unwrap().links.is_empty());
}

#[tokio::test]
async fn test_ledger_change_updates_link_value() {
    // Arrange
    let h = harness();
    let link = LinkPath::story("remote");
    let mut connection = h
        .controller
        .connect_link(link.clone(), LinkConnectionType::ReadOnly)
        .await
        .unwrap();

    // Act
    h.page.put(&link_key(&link), json!(42)).await.unwrap();

    // Assert
    let value = tokio::time::timeout(Duration::from_secs(1), connection.changed())
        .await
        .expect("link value not updated from ledger")
        .unwrap();
    assert_eq!(value, json!(42));
}

#[tokio::test]
async fn test_story_stop_closes_links() {
    // Arrange
    let h = harness();
    h.controller.start().await.unwrap();
    let mut connection = h
        .controller
        .connect_link(LinkPath::story("shared"), LinkConnectionType::ReadWrite)
        .await
        .unwrap();

    // Act
    h.controller.stop().await.unwrap();

    // Assert
    assert_eq!(
        connection.changed().await,
        Err(StoryError::LinkNotFound(LinkPath::story("shared")))
    );
    assert_eq!(
        connection.set(json!(1)).await,
        Err(StoryError::LinkNotFound(LinkPath::story("shared")))
    );
}

#[tokio::test]
async fn test_module_links_removed_when_module_stops() {
    // Arrange
    let h = harness_builder().build();
    h.controller
        .start_module(
            path(&[]),
            "Z",
            intent("mod://z").with_noun("query", Noun::Json(json!("pizza"))),
            ModuleSurface::Headless,
            ModuleSource::Internal,
        )
        .await
        .unwrap();

    // Act
    h.controller.stop_module(path(&["Z"])).await.unwrap();

    // Assert
    assert!(h.controller.active_links().await.unwrap().links.is_empty());
}

#[tokio::test]
async fn test_echo_of_replaced_write_does_not_revert_link() {
    // Arrange
    let page = Arc::new(DelayedPage::new());
    let controller = controller_on_delayed_page(&page);
    let link = LinkPath::new(path(&["recipe"]), "servings");
    let writer = controller
        .connect_link(link.clone(), LinkConnectionType::ReadWrite)
        .await
        .unwrap();
    writer.set(json!({"count": 1})).await.unwrap();
    writer.set(json!({"count": 2})).await.unwrap();
    let mut reader = controller
        .connect_link(link.clone(), LinkConnectionType::ReadOnly)
        .await
        .unwrap();

    // Act
    assert!(page.release(&link_key(&link), &json!({"count": 1})));
    let changed = tokio::time::timeout(Duration::from_millis(100), reader.changed()).await;

    // Assert
    assert!(changed.is_err(), "link changed to {changed:?}");
    assert_eq!(reader.get(), json!({"count": 2}));
    assert_eq!(writer.get(), json!({"count": 2}));
}

#[tokio::test]
async fn test_write_from_elsewhere_applies_after_local_echoes() {
    // Arrange
    let page = Arc::new(DelayedPage::new());
    let controller = controller_on_delayed_page(&page);
    let link = LinkPath::new(path(&["recipe"]), "servings");
    let key = link_key(&link);
    let writer = controller
        .connect_link(link.clone(), LinkConnectionType::ReadWrite)
        .await
        .unwrap();
    writer.set(json!({"count": 1})).await.unwrap();
    writer.set(json!({"count": 2})).await.unwrap();
    let mut reader = controller
        .connect_link(link, LinkConnectionType::ReadOnly)
        .await
        .unwrap();
    assert!(page.release(&key, &json!({"count": 1})));
    assert!(page.release(&key, &json!({"count": 2})));

    // Act
    page.put(&key, json!({"count": 9})).await.unwrap();
    assert!(page.release(&key, &json!({"count": 9})));
    let changed = tokio::time::timeout(Duration::from_secs(1), reader.changed())
        .await
        .expect("remote write was not applied");

    // Assert
    assert_eq!(changed.unwrap(), json!({"count": 9}));
    assert_eq!(writer.get(), json!({"count": 9}));
}
