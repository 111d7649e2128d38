//! Superseded and timed-out requests leave no trace besides their loading bracket.

#![allow(clippy::expect_used, reason = "Test assertions")]

mod common;

use common::{MockTransport, coordinator, drain, init_logging, kinds_for, node, page_url, table_html, PAGE};
use dom::Document;
use std::sync::Arc;
use table_sync::{ChannelOutcome, Coordinator, Query, RefreshContext, RequestKind, SyncConfig};
use tokio::task::yield_now;

#[tokio::test]
async fn newer_refresh_supersedes_the_one_in_flight() {
    let transport = MockTransport::new();
    let release_first = transport.hold("/tbody");
    transport.reply_json("/tbody", table_html("second"));
    let coordinator = coordinator(&transport);
    coordinator.init().expect("init");
    let mut events = coordinator.subscribe();
    let container = node(&coordinator, "c1");

    let first = tokio::spawn({
        let coordinator = coordinator.clone();
        async move {
            coordinator
                .update_table_container(container, &Query::parse("page=1"), RefreshContext::Reload)
                .await
        }
    });
    yield_now().await;
    assert!(coordinator.is_request_active(container, RequestKind::Refresh));

    let second = coordinator
        .update_table_container(container, &Query::parse("page=2"), RefreshContext::Reload)
        .await;
    drop(release_first.send(table_html("stale")));
    let first = first.await.expect("first refresh task");

    assert_eq!(second, ChannelOutcome::Applied);
    assert_eq!(first, ChannelOutcome::Aborted);
    assert!(!coordinator.is_request_active(container, RequestKind::Refresh));
    coordinator.with_document(|document| {
        let text = document.text_content(container);
        assert!(text.contains("second"));
        assert!(!text.contains("stale"));
    });

    let kinds = kinds_for(&drain(&mut events), container);
    assert_eq!(kinds.iter().filter(|kind| **kind == "start").count(), 2);
    assert_eq!(kinds.iter().filter(|kind| **kind == "end").count(), 2);
    assert_eq!(kinds.iter().filter(|kind| **kind == "populated").count(), 1);
    assert!(!kinds.contains(&"error"));
}

#[tokio::test]
async fn refreshes_of_different_containers_are_independent() {
    let transport = MockTransport::new();
    let release = transport.hold("/tbody");
    transport.reply_json("/other_tbody", serde_json::json!({"html": "<p>other</p>"}));
    let coordinator = coordinator(&transport);
    coordinator.init().expect("init");
    let first = node(&coordinator, "c1");
    let second = node(&coordinator, "c2");

    let pending = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.reload(first).await }
    });
    yield_now().await;

    assert_eq!(coordinator.reload(second).await, ChannelOutcome::Applied);
    assert!(coordinator.is_request_active(first, RequestKind::Refresh));
    release.send(table_html("first")).expect("refresh still waiting");
    assert_eq!(pending.await.expect("task"), ChannelOutcome::Applied);
}

#[tokio::test(start_paused = true)]
async fn timed_out_refresh_ends_without_error() {
    init_logging();
    let transport = MockTransport::new();
    let _never_released = transport.hold("/tbody");
    let concrete: Arc<MockTransport> = Arc::clone(&transport);
    let coordinator = Coordinator::new(
        Document::parse(PAGE).expect("page"),
        page_url(),
        concrete,
        SyncConfig::new(Some(5000), 400, true),
    );
    coordinator.init().expect("init");
    let mut events = coordinator.subscribe();
    let container = node(&coordinator, "c1");

    let outcome = coordinator.reload(container).await;

    assert_eq!(outcome, ChannelOutcome::Aborted);
    assert_eq!(kinds_for(&drain(&mut events), container), vec!["start", "end"]);
    coordinator.with_document(|document| {
        assert!(document.text_content(container).contains("row"));
    });
}
