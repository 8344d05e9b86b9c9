//! Integration tests for subscription lifetime semantics: explicit release,
//! mount/unmount cycles, and the deliberate absence of Drop cleanup.

use outline_core::models::Node;
use outline_core::store::{DocumentContext, ParentKey};
use outline_core::{NodeUpdate, UpdateSource};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn seed(context: &Arc<DocumentContext>, id: &str) {
    let node = Node::new_with_id(
        id.to_string(),
        "text".to_string(),
        String::new(),
        None,
        json!({}),
    );
    context.nodes.set(node, UpdateSource::UserEdit);
    context.structure.append_child(ParentKey::Root, id);
}

#[test]
fn test_mount_unmount_cycles_leave_count_stable() {
    let context = DocumentContext::new();
    seed(&context, "n-1");
    let baseline = context.hub.subscription_count();

    // A component that releases on unmount never accumulates registrations
    for _ in 0..50 {
        let mut handle = context.hub.subscribe_node("n-1", |_| {});
        assert_eq!(context.hub.subscription_count(), baseline + 1);
        handle.release();
        assert_eq!(context.hub.subscription_count(), baseline);
    }
}

#[test]
fn test_unreleased_handles_accumulate() {
    let context = DocumentContext::new();
    seed(&context, "n-1");
    let baseline = context.hub.subscription_count();

    // No Drop cleanup: each forgotten handle is a leak the count exposes
    for _ in 0..10 {
        let _forgotten = context.hub.subscribe_node("n-1", |_| {});
    }
    assert_eq!(context.hub.subscription_count(), baseline + 10);
}

#[test]
fn test_released_subscriber_stops_receiving_store_events() {
    let context = DocumentContext::new();
    seed(&context, "n-1");

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let mut handle = context.hub.subscribe_node("n-1", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    context
        .nodes
        .update("n-1", NodeUpdate::content("first"), UpdateSource::UserEdit, true)
        .unwrap();
    let after_first = hits.load(Ordering::SeqCst);
    assert!(after_first >= 1);

    handle.release();
    assert!(!handle.is_active());
    context
        .nodes
        .update("n-1", NodeUpdate::content("second"), UpdateSource::UserEdit, true)
        .unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), after_first);
}

#[test]
fn test_double_release_does_not_disturb_other_subscribers() {
    let context = DocumentContext::new();
    seed(&context, "n-1");
    let baseline = context.hub.subscription_count();

    let mut first = context.hub.subscribe_node("n-1", |_| {});
    let survivor_hits = Arc::new(AtomicUsize::new(0));
    let counter = survivor_hits.clone();
    let _survivor = context.hub.subscribe_node("n-1", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    first.release();
    first.release();
    first.release();
    assert_eq!(context.hub.subscription_count(), baseline + 1);

    context
        .nodes
        .update("n-1", NodeUpdate::content("edit"), UpdateSource::UserEdit, true)
        .unwrap();
    assert_eq!(survivor_hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_per_node_subscription_ignores_other_nodes() {
    let context = DocumentContext::new();
    seed(&context, "n-1");
    seed(&context, "n-2");

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let _handle = context.hub.subscribe_node("n-1", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    context
        .nodes
        .update("n-2", NodeUpdate::content("other"), UpdateSource::UserEdit, true)
        .unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    context
        .nodes
        .update("n-1", NodeUpdate::content("mine"), UpdateSource::UserEdit, true)
        .unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
