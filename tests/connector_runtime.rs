//! Connector runtime integration tests
//!
//! Drive a connector end to end through a channel-backed control bus and an
//! in-memory transport.

mod common;

use amqp_connector::connector::{ChannelBus, ConnectorError, ConnectorRuntime};
use amqp_connector::core::shutdown::ShutdownReason;
use amqp_connector::definition::{DefinitionId, InMemoryDefinitionStore, StoreError};
use amqp_connector::session::{ConnectOutcome, MemoryTransport, SessionState, TransportError};
use common::*;
use std::sync::Arc;
use std::time::Duration;

fn start(store: &Arc<InMemoryDefinitionStore>, transport: &MemoryTransport) -> ConnectorRuntime {
    ConnectorRuntime::start(&config(1), store.clone(), Arc::new(transport.clone())).unwrap()
}

#[tokio::test]
async fn test_missing_definition_prevents_start() {
    let store = Arc::new(InMemoryDefinitionStore::new(TOKEN));
    let result = ConnectorRuntime::start(&config(7), store, Arc::new(MemoryTransport::new()));

    match result {
        Err(ConnectorError::Store(StoreError::NotFound {
            cluster_id,
            definition_id,
        })) => {
            assert_eq!(cluster_id, CLUSTER_ID);
            assert_eq!(definition_id, DefinitionId(7));
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("connector started without a definition"),
    }
}

#[tokio::test]
async fn test_edit_then_close_over_the_bus() {
    let store = store_with(definition(1));
    let transport = MemoryTransport::new();
    let runtime = start(&store, &transport);
    let connector = Arc::clone(runtime.connector());
    connector.provision_outgoing("publisher").unwrap();

    let (sender, bus) = ChannelBus::channel(16);
    let running = tokio::spawn(runtime.run(bus));

    sender.send(edit_message(1, "mq2")).await.unwrap();
    sender.send(edit_message(2, "mq3")).await.unwrap();
    sender.send(close_message(TOKEN)).await.unwrap();

    let reason = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reason, ShutdownReason::ConnectorClosed);

    let active = connector.definition().unwrap();
    assert_eq!(active.host, "mq2");
    assert_eq!(active.password, "p1");
    assert_eq!(store.close_count(), 1);
    assert!(connector.outgoing_session_ids().unwrap().is_empty());
    wait_until(|| transport.live_connections() == 0).await;
}

#[tokio::test]
async fn test_delete_stops_runtime() {
    let store = store_with(definition(1));
    let transport = MemoryTransport::new();
    let runtime = start(&store, &transport);
    let connector = Arc::clone(runtime.connector());
    connector.provision_inbound("consumer").unwrap();
    wait_until(|| connector.session_state("consumer").unwrap() == Some(SessionState::Ready))
        .await;

    let (sender, bus) = ChannelBus::channel(16);
    sender.send(delete_message(1)).await.unwrap();
    sender.send(delete_message(1)).await.unwrap();

    let reason = runtime.run(bus).await;
    assert_eq!(reason, ShutdownReason::DefinitionDeleted);
    assert_eq!(store.close_count(), 1);
    wait_until(|| transport.close_count() == 1).await;
}

#[tokio::test]
async fn test_unreadable_and_foreign_messages_are_skipped() {
    let store = store_with(definition(1));
    let transport = MemoryTransport::new();
    let runtime = start(&store, &transport);
    let connector = Arc::clone(runtime.connector());

    let (sender, bus) = ChannelBus::channel(16);
    sender.send("not json".to_string()).await.unwrap();
    sender
        .send(r#"{"action": "OUTGOING_AMQP_EDIT", "id": 1}"#.to_string())
        .await
        .unwrap();
    sender.send(close_message("another-process")).await.unwrap();
    sender.send(delete_message(9)).await.unwrap();
    sender.send(close_message(TOKEN)).await.unwrap();

    assert_eq!(runtime.run(bus).await, ShutdownReason::ConnectorClosed);
    assert_eq!(connector.definition().unwrap().host, "mq1");
}

#[tokio::test]
async fn test_fatal_session_failure_stops_runtime() {
    let store = store_with(definition(1));
    let transport = MemoryTransport::new();
    transport.push_outcome(ConnectOutcome::Fail(TransportError::AuthenticationFailed(
        "ACCESS_REFUSED".to_string(),
    )));
    let runtime = start(&store, &transport);
    let session = runtime.connector().provision_outgoing("publisher").unwrap();

    let (_sender, bus) = ChannelBus::channel(16);
    let reason = tokio::time::timeout(Duration::from_secs(5), runtime.run(bus))
        .await
        .unwrap();

    match reason {
        ShutdownReason::FatalTransport { session: failed, error } => {
            assert_eq!(failed, session);
            assert!(error.contains("ACCESS_REFUSED"));
        }
        other => panic!("unexpected reason: {}", other),
    }
    assert_eq!(store.close_count(), 1);
}

#[tokio::test]
async fn test_closed_bus_stops_runtime() {
    let store = store_with(definition(1));
    let runtime = start(&store, &MemoryTransport::new());

    let (sender, bus) = ChannelBus::channel(1);
    drop(sender);

    assert_eq!(runtime.run(bus).await, ShutdownReason::BusClosed);
    assert_eq!(store.close_count(), 1);
}

#[tokio::test]
async fn test_external_shutdown_request_tears_down_sessions() {
    let store = store_with(definition(1));
    let transport = MemoryTransport::new();
    let runtime = start(&store, &transport);
    let connector = Arc::clone(runtime.connector());
    connector.provision_outgoing("publisher").unwrap();
    wait_until(|| connector.session_state("publisher").unwrap() == Some(SessionState::Ready))
        .await;

    let (_sender, bus) = ChannelBus::channel(1);
    let running = tokio::spawn(runtime.run(bus));
    connector.shutdown_coordinator().trigger(ShutdownReason::Signal);

    let reason = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reason, ShutdownReason::Signal);
    assert!(connector.is_shut_down().unwrap());
    assert_eq!(store.close_count(), 1);
    wait_until(|| transport.live_connections() == 0).await;
}
