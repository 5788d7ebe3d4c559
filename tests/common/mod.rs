//! Shared fixtures for connector integration tests

#![allow(dead_code)]

use amqp_connector::core::config::ConnectorConfig;
use amqp_connector::definition::{Definition, DefinitionId, InMemoryDefinitionStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const CLUSTER_ID: i64 = 1;
pub const TOKEN: &str = "odb-session-42";

pub fn definition(id: i64) -> Definition {
    Definition {
        id: DefinitionId(id),
        name: format!("definition-{}", id),
        host: "mq1".to_string(),
        port: 5672,
        virtual_host: "/".to_string(),
        username: "guest".to_string(),
        password: "p1".to_string(),
        heartbeat_seconds: 30,
        frame_max_bytes: 131072,
    }
}

pub fn store_with(definition: Definition) -> Arc<InMemoryDefinitionStore> {
    Arc::new(InMemoryDefinitionStore::new(TOKEN).with_definition(CLUSTER_ID, definition))
}

/// Configuration that retries quickly
pub fn config(definition_id: i64) -> ConnectorConfig {
    let mut config = ConnectorConfig::new(CLUSTER_ID, definition_id);
    config.reconnect.initial_delay_ms = 1;
    config.reconnect.max_delay_ms = 5;
    config
}

pub fn edit_message(id: i64, host: &str) -> String {
    json!({
        "action": "DEFINITION_AMQP_EDIT",
        "id": id,
        "host": host,
        "port": 5672,
        "vhost": "/",
        "username": "guest",
        "heartbeat": 30,
        "frame_max": 131072,
    })
    .to_string()
}

pub fn close_message(token: &str) -> String {
    json!({"action": "CONNECTOR_CLOSE", "odb_token": token}).to_string()
}

pub fn delete_message(id: i64) -> String {
    json!({"action": "DEFINITION_AMQP_DELETE", "id": id}).to_string()
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
