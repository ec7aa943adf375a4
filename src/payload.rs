//! Request payload construction for the endpoint's wire contract.
//!
//! The harness does not own the protocol; it only has to produce the three
//! request payloads the endpoint understands. Field names vary between
//! endpoint versions, so [`WireSchema`] keeps every name as data: pointing
//! the harness at a different endpoint version is a configuration change,
//! not an edit.

use serde_json::{Map, Value, json};

/// Wire field names for one endpoint version.
///
/// `namespace_key` is optional because newer endpoint versions folded the
/// namespace into the channel and dropped the field entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireSchema {
    /// Top-level key naming the request verb.
    pub method_key: String,
    /// Top-level key holding the request parameters.
    pub params_key: String,
    /// Connect parameter: project identifier.
    pub project_key: String,
    /// Connect parameter: authentication token.
    pub token_key: String,
    /// Connect parameter: user identifier.
    pub user_key: String,
    /// Connect parameter: token timestamp, written only when a timestamp is used.
    pub timestamp_key: String,
    /// Subscribe/publish parameter: namespace, omitted when `None`.
    pub namespace_key: Option<String>,
    /// Subscribe/publish parameter: channel.
    pub channel_key: String,
    /// Publish parameter: message body.
    pub data_key: String,
}

impl Default for WireSchema {
    fn default() -> Self {
        Self {
            method_key: "method".into(),
            params_key: "params".into(),
            project_key: "project".into(),
            token_key: "token".into(),
            user_key: "user".into(),
            timestamp_key: "timestamp".into(),
            namespace_key: Some("namespace".into()),
            channel_key: "channel".into(),
            data_key: "data".into(),
        }
    }
}

impl WireSchema {
    /// Build the connect request payload.
    #[must_use]
    pub fn connect_request(
        &self,
        project: &str,
        token: &str,
        user: &str,
        timestamp: Option<&str>,
    ) -> String {
        let mut params = Map::new();
        params.insert(self.project_key.clone(), json!(project));
        params.insert(self.token_key.clone(), json!(token));
        params.insert(self.user_key.clone(), json!(user));
        if let Some(ts) = timestamp {
            params.insert(self.timestamp_key.clone(), json!(ts));
        }
        self.request("connect", params)
    }

    /// Build the subscribe request payload.
    #[must_use]
    pub fn subscribe_request(&self, namespace: &str, channel: &str) -> String {
        let mut params = Map::new();
        if let Some(ref key) = self.namespace_key {
            params.insert(key.clone(), json!(namespace));
        }
        params.insert(self.channel_key.clone(), json!(channel));
        self.request("subscribe", params)
    }

    /// Build the publish request payload with an arbitrary JSON body.
    #[must_use]
    pub fn publish_request(&self, namespace: &str, channel: &str, data: &Value) -> String {
        let mut params = Map::new();
        if let Some(ref key) = self.namespace_key {
            params.insert(key.clone(), json!(namespace));
        }
        params.insert(self.channel_key.clone(), json!(channel));
        params.insert(self.data_key.clone(), data.clone());
        self.request("publish", params)
    }

    fn request(&self, method: &str, params: Map<String, Value>) -> String {
        let mut root = Map::new();
        root.insert(self.method_key.clone(), json!(method));
        root.insert(self.params_key.clone(), Value::Object(params));
        Value::Object(root).to_string()
    }
}

/// The three request payloads a worker needs, computed once per session.
///
/// Immutable after construction; shared read-only across all worker tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSet {
    /// Connect request, including the derived authentication token.
    pub connect: String,
    /// Subscribe request.
    pub subscribe: String,
    /// Publish request.
    pub publish: String,
}

impl RequestSet {
    /// Precompute the request payloads for an endpoint configuration.
    #[must_use]
    pub fn from_endpoint(endpoint: &crate::config::EndpointConfig) -> Self {
        let token = endpoint.auth_token();
        Self {
            connect: endpoint.schema.connect_request(
                &endpoint.project,
                &token,
                &endpoint.user,
                endpoint.token_timestamp.as_deref(),
            ),
            subscribe: endpoint
                .schema
                .subscribe_request(&endpoint.namespace, &endpoint.channel),
            publish: endpoint.schema.publish_request(
                &endpoint.namespace,
                &endpoint.channel,
                &endpoint.payload,
            ),
        }
    }
}
