//! `RuleStore`: the rule-store boundary. The external `servers`/`clients`
//! relational tables themselves are out of scope; this trait and its
//! in-memory double are in scope because the controller needs a concrete
//! type to read rules from and write enable/disable/allow/deny/
//! request-count updates back to.

use std::sync::Mutex;

use async_trait::async_trait;
use axon_protocol::rules::Allowance;
use axon_protocol::{ClientRule, Protocol, ServerRule};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Filter predicate over any subset of `servers` columns. `None` fields are
/// unconstrained. Serializable so the controller's RPC surface can accept
/// a filter as an argument (`disable_clients_rule` et al.).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerRuleFilter {
    pub endpoint: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<Protocol>,
    pub enabled: Option<bool>,
}

impl ServerRuleFilter {
    pub fn matches(&self, rule: &ServerRule) -> bool {
        self.endpoint.as_deref().is_none_or(|v| v == rule.endpoint)
            && self.port.is_none_or(|v| v == rule.port)
            && self.protocol.is_none_or(|v| v == rule.protocol)
            && self.enabled.is_none_or(|v| v == rule.enabled)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientRuleFilter {
    pub source: Option<String>,
    pub destination: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<Protocol>,
    pub allowed: Option<Allowance>,
    pub enabled: Option<bool>,
}

impl ClientRuleFilter {
    pub fn matches(&self, rule: &ClientRule) -> bool {
        self.source.as_deref().is_none_or(|v| v == rule.source)
            && self.destination.as_deref().is_none_or(|v| v == rule.destination)
            && self.port.is_none_or(|v| v == rule.port)
            && self.protocol.is_none_or(|v| v == rule.protocol)
            && self.allowed.is_none_or(|v| v == rule.allowed)
            && self.enabled.is_none_or(|v| v == rule.enabled)
    }
}

/// The external rule-store boundary: bulk insert, filtered query, and
/// three filtered update operations (`enable/disable`, `allow/deny`,
/// `update_request_count`). Each update returns the number of rows it
/// touched, so "no rows matched" is simply `Ok(0)` rather than a distinct
/// error variant.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn insert_servers(&self, rules: Vec<ServerRule>) -> Result<(), StoreError>;
    async fn insert_clients(&self, rules: Vec<ClientRule>) -> Result<(), StoreError>;

    async fn query_servers(&self, filter: &ServerRuleFilter) -> Result<Vec<ServerRule>, StoreError>;
    async fn query_clients(&self, filter: &ClientRuleFilter) -> Result<Vec<ClientRule>, StoreError>;

    async fn set_servers_enabled(
        &self,
        filter: &ServerRuleFilter,
        enabled: bool,
    ) -> Result<usize, StoreError>;

    async fn set_clients_enabled(
        &self,
        filter: &ClientRuleFilter,
        enabled: bool,
    ) -> Result<usize, StoreError>;

    async fn set_clients_allowed(
        &self,
        filter: &ClientRuleFilter,
        allowed: Allowance,
    ) -> Result<usize, StoreError>;

    async fn update_request_count(
        &self,
        filter: &ClientRuleFilter,
        request_count: u32,
    ) -> Result<usize, StoreError>;
}

#[derive(Default)]
pub struct InMemoryRuleStore {
    servers: Mutex<Vec<ServerRule>>,
    clients: Mutex<Vec<ClientRule>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn insert_servers(&self, rules: Vec<ServerRule>) -> Result<(), StoreError> {
        self.servers
            .lock()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .extend(rules);
        Ok(())
    }

    async fn insert_clients(&self, rules: Vec<ClientRule>) -> Result<(), StoreError> {
        self.clients
            .lock()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .extend(rules);
        Ok(())
    }

    async fn query_servers(&self, filter: &ServerRuleFilter) -> Result<Vec<ServerRule>, StoreError> {
        Ok(self
            .servers
            .lock()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn query_clients(&self, filter: &ClientRuleFilter) -> Result<Vec<ClientRule>, StoreError> {
        Ok(self
            .clients
            .lock()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn set_servers_enabled(
        &self,
        filter: &ServerRuleFilter,
        enabled: bool,
    ) -> Result<usize, StoreError> {
        let mut servers = self.servers.lock().map_err(|e| StoreError::Internal(e.to_string()))?;
        let mut touched = 0;
        for rule in servers.iter_mut().filter(|r| filter.matches(r)) {
            rule.enabled = enabled;
            touched += 1;
        }
        Ok(touched)
    }

    async fn set_clients_enabled(
        &self,
        filter: &ClientRuleFilter,
        enabled: bool,
    ) -> Result<usize, StoreError> {
        let mut clients = self.clients.lock().map_err(|e| StoreError::Internal(e.to_string()))?;
        let mut touched = 0;
        for rule in clients.iter_mut().filter(|r| filter.matches(r)) {
            rule.enabled = enabled;
            touched += 1;
        }
        Ok(touched)
    }

    async fn set_clients_allowed(
        &self,
        filter: &ClientRuleFilter,
        allowed: Allowance,
    ) -> Result<usize, StoreError> {
        let mut clients = self.clients.lock().map_err(|e| StoreError::Internal(e.to_string()))?;
        let mut touched = 0;
        for rule in clients.iter_mut().filter(|r| filter.matches(r)) {
            rule.allowed = allowed;
            touched += 1;
        }
        Ok(touched)
    }

    async fn update_request_count(
        &self,
        filter: &ClientRuleFilter,
        request_count: u32,
    ) -> Result<usize, StoreError> {
        let mut clients = self.clients.lock().map_err(|e| StoreError::Internal(e.to_string()))?;
        let mut touched = 0;
        for rule in clients.iter_mut().filter(|r| filter.matches(r)) {
            rule.request_count = request_count.max(1);
            touched += 1;
        }
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_protocol::rules::Allowance;
    use axon_protocol::Protocol;

    fn client(source: &str, port: u16) -> ClientRule {
        ClientRule::new(source, "dst", port, Protocol::Tcp, Allowance::Allow, 1)
    }

    #[tokio::test]
    async fn set_clients_enabled_reports_rows_touched() {
        let store = InMemoryRuleStore::new();
        store
            .insert_clients(vec![client("a", 1), client("a", 2), client("b", 3)])
            .await
            .unwrap();

        let filter = ClientRuleFilter {
            source: Some("a".to_string()),
            ..Default::default()
        };
        let touched = store.set_clients_enabled(&filter, false).await.unwrap();
        assert_eq!(touched, 2);

        let filter = ClientRuleFilter {
            source: Some("nonexistent".to_string()),
            ..Default::default()
        };
        let touched = store.set_clients_enabled(&filter, false).await.unwrap();
        assert_eq!(touched, 0, "no rows matched must be observable as zero touched");
    }

    #[tokio::test]
    async fn update_request_count_clamps_to_one() {
        let store = InMemoryRuleStore::new();
        store.insert_clients(vec![client("a", 1)]).await.unwrap();

        store
            .update_request_count(&ClientRuleFilter::default(), 0)
            .await
            .unwrap();

        let rows = store.query_clients(&ClientRuleFilter::default()).await.unwrap();
        assert_eq!(rows[0].request_count, 1);
    }
}
