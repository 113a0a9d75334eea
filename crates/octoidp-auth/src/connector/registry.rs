//! Connector registry and health tracking.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::watch;

use super::{Connector, ConnectorKind};
use crate::error::{AuthError, AuthResult};

/// Last health check result of one connector.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectorHealth {
    pub kind: ConnectorKind,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub checked_at: Option<OffsetDateTime>,
}

/// Connectors keyed by ID.
///
/// A connector starts out healthy. Only a failed [`poll_health`] marks it
/// unavailable, and only for new logins.
///
/// [`poll_health`]: ConnectorRegistry::poll_health
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: DashMap<String, Arc<dyn Connector>>,
    health: DashMap<String, ConnectorHealth>,
}

impl ConnectorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connector.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the ID is taken.
    pub fn register(&self, connector: Arc<dyn Connector>) -> AuthResult<()> {
        let id = connector.id().to_string();
        match self.connectors.entry(id.clone()) {
            Entry::Occupied(_) => Err(AuthError::configuration(format!(
                "duplicate connector id '{id}'"
            ))),
            Entry::Vacant(slot) => {
                self.health.insert(
                    id.clone(),
                    ConnectorHealth {
                        kind: connector.kind(),
                        healthy: true,
                        error: None,
                        checked_at: None,
                    },
                );
                tracing::info!(connector_id = %id, kind = connector.kind().as_str(), "Connector registered");
                slot.insert(connector);
                Ok(())
            }
        }
    }

    /// Returns a connector regardless of health.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.get(id).map(|c| Arc::clone(c.value()))
    }

    /// Returns a connector that may take new logins.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for unknown IDs and
    /// `TemporarilyUnavailable` when the last health check failed.
    pub fn available(&self, id: &str) -> AuthResult<Arc<dyn Connector>> {
        let connector = self
            .get(id)
            .ok_or_else(|| AuthError::invalid_request(format!("unknown connector '{id}'")))?;
        if !self.is_healthy(id) {
            return Err(AuthError::temporarily_unavailable(format!(
                "connector '{id}' is unavailable"
            )));
        }
        Ok(connector)
    }

    /// Returns the only connector's ID when exactly one is registered.
    #[must_use]
    pub fn sole(&self) -> Option<String> {
        if self.connectors.len() == 1 {
            self.connectors.iter().next().map(|c| c.key().clone())
        } else {
            None
        }
    }

    /// Registered IDs, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connectors.iter().map(|c| c.key().clone()).collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn is_healthy(&self, id: &str) -> bool {
        self.health.get(id).is_some_and(|h| h.healthy)
    }

    /// Runs every health check once and records the results.
    ///
    /// Returns the number of unhealthy connectors.
    pub async fn poll_health(&self) -> usize {
        let connectors: Vec<Arc<dyn Connector>> =
            self.connectors.iter().map(|c| Arc::clone(c.value())).collect();

        let mut unhealthy = 0;
        for connector in connectors {
            let result = connector.healthy().await;
            let now = OffsetDateTime::now_utc();
            let id = connector.id();

            let was_healthy = self.is_healthy(id);
            let (healthy, error) = match result {
                Ok(()) => (true, None),
                Err(e) => {
                    unhealthy += 1;
                    (false, Some(e.to_string()))
                }
            };

            match (was_healthy, healthy) {
                (true, false) => tracing::warn!(
                    connector_id = %id,
                    error = error.as_deref().unwrap_or_default(),
                    "Connector became unhealthy"
                ),
                (false, true) => tracing::info!(connector_id = %id, "Connector recovered"),
                _ => {}
            }

            self.health.insert(
                id.to_string(),
                ConnectorHealth {
                    kind: connector.kind(),
                    healthy,
                    error,
                    checked_at: Some(now),
                },
            );
        }
        unhealthy
    }

    /// Polls health on every tick until `shutdown` flips to `true`.
    pub async fn run_health_checks(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_health().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// Health of every connector, keyed by ID.
    #[must_use]
    pub fn health_report(&self) -> BTreeMap<String, ConnectorHealth> {
        self.health
            .iter()
            .map(|h| (h.key().clone(), h.value().clone()))
            .collect()
    }

    /// Closes every connector.
    pub async fn close(&self) {
        let connectors: Vec<Arc<dyn Connector>> =
            self.connectors.iter().map(|c| Arc::clone(c.value())).collect();
        for connector in connectors {
            connector.close().await;
            tracing::debug!(connector_id = %connector.id(), "Connector closed");
        }
    }
}
