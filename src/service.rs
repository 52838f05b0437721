//! Command surface for front ends
//!
//! [`VpnService`] ties the parser, the connection store and the connection
//! manager together behind the nine commands a client UI issues. Replies
//! serialize to camelCase JSON so they can be handed to a UI bridge as-is.

use crate::config::Config;
use crate::error::{Result, VpnError};
use crate::logging::Logger;
use crate::manager::ConnectionManager;
use crate::parser::UrlParser;
use crate::store::ConnectionStore;
use crate::types::{ConnectionMode, ConnectionRecord, ConnectionStatus, Metrics, Protocol};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

const SERVICE_TARGET: &str = "rvpnmux::service";

/// Acknowledgement for state-changing commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl CommandReply {
    pub fn ok() -> Self {
        Self {
            success: true,
            id: None,
        }
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            success: true,
            id: Some(id.into()),
        }
    }
}

/// Listing entry; the protocol payload stays private
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub id: String,
    pub name: String,
    pub protocol: Protocol,
    pub url: String,
}

impl From<&ConnectionRecord> for ConnectionSummary {
    fn from(record: &ConnectionRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            protocol: record.protocol,
            url: record.url.clone(),
        }
    }
}

pub struct VpnService {
    manager: ConnectionManager,
    store: Mutex<ConnectionStore>,
    parser: UrlParser,
    log: Logger,
}

impl VpnService {
    pub fn new(
        manager: ConnectionManager,
        store: ConnectionStore,
        parser: UrlParser,
        log: Logger,
    ) -> Self {
        Self {
            manager,
            store: Mutex::new(store),
            parser,
            log: log.with_target(SERVICE_TARGET),
        }
    }

    /// Build every component from a validated configuration
    ///
    /// Opens `storage.path` when set, otherwise keeps connections in memory.
    pub fn from_config(config: &Config, log: Logger) -> Result<Self> {
        let store = match &config.storage.path {
            Some(path) => ConnectionStore::open(path)?,
            None => ConnectionStore::in_memory(),
        };
        Self::with_store(config, store, log)
    }

    /// Build around an already opened store
    ///
    /// A persisted store's connection mode takes precedence over
    /// `manager.default_mode`.
    pub fn with_store(config: &Config, store: ConnectionStore, log: Logger) -> Result<Self> {
        config.validate()?;

        let mut manager_config = config.manager.clone();
        if store.is_persistent() {
            manager_config.default_mode = store.connection_mode();
        }
        let manager = ConnectionManager::new(&manager_config, &config.engine, log.clone())?;
        let parser = UrlParser::new(log.with_target("rvpnmux::parser"));

        Ok(Self::new(manager, store, parser, log))
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    fn store(&self) -> Result<MutexGuard<'_, ConnectionStore>> {
        self.store
            .lock()
            .map_err(|_| VpnError::Storage("connection store lock poisoned".to_string()))
    }

    /// Connect to a saved connection
    pub async fn connect(&self, id: &str) -> Result<CommandReply> {
        let record = self
            .store()?
            .get(id)
            .cloned()
            .ok_or_else(|| VpnError::ConnectionNotFound(id.to_string()))?;

        self.manager.connect(&record).await?;
        Ok(CommandReply::ok())
    }

    pub async fn disconnect(&self) -> Result<CommandReply> {
        self.manager.disconnect().await?;
        Ok(CommandReply::ok())
    }

    /// Parse a share link, register it and persist it
    pub fn add_connection(&self, url: &str) -> Result<CommandReply> {
        if url.trim().is_empty() {
            return Err(VpnError::Parse("URL is required".to_string()));
        }

        let record = self.parser.parse(url)?;
        self.manager.ensure_supported(record.protocol)?;

        let id = record.id.clone();
        let name = record.name.clone();
        let mut store = self.store()?;
        store.add(record)?;
        if let Err(e) = store.save() {
            store.remove(&id);
            return Err(e);
        }

        self.log.info(format_args!("added connection {name} ({id})"));
        Ok(CommandReply::with_id(id))
    }

    /// Forget a saved connection; unknown ids are not an error
    ///
    /// An active tunnel for the removed record stays up until disconnected.
    pub fn remove_connection(&self, id: &str) -> Result<CommandReply> {
        let mut store = self.store()?;
        if let Some((index, removed)) = store.remove(id) {
            if let Err(e) = store.save() {
                store.insert(index, removed)?;
                return Err(e);
            }
            self.log
                .info(format_args!("removed connection {} ({id})", removed.name));
        }
        Ok(CommandReply::ok())
    }

    pub fn get_connections(&self) -> Result<Vec<ConnectionSummary>> {
        Ok(self
            .store()?
            .list()
            .iter()
            .map(ConnectionSummary::from)
            .collect())
    }

    pub async fn get_connection_status(&self) -> ConnectionStatus {
        self.manager.status().await
    }

    pub async fn get_connection_metrics(&self) -> Metrics {
        self.manager.metrics().await
    }

    /// Change the connection mode and remember it
    ///
    /// Nothing is persisted unless the manager accepts the change, and the
    /// manager goes back to its previous mode if the store cannot be written.
    pub async fn set_connection_mode(&self, mode: &str) -> Result<CommandReply> {
        let previous = self.manager.mode().await;
        self.manager.set_mode(mode).await?;
        let mode: ConnectionMode = mode.parse()?;

        let saved = self.persist_mode(mode);
        if let Err(e) = saved {
            if let Err(restore) = self.manager.set_mode(previous.as_str()).await {
                self.log.warn(format_args!(
                    "could not restore connection mode {previous}: {restore}"
                ));
            }
            return Err(e);
        }
        Ok(CommandReply::ok())
    }

    fn persist_mode(&self, mode: ConnectionMode) -> Result<()> {
        let mut store = self.store()?;
        let previous = store.connection_mode();
        store.set_connection_mode(mode);
        if let Err(e) = store.save() {
            store.set_connection_mode(previous);
            return Err(e);
        }
        Ok(())
    }

    pub fn set_language(&self, language: &str) -> Result<CommandReply> {
        let mut store = self.store()?;
        let previous = store.language().to_string();
        store.set_language(language)?;
        if let Err(e) = store.save() {
            store.set_language(&previous)?;
            return Err(e);
        }
        self.log.info(format_args!("interface language set to {language}"));
        Ok(CommandReply::ok())
    }

    pub fn language(&self) -> Result<String> {
        Ok(self.store()?.language().to_string())
    }

    /// Disconnect and stop background work
    pub async fn shutdown(&self) -> Result<()> {
        self.manager.shutdown().await
    }
}

impl std::fmt::Debug for VpnService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VpnService")
            .field("manager", &self.manager)
            .field("parser", &self.parser)
            .finish_non_exhaustive()
    }
}
