//! Connection manager
//!
//! Owns the provider registry and the single active session. All state lives
//! behind one async mutex:
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Connected --disconnect--> Disconnected
//!                               |
//!                               +--error--> Disconnected
//! ```
//!
//! A connect attempt runs on its own task. The lock is released while the
//! provider brings the tunnel up, so status queries stay responsive and a
//! second `connect` fails fast with [`VpnError::ConnectionInProgress`]. The
//! task commits or rolls back the state itself, which keeps the manager
//! consistent even when the caller stops waiting.

use crate::config::{EngineConfig, ManagerConfig};
use crate::error::{Result, VpnError};
use crate::logging::Logger;
use crate::provider::{Provider, ProviderContext};
use crate::types::{ConnectionMode, ConnectionRecord, ConnectionStatus, Metrics, Protocol};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const MANAGER_TARGET: &str = "rvpnmux::manager";

enum Phase {
    Disconnected,
    Connecting { record_id: String },
    Connected(ActiveSession),
}

struct ActiveSession {
    record_id: String,
    provider: Provider,
}

struct ManagerState {
    phase: Phase,
    mode: ConnectionMode,
    idle: HashMap<Protocol, Provider>,
    metrics: Metrics,
}

impl ManagerState {
    /// Move the idle provider for `protocol` out of the registry
    ///
    /// A provider lost to a cancelled disconnect is rebuilt.
    fn take_provider(&mut self, protocol: Protocol, ctx: &ProviderContext) -> Provider {
        self.idle
            .remove(&protocol)
            .unwrap_or_else(|| Provider::for_protocol(protocol, ctx))
    }
}

struct Shared {
    state: Mutex<ManagerState>,
    /// Woken whenever a connect attempt leaves `Connecting`
    settled: Notify,
    registered: HashSet<Protocol>,
    ctx: ProviderContext,
    log: Logger,
}

impl Shared {
    async fn finish_connect(
        &self,
        record: &ConnectionRecord,
        provider: Provider,
        outcome: Result<()>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.metrics = Metrics::default();
        self.settled.notify_waiters();

        match outcome {
            Ok(()) => {
                state.phase = Phase::Connected(ActiveSession {
                    record_id: record.id.clone(),
                    provider,
                });
                self.log.info(format_args!(
                    "connected to {} ({}, {} mode)",
                    record.name, record.protocol, state.mode
                ));
                Ok(())
            }
            Err(e) => {
                state.idle.insert(record.protocol, provider);
                state.phase = Phase::Disconnected;
                self.log
                    .error(format_args!("failed to connect to {}: {e}", record.name));
                Err(e)
            }
        }
    }

    async fn sample(&self) {
        let mut state = self.state.lock().await;
        let ManagerState { phase, metrics, .. } = &mut *state;

        let Phase::Connected(session) = phase else {
            return;
        };
        match session.provider.metrics() {
            Ok(snapshot) => *metrics = snapshot,
            Err(e) => self.log.warn(format_args!(
                "metrics for {} unavailable: {e}",
                session.record_id
            )),
        }
    }
}

/// Drives one provider at a time through init, connect and disconnect
pub struct ConnectionManager {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    sampler: JoinHandle<()>,
}

impl ConnectionManager {
    /// Build the registry and start the metrics sampler
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: &ManagerConfig, engine: &EngineConfig, log: Logger) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| {
            VpnError::InvalidState("connection manager requires a tokio runtime".to_string())
        })?;
        if config.metrics_interval_ms == 0 {
            return Err(VpnError::Config(
                "Metrics interval cannot be zero".to_string(),
            ));
        }

        let ctx = ProviderContext::new(log.clone(), engine.clone());
        let registered: HashSet<Protocol> = config.protocols.iter().copied().collect();
        let idle: HashMap<Protocol, Provider> = registered
            .iter()
            .map(|&protocol| (protocol, Provider::for_protocol(protocol, &ctx)))
            .collect();

        let log = log.with_target(MANAGER_TARGET);
        log.debug(format_args!(
            "registered {} protocol providers",
            registered.len()
        ));

        let shared = Arc::new(Shared {
            state: Mutex::new(ManagerState {
                phase: Phase::Disconnected,
                mode: config.default_mode,
                idle,
                metrics: Metrics::default(),
            }),
            settled: Notify::new(),
            registered,
            ctx,
            log,
        });

        let (shutdown, shutdown_rx) = watch::channel(false);
        let sampler = runtime.spawn(run_sampler(
            Arc::clone(&shared),
            config.metrics_interval(),
            shutdown_rx,
        ));

        Ok(Self {
            shared,
            shutdown,
            sampler,
        })
    }

    /// Fail with `UnsupportedProtocol` unless a provider is registered
    pub fn ensure_supported(&self, protocol: Protocol) -> Result<()> {
        if self.shared.registered.contains(&protocol) {
            Ok(())
        } else {
            Err(VpnError::UnsupportedProtocol(protocol.to_string()))
        }
    }

    pub fn registered_protocols(&self) -> Vec<Protocol> {
        let mut protocols: Vec<Protocol> = self.shared.registered.iter().copied().collect();
        protocols.sort();
        protocols
    }

    /// Bring up the tunnel described by `record`
    pub async fn connect(&self, record: &ConnectionRecord) -> Result<()> {
        let (provider, mode) = {
            let mut state = self.shared.state.lock().await;
            match state.phase {
                Phase::Connected(_) => return Err(VpnError::AlreadyConnected),
                Phase::Connecting { .. } => return Err(VpnError::ConnectionInProgress),
                Phase::Disconnected => {}
            }
            self.ensure_supported(record.protocol)?;

            let provider = state.take_provider(record.protocol, &self.shared.ctx);
            state.phase = Phase::Connecting {
                record_id: record.id.clone(),
            };
            (provider, state.mode)
        };

        self.shared.log.info(format_args!(
            "connecting to {} ({}, {mode} mode)",
            record.name, record.protocol
        ));

        let shared = Arc::clone(&self.shared);
        let attempt_record = record.clone();
        let attempt = tokio::spawn(async move {
            let mut provider = provider;
            let outcome = bring_up(&mut provider, &attempt_record, mode, &shared.log).await;
            shared
                .finish_connect(&attempt_record, provider, outcome)
                .await
        });

        match attempt.await {
            Ok(result) => result,
            Err(e) => {
                let mut state = self.shared.state.lock().await;
                state.phase = Phase::Disconnected;
                state.metrics = Metrics::default();
                self.shared.settled.notify_waiters();
                self.shared
                    .log
                    .error(format_args!("connect task for {} failed: {e}", record.name));
                Err(VpnError::InvalidState(format!("connect attempt aborted: {e}")))
            }
        }
    }

    /// Tear down the active tunnel
    ///
    /// The session is cleared even when the provider reports an error; that
    /// error is returned afterwards.
    pub async fn disconnect(&self) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        let session = match std::mem::replace(&mut state.phase, Phase::Disconnected) {
            Phase::Connected(session) => session,
            Phase::Disconnected => return Err(VpnError::NotConnected),
            connecting @ Phase::Connecting { .. } => {
                state.phase = connecting;
                return Err(VpnError::ConnectionInProgress);
            }
        };

        let ActiveSession {
            record_id,
            mut provider,
        } = session;
        let result = provider.disconnect().await;
        state.idle.insert(provider.protocol(), provider);
        state.metrics = Metrics::default();

        match result {
            Ok(()) => {
                self.shared
                    .log
                    .info(format_args!("disconnected from {record_id}"));
                Ok(())
            }
            Err(e) => {
                self.shared
                    .log
                    .warn(format_args!("disconnect from {record_id} reported: {e}"));
                Err(e)
            }
        }
    }

    /// Change the mode used by the next connection
    pub async fn set_mode(&self, mode: &str) -> Result<()> {
        let mode: ConnectionMode = mode.parse()?;
        let mut state = self.shared.state.lock().await;
        if !matches!(state.phase, Phase::Disconnected) {
            return Err(VpnError::InvalidState(
                "connection mode can only be changed while disconnected".to_string(),
            ));
        }
        if state.mode != mode {
            self.shared
                .log
                .info(format_args!("connection mode {} -> {mode}", state.mode));
            state.mode = mode;
        }
        Ok(())
    }

    pub async fn mode(&self) -> ConnectionMode {
        self.shared.state.lock().await.mode
    }

    pub async fn status(&self) -> ConnectionStatus {
        let state = self.shared.state.lock().await;
        match &state.phase {
            Phase::Disconnected => ConnectionStatus::default(),
            Phase::Connecting { record_id } => ConnectionStatus {
                connected: false,
                connecting: true,
                active_connection_id: Some(record_id.clone()),
            },
            Phase::Connected(session) => ConnectionStatus {
                connected: true,
                connecting: false,
                active_connection_id: Some(session.record_id.clone()),
            },
        }
    }

    /// Latest sampled metrics; zero unless connected
    pub async fn metrics(&self) -> Metrics {
        self.shared.state.lock().await.metrics
    }

    /// Take one sample now instead of waiting for the next tick
    pub async fn sample_metrics(&self) {
        self.shared.sample().await;
    }

    /// Stop the sampler and tear down any active tunnel
    ///
    /// A connect attempt in flight is allowed to settle first so its tunnel
    /// is torn down too.
    pub async fn shutdown(&self) -> Result<()> {
        let _ = self.shutdown.send(true);
        self.wait_until_settled().await;
        match self.disconnect().await {
            Ok(()) | Err(VpnError::NotConnected) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl ConnectionManager {
    async fn wait_until_settled(&self) {
        loop {
            let settled = self.shared.settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();

            let connecting = matches!(
                self.shared.state.lock().await.phase,
                Phase::Connecting { .. }
            );
            if !connecting {
                return;
            }
            self.shared
                .log
                .debug(format_args!("waiting for connect attempt before shutdown"));
            settled.await;
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.sampler.abort();
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("registered", &self.registered_protocols())
            .finish_non_exhaustive()
    }
}

async fn bring_up(
    provider: &mut Provider,
    record: &ConnectionRecord,
    mode: ConnectionMode,
    log: &Logger,
) -> Result<()> {
    provider.init(record, mode)?;
    let connected = provider.connect().await;
    if let Err(e) = connected {
        if let Err(cleanup) = provider.disconnect().await {
            log.warn(format_args!(
                "cleanup after failed connect to {}: {cleanup}",
                record.name
            ));
        }
        return Err(e);
    }
    Ok(())
}

async fn run_sampler(shared: Arc<Shared>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick fires immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => shared.sample().await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    shared.log.debug(format_args!("metrics sampler stopped"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::CaptureSink;
    use log::Level;

    fn manager_config(protocols: &[Protocol]) -> ManagerConfig {
        ManagerConfig {
            // tests sample by hand unless they say otherwise
            metrics_interval_ms: 60_000,
            protocols: protocols.to_vec(),
            ..ManagerConfig::default()
        }
    }

    fn manager() -> ConnectionManager {
        ConnectionManager::new(
            &manager_config(&Protocol::ALL),
            &EngineConfig::default(),
            Logger::discard(),
        )
        .unwrap()
    }

    fn sstp_record() -> ConnectionRecord {
        ConnectionRecord::new(
            "SSTP - vpn.example.com:443",
            Protocol::Sstp,
            "sstp://u:p@vpn.example.com",
            r#"{"username":"u","password":"p","address":"vpn.example.com","port":443}"#,
        )
    }

    fn trojan_record() -> ConnectionRecord {
        ConnectionRecord::new(
            "Trojan - example.com:443",
            Protocol::Trojan,
            "trojan://secret@example.com:443",
            r#"{"password":"secret","address":"example.com","port":443,"tls":true,"server_name":""}"#,
        )
    }

    #[cfg(unix)]
    fn slow_vless_manager(grace_period_ms: u64) -> ConnectionManager {
        let engine = EngineConfig {
            xray_path: "sh".to_string(),
            xray_args: vec![
                "-c".to_string(),
                "exec sleep 30".to_string(),
                "{config}".to_string(),
            ],
            grace_period_ms,
            ..EngineConfig::default()
        };
        ConnectionManager::new(&manager_config(&[Protocol::Vless]), &engine, Logger::discard())
            .unwrap()
    }

    fn vless_record() -> ConnectionRecord {
        ConnectionRecord::new(
            "VLESS - example.com:443",
            Protocol::Vless,
            "vless://8a45f2f0-5361-4e2b-b330-1d756c448c59@example.com:443",
            r#"{"id":"8a45f2f0-5361-4e2b-b330-1d756c448c59","address":"example.com","port":443,"tls":true}"#,
        )
    }

    #[tokio::test]
    async fn test_connect_disconnect_lifecycle() {
        let manager = manager();
        let record = sstp_record();

        assert_eq!(manager.status().await, ConnectionStatus::default());
        manager.connect(&record).await.unwrap();

        let status = manager.status().await;
        assert!(status.connected);
        assert!(!status.connecting);
        assert_eq!(status.active_connection_id.as_deref(), Some(record.id.as_str()));

        manager.sample_metrics().await;
        assert!(!manager.metrics().await.is_zero());

        manager.disconnect().await.unwrap();
        assert_eq!(manager.status().await, ConnectionStatus::default());
        assert!(manager.metrics().await.is_zero());

        // the provider went back to the registry
        manager.connect(&record).await.unwrap();
        manager.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_connect_is_rejected() {
        let manager = manager();
        manager.connect(&sstp_record()).await.unwrap();

        let result = manager.connect(&trojan_record()).await;
        assert!(matches!(result, Err(VpnError::AlreadyConnected)));

        let status = manager.status().await;
        assert!(status.connected);
        manager.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_unregistered_protocol_is_rejected() {
        let manager = ConnectionManager::new(
            &manager_config(&[Protocol::Sstp]),
            &EngineConfig::default(),
            Logger::discard(),
        )
        .unwrap();

        assert!(manager.ensure_supported(Protocol::Sstp).is_ok());
        assert!(manager.ensure_supported(Protocol::Trojan).is_err());

        let result = manager.connect(&trojan_record()).await;
        assert!(matches!(result, Err(VpnError::UnsupportedProtocol(_))));
        assert_eq!(manager.status().await, ConnectionStatus::default());
        assert_eq!(manager.registered_protocols(), vec![Protocol::Sstp]);
    }

    #[tokio::test]
    async fn test_init_failure_rolls_back() {
        let manager = manager();
        let broken = ConnectionRecord::new("broken", Protocol::Sstp, "sstp://x", "{oops");

        let result = manager.connect(&broken).await;
        assert!(matches!(result, Err(VpnError::Config(_))));
        assert_eq!(manager.status().await, ConnectionStatus::default());
        assert!(manager.metrics().await.is_zero());

        manager.connect(&sstp_record()).await.unwrap();
        assert!(manager.status().await.connected);
    }

    #[tokio::test]
    async fn test_wireguard_without_keys_is_rejected_at_init() {
        let manager = manager();
        let record = ConnectionRecord::new(
            "WireGuard - example.com:51820",
            Protocol::WireGuard,
            "wg://example.com:51820",
            r#"{"private_key":"","public_key":"","preshared_key":"","address":"example.com","port":51820}"#,
        );
        assert!(matches!(
            manager.connect(&record).await,
            Err(VpnError::Config(_))
        ));
        assert!(!manager.status().await.connected);
    }

    #[tokio::test]
    async fn test_missing_engine_rolls_back() {
        let engine = EngineConfig {
            xray_path: "/nonexistent/xray".to_string(),
            ..EngineConfig::default()
        };
        let manager =
            ConnectionManager::new(&manager_config(&Protocol::ALL), &engine, Logger::discard())
                .unwrap();

        let result = manager.connect(&vless_record()).await;
        assert!(matches!(result, Err(VpnError::Process(_))));
        assert_eq!(manager.status().await, ConnectionStatus::default());
        assert!(matches!(
            manager.disconnect().await,
            Err(VpnError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_when_idle() {
        let manager = manager();
        assert!(matches!(
            manager.disconnect().await,
            Err(VpnError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_set_mode() {
        let manager = manager();
        assert_eq!(manager.mode().await, ConnectionMode::Proxy);

        assert!(matches!(
            manager.set_mode("bridge").await,
            Err(VpnError::InvalidMode(_))
        ));
        manager.set_mode("tun").await.unwrap();
        assert_eq!(manager.mode().await, ConnectionMode::Tun);

        manager.connect(&sstp_record()).await.unwrap();
        assert!(matches!(
            manager.set_mode("tap").await,
            Err(VpnError::InvalidState(_))
        ));
        // unknown strings are rejected before the state check
        assert!(matches!(
            manager.set_mode("bridge").await,
            Err(VpnError::InvalidMode(_))
        ));
        assert_eq!(manager.mode().await, ConnectionMode::Tun);

        manager.disconnect().await.unwrap();
        manager.set_mode("tap").await.unwrap();
        assert_eq!(manager.mode().await, ConnectionMode::Tap);
    }

    #[tokio::test]
    async fn test_metrics_error_keeps_previous_snapshot() {
        let sink = Arc::new(CaptureSink::default());
        let manager = ConnectionManager::new(
            &manager_config(&Protocol::ALL),
            &EngineConfig::default(),
            Logger::new(sink.clone()),
        )
        .unwrap();

        manager.connect(&trojan_record()).await.unwrap();
        manager.sample_metrics().await;
        let before = manager.metrics().await;
        assert!(!before.is_zero());

        {
            let mut state = manager.shared.state.lock().await;
            if let Phase::Connected(session) = &mut state.phase {
                session.provider.disconnect().await.unwrap();
            }
        }

        manager.sample_metrics().await;
        assert_eq!(manager.metrics().await, before);
        assert!(sink.contains(Level::Warn, "metrics for"));
    }

    #[tokio::test]
    async fn test_sampler_updates_metrics() {
        let config = ManagerConfig {
            metrics_interval_ms: 20,
            ..ManagerConfig::default()
        };
        let manager =
            ConnectionManager::new(&config, &EngineConfig::default(), Logger::discard()).unwrap();
        manager.connect(&sstp_record()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        let first = manager.metrics().await;
        assert!(!first.is_zero());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = manager.metrics().await;
        assert!(second.bytes_received >= first.bytes_received);
        assert!(second.bytes_sent >= first.bytes_sent);
    }

    #[tokio::test]
    async fn test_shutdown_disconnects() {
        let manager = manager();
        manager.shutdown().await.unwrap();

        manager.connect(&sstp_record()).await.unwrap();
        manager.shutdown().await.unwrap();
        assert_eq!(manager.status().await, ConnectionStatus::default());
    }

    #[test]
    fn test_new_requires_runtime() {
        let result = ConnectionManager::new(
            &ManagerConfig::default(),
            &EngineConfig::default(),
            Logger::discard(),
        );
        assert!(matches!(result, Err(VpnError::InvalidState(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_concurrent_connect_sees_in_progress() {
        let manager = Arc::new(slow_vless_manager(400));
        let record = vless_record();

        let first = {
            let manager = Arc::clone(&manager);
            let record = record.clone();
            tokio::spawn(async move { manager.connect(&record).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let status = manager.status().await;
        assert!(status.connecting);
        assert!(!status.connected);
        assert_eq!(status.active_connection_id.as_deref(), Some(record.id.as_str()));

        assert!(matches!(
            manager.connect(&record).await,
            Err(VpnError::ConnectionInProgress)
        ));
        assert!(matches!(
            manager.disconnect().await,
            Err(VpnError::ConnectionInProgress)
        ));
        assert!(matches!(
            manager.set_mode("tun").await,
            Err(VpnError::InvalidState(_))
        ));

        first.await.unwrap().unwrap();
        assert!(manager.status().await.connected);
        manager.disconnect().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_abandoned_connect_still_settles() {
        let manager = slow_vless_manager(300);
        let record = vless_record();

        let result =
            tokio::time::timeout(Duration::from_millis(50), manager.connect(&record)).await;
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_millis(600)).await;
        let status = manager.status().await;
        assert!(status.connected);
        assert!(!status.connecting);
        manager.disconnect().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_during_connect_tears_down_tunnel() {
        let manager = Arc::new(slow_vless_manager(300));
        let record = vless_record();

        let attempt = {
            let manager = Arc::clone(&manager);
            let record = record.clone();
            tokio::spawn(async move { manager.connect(&record).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.status().await.connecting);

        manager.shutdown().await.unwrap();
        assert_eq!(manager.status().await, ConnectionStatus::default());
        assert!(manager.metrics().await.is_zero());

        attempt.await.unwrap().unwrap();
        assert_eq!(manager.status().await, ConnectionStatus::default());
    }
}
