//! VLESS over the xray core
//!
//! `connect` renders an xray configuration for the stored link, starts the
//! engine on it and waits out the startup grace period. The engine is the
//! only tunnel implementation in the crate; everything it prints ends up in
//! the debug log.

use super::engine::EngineProcess;
use super::{decode_config, ProtocolConfig, TrafficProfile, TrafficSimulator};
use crate::config::EngineConfig;
use crate::error::{Result, VpnError};
use crate::logging::Logger;
use crate::types::{ConnectionMode, ConnectionRecord, Metrics, Protocol};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Interface name requested from the engine in tun and tap modes
pub const TUN_INTERFACE: &str = "rvpnmux0";

const VISION_FLOW: &str = "xtls-rprx-vision";
const DEFAULT_FINGERPRINT: &str = "chrome";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlessConfig {
    pub id: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub reality: bool,
    #[serde(default)]
    pub vision: bool,
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub short_id: String,
    /// Transport: tcp, ws or grpc
    #[serde(default = "default_network")]
    pub network: String,
    /// WebSocket path or gRPC service name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// WebSocket Host header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

fn default_network() -> String {
    "tcp".to_string()
}

impl ProtocolConfig for VlessConfig {
    const PROTOCOL: Protocol = Protocol::Vless;
    const PROFILE: TrafficProfile = TrafficProfile::new(1_000_000, 500_000, 50, 5);

    fn endpoint(&self) -> (&str, u16) {
        (&self.address, self.port)
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(VpnError::Config("VLESS user id is missing".to_string()));
        }
        if self.address.trim().is_empty() {
            return Err(VpnError::Config("VLESS address is missing".to_string()));
        }
        Ok(())
    }
}

impl VlessConfig {
    fn outbound(&self) -> Value {
        let mut user = json!({
            "id": self.id,
            "encryption": "none",
        });
        if self.vision {
            user["flow"] = json!(VISION_FLOW);
        }

        json!({
            "tag": "proxy",
            "protocol": "vless",
            "settings": {
                "vnext": [{
                    "address": self.address,
                    "port": self.port,
                    "users": [user],
                }]
            },
            "streamSettings": self.stream_settings(),
        })
    }

    fn stream_settings(&self) -> Value {
        let mut settings = json!({ "network": self.network });

        if self.reality {
            settings["security"] = json!("reality");
            settings["realitySettings"] = json!({
                "serverName": self.server_name,
                "fingerprint": self.fingerprint_or_default(),
                "publicKey": self.public_key,
                "shortId": self.short_id,
            });
        } else if self.tls {
            let server_name = if self.server_name.is_empty() {
                &self.address
            } else {
                &self.server_name
            };
            settings["security"] = json!("tls");
            settings["tlsSettings"] = json!({
                "serverName": server_name,
                "fingerprint": self.fingerprint_or_default(),
            });
        } else {
            settings["security"] = json!("none");
        }

        match self.network.as_str() {
            "ws" => {
                settings["wsSettings"] = json!({
                    "path": self.path.as_deref().unwrap_or("/"),
                    "headers": { "Host": self.host.as_deref().unwrap_or_default() },
                });
            }
            "grpc" => {
                settings["grpcSettings"] = json!({
                    "serviceName": self.path.as_deref().unwrap_or_default(),
                });
            }
            _ => {}
        }

        settings
    }

    fn fingerprint_or_default(&self) -> &str {
        if self.fingerprint.is_empty() {
            DEFAULT_FINGERPRINT
        } else {
            &self.fingerprint
        }
    }
}

fn inbounds(mode: ConnectionMode, engine: &EngineConfig) -> Value {
    match mode {
        ConnectionMode::Proxy => json!([
            {
                "tag": "socks-in",
                "listen": "127.0.0.1",
                "port": engine.socks_port,
                "protocol": "socks",
                "settings": { "udp": true },
            },
            {
                "tag": "http-in",
                "listen": "127.0.0.1",
                "port": engine.http_port,
                "protocol": "http",
            },
        ]),
        // xray has no layer 2 inbound; tap shares the tun interface
        ConnectionMode::Tun | ConnectionMode::Tap => json!([
            {
                "tag": "tun-in",
                "protocol": "tun",
                "settings": {
                    "name": TUN_INTERFACE,
                    "MTU": 1500,
                },
                "sniffing": {
                    "enabled": true,
                    "destOverride": ["http", "tls", "quic"],
                },
            },
        ]),
    }
}

/// Full engine document for one connection
pub fn build_engine_config(config: &VlessConfig, mode: ConnectionMode, engine: &EngineConfig) -> Value {
    json!({
        "log": { "loglevel": "warning" },
        "inbounds": inbounds(mode, engine),
        "outbounds": [
            config.outbound(),
            { "tag": "direct", "protocol": "freedom" },
        ],
    })
}

#[derive(Debug)]
pub struct VlessProvider {
    log: Logger,
    engine: Arc<EngineConfig>,
    record_id: Option<String>,
    mode: ConnectionMode,
    config: Option<VlessConfig>,
    engine_process: Option<EngineProcess>,
    traffic: TrafficSimulator,
}

impl VlessProvider {
    pub fn new(log: Logger, engine: Arc<EngineConfig>) -> Self {
        Self {
            log,
            engine,
            record_id: None,
            mode: ConnectionMode::default(),
            config: None,
            engine_process: None,
            traffic: TrafficSimulator::new(VlessConfig::PROFILE),
        }
    }

    pub fn init(&mut self, record: &ConnectionRecord, mode: ConnectionMode) -> Result<()> {
        let config = decode_config::<VlessConfig>(record)?;
        self.record_id = Some(record.id.clone());
        self.mode = mode;
        self.config = Some(config);
        Ok(())
    }

    pub async fn connect(&mut self) -> Result<()> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| VpnError::InvalidState("VLESS provider used before init".to_string()))?;

        if let Some(stale) = self.engine_process.take() {
            stale.stop(self.engine.stop_timeout()).await?;
        }

        let document = build_engine_config(config, self.mode, &self.engine);
        self.log.info(format_args!(
            "starting VLESS session to {}:{} in {} mode",
            config.address, config.port, self.mode
        ));

        let mut process =
            EngineProcess::spawn(&self.engine.xray_command(), &document, self.log.clone())?;
        let started = process.wait_for_startup(self.engine.grace_period()).await;
        if let Err(e) = started {
            if let Err(stop_err) = process.stop(self.engine.stop_timeout()).await {
                self.log
                    .warn(format_args!("cleanup after failed start: {stop_err}"));
            }
            return Err(e);
        }

        self.engine_process = Some(process);
        self.traffic.start();
        Ok(())
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        self.traffic.stop();
        let Some(process) = self.engine_process.take() else {
            return Ok(());
        };
        process.stop(self.engine.stop_timeout()).await?;
        self.log.info(format_args!(
            "VLESS session {} closed",
            self.record_id.as_deref().unwrap_or("-")
        ));
        Ok(())
    }

    pub fn metrics(&mut self) -> Result<Metrics> {
        if let Some(process) = self.engine_process.as_mut() {
            if !process.is_running() {
                return Err(VpnError::Metrics("xray engine is no longer running".to_string()));
            }
        }
        self.traffic.sample()
    }

}
