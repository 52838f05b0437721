//! Protocol providers
//!
//! Every supported protocol has exactly one [`Provider`] variant. All variants
//! share the same contract:
//!
//! - `init` stores the record and mode and decodes the protocol payload
//! - `connect` brings the tunnel up
//! - `disconnect` tears it down; without a running tunnel it is a no-op
//! - `metrics` reports the current session
//!
//! Adding a protocol means adding a module, a variant and one arm in
//! [`Provider::for_protocol`]. The connection manager never matches on
//! variants.

use crate::config::EngineConfig;
use crate::error::{Result, VpnError};
use crate::logging::Logger;
use crate::types::{ConnectionMode, ConnectionRecord, Metrics, Protocol};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

pub mod engine;
pub mod ikev2;
pub mod openvpn;
pub mod passive;
pub mod shadowsocks;
pub mod sstp;
pub mod traffic;
pub mod trojan;
pub mod vless;
pub mod wireguard;

pub use ikev2::{Ikev2Config, Ikev2Provider};
pub use openvpn::{OpenVpnConfig, OpenVpnProvider};
pub use passive::PassiveProvider;
pub use shadowsocks::{ShadowsocksConfig, ShadowsocksProvider};
pub use sstp::{SstpConfig, SstpProvider};
pub use traffic::{TrafficProfile, TrafficSimulator};
pub use trojan::{TrojanConfig, TrojanProvider};
pub use vless::{VlessConfig, VlessProvider};
pub use wireguard::{WireGuardConfig, WireGuardProvider};

/// Protocol payload stored in a connection record
pub trait ProtocolConfig: Serialize + DeserializeOwned + Send + 'static {
    /// Protocol owning this payload
    const PROTOCOL: Protocol;

    /// Nominal traffic characteristics for synthetic telemetry
    const PROFILE: TrafficProfile;

    /// Server address and port
    fn endpoint(&self) -> (&str, u16);

    /// Provider-level checks beyond what the payload shape guarantees
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Decode a record's payload into the protocol's config type
pub fn decode_config<C: ProtocolConfig>(record: &ConnectionRecord) -> Result<C> {
    if record.protocol != C::PROTOCOL {
        return Err(VpnError::Config(format!(
            "{} provider cannot handle {} connection {}",
            C::PROTOCOL.display_name(),
            record.protocol,
            record.id
        )));
    }

    let config: C = serde_json::from_str(&record.config).map_err(|e| {
        VpnError::Config(format!(
            "failed to parse {} config: {e}",
            C::PROTOCOL.display_name()
        ))
    })?;
    config.validate()?;
    Ok(config)
}

/// Dependencies handed to every provider at construction
#[derive(Debug, Clone)]
pub struct ProviderContext {
    pub log: Logger,
    pub engine: Arc<EngineConfig>,
}

impl ProviderContext {
    pub fn new(log: Logger, engine: EngineConfig) -> Self {
        Self {
            log,
            engine: Arc::new(engine),
        }
    }
}

/// Closed set of protocol handlers
#[derive(Debug)]
pub enum Provider {
    Vless(VlessProvider),
    Shadowsocks(ShadowsocksProvider),
    OpenVpn(OpenVpnProvider),
    WireGuard(WireGuardProvider),
    Trojan(TrojanProvider),
    Ikev2(Ikev2Provider),
    Sstp(SstpProvider),
}

macro_rules! dispatch {
    ($provider:expr, $inner:ident => $body:expr) => {
        match $provider {
            Provider::Vless($inner) => $body,
            Provider::Shadowsocks($inner) => $body,
            Provider::OpenVpn($inner) => $body,
            Provider::WireGuard($inner) => $body,
            Provider::Trojan($inner) => $body,
            Provider::Ikev2($inner) => $body,
            Provider::Sstp($inner) => $body,
        }
    };
}

impl Provider {
    /// Build the idle provider registered for `protocol`
    pub fn for_protocol(protocol: Protocol, ctx: &ProviderContext) -> Self {
        let log = ctx.log.with_target(provider_target(protocol));
        match protocol {
            Protocol::Vless => Provider::Vless(VlessProvider::new(log, Arc::clone(&ctx.engine))),
            Protocol::Shadowsocks => Provider::Shadowsocks(PassiveProvider::new(log)),
            Protocol::OpenVpn => Provider::OpenVpn(PassiveProvider::new(log)),
            Protocol::WireGuard => Provider::WireGuard(PassiveProvider::new(log)),
            Protocol::Trojan => Provider::Trojan(PassiveProvider::new(log)),
            Protocol::Ikev2 => Provider::Ikev2(PassiveProvider::new(log)),
            Protocol::Sstp => Provider::Sstp(PassiveProvider::new(log)),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Provider::Vless(_) => Protocol::Vless,
            Provider::Shadowsocks(_) => Protocol::Shadowsocks,
            Provider::OpenVpn(_) => Protocol::OpenVpn,
            Provider::WireGuard(_) => Protocol::WireGuard,
            Provider::Trojan(_) => Protocol::Trojan,
            Provider::Ikev2(_) => Protocol::Ikev2,
            Provider::Sstp(_) => Protocol::Sstp,
        }
    }

    /// Store the record and mode, decoding and validating the payload
    pub fn init(&mut self, record: &ConnectionRecord, mode: ConnectionMode) -> Result<()> {
        dispatch!(self, p => p.init(record, mode))
    }

    /// Bring the tunnel up
    pub async fn connect(&mut self) -> Result<()> {
        dispatch!(self, p => p.connect().await)
    }

    /// Tear the tunnel down
    pub async fn disconnect(&mut self) -> Result<()> {
        dispatch!(self, p => p.disconnect().await)
    }

    /// Current session figures
    pub fn metrics(&mut self) -> Result<Metrics> {
        dispatch!(self, p => p.metrics())
    }
}

fn provider_target(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Vless => "rvpnmux::provider::vless",
        Protocol::Shadowsocks => "rvpnmux::provider::shadowsocks",
        Protocol::OpenVpn => "rvpnmux::provider::openvpn",
        Protocol::WireGuard => "rvpnmux::provider::wireguard",
        Protocol::Trojan => "rvpnmux::provider::trojan",
        Protocol::Ikev2 => "rvpnmux::provider::ikev2",
        Protocol::Sstp => "rvpnmux::provider::sstp",
    }
}
