//! Shadowsocks

use super::{PassiveProvider, ProtocolConfig, TrafficProfile};
use crate::error::{Result, VpnError};
use crate::types::Protocol;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowsocksConfig {
    pub method: String,
    pub password: String,
    pub address: String,
    pub port: u16,
}

impl ProtocolConfig for ShadowsocksConfig {
    const PROTOCOL: Protocol = Protocol::Shadowsocks;
    const PROFILE: TrafficProfile = TrafficProfile::new(1_000_000, 500_000, 45, 3);

    fn endpoint(&self) -> (&str, u16) {
        (&self.address, self.port)
    }

    fn validate(&self) -> Result<()> {
        if self.method.is_empty() {
            return Err(VpnError::Config("Shadowsocks method is missing".to_string()));
        }
        Ok(())
    }
}

pub type ShadowsocksProvider = PassiveProvider<ShadowsocksConfig>;
