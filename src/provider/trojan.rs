//! Trojan

use super::{PassiveProvider, ProtocolConfig, TrafficProfile};
use crate::error::{Result, VpnError};
use crate::types::Protocol;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrojanConfig {
    pub password: String,
    pub address: String,
    pub port: u16,
    #[serde(default = "default_tls")]
    pub tls: bool,
    #[serde(default)]
    pub server_name: String,
}

fn default_tls() -> bool {
    true
}

impl ProtocolConfig for TrojanConfig {
    const PROTOCOL: Protocol = Protocol::Trojan;
    const PROFILE: TrafficProfile = TrafficProfile::new(1_200_000, 600_000, 55, 3);

    fn endpoint(&self) -> (&str, u16) {
        (&self.address, self.port)
    }

    fn validate(&self) -> Result<()> {
        if self.password.is_empty() {
            return Err(VpnError::Config("Trojan password is missing".to_string()));
        }
        Ok(())
    }
}

pub type TrojanProvider = PassiveProvider<TrojanConfig>;
