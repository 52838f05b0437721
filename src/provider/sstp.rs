//! SSTP

use super::{PassiveProvider, ProtocolConfig, TrafficProfile};
use crate::types::Protocol;
use serde::{Deserialize, Serialize};

/// Port used when a link omits it
pub const DEFAULT_PORT: u16 = 443;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SstpConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl ProtocolConfig for SstpConfig {
    const PROTOCOL: Protocol = Protocol::Sstp;
    const PROFILE: TrafficProfile = TrafficProfile::new(1_133_333, 566_667, 65, 4);

    fn endpoint(&self) -> (&str, u16) {
        (&self.address, self.port)
    }
}

pub type SstpProvider = PassiveProvider<SstpConfig>;
