//! IKEv2/IPsec

use super::{PassiveProvider, ProtocolConfig, TrafficProfile};
use crate::types::Protocol;
use serde::{Deserialize, Serialize};

/// IKE port used when a link omits it
pub const DEFAULT_PORT: u16 = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ikev2Config {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Pre-shared key
    #[serde(default)]
    pub psk: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl ProtocolConfig for Ikev2Config {
    const PROTOCOL: Protocol = Protocol::Ikev2;
    const PROFILE: TrafficProfile = TrafficProfile::new(1_466_667, 733_333, 40, 2);

    fn endpoint(&self) -> (&str, u16) {
        (&self.address, self.port)
    }
}

pub type Ikev2Provider = PassiveProvider<Ikev2Config>;
