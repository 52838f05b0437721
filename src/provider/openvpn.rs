//! OpenVPN

use super::{PassiveProvider, ProtocolConfig, TrafficProfile};
use crate::types::Protocol;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenVpnConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub address: String,
    pub port: u16,
}

impl ProtocolConfig for OpenVpnConfig {
    const PROTOCOL: Protocol = Protocol::OpenVpn;
    const PROFILE: TrafficProfile = TrafficProfile::new(1_333_333, 666_667, 60, 4);

    fn endpoint(&self) -> (&str, u16) {
        (&self.address, self.port)
    }
}

pub type OpenVpnProvider = PassiveProvider<OpenVpnConfig>;
