//! WireGuard
//!
//! Share links may omit keys; the parser keeps them as empty strings. A
//! connection is only accepted once both the private and the peer public key
//! decode to 32-byte Curve25519 keys. The preshared key stays optional.

use super::{PassiveProvider, ProtocolConfig, TrafficProfile};
use crate::error::{Result, VpnError};
use crate::types::Protocol;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

const KEY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireGuardConfig {
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub preshared_key: String,
    pub address: String,
    pub port: u16,
}

impl ProtocolConfig for WireGuardConfig {
    const PROTOCOL: Protocol = Protocol::WireGuard;
    const PROFILE: TrafficProfile = TrafficProfile::new(1_666_667, 833_333, 30, 2);

    fn endpoint(&self) -> (&str, u16) {
        (&self.address, self.port)
    }

    fn validate(&self) -> Result<()> {
        check_key("private key", &self.private_key)?;
        check_key("public key", &self.public_key)?;
        if !self.preshared_key.is_empty() {
            check_key("preshared key", &self.preshared_key)?;
        }
        Ok(())
    }
}

fn check_key(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(VpnError::Config(format!("WireGuard {field} is missing")));
    }
    match STANDARD.decode(value) {
        Ok(bytes) if bytes.len() == KEY_LEN => Ok(()),
        Ok(bytes) => Err(VpnError::Config(format!(
            "WireGuard {field} must be {KEY_LEN} bytes, got {}",
            bytes.len()
        ))),
        Err(e) => Err(VpnError::Config(format!(
            "WireGuard {field} is not valid base64: {e}"
        ))),
    }
}

pub type WireGuardProvider = PassiveProvider<WireGuardConfig>;
