//! Shared data types: protocols, modes, connection records, status and metrics

use crate::error::{Result, VpnError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Supported tunneling protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Vless,
    Shadowsocks,
    OpenVpn,
    WireGuard,
    Trojan,
    Ikev2,
    Sstp,
}

impl Protocol {
    pub const ALL: [Protocol; 7] = [
        Protocol::Vless,
        Protocol::Shadowsocks,
        Protocol::OpenVpn,
        Protocol::WireGuard,
        Protocol::Trojan,
        Protocol::Ikev2,
        Protocol::Sstp,
    ];

    /// Canonical tag, as persisted in connection records
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Vless => "vless",
            Protocol::Shadowsocks => "shadowsocks",
            Protocol::OpenVpn => "openvpn",
            Protocol::WireGuard => "wireguard",
            Protocol::Trojan => "trojan",
            Protocol::Ikev2 => "ikev2",
            Protocol::Sstp => "sstp",
        }
    }

    /// Label used in generated connection names
    pub fn display_name(&self) -> &'static str {
        match self {
            Protocol::Vless => "VLESS",
            Protocol::Shadowsocks => "Shadowsocks",
            Protocol::OpenVpn => "OpenVPN",
            Protocol::WireGuard => "WireGuard",
            Protocol::Trojan => "Trojan",
            Protocol::Ikev2 => "IKEv2",
            Protocol::Sstp => "SSTP",
        }
    }

    /// Map a URL scheme, including its aliases, to a protocol
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "vless" => Some(Protocol::Vless),
            "ss" | "shadowsocks" => Some(Protocol::Shadowsocks),
            "ovpn" | "openvpn" => Some(Protocol::OpenVpn),
            "wg" | "wireguard" => Some(Protocol::WireGuard),
            "trojan" => Some(Protocol::Trojan),
            "ikev2" | "ipsec" => Some(Protocol::Ikev2),
            "sstp" => Some(Protocol::Sstp),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = VpnError;

    fn from_str(s: &str) -> Result<Self> {
        Protocol::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| VpnError::UnsupportedProtocol(s.to_string()))
    }
}

/// Client-side traffic interception strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// Local SOCKS/HTTP proxy
    #[default]
    Proxy,
    /// Layer 3 virtual interface
    Tun,
    /// Layer 2 virtual interface
    Tap,
}

impl ConnectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionMode::Proxy => "proxy",
            ConnectionMode::Tun => "tun",
            ConnectionMode::Tap => "tap",
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionMode {
    type Err = VpnError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "proxy" => Ok(ConnectionMode::Proxy),
            "tun" => Ok(ConnectionMode::Tun),
            "tap" => Ok(ConnectionMode::Tap),
            other => Err(VpnError::InvalidMode(other.to_string())),
        }
    }
}

/// One configured VPN endpoint
///
/// `config` is the protocol payload serialized as JSON. Only the provider
/// registered for `protocol` interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub id: String,
    pub name: String,
    pub protocol: Protocol,
    pub url: String,
    pub config: String,
}

impl ConnectionRecord {
    /// Build a record with a freshly generated id
    pub fn new(
        name: impl Into<String>,
        protocol: Protocol,
        url: impl Into<String>,
        config: impl Into<String>,
    ) -> Self {
        Self {
            id: new_connection_id(),
            name: name.into(),
            protocol,
            url: url.into(),
            config: config.into(),
        }
    }
}

/// Generate a process-unique connection id
pub fn new_connection_id() -> String {
    Uuid::new_v4().to_string()
}

/// Point-in-time connection status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    pub connecting: bool,
    pub active_connection_id: Option<String>,
}

/// Throughput and latency snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    /// Bytes per second, both directions
    pub throughput: u64,
    /// Milliseconds
    pub ping: u32,
    /// Milliseconds
    pub jitter: u32,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

impl Metrics {
    pub fn is_zero(&self) -> bool {
        *self == Metrics::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_aliases() {
        assert_eq!(Protocol::from_scheme("ss"), Some(Protocol::Shadowsocks));
        assert_eq!(Protocol::from_scheme("OVPN"), Some(Protocol::OpenVpn));
        assert_eq!(Protocol::from_scheme("wg"), Some(Protocol::WireGuard));
        assert_eq!(Protocol::from_scheme("ipsec"), Some(Protocol::Ikev2));
        assert_eq!(Protocol::from_scheme("unknown"), None);
    }

    #[test]
    fn test_protocol_tags_round_trip() {
        for protocol in Protocol::ALL {
            assert_eq!(protocol.as_str().parse::<Protocol>().unwrap(), protocol);
            let json = serde_json::to_string(&protocol).unwrap();
            assert_eq!(json, format!("\"{}\"", protocol.as_str()));
        }
        assert!(matches!(
            "ss".parse::<Protocol>(),
            Err(VpnError::UnsupportedProtocol(_))
        ));
    }

    #[test]
    fn test_connection_mode_parsing() {
        assert_eq!("tun".parse::<ConnectionMode>().unwrap(), ConnectionMode::Tun);
        assert_eq!(ConnectionMode::default(), ConnectionMode::Proxy);
        assert!(matches!(
            "vpn".parse::<ConnectionMode>(),
            Err(VpnError::InvalidMode(_))
        ));
    }

    #[test]
    fn test_record_ids_are_unique() {
        let a = ConnectionRecord::new("a", Protocol::Sstp, "sstp://h", "{}");
        let b = ConnectionRecord::new("b", Protocol::Sstp, "sstp://h", "{}");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = ConnectionStatus {
            connected: true,
            connecting: false,
            active_connection_id: Some("abc".into()),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["activeConnectionId"], "abc");

        let metrics = Metrics {
            bytes_received: 5,
            ..Default::default()
        };
        let json = serde_json::to_value(metrics).unwrap();
        assert_eq!(json["bytesReceived"], 5);
        assert!(!metrics.is_zero());
    }
}
