//! rvpnmux - Multi-protocol VPN client orchestrator
//!
//! Turns protocol share links into connection records and drives exactly one
//! tunnel at a time through its provider.
//!
//! ## What This Crate Provides
//! - Share-link parsing for VLESS, Shadowsocks, OpenVPN, WireGuard, Trojan,
//!   IKEv2 and SSTP
//! - A connection manager with a connect/disconnect state machine and a
//!   background metrics sampler
//! - Supervision of the xray core for VLESS tunnels
//! - A JSON-backed store for saved connections and preferences
//! - A command surface ([`VpnService`]) for UI front ends
//! - Configuration parsing and validation (TOML format)
//!
//! ## What It Does Not Do
//! - Carry packets itself; tunnels are established by external engines
//! - Configure routes, DNS or system proxies

pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod parser;
pub mod provider;
pub mod service;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{Result, VpnError};
pub use logging::Logger;
pub use manager::ConnectionManager;
pub use parser::UrlParser;
pub use service::{CommandReply, ConnectionSummary, VpnService};
pub use store::{ConnectionStore, Settings};
pub use types::{ConnectionMode, ConnectionRecord, ConnectionStatus, Metrics, Protocol};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
