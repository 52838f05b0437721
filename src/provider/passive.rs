//! Providers without an external engine
//!
//! These protocols have no tunneling engine wired in yet. They validate their
//! payload like any other provider, but `connect` only opens a simulated
//! session so status and metrics behave as they would for a live tunnel.

use super::{decode_config, ProtocolConfig, TrafficSimulator};
use crate::error::{Result, VpnError};
use crate::logging::Logger;
use crate::types::{ConnectionMode, ConnectionRecord, Metrics};

#[derive(Debug)]
pub struct PassiveProvider<C> {
    log: Logger,
    record_id: Option<String>,
    mode: ConnectionMode,
    config: Option<C>,
    traffic: TrafficSimulator,
}

impl<C: ProtocolConfig> PassiveProvider<C> {
    pub fn new(log: Logger) -> Self {
        Self {
            log,
            record_id: None,
            mode: ConnectionMode::default(),
            config: None,
            traffic: TrafficSimulator::new(C::PROFILE),
        }
    }

    pub fn init(&mut self, record: &ConnectionRecord, mode: ConnectionMode) -> Result<()> {
        let config = decode_config::<C>(record)?;
        self.record_id = Some(record.id.clone());
        self.mode = mode;
        self.config = Some(config);
        Ok(())
    }

    pub async fn connect(&mut self) -> Result<()> {
        let config = self.config.as_ref().ok_or_else(|| {
            VpnError::InvalidState(format!(
                "{} provider used before init",
                C::PROTOCOL.display_name()
            ))
        })?;
        let (address, port) = config.endpoint();

        self.log.info(format_args!(
            "{} session to {address}:{port} in {} mode (no engine, simulated)",
            C::PROTOCOL.display_name(),
            self.mode
        ));
        self.traffic.start();
        Ok(())
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        if self.traffic.is_running() {
            self.log.info(format_args!(
                "{} session {} closed",
                C::PROTOCOL.display_name(),
                self.record_id.as_deref().unwrap_or("-")
            ));
        }
        self.traffic.stop();
        Ok(())
    }

    pub fn metrics(&mut self) -> Result<Metrics> {
        self.traffic.sample()
    }
}
