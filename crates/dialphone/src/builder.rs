//! BridgeBuilder -- fluent builder for constructing [`CallBridge`] instances.
//!
//! Separates link configuration from construction: pick a serial port or a
//! TCP bridge, tune timeouts, then build against a [`HostAdapter`].
//!
//! # Example
//!
//! ```no_run
//! use dialphone::BridgeBuilder;
//! use std::time::Duration;
//!
//! # async fn example(host: std::sync::Arc<dyn dialphone::HostAdapter>) -> dialphone::Result<()> {
//! let bridge = BridgeBuilder::new()
//!     .serial_port("/dev/rfcomm0")
//!     .baud_rate(9600)
//!     .connect_timeout(Duration::from_secs(15))
//!     .build(host)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use dialphone_core::error::{Error, Result};
use dialphone_core::transport::Connector;
use dialphone_link::{LinkConfig, LinkManager};
use dialphone_transport::{SerialConfig, SerialConnector, TcpConnector};

use crate::bridge::CallBridge;
use crate::host::HostAdapter;

/// Fluent builder for [`CallBridge`].
pub struct BridgeBuilder {
    serial_port: Option<String>,
    baud_rate: Option<u32>,
    tcp_addr: Option<String>,
    link: LinkConfig,
}

impl BridgeBuilder {
    pub fn new() -> Self {
        BridgeBuilder {
            serial_port: None,
            baud_rate: None,
            tcp_addr: None,
            link: LinkConfig::default(),
        }
    }

    /// Reach the handset through a serial port (e.g. `/dev/rfcomm0`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Override the default 9600 baud.
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = Some(baud);
        self
    }

    /// Reach the handset through a TCP serial bridge at `host:port`.
    pub fn tcp(mut self, addr: &str) -> Self {
        self.tcp_addr = Some(addr.to_string());
        self
    }

    /// Limit each connect attempt (default: 10s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.link.connect_timeout = timeout;
        self
    }

    /// Set how often the IO task wakes from an idle read (default: 100ms).
    pub fn read_poll_interval(mut self, interval: Duration) -> Self {
        self.link.read_poll_interval = interval;
        self
    }

    /// Append `terminator` to every command written to the handset.
    pub fn command_terminator(mut self, terminator: &[u8]) -> Self {
        self.link.command_terminator = terminator.to_vec();
        self
    }

    /// Build a [`CallBridge`] with a caller-provided connector.
    ///
    /// This is the entry point for tests (pass a `MockConnector` from
    /// `dialphone-test-harness`). Serial and TCP settings are ignored; the
    /// link stays disconnected until [`CallBridge::connect`] is called.
    pub fn build_with_connector(
        self,
        connector: Arc<dyn Connector>,
        host: Arc<dyn HostAdapter>,
    ) -> Result<CallBridge> {
        self.validate_link()?;
        let link = LinkManager::with_config(connector, self.link);
        Ok(CallBridge::new(link, host))
    }

    /// Build a [`CallBridge`] over a serial or TCP connector and start
    /// connecting to the configured port or address.
    ///
    /// Exactly one of [`serial_port()`](Self::serial_port) and
    /// [`tcp()`](Self::tcp) must have been called.
    pub fn build(self, host: Arc<dyn HostAdapter>) -> Result<CallBridge> {
        let (connector, address): (Arc<dyn Connector>, String) =
            match (&self.serial_port, &self.tcp_addr) {
                (Some(port), None) => {
                    let config = SerialConfig {
                        baud_rate: self.baud_rate.unwrap_or(SerialConfig::default().baud_rate),
                        ..Default::default()
                    };
                    (Arc::new(SerialConnector::new(config)), port.clone())
                }
                (None, Some(addr)) => {
                    if self.baud_rate.is_some() {
                        return Err(Error::InvalidParameter(
                            "baud_rate does not apply to a TCP link".into(),
                        ));
                    }
                    (Arc::new(TcpConnector::new()), addr.clone())
                }
                (Some(_), Some(_)) => {
                    return Err(Error::InvalidParameter(
                        "serial_port and tcp are mutually exclusive".into(),
                    ));
                }
                (None, None) => {
                    return Err(Error::InvalidParameter(
                        "serial_port or tcp is required for build()".into(),
                    ));
                }
            };

        let bridge = self.build_with_connector(connector, host)?;
        let link = bridge.link().clone();
        tokio::spawn(async move { link.connect(&address).await });
        Ok(bridge)
    }

    fn validate_link(&self) -> Result<()> {
        if self.baud_rate == Some(0) {
            return Err(Error::InvalidParameter("baud_rate must be non-zero".into()));
        }
        if self.link.connect_timeout.is_zero() {
            return Err(Error::InvalidParameter(
                "connect_timeout must be non-zero".into(),
            ));
        }
        if self.link.read_poll_interval.is_zero() {
            return Err(Error::InvalidParameter(
                "read_poll_interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dialphone_core::types::{HostCallState, LinkState};
    use dialphone_test_harness::MockConnector;
    use tokio::sync::broadcast;

    struct NullHost {
        call_tx: broadcast::Sender<HostCallState>,
    }

    impl NullHost {
        fn new() -> Arc<Self> {
            let (call_tx, _) = broadcast::channel(4);
            Arc::new(Self { call_tx })
        }
    }

    #[async_trait]
    impl HostAdapter for NullHost {
        fn subscribe_call_state(&self) -> broadcast::Receiver<HostCallState> {
            self.call_tx.subscribe()
        }

        async fn place_call(&self, _number: &str) -> Result<()> {
            Ok(())
        }
    }

    fn invalid(result: Result<CallBridge>) -> String {
        match result {
            Err(Error::InvalidParameter(msg)) => msg,
            Err(other) => panic!("expected InvalidParameter, got {other:?}"),
            Ok(_) => panic!("expected InvalidParameter, got a bridge"),
        }
    }

    #[test]
    fn builder_defaults() {
        let builder = BridgeBuilder::new();
        assert!(builder.serial_port.is_none());
        assert!(builder.tcp_addr.is_none());
        assert!(builder.baud_rate.is_none());
        assert_eq!(builder.link.connect_timeout, Duration::from_secs(10));
        assert!(builder.link.command_terminator.is_empty());
    }

    #[test]
    fn builder_settings() {
        let builder = BridgeBuilder::new()
            .serial_port("/dev/rfcomm0")
            .baud_rate(115_200)
            .connect_timeout(Duration::from_secs(3))
            .read_poll_interval(Duration::from_millis(20))
            .command_terminator(b"\n");
        assert_eq!(builder.serial_port.as_deref(), Some("/dev/rfcomm0"));
        assert_eq!(builder.baud_rate, Some(115_200));
        assert_eq!(builder.link.connect_timeout, Duration::from_secs(3));
        assert_eq!(builder.link.read_poll_interval, Duration::from_millis(20));
        assert_eq!(builder.link.command_terminator, b"\n");
    }

    #[tokio::test]
    async fn build_requires_a_transport() {
        let msg = invalid(BridgeBuilder::new().build(NullHost::new()));
        assert!(msg.contains("required"), "got: {msg}");
    }

    #[tokio::test]
    async fn build_rejects_both_transports() {
        let msg = invalid(
            BridgeBuilder::new()
                .serial_port("/dev/rfcomm0")
                .tcp("127.0.0.1:2000")
                .build(NullHost::new()),
        );
        assert!(msg.contains("mutually exclusive"), "got: {msg}");
    }

    #[tokio::test]
    async fn build_rejects_baud_rate_for_tcp() {
        invalid(
            BridgeBuilder::new()
                .tcp("127.0.0.1:2000")
                .baud_rate(9600)
                .build(NullHost::new()),
        );
    }

    #[tokio::test]
    async fn build_rejects_zero_values() {
        invalid(
            BridgeBuilder::new()
                .serial_port("/dev/rfcomm0")
                .baud_rate(0)
                .build(NullHost::new()),
        );
        invalid(
            BridgeBuilder::new()
                .connect_timeout(Duration::ZERO)
                .build_with_connector(Arc::new(MockConnector::new()), NullHost::new()),
        );
        invalid(
            BridgeBuilder::new()
                .read_poll_interval(Duration::ZERO)
                .build_with_connector(Arc::new(MockConnector::new()), NullHost::new()),
        );
    }

    #[tokio::test]
    async fn build_with_connector_starts_disconnected() {
        let bridge = BridgeBuilder::new()
            .build_with_connector(Arc::new(MockConnector::new()), NullHost::new())
            .unwrap();
        assert_eq!(bridge.link_state().await, LinkState::Disconnected);
        assert!(bridge.dialed_number().await.is_empty());
        bridge.shutdown().await;
    }
}
