//! Serial port transport for the handset link.
//!
//! The handset pairs as a Bluetooth serial (SPP) device. On Linux the
//! paired device is bound to an RFCOMM TTY such as `/dev/rfcomm0`; on
//! Windows and macOS it appears as a COM port or `/dev/tty.*` node. USB
//! serial adapters wired straight to the handset's UART work the same way.
//! The handset's Bluetooth module runs at 9600 baud, 8N1.
//!
//! Opening an RFCOMM TTY pages the remote device and can stall for many
//! seconds while the handset is out of range, so the open runs on the
//! blocking pool where the link manager's timeout and cancellation can
//! abandon it.
//!
//! # Example
//!
//! ```no_run
//! use dialphone_transport::{SerialConfig, SerialTransport};
//! use dialphone_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> dialphone_core::Result<()> {
//! let mut handset = SerialTransport::open("/dev/rfcomm0", &SerialConfig::default()).await?;
//!
//! // Start the bell
//! handset.send(b"r").await?;
//!
//! let mut buf = [0u8; 64];
//! let n = handset.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use dialphone_core::error::{Error, Result};
use dialphone_core::transport::{Connector, Transport};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Line settings for the handset's serial port. Defaults to 9600 8N1.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

impl SerialConfig {
    fn port_builder(&self, path: &str) -> tokio_serial::SerialPortBuilder {
        tokio_serial::new(path, self.baud_rate)
            .data_bits(self.data_bits.into())
            .stop_bits(self.stop_bits.into())
            .parity(self.parity.into())
            .flow_control(self.flow_control.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Seven,
    Eight,
}

impl From<DataBits> for tokio_serial::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => tokio_serial::DataBits::Seven,
            DataBits::Eight => tokio_serial::DataBits::Eight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

impl From<StopBits> for tokio_serial::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

/// Some USB adapters need RTS/CTS; the Bluetooth module needs none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

impl From<FlowControl> for tokio_serial::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => tokio_serial::FlowControl::None,
            FlowControl::Software => tokio_serial::FlowControl::Software,
            FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
        }
    }
}

/// Serial link to the handset. The port path doubles as its remote name.
pub struct SerialTransport {
    stream: Option<SerialStream>,
    path: String,
}

impl SerialTransport {
    /// Open the handset's port at `path`.
    ///
    /// If the returned future is dropped while the open is stalled, the
    /// port is closed as soon as the open returns.
    pub async fn open(path: &str, config: &SerialConfig) -> Result<Self> {
        tracing::debug!(
            path = %path,
            baud_rate = config.baud_rate,
            flow_control = ?config.flow_control,
            "opening handset serial port"
        );

        let builder = config.port_builder(path);
        let owned = path.to_string();
        let stream = open_off_runtime(path, move || {
            builder
                .open_native_async()
                .map_err(|e| Error::Transport(format!("cannot open {owned}: {e}")))
        })
        .await
        .inspect_err(|e| {
            tracing::warn!(path = %path, error = %e, "handset serial port unavailable");
        })?;

        tracing::info!(path = %path, baud_rate = config.baud_rate, "handset serial port open");

        Ok(Self {
            stream: Some(stream),
            path: path.to_string(),
        })
    }
}

/// Run a blocking open on the blocking pool with the runtime entered, so
/// the resulting stream can register with the reactor.
async fn open_off_runtime<T, F>(path: &str, open: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let runtime = tokio::runtime::Handle::current();
    tokio::task::spawn_blocking(move || {
        let _entered = runtime.enter();
        open()
    })
    .await
    .map_err(|e| Error::Transport(format!("open of {path} did not complete: {e}")))?
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        tracing::trace!(path = %self.path, bytes = ?data, "to handset");

        stream.write_all(data).await.map_err(map_io_error)?;
        // RFCOMM buffers small writes; the bell should ring now.
        stream.flush().await.map_err(map_io_error)
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, stream.read(buf)).await {
            Err(_) => Err(Error::Timeout),
            // An RFCOMM TTY reads EOF once the handset drops the channel.
            Ok(Ok(0)) => {
                tracing::debug!(path = %self.path, "handset closed the serial link");
                Err(Error::ConnectionLost)
            }
            Ok(Ok(n)) => {
                tracing::trace!(path = %self.path, bytes = ?&buf[..n], "from handset");
                Ok(n)
            }
            Ok(Err(e)) => Err(map_io_error(e)),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.flush().await {
                tracing::debug!(path = %self.path, error = %e, "flush on close failed");
            }
            tracing::info!(path = %self.path, "handset serial port closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn remote_name(&self) -> Option<String> {
        Some(self.path.clone())
    }
}

/// Opens [`SerialTransport`]s, treating the link address as a port path.
#[derive(Debug, Clone, Default)]
pub struct SerialConnector {
    config: SerialConfig,
}

impl SerialConnector {
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn Transport>> {
        Ok(Box::new(SerialTransport::open(address, &self.config).await?))
    }
}

fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::ConnectionReset => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}
