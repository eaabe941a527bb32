//! ==============================================================================
//! link.rs - serial device link
//! ==============================================================================
//!
//! purpose:
//!     owns the one physical serial connection to the sensor board and exposes
//!     exactly two primitives on it: read one line, write one token.
//!
//! design:
//!     - "Single Owner": the channel lives behind one async mutex. the telemetry
//!       loop (reads) and the command dispatcher (writes) both go through it, so
//!       bytes of a read and a write never interleave. tokio's mutex is fair,
//!       a queued write runs as soon as the current read returns.
//!     - "Fail Soft": when the board is missing the link is simply disconnected.
//!       reads and writes report `NotInitialized` instead of failing the process.
//!     - "Swap the Port": opening goes through `PortOpener`. on a real host that
//!       is tokio-serial; in tests it is an in-memory duplex stream.
//!
//! relationships:
//!     - used by: telemetry.rs (read_line, reconnect)
//!     - used by: dispatcher.rs (write_token)
//!     - uses: tokio-serial (SerialOpener)
//!
//! ==============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio_serial::SerialPortBuilderExt;

use crate::config::SerialConfig;

/// longest line kept while waiting for a terminator
const MAX_LINE_LEN: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("serial port {port} unavailable: {reason}")]
    Unavailable { port: String, reason: String },

    #[error("serial not initialized")]
    NotInitialized,

    #[error("no complete line before timeout")]
    Timeout,

    #[error("serial link closed")]
    Closed,

    #[error("serial i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// anything that can stand in for the board's serial stream
pub trait SerialPort: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPort for T {}

pub trait PortOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn SerialPort>, LinkError>;
    fn name(&self) -> String;
}

/// opens the board with tokio-serial
pub struct SerialOpener {
    port: String,
    baud_rate: u32,
}

impl SerialOpener {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self { port: port.into(), baud_rate }
    }

    pub fn from_config(config: &SerialConfig) -> Self {
        Self::new(config.port.clone(), config.baud_rate)
    }
}

impl PortOpener for SerialOpener {
    fn open(&self) -> Result<Box<dyn SerialPort>, LinkError> {
        let stream = tokio_serial::new(&self.port, self.baud_rate)
            .open_native_async()
            .map_err(|e| LinkError::Unavailable {
                port: self.port.clone(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(stream))
    }

    fn name(&self) -> String {
        self.port.clone()
    }
}

struct Channel {
    port: BufReader<Box<dyn SerialPort>>,
    // bytes of a line that has not been terminated yet
    pending: Vec<u8>,
}

impl Channel {
    fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port: BufReader::new(port), pending: Vec::new() }
    }
}

enum ReadOutcome {
    Line(Vec<u8>),
    Timeout,
    Eof,
    Failed(std::io::Error),
}

/// clone-able handle to the shared serial channel
#[derive(Clone)]
pub struct DeviceLink {
    channel: Arc<Mutex<Option<Channel>>>,
    connected: Arc<AtomicBool>,
    opener: Option<Arc<dyn PortOpener>>,
}

impl DeviceLink {
    /// a link that never had a device and cannot reopen one
    #[cfg(test)]
    pub fn absent() -> Self {
        Self {
            channel: Arc::new(Mutex::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
            opener: None,
        }
    }

    pub fn open(opener: Arc<dyn PortOpener>) -> Result<Self, LinkError> {
        let port = opener.open()?;
        tracing::info!("serial connected on {}", opener.name());
        Ok(Self {
            channel: Arc::new(Mutex::new(Some(Channel::new(port)))),
            connected: Arc::new(AtomicBool::new(true)),
            opener: Some(opener),
        })
    }

    /// open the device, or keep running without one
    pub fn open_or_absent(opener: Arc<dyn PortOpener>) -> Self {
        match Self::open(opener.clone()) {
            Ok(link) => link,
            Err(e) => {
                tracing::error!("error connecting to device: {}", e);
                Self {
                    channel: Arc::new(Mutex::new(None)),
                    connected: Arc::new(AtomicBool::new(false)),
                    opener: Some(opener),
                }
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn port_name(&self) -> Option<String> {
        self.opener.as_ref().map(|o| o.name())
    }

    /// read one newline-terminated line, terminator included
    ///
    /// on timeout the bytes received so far are kept and completed by the
    /// next call.
    pub async fn read_line(&self, timeout: Duration) -> Result<Vec<u8>, LinkError> {
        let mut guard = self.channel.lock().await;
        let channel = guard.as_mut().ok_or(LinkError::NotInitialized)?;

        let result =
            tokio::time::timeout(timeout, channel.port.read_until(b'\n', &mut channel.pending))
                .await;
        let outcome = match result {
            Err(_) => {
                if channel.pending.len() > MAX_LINE_LEN {
                    tracing::debug!("dropping {} unterminated bytes", channel.pending.len());
                    channel.pending.clear();
                }
                ReadOutcome::Timeout
            }
            Ok(Ok(0)) => ReadOutcome::Eof,
            Ok(Ok(_)) => ReadOutcome::Line(std::mem::take(&mut channel.pending)),
            Ok(Err(e)) => ReadOutcome::Failed(e),
        };

        match outcome {
            ReadOutcome::Line(line) => Ok(line),
            ReadOutcome::Timeout => Err(LinkError::Timeout),
            ReadOutcome::Eof => {
                self.disconnect(&mut guard, "end of stream");
                Err(LinkError::Closed)
            }
            ReadOutcome::Failed(e) => {
                self.disconnect(&mut guard, &e.to_string());
                Err(LinkError::Io(e))
            }
        }
    }

    /// write one device token and flush it
    pub async fn write_token(&self, token: &[u8]) -> Result<(), LinkError> {
        let mut guard = self.channel.lock().await;
        let channel = guard.as_mut().ok_or(LinkError::NotInitialized)?;

        if let Err(e) = write_and_flush(channel.port.get_mut(), token).await {
            self.disconnect(&mut guard, &e.to_string());
            return Err(LinkError::Io(e));
        }
        Ok(())
    }

    /// reopen the device through the stored opener
    pub async fn reconnect(&self) -> Result<(), LinkError> {
        let opener = self.opener.as_ref().ok_or(LinkError::NotInitialized)?;
        let port = opener.open()?;

        let mut guard = self.channel.lock().await;
        *guard = Some(Channel::new(port));
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!("serial reconnected on {}", opener.name());
        Ok(())
    }

    fn disconnect(&self, channel: &mut Option<Channel>, reason: &str) {
        if channel.take().is_some() {
            tracing::warn!("serial disconnected: {}", reason);
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn from_port(port: impl SerialPort + 'static) -> Self {
        Self {
            channel: Arc::new(Mutex::new(Some(Channel::new(Box::new(port))))),
            connected: Arc::new(AtomicBool::new(true)),
            opener: None,
        }
    }
}

async fn write_and_flush<W>(port: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    port.write_all(bytes).await?;
    port.flush().await
}
