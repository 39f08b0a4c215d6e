//! Serial transport for RTU exchanges.
//!
//! A [`Transport`] performs one request/response exchange at a time; the
//! poll loop owns it exclusively, so the half-duplex line never carries two
//! exchanges at once.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio_serial::{SerialPort, SerialStream};
use tracing::{debug, trace};

use crate::config::SerialConfig;
use crate::rtu::{Frame, response_len};

/// Largest response a read can announce: header, 255 data bytes, CRC.
const MAX_RESPONSE_LEN: usize = 3 + 255 + 2;

/// Errors that end a transport session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Serial I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serial line closed")]
    Closed,

    #[error("Failed to open serial port '{port}': {message}")]
    Open { port: String, message: String },
}

/// One request/response exchange on the serial line.
#[async_trait]
pub trait Transport: Send {
    /// Send `request` and return whatever arrived before the response was
    /// complete or the timeout elapsed.
    async fn exchange(&mut self, request: &Frame) -> Result<Vec<u8>, TransportError>;
}

/// Opens transport sessions; called again after every teardown.
#[async_trait]
pub trait Connector: Send {
    async fn connect(&mut self) -> Result<Box<dyn Transport>, TransportError>;

    /// Human-readable endpoint for logs.
    fn endpoint(&self) -> &str;
}

/// A byte stream that can drop input left over from a previous exchange.
pub trait SerialLine: AsyncRead + AsyncWrite + Unpin + Send {
    fn discard_input(&mut self) -> io::Result<()>;
}

impl SerialLine for SerialStream {
    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(tokio_serial::ClearBuffer::All)
            .map_err(io::Error::from)
    }
}

/// A plain byte stream used as a serial line, e.g. a TCP serial server.
/// There is no driver buffer to flush, so discarding input is a no-op.
#[derive(Debug)]
pub struct StreamLine<S>(pub S);

impl<S: AsyncRead + Unpin> AsyncRead for StreamLine<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for StreamLine<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> SerialLine for StreamLine<S> {
    fn discard_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// RTU exchange over any serial-like stream.
#[derive(Debug)]
pub struct RtuTransport<S> {
    stream: S,
    timeout: Duration,
}

impl<S: SerialLine> RtuTransport<S> {
    pub fn new(stream: S, timeout: Duration) -> Self {
        Self { stream, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[async_trait]
impl<S: SerialLine> Transport for RtuTransport<S> {
    async fn exchange(&mut self, request: &Frame) -> Result<Vec<u8>, TransportError> {
        self.stream.discard_input()?;
        self.stream.write_all(request.as_bytes()).await?;
        self.stream.flush().await?;
        trace!(request = ?request.as_bytes(), "Request sent");

        let deadline = tokio::time::Instant::now() + self.timeout;
        let function = request.function();
        let mut response = Vec::with_capacity(MAX_RESPONSE_LEN);
        let mut buf = [0u8; MAX_RESPONSE_LEN];

        loop {
            let wanted = response_len(function, &response);
            if response.len() >= wanted {
                break;
            }
            let missing = wanted - response.len();
            match tokio::time::timeout_at(deadline, self.stream.read(&mut buf[..missing])).await {
                Err(_) => {
                    debug!(received = response.len(), wanted, "Response timed out");
                    break;
                }
                Ok(Ok(0)) => return Err(TransportError::Closed),
                Ok(Ok(n)) => response.extend_from_slice(&buf[..n]),
                Ok(Err(e)) => return Err(TransportError::Io(e)),
            }
        }

        trace!(response = ?response, "Response received");
        Ok(response)
    }
}

fn parity(value: &str) -> tokio_serial::Parity {
    match value.to_lowercase().as_str() {
        "even" => tokio_serial::Parity::Even,
        "odd" => tokio_serial::Parity::Odd,
        _ => tokio_serial::Parity::None,
    }
}

fn stop_bits(value: u8) -> tokio_serial::StopBits {
    match value {
        2 => tokio_serial::StopBits::Two,
        _ => tokio_serial::StopBits::One,
    }
}

fn data_bits(value: u8) -> tokio_serial::DataBits {
    match value {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    }
}

/// Open the configured serial port.
pub fn open_serial(settings: &SerialConfig) -> Result<SerialStream, TransportError> {
    let builder = tokio_serial::new(&settings.port, settings.baud_rate)
        .parity(parity(&settings.parity))
        .stop_bits(stop_bits(settings.stop_bits))
        .data_bits(data_bits(settings.data_bits))
        .timeout(settings.timeout());

    SerialStream::open(&builder).map_err(|e| TransportError::Open {
        port: settings.port.clone(),
        message: e.to_string(),
    })
}

/// Connector for a real serial port.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    settings: SerialConfig,
}

impl SerialConnector {
    pub fn new(settings: SerialConfig) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn connect(&mut self) -> Result<Box<dyn Transport>, TransportError> {
        let stream = open_serial(&self.settings)?;
        Ok(Box::new(RtuTransport::new(stream, self.settings.timeout())))
    }

    fn endpoint(&self) -> &str {
        &self.settings.port
    }
}
