//! Device link transport: a serial port or a TCP line bridge.
//!
//! Both Arduinos speak newline-delimited UTF-8 at a caller-supplied baud,
//! 8 data bits, 1 stop bit, no parity, no flow control. During development
//! the `rig-node` simulator stands in for the hardware over TCP; everything
//! above this module sees the same pair of async stream halves either way.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_serial::SerialPortBuilderExt;

#[derive(Debug, Error)]
pub enum TransportError {
    /// No usable transport for this device (endpoint not configured).
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The port exists but could not be opened (busy, permissions, refused).
    #[error("failed to open {port}: {reason}")]
    PortOpenFailed { port: String, reason: String },

    /// A command write did not complete; the command is not delivered.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// The read side aborted mid-stream; the read loop terminates cleanly.
    #[error("read interrupted: {0}")]
    ReadInterrupted(String),

    /// Bounded wait for a device acknowledgment elapsed.
    #[error("command timed out")]
    Timeout,
}

pub type LineReader = Box<dyn AsyncRead + Send + Unpin>;
pub type LineWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Where a device lives: a serial device path, or `tcp:host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Serial { path: String, baud: u32 },
    Tcp { addr: String },
}

impl Endpoint {
    pub fn parse(spec: &str, baud: u32) -> Result<Self, TransportError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(TransportError::Unavailable(
                "no endpoint configured".to_string(),
            ));
        }
        if let Some(addr) = spec.strip_prefix("tcp:") {
            if addr.is_empty() {
                return Err(TransportError::Unavailable(format!(
                    "bad tcp endpoint '{spec}'"
                )));
            }
            return Ok(Endpoint::Tcp {
                addr: addr.to_string(),
            });
        }
        Ok(Endpoint::Serial {
            path: spec.to_string(),
            baud,
        })
    }

    pub fn describe(&self) -> String {
        match self {
            Endpoint::Serial { path, baud } => format!("{path}@{baud}"),
            Endpoint::Tcp { addr } => format!("tcp:{addr}"),
        }
    }
}

/// Open the endpoint, yielding independent read/write halves.
pub async fn open(endpoint: &Endpoint) -> Result<(LineReader, LineWriter), TransportError> {
    match endpoint {
        Endpoint::Serial { path, baud } => {
            let stream = tokio_serial::new(path.as_str(), *baud)
                .data_bits(tokio_serial::DataBits::Eight)
                .stop_bits(tokio_serial::StopBits::One)
                .parity(tokio_serial::Parity::None)
                .flow_control(tokio_serial::FlowControl::None)
                .timeout(Duration::from_millis(1000))
                .open_native_async()
                .map_err(|e| TransportError::PortOpenFailed {
                    port: path.clone(),
                    reason: e.to_string(),
                })?;
            let (r, w) = tokio::io::split(stream);
            Ok((Box::new(r), Box::new(w)))
        }
        Endpoint::Tcp { addr } => {
            let stream =
                TcpStream::connect(addr)
                    .await
                    .map_err(|e| TransportError::PortOpenFailed {
                        port: format!("tcp:{addr}"),
                        reason: e.to_string(),
                    })?;
            let (r, w) = stream.into_split();
            Ok((Box::new(r), Box::new(w)))
        }
    }
}

/// Send one newline-terminated token and flush it out.
pub async fn write_line(writer: &mut LineWriter, token: &str) -> Result<(), TransportError> {
    let framed = format!("{token}\n");
    writer
        .write_all(framed.as_bytes())
        .await
        .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    // -- Endpoint parsing ----------------------------------------------------

    #[test]
    fn serial_path_parses_with_baud() {
        let e = Endpoint::parse("/dev/ttyUSB0", 9600).unwrap();
        assert_eq!(
            e,
            Endpoint::Serial {
                path: "/dev/ttyUSB0".into(),
                baud: 9600
            }
        );
    }

    #[test]
    fn tcp_prefix_parses_to_tcp() {
        let e = Endpoint::parse("tcp:127.0.0.1:7001", 9600).unwrap();
        assert_eq!(
            e,
            Endpoint::Tcp {
                addr: "127.0.0.1:7001".into()
            }
        );
    }

    #[test]
    fn empty_endpoint_is_unavailable() {
        assert!(matches!(
            Endpoint::parse("  ", 9600),
            Err(TransportError::Unavailable(_))
        ));
    }

    #[test]
    fn bare_tcp_prefix_is_unavailable() {
        assert!(matches!(
            Endpoint::parse("tcp:", 9600),
            Err(TransportError::Unavailable(_))
        ));
    }

    #[test]
    fn describe_formats() {
        assert_eq!(
            Endpoint::parse("/dev/ttyACM0", 115200).unwrap().describe(),
            "/dev/ttyACM0@115200"
        );
        assert_eq!(
            Endpoint::parse("tcp:localhost:7002", 9600).unwrap().describe(),
            "tcp:localhost:7002"
        );
    }

    // -- Open failures -------------------------------------------------------

    #[tokio::test]
    async fn refused_tcp_connect_reports_port_open_failed() {
        // Bind a listener to grab a free port, then drop it so the connect
        // is refused.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = Endpoint::Tcp {
            addr: addr.to_string(),
        };
        match open(&endpoint).await {
            Err(TransportError::PortOpenFailed { port, .. }) => {
                assert!(port.starts_with("tcp:"));
            }
            Err(other) => panic!("expected PortOpenFailed, got {other:?}"),
            Ok(_) => panic!("expected PortOpenFailed, got a connection"),
        }
    }

    #[tokio::test]
    async fn missing_serial_device_reports_port_open_failed() {
        let endpoint = Endpoint::Serial {
            path: "/dev/definitely-not-a-port".into(),
            baud: 9600,
        };
        assert!(matches!(
            open(&endpoint).await,
            Err(TransportError::PortOpenFailed { .. })
        ));
    }

    // -- write_line ----------------------------------------------------------

    #[tokio::test]
    async fn write_line_appends_newline_and_flushes() {
        let (client, mut server) = tokio::io::duplex(64);
        let (_r, w) = tokio::io::split(client);
        let mut writer: LineWriter = Box::new(w);

        write_line(&mut writer, "OFF").await.unwrap();

        let mut buf = [0u8; 8];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"OFF\n");
    }
}
