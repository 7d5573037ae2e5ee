//! One-shot TCP relay to the controller

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};

use super::translate::GatewayRequest;
use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::protocol::encode_record;

/// Where and how [`relay`] talks to the controller
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    /// Deadline for the whole reply, measured from the first read
    pub read_timeout: Duration,
    /// Bytes requested per read call
    pub chunk_size: usize,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self::from(&GatewayConfig::default())
    }
}

impl From<&GatewayConfig> for RelayOptions {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            host: config.target_host.clone(),
            port: config.target_port,
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
            chunk_size: config.read_chunk_size,
        }
    }
}

impl RelayOptions {
    /// `host:port` of the controller
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Send `request` to the controller and return its reply line.
///
/// Never fails: connection problems come back as a JSON error body
/// `{"error": ...}`. The message names the failed step, so a read timeout
/// with nothing received reads `timeout waiting for reply from <target>`
/// rather than the connect-failure text.
pub async fn relay(request: &GatewayRequest, options: &RelayOptions) -> Bytes {
    let target = options.target();
    match exchange(request, options, &target).await {
        Ok(reply) => {
            debug!(target = %target, bytes = reply.len(), "Controller replied");
            reply
        }
        Err(e) => {
            warn!(target = %target, "Relay failed: {}", e);
            error_body(&failure_message(&e, &target))
        }
    }
}

/// `{"error": message}` as bytes
pub fn error_body(message: &str) -> Bytes {
    Bytes::from(serde_json::json!({ "error": message }).to_string())
}

fn failure_message(error: &Error, target: &str) -> String {
    match error {
        Error::Connect { .. } => format!("cannot open TCP connection to {}", target),
        Error::Timeout(_) => format!("timeout waiting for reply from {}", target),
        _ => format!("cannot send request to {}", target),
    }
}

async fn exchange(request: &GatewayRequest, options: &RelayOptions, target: &str) -> Result<Bytes> {
    let record = encode_record(request)?;

    let mut stream = match timeout(options.connect_timeout, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(Error::connect(target, e)),
        Err(_) => return Err(Error::connect(target, "connect timed out")),
    };
    debug!(target = %target, method = %request.method, uri = %request.uri, "Relaying request");

    let reply = match stream.write_all(&record).await {
        Ok(()) => read_reply(&mut stream, options.chunk_size, options.read_timeout).await,
        Err(e) => Err(Error::Io(e)),
    };

    // Best effort; the socket is dropped right after.
    let _ = stream.shutdown().await;
    reply
}

/// Read chunks until one contains a newline, the peer closes, or the
/// deadline passes. Only the first line is kept, newline included; bytes
/// after it are discarded. A deadline with nothing read is
/// [`Error::Timeout`]; a read error keeps whatever arrived before it.
async fn read_reply<R>(reader: &mut R, chunk_size: usize, read_timeout: Duration) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let deadline = Instant::now() + read_timeout;
    let mut chunk = vec![0u8; chunk_size.max(1)];
    let mut reply = BytesMut::new();

    loop {
        match timeout_at(deadline, reader.read(&mut chunk)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                if let Some(pos) = chunk[..n].iter().position(|&b| b == b'\n') {
                    reply.extend_from_slice(&chunk[..=pos]);
                    break;
                }
                reply.extend_from_slice(&chunk[..n]);
            }
            Ok(Err(e)) => {
                debug!("Reply read interrupted after {} bytes: {}", reply.len(), e);
                break;
            }
            Err(_) if reply.is_empty() => {
                return Err(Error::Timeout(format!("no reply within {:?}", read_timeout)));
            }
            Err(_) => break,
        }
    }

    Ok(reply.freeze())
}
