/// Wire transport: a TCP connection framed as newline-terminated JSON,
/// matching the reference implementation's `asyncio` line protocol rather
/// than the length-prefixed binary framing other TCP-based components in
/// this lineage use.
///
/// A `Connection` is one accepted or dialed socket. Every request/response
/// pair is one line in, one line out; there is no pipelining.
use crate::error::{CoreError, CoreResult};
use crate::protocol::{parse_request, Request, Response};
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

/// Longest line this side will read before giving up and treating the peer
/// as misbehaving. Generous relative to any real KV payload.
const MAX_LINE_BYTES: usize = 1 << 20;

/// One accepted or dialed connection, framed as newline-delimited JSON.
pub struct Connection {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
    peer: SocketAddr,
}

impl Connection {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            peer,
        }
    }

    /// Dial `addr`, bounded by [`crate::config::TRANSPORT_TIMEOUT`].
    pub async fn connect(addr: SocketAddr) -> CoreResult<Self> {
        let stream = timeout(crate::config::TRANSPORT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| CoreError::Transport {
                peer: addr.port(),
                reason: "connect timed out".to_string(),
            })?
            .map_err(|e| CoreError::Transport {
                peer: addr.port(),
                reason: e.to_string(),
            })?;
        Ok(Self::new(stream, addr))
    }

    /// Write one JSON-serializable value terminated by `\n`.
    pub async fn send_line(&mut self, value: &impl Serialize) -> CoreResult<()> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .await
            .map_err(|e| CoreError::Transport {
                peer: self.peer.port(),
                reason: e.to_string(),
            })
    }

    /// Read one line of raw JSON text. Returns `None` on a clean EOF before
    /// any bytes arrive (peer closed without writing).
    pub async fn recv_line(&mut self) -> CoreResult<Option<String>> {
        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| CoreError::Transport {
                peer: self.peer.port(),
                reason: e.to_string(),
            })?;
        if n == 0 {
            return Ok(None);
        }
        if line.len() > MAX_LINE_BYTES {
            return Err(CoreError::Transport {
                peer: self.peer.port(),
                reason: "line exceeded maximum size".to_string(),
            });
        }
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    /// Read one line and parse it as a [`Request`].
    pub async fn recv_request(&mut self) -> CoreResult<Option<Request>> {
        match self.recv_line().await? {
            None => Ok(None),
            Some(line) => parse_request(&line).map(Some),
        }
    }
}

/// Dial `addr`, send `request`, read exactly one response line back, all
/// bounded by [`crate::config::TRANSPORT_TIMEOUT`]. This is the primitive
/// behind peer-to-peer forwarding, replica writes, heartbeats and
/// anti-entropy pulls (spec §4.1/§4.7): every cross-node call in this system
/// is a single request/response round trip, never a long-lived session.
pub async fn request(addr: SocketAddr, request: &Request) -> CoreResult<Response> {
    let call = async {
        let mut conn = Connection::connect(addr).await?;
        conn.send_line(request).await?;
        match conn.recv_line().await? {
            Some(line) => serde_json::from_str::<Response>(&line).map_err(CoreError::from),
            None => Err(CoreError::Transport {
                peer: addr.port(),
                reason: "peer closed connection without responding".to_string(),
            }),
        }
    };

    timeout(crate::config::TRANSPORT_TIMEOUT, call)
        .await
        .map_err(|_| CoreError::Transport {
            peer: addr.port(),
            reason: "request timed out".to_string(),
        })?
}

/// A bound TCP listener accepting newline-JSON connections.
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    pub async fn bind(addr: SocketAddr) -> CoreResult<Self> {
        let inner = TcpListener::bind(addr)
            .await
            .map_err(|e| CoreError::BindFailure(addr, e.to_string()))?;
        Ok(Self { inner })
    }

    pub fn local_addr(&self) -> CoreResult<SocketAddr> {
        self.inner
            .local_addr()
            .map_err(|e| CoreError::BindFailure("0.0.0.0:0".parse().unwrap(), e.to_string()))
    }

    /// Accept the next incoming connection.
    pub async fn accept(&self) -> CoreResult<Connection> {
        let (stream, peer) = self
            .inner
            .accept()
            .await
            .map_err(|e| CoreError::Transport {
                peer: 0,
                reason: e.to_string(),
            })?;
        Ok(Connection::new(stream, peer))
    }
}
