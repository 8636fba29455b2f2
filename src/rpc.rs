//! Framed request/response transport over TCP.
//!
//! Frame format: `[Magic:4][Kind:1][Len:4 LE][Payload:Len]`. The payload is a
//! bincode [`Envelope`]. A connection carries any number of sequential
//! request/response pairs; the server answers each request before reading
//! the next one from the same connection.

use crate::errors::RpcError;
use crate::ipc_protocol::{Envelope, ErrorResponse, PROTOCOL_VERSION};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// Magic bytes opening every frame.
pub const FRAME_MAGIC: [u8; 4] = *b"GOL1";

pub const FRAME_HEADER_SIZE: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Request = 1,
    Response = 2,
}

impl FrameKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Request),
            2 => Some(Self::Response),
            _ => None,
        }
    }
}

/// Serialize `payload` inside a versioned envelope.
pub fn encode<T: Serialize>(payload: &T) -> Result<Vec<u8>, RpcError> {
    Ok(bincode::serialize(&Envelope::new(payload))?)
}

/// Decode an envelope, rejecting any other protocol version before the
/// payload itself is touched.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, RpcError> {
    let remote: u32 = bincode::deserialize(bytes)?;
    if remote != PROTOCOL_VERSION {
        return Err(RpcError::VersionMismatch {
            local: PROTOCOL_VERSION,
            remote,
        });
    }
    let envelope: Envelope<T> = bincode::deserialize(bytes)?;
    Ok(envelope.payload)
}

pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    kind: FrameKind,
    payload: &[u8],
) -> Result<(), RpcError> {
    let len = u32::try_from(payload.len())
        .map_err(|_| RpcError::Frame(format!("payload of {} bytes too large", payload.len())))?;
    let mut header = [0u8; FRAME_HEADER_SIZE];
    header[..4].copy_from_slice(&FRAME_MAGIC);
    header[4] = kind as u8;
    header[5..].copy_from_slice(&len.to_le_bytes());
    writer.write_all(&header).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. `Ok(None)` means the peer closed the connection cleanly
/// between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_bytes: u32,
) -> Result<Option<(FrameKind, Vec<u8>)>, RpcError> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    if header[..4] != FRAME_MAGIC {
        return Err(RpcError::Frame("invalid magic".to_string()));
    }
    let kind = FrameKind::from_u8(header[4])
        .ok_or_else(|| RpcError::Frame(format!("unknown frame kind {}", header[4])))?;
    let len = u32::from_le_bytes([header[5], header[6], header[7], header[8]]);
    if len > max_frame_bytes {
        return Err(RpcError::Frame(format!(
            "frame of {} bytes exceeds limit of {}",
            len, max_frame_bytes
        )));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(Some((kind, payload)))
}

/// Client end of a connection, typed by the request/response pair it speaks.
pub struct RpcClient<Req, Resp> {
    stream: TcpStream,
    peer: String,
    max_frame_bytes: u32,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> RpcClient<Req, Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    pub async fn connect(address: &str, max_frame_bytes: u32) -> Result<Self, RpcError> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        debug!("🔌 Connected to {}", address);
        Ok(Self {
            stream,
            peer: address.to_string(),
            max_frame_bytes,
            _marker: PhantomData,
        })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Send one request and wait for its response. No timeout: a peer that
    /// never answers blocks the caller.
    pub async fn call(&mut self, request: &Req) -> Result<Resp, RpcError> {
        let bytes = encode(request)?;
        write_frame(&mut self.stream, FrameKind::Request, &bytes).await?;
        match read_frame(&mut self.stream, self.max_frame_bytes).await? {
            Some((FrameKind::Response, payload)) => decode(&payload),
            Some((kind, _)) => Err(RpcError::Frame(format!("expected response, got {:?}", kind))),
            None => Err(RpcError::Closed),
        }
    }
}

/// Server-side request handling for one service.
#[async_trait]
pub trait RpcHandler: Send + Sync + 'static {
    type Request: DeserializeOwned + Send + 'static;
    type Response: Serialize + ErrorResponse + Send + 'static;

    async fn handle(&self, request: Self::Request) -> Self::Response;
}

/// Bind a listener, logging the address actually bound.
pub async fn bind(address: &str) -> Result<TcpListener, RpcError> {
    let listener = TcpListener::bind(address).await?;
    info!("📡 Listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Accept connections until `shutdown` is cancelled, one task per connection.
pub async fn serve<H: RpcHandler>(
    listener: TcpListener,
    handler: Arc<H>,
    max_frame_bytes: u32,
    shutdown: CancellationToken,
) -> Result<(), RpcError> {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("🛑 Shutdown requested, no longer accepting connections");
                return Ok(());
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!("🔗 Accepted connection from {}", peer);
                        tokio::spawn(handle_connection(
                            stream,
                            peer,
                            handler.clone(),
                            max_frame_bytes,
                            shutdown.child_token(),
                        ));
                    }
                    Err(e) => warn!("⚠️ Failed to accept connection: {}", e),
                }
            }
        }
    }
}

async fn handle_connection<H: RpcHandler>(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<H>,
    max_frame_bytes: u32,
    shutdown: CancellationToken,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not set TCP_NODELAY for {}: {}", peer, e);
    }

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = read_frame(&mut stream, max_frame_bytes) => frame,
        };

        let payload = match frame {
            Ok(Some((FrameKind::Request, payload))) => payload,
            Ok(Some((kind, _))) => {
                warn!("⚠️ {} sent a {:?} frame, closing", peer, kind);
                break;
            }
            Ok(None) => {
                debug!("👋 {} disconnected", peer);
                break;
            }
            Err(e) => {
                warn!("⚠️ Dropping connection from {}: {}", peer, e);
                break;
            }
        };

        let response = match decode::<H::Request>(&payload) {
            Ok(request) => handler.handle(request).await,
            Err(e) => {
                warn!("⚠️ Undecodable request from {}: {}", peer, e);
                H::Response::error(e.to_string())
            }
        };

        let bytes = match encode(&response) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("⚠️ Failed to encode response for {}: {}", peer, e);
                break;
            }
        };
        if let Err(e) = write_frame(&mut stream, FrameKind::Response, &bytes).await {
            warn!("⚠️ Failed to answer {}: {}", peer, e);
            break;
        }
    }
}
