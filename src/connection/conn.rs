use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::connection::{Role, WorkerState};
use crate::error::{Error, Result};
use crate::ws::frame::{Frame, OpCode};
use crate::ws::handshake::{UpgradeRequest, UpgradeResponse};

const READ_BUFFER_SIZE: usize = 8192;
const READ_CHUNK: usize = 4096;
const MAX_UPGRADE_RESPONSE: usize = 8192;

/// One logical duplex channel to the messaging endpoint.
///
/// A `Connection` is owned exclusively by its worker task; nothing else
/// touches the transport. It moves opaque text payloads: requests out,
/// whole data-message payloads in. Payload content is never inspected;
/// the harness measures timing, not protocol conformance.
///
/// ## Type Parameters
///
/// - `T`: the underlying async I/O stream (`TcpStream` in production,
///   an in-memory stub in tests)
pub struct Connection<T> {
    io: T,
    role: Role,
    state: WorkerState,
    read_buf: BytesMut,
    write_buf: BytesMut,
    mask_counter: u32,
}

/// Seed for the mask sequence. Falls back to system time if the system RNG
/// is unavailable.
fn random_mask_seed() -> u32 {
    let mut buf = [0u8; 4];
    if getrandom::getrandom(&mut buf).is_ok() {
        u32::from_le_bytes(buf)
    } else {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u32)
            .unwrap_or(0x1234_5678)
    }
}

impl Connection<TcpStream> {
    /// Open a connection to the endpoint, retrying until it succeeds.
    ///
    /// Any failure before the transport is established (TCP connect refused,
    /// upgrade rejected, socket dropped mid-upgrade) is treated as transient:
    /// the attempt is logged and retried after `retry_backoff`, with no retry
    /// ceiling. Unbounded retry is deliberate for a controlled test target;
    /// the operator sees every attempt at `warn`.
    ///
    /// # Errors
    ///
    /// The current policy retries every failure, so this only returns `Ok`;
    /// the `Result` keeps call sites uniform with the fallible operations.
    pub async fn dial(
        addr: &str,
        path: &str,
        origin: &str,
        role: Role,
        retry_backoff: Duration,
    ) -> Result<Self> {
        loop {
            match Self::attempt(addr, path, origin, role).await {
                Ok(conn) => {
                    debug!(%addr, %role, "transport established");
                    return Ok(conn);
                }
                Err(error) => {
                    warn!(%addr, %role, %error, "dial failed, retrying");
                    sleep(retry_backoff).await;
                }
            }
        }
    }

    async fn attempt(addr: &str, path: &str, origin: &str, role: Role) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        // Nagle would fold the publish request into a later segment and
        // skew every measurement.
        let _ = stream.set_nodelay(true);
        Self::upgrade(stream, addr, path, origin, role).await
    }

    async fn upgrade(
        mut stream: TcpStream,
        host: &str,
        path: &str,
        origin: &str,
        role: Role,
    ) -> Result<Self> {
        let request = UpgradeRequest::new(host, path, origin);
        stream.write_all(&request.to_bytes()).await?;

        let mut buf = BytesMut::with_capacity(1024);
        let header_end = loop {
            if let Some(end) = find_header_end(&buf) {
                break end;
            }
            if buf.len() > MAX_UPGRADE_RESPONSE {
                return Err(Error::InvalidHandshake("oversized upgrade response".into()));
            }
            let n = stream.read_buf(&mut buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed(None));
            }
        };

        let response = UpgradeResponse::parse(&buf[..header_end])?;
        response.verify(&request.key)?;

        // Bytes past the header belong to the frame stream.
        buf.advance(header_end);

        Ok(Self {
            io: stream,
            role,
            state: WorkerState::Connected,
            read_buf: buf,
            write_buf: BytesMut::with_capacity(1024),
            mask_counter: random_mask_seed(),
        })
    }
}

impl<T> Connection<T> {
    /// Wrap an already-established stream.
    #[must_use]
    pub fn from_stream(io: T, role: Role) -> Self {
        Self {
            io,
            role,
            state: WorkerState::Connected,
            read_buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            write_buf: BytesMut::with_capacity(1024),
            mask_counter: random_mask_seed(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Role this connection plays.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    fn next_mask(&mut self) -> [u8; 4] {
        self.mask_counter = self.mask_counter.wrapping_add(0x9E37_79B9);
        let mut x = self.mask_counter;
        x ^= x >> 16;
        x = x.wrapping_mul(0x7FEB_352D);
        x ^= x >> 15;
        x.to_le_bytes()
    }

    fn fail(&mut self, err: Error) -> Error {
        self.state = WorkerState::Failed;
        err
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Connection<T> {
    /// Perform the application handshake: connect, then subscribe.
    ///
    /// Writes the connect request and reads exactly one response frame,
    /// then writes the subscribe request and reads exactly one response
    /// frame. Neither response is validated beyond "a frame arrived":
    /// a broken handshake shows up as an I/O error or a stall, and either
    /// invalidates the whole measurement anyway.
    ///
    /// # Errors
    ///
    /// Any I/O error here is fatal for this worker: the connection moves to
    /// `Failed` and the error propagates.
    pub async fn handshake(&mut self, connect_request: &str, subscribe_request: &str) -> Result<()> {
        match self.exchange(connect_request, subscribe_request).await {
            Ok(()) => {
                self.state = WorkerState::Subscribed;
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    async fn exchange(&mut self, connect_request: &str, subscribe_request: &str) -> Result<()> {
        self.write_text(connect_request).await?;
        self.read_message().await?;
        self.write_text(subscribe_request).await?;
        self.read_message().await?;
        Ok(())
    }

    /// Write the publish request and return the write-completion timestamp.
    ///
    /// The caller drains whatever acknowledgement frames the endpoint sends
    /// afterwards; taking the timestamp here keeps it at wire-send time.
    ///
    /// # Errors
    ///
    /// Any I/O error is fatal (`Failed` state, error propagated).
    pub async fn publish(&mut self, request: &str) -> Result<Instant> {
        match self.write_text(request).await {
            Ok(()) => Ok(Instant::now()),
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Block until the next data message arrives and return its payload.
    ///
    /// Control traffic is transparent: pings are answered, pongs skipped,
    /// fragmented messages reassembled. A close frame or EOF is fatal: a
    /// connection dying mid-measurement invalidates the round, so there is
    /// nothing sensible to recover to.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionClosed`] on close/EOF, [`Error::Io`] on transport
    /// errors, frame errors on malformed input. All fatal.
    pub async fn read_frame(&mut self) -> Result<Vec<u8>> {
        if self.state == WorkerState::Subscribed && !self.role.is_publisher() {
            self.state = WorkerState::Active;
        }
        match self.read_message().await {
            Ok(payload) => Ok(payload),
            Err(err) => Err(self.fail(err)),
        }
    }

    async fn read_message(&mut self) -> Result<Vec<u8>> {
        let mut partial: Option<Vec<u8>> = None;
        loop {
            let frame = self.next_frame().await?;
            match frame.opcode {
                OpCode::Ping => {
                    self.write_frame(&Frame::pong(frame.payload)).await?;
                }
                OpCode::Pong => {}
                OpCode::Close => {
                    let code = (frame.payload.len() >= 2)
                        .then(|| u16::from_be_bytes([frame.payload[0], frame.payload[1]]));
                    return Err(Error::ConnectionClosed(code));
                }
                OpCode::Text | OpCode::Binary => {
                    if frame.fin {
                        return Ok(frame.payload);
                    }
                    partial = Some(frame.payload);
                }
                OpCode::Continuation => match partial.take() {
                    Some(mut message) => {
                        message.extend_from_slice(&frame.payload);
                        if frame.fin {
                            return Ok(message);
                        }
                        partial = Some(message);
                    }
                    None => {
                        return Err(Error::InvalidFrame(
                            "continuation without a message start".into(),
                        ));
                    }
                },
            }
        }
    }

    async fn next_frame(&mut self) -> Result<Frame> {
        loop {
            match Frame::parse(&self.read_buf) {
                Ok((frame, consumed)) => {
                    self.read_buf.advance(consumed);
                    return Ok(frame);
                }
                Err(Error::IncompleteFrame { .. }) => {}
                Err(err) => return Err(err),
            }

            self.read_buf.reserve(READ_CHUNK);
            let n = self.io.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed(None));
            }
        }
    }

    async fn write_text(&mut self, text: &str) -> Result<()> {
        self.write_frame(&Frame::text(text)).await
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mask = self.next_mask();
        self.write_buf.clear();
        frame.encode(&mut self.write_buf, Some(mask));
        self.io.write_all(&self.write_buf).await?;
        self.io.flush().await?;
        Ok(())
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}
