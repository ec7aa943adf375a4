//! In-process pub/sub endpoint for session tests.
//!
//! Speaks just enough of the wire contract for the harness: upgrade, a
//! connect ack, a subscribe ack, and on publish an ack to the publisher plus
//! a fan-out message to every subscribed connection (the publisher's own
//! copy included, matching the classic endpoint's echo behavior).

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use fanbench::ws::{Frame, OpCode, compute_accept_key};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};

/// Behavior knobs for a [`MockHub`].
#[derive(Debug, Clone, Copy)]
pub struct HubOptions {
    /// Deliver published messages to subscribers. Disabling this simulates
    /// an endpoint that acknowledges publishes but stalls the fan-out.
    pub fan_out: bool,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self { fan_out: true }
    }
}

struct HubState {
    options: HubOptions,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<String>>>,
}

/// A mock endpoint listening on an ephemeral local port.
pub struct MockHub {
    addr: SocketAddr,
}

impl MockHub {
    /// Spawn a hub with default behavior on an ephemeral port.
    pub async fn spawn() -> Self {
        Self::spawn_with(HubOptions::default()).await
    }

    /// Spawn a hub with explicit behavior on an ephemeral port.
    pub async fn spawn_with(options: HubOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::from_listener(listener, options)
    }

    /// Spawn a hub on a specific address (for late-bind scenarios).
    pub async fn spawn_at(addr: &str, options: HubOptions) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_listener(listener, options))
    }

    fn from_listener(listener: TcpListener, options: HubOptions) -> Self {
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(HubState {
            options,
            subscribers: Mutex::new(Vec::new()),
        });
        tokio::spawn(accept_loop(listener, state));
        Self { addr }
    }

    /// `host:port` string clients should dial.
    pub fn address(&self) -> String {
        self.addr.to_string()
    }
}

async fn accept_loop(listener: TcpListener, state: Arc<HubState>) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            break;
        };
        tokio::spawn(serve_conn(stream, Arc::clone(&state)));
    }
}

async fn serve_conn(mut stream: TcpStream, state: Arc<HubState>) {
    let mut buf = BytesMut::with_capacity(1024);

    // Upgrade: read headers, answer 101 with the computed accept key.
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        match stream.read_buf(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let Some(key) = head
        .lines()
        .find(|line| line.to_ascii_lowercase().starts_with("sec-websocket-key:"))
        .and_then(|line| line.split_once(':'))
        .map(|(_, value)| value.trim().to_string())
    else {
        return;
    };
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        compute_accept_key(&key)
    );
    if stream.write_all(response.as_bytes()).await.is_err() {
        return;
    }
    buf.advance(header_end);

    let (mut rd, mut wr) = stream.into_split();
    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<String>();

    loop {
        tokio::select! {
            outbound = outbox_rx.recv() => {
                let Some(text) = outbound else { break };
                if send_text(&mut wr, &text).await.is_err() {
                    break;
                }
            }
            inbound = read_frame(&mut rd, &mut buf) => {
                let Some(frame) = inbound else { break };
                match frame.opcode {
                    OpCode::Text | OpCode::Binary => {
                        if handle_request(&state, &outbox_tx, &mut wr, &frame.payload)
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    OpCode::Ping => {
                        let mut out = BytesMut::new();
                        Frame::pong(frame.payload).encode(&mut out, None);
                        if wr.write_all(&out).await.is_err() {
                            break;
                        }
                    }
                    OpCode::Close => break,
                    _ => {}
                }
            }
        }
    }
}

async fn handle_request(
    state: &HubState,
    outbox_tx: &mpsc::UnboundedSender<String>,
    wr: &mut OwnedWriteHalf,
    payload: &[u8],
) -> std::io::Result<()> {
    let request: Value = match serde_json::from_slice(payload) {
        Ok(value) => value,
        Err(_) => return Ok(()),
    };

    match request["method"].as_str().unwrap_or("") {
        "connect" => {
            send_text(wr, r#"{"method":"connect","body":{"client":"mock"},"error":null}"#).await
        }
        "subscribe" => {
            state.subscribers.lock().await.push(outbox_tx.clone());
            send_text(wr, r#"{"method":"subscribe","body":{},"error":null}"#).await
        }
        "publish" => {
            send_text(wr, r#"{"method":"publish","body":{},"error":null}"#).await?;
            if state.options.fan_out {
                let message = format!(
                    r#"{{"method":"message","body":{{"data":{}}}}}"#,
                    request["params"]["data"]
                );
                let mut subscribers = state.subscribers.lock().await;
                subscribers.retain(|sink| sink.send(message.clone()).is_ok());
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

async fn send_text(wr: &mut OwnedWriteHalf, text: &str) -> std::io::Result<()> {
    let mut out = BytesMut::new();
    Frame::text(text).encode(&mut out, None);
    wr.write_all(&out).await
}

async fn read_frame(rd: &mut OwnedReadHalf, buf: &mut BytesMut) -> Option<Frame> {
    loop {
        match Frame::parse(buf) {
            Ok((frame, consumed)) => {
                buf.advance(consumed);
                return Some(frame);
            }
            Err(fanbench::Error::IncompleteFrame { .. }) => {}
            Err(_) => return None,
        }
        match rd.read_buf(buf).await {
            Ok(0) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}
