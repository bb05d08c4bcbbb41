//! TCP connection to the push gateway.
//!
//! TLS is expected to be terminated by a local proxy; this side speaks the
//! binary protocol in [`crate::wire`] over plain TCP. The gateway writes an error
//! response frame and closes the connection when a message is rejected, so the
//! connection is re-opened on the next send once its reader has stopped. Every
//! reader feeds the same response channel.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use async_trait::async_trait;
use herald_common::error::AppError;
use herald_common::types::ResponseEvent;

use crate::transport::PushTransport;
use crate::wire::{self, ERROR_RESPONSE_LEN, FeedbackTuple, WireMessage};

/// Capacity of the response channel between the reader task and the reconciler.
const RESPONSE_CHANNEL_CAPACITY: usize = 1024;

/// One open socket: its write half and the task reading responses from it.
struct Link {
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
}

impl Link {
    async fn open(addr: &str, tx: mpsc::Sender<ResponseEvent>) -> Result<Self, AppError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        let reader = tokio::spawn(read_responses(addr.to_string(), reader, tx));

        tracing::info!(addr = %addr, "Connected to push gateway");
        Ok(Self { writer, reader })
    }

    /// The reader stops on EOF, read errors and garbled frames.
    fn is_open(&self) -> bool {
        !self.reader.is_finished()
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Gateway connection that reconnects after the gateway hangs up.
pub struct GatewayConnection {
    addr: String,
    link: Mutex<Option<Link>>,
    responses: mpsc::Sender<ResponseEvent>,
}

impl GatewayConnection {
    /// Connect to the gateway and start the response reader.
    ///
    /// The receiver yields every error response the gateway sends, across
    /// reconnects, and closes when the connection is dropped.
    pub async fn connect(addr: &str) -> Result<(Self, mpsc::Receiver<ResponseEvent>), AppError> {
        let (tx, rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
        let link = Link::open(addr, tx.clone()).await?;

        Ok((
            Self {
                addr: addr.to_string(),
                link: Mutex::new(Some(link)),
                responses: tx,
            },
            rx,
        ))
    }

    /// Whether the current socket is still being read.
    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.as_ref().is_some_and(Link::is_open)
    }
}

#[async_trait]
impl PushTransport for GatewayConnection {
    async fn send(&self, message: &WireMessage) -> Result<(), AppError> {
        let frame = message.encode();
        let mut guard = self.link.lock().await;

        let mut link = match guard.take() {
            Some(link) if link.is_open() => link,
            stale => {
                if stale.is_some() {
                    tracing::warn!(addr = %self.addr, "Push gateway connection closed, reconnecting");
                }
                drop(stale);
                Link::open(&self.addr, self.responses.clone()).await?
            }
        };

        let written = link.writer.write_all(&frame).await;
        if let Err(e) = written {
            tracing::warn!(addr = %self.addr, error = %e, "Push gateway write failed, reconnecting");
            drop(link);
            link = Link::open(&self.addr, self.responses.clone()).await?;
            link.writer.write_all(&frame).await.map_err(|e| {
                AppError::Transport(format!("write to {} failed: {}", self.addr, e))
            })?;
        }

        *guard = Some(link);
        Ok(())
    }
}

async fn read_responses(
    addr: String,
    mut reader: OwnedReadHalf,
    tx: mpsc::Sender<ResponseEvent>,
) {
    let mut frame = [0u8; ERROR_RESPONSE_LEN];

    loop {
        match reader.read_exact(&mut frame).await {
            Ok(_) => match wire::decode_error_response(&frame) {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        tracing::debug!(addr = %addr, "Response receiver dropped, stopping reader");
                        return;
                    }
                }
                Err(e) => {
                    // framing is lost; the next send opens a fresh connection
                    tracing::error!(addr = %addr, error = %e, "Undecodable gateway response, dropping connection");
                    return;
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                tracing::info!(addr = %addr, "Push gateway closed the connection");
                return;
            }
            Err(e) => {
                tracing::error!(addr = %addr, error = %e, "Push gateway read failed");
                return;
            }
        }
    }
}

/// Read the full feedback stream from the feedback endpoint.
pub async fn fetch_feedback(addr: &str) -> Result<Vec<FeedbackTuple>, AppError> {
    let mut stream = TcpStream::connect(addr).await?;
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;

    let tuples = wire::decode_feedback(&buf)?;
    tracing::info!(addr = %addr, count = tuples.len(), "Fetched push feedback");
    Ok(tuples)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use herald_common::types::PushPayload;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_send_and_receive_error_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let msg = WireMessage::build(100, "aaaa", &PushPayload::alert("test"), 0).unwrap();
        let frame_len = msg.encode().len();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut frame = vec![0u8; frame_len];
            socket.read_exact(&mut frame).await.unwrap();
            socket
                .write_all(&[8, 8, frame[1], frame[2], frame[3], frame[4]])
                .await
                .unwrap();
            frame
        });

        let (conn, mut responses) = GatewayConnection::connect(&addr).await.unwrap();
        conn.send(&msg).await.unwrap();

        let event = responses.recv().await.unwrap();
        assert_eq!(
            event,
            ResponseEvent {
                identifier: 100,
                status: 8
            }
        );

        let frame = server.await.unwrap();
        assert_eq!(frame, msg.encode());

        // the channel outlives individual sockets and closes with the connection
        drop(conn);
        assert!(responses.recv().await.is_none());
    }

    async fn wait_until_disconnected(conn: &GatewayConnection) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while conn.is_connected().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_reconnects_after_gateway_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let first = WireMessage::build(100, "aaaa", &PushPayload::alert("one"), 0).unwrap();
        let second = WireMessage::build(200, "bbbb", &PushPayload::alert("two"), 0).unwrap();
        let first_len = first.encode().len();
        let second_len = second.encode().len();

        let server = tokio::spawn(async move {
            // reject the first message and hang up
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut frame = vec![0u8; first_len];
            socket.read_exact(&mut frame).await.unwrap();
            socket
                .write_all(&[8, 8, frame[1], frame[2], frame[3], frame[4]])
                .await
                .unwrap();
            drop(socket);

            let (mut socket, _) = listener.accept().await.unwrap();
            let mut frame = vec![0u8; second_len];
            socket.read_exact(&mut frame).await.unwrap();
            socket
                .write_all(&[8, 1, frame[1], frame[2], frame[3], frame[4]])
                .await
                .unwrap();
            frame
        });

        let (conn, mut responses) = GatewayConnection::connect(&addr).await.unwrap();
        conn.send(&first).await.unwrap();
        assert_eq!(responses.recv().await.unwrap().identifier, 100);

        wait_until_disconnected(&conn).await;
        conn.send(&second).await.unwrap();

        let event = responses.recv().await.unwrap();
        assert_eq!(
            event,
            ResponseEvent {
                identifier: 200,
                status: 1
            }
        );
        assert_eq!(server.await.unwrap(), second.encode());
    }

    #[tokio::test]
    async fn test_undecodable_response_drops_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(&[9, 0, 0, 0, 0, 1]).await.unwrap();
            // hold the socket open until the client goes away
            let mut buf = [0u8; 64];
            while socket.read(&mut buf).await.unwrap_or(0) > 0 {}
        });

        let (conn, mut responses) = GatewayConnection::connect(&addr).await.unwrap();
        wait_until_disconnected(&conn).await;
        assert!(responses.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fetch_feedback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            buf.extend_from_slice(&1_700_000_000u32.to_be_bytes());
            buf.extend_from_slice(&2u16.to_be_bytes());
            buf.extend_from_slice(&[0xaa, 0xaa]);
            socket.write_all(&buf).await.unwrap();
        });

        let tuples = fetch_feedback(&addr).await.unwrap();
        assert_eq!(tuples.len(), 1);
        assert_eq!(tuples[0].token_hex(), "aaaa");
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = GatewayConnection::connect(&addr).await.err().unwrap();
        assert!(matches!(err, AppError::Transport(_)));
    }
}
