//! Sync server listener
//!
//! Handles the TCP accept loop. Each connection gets the current state on
//! accept, then every rebroadcast, while its inbound envelopes go to
//! [`SyncRuntime::handle_client_bytes`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Semaphore};

use crate::error::Result;
use crate::protocol::constants::{ENVELOPE_HEADER_LEN, MAGIC};
use crate::sync::SyncRuntime;

/// TCP front end for a [`SyncRuntime`]
pub struct SyncServer {
    runtime: Arc<SyncRuntime>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl SyncServer {
    pub fn new(runtime: Arc<SyncRuntime>) -> Self {
        let max = runtime.config().max_connections;
        let connection_semaphore = if max > 0 {
            Some(Arc::new(Semaphore::new(max)))
        } else {
            None
        };

        Self {
            runtime,
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    pub fn runtime(&self) -> &Arc<SyncRuntime> {
        &self.runtime
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.runtime.config().bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.bind_addr()).await?;
        tracing::info!(addr = %self.bind_addr(), "Sync server listening");
        self.accept_loop(&listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.bind_addr()).await?;
        tracing::info!(addr = %self.bind_addr(), "Sync server listening");
        self.serve(listener, shutdown).await
    }

    /// Serve an already bound listener until `shutdown` resolves
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session_id = session_id, peer = %peer_addr, "New connection");

        if self.runtime.config().tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let runtime = Arc::clone(&self.runtime);
        tokio::spawn(async move {
            let _permit = permit;
            let (updates, current) = runtime.subscribe().await;
            let (reader, writer) = socket.into_split();

            tokio::select! {
                result = forward_updates(writer, current, updates) => {
                    if let Err(e) = result {
                        tracing::debug!(session_id = session_id, error = %e, "Write failed");
                    }
                }
                result = read_client(reader, &runtime) => {
                    if let Err(e) = result {
                        tracing::debug!(session_id = session_id, error = %e, "Read failed");
                    }
                }
            }

            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }
}

/// Write the catch-up state, then every broadcast
async fn forward_updates<W>(
    mut writer: W,
    current: Option<Bytes>,
    mut updates: broadcast::Receiver<Bytes>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if let Some(bytes) = current {
        writer.write_all(&bytes).await?;
    }

    loop {
        match updates.recv().await {
            Ok(bytes) => writer.write_all(&bytes).await?,
            // Every message is a full state; the next one catches us up
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped = skipped, "Subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}

/// Read envelopes until EOF or a framing error
///
/// A bad header leaves no way to find the next envelope, so the connection
/// ends. Payload errors are handled by the runtime and do not.
async fn read_client<R>(mut reader: R, runtime: &SyncRuntime) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let max = runtime.config().max_client_packet;
    let mut header = [0u8; ENVELOPE_HEADER_LEN];

    loop {
        match reader.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        }

        if header[..4] != MAGIC {
            tracing::debug!(magic = ?&header[..4], "Dropped connection with bad magic");
            return Ok(());
        }
        let len = i32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if len < 0 || len as usize > max {
            tracing::debug!(len = len, "Dropped connection with oversized envelope");
            return Ok(());
        }

        let mut envelope = BytesMut::with_capacity(ENVELOPE_HEADER_LEN + len as usize);
        envelope.extend_from_slice(&header);
        envelope.resize(ENVELOPE_HEADER_LEN + len as usize, 0);
        reader.read_exact(&mut envelope[ENVELOPE_HEADER_LEN..]).await?;

        runtime.handle_client_bytes(&envelope).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::protocol::{Bounds, Message};
    use crate::server::config::ServerConfig;
    use crate::sync::ScreenSpec;

    async fn read_envelope(stream: &mut TcpStream) -> Message {
        let mut header = [0u8; ENVELOPE_HEADER_LEN];
        stream.read_exact(&mut header).await.unwrap();
        let len = i32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await.unwrap();
        let mut envelope = header.to_vec();
        envelope.extend_from_slice(&body);
        Message::decode(&envelope, usize::MAX).unwrap()
    }

    #[tokio::test]
    async fn test_client_receives_state_and_reports_duration() {
        let runtime = Arc::new(SyncRuntime::new(ServerConfig::default()));
        runtime
            .add_screen(
                ScreenSpec::new("lobby", "world", Bounds::default(), 0),
                "https://cdn.example/a.mp4",
            )
            .await
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = SyncServer::new(runtime.clone());
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let serving = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = stop_rx.await;
                })
                .await
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let Message::Sync(initial) = read_envelope(&mut stream).await else {
            panic!("expected sync");
        };
        assert_eq!(initial.screens[0].name, "lobby");
        assert!(!initial.screens[0].playing);

        runtime.play("lobby").await.unwrap();
        let Message::Sync(update) = read_envelope(&mut stream).await else {
            panic!("expected sync");
        };
        assert!(update.screens[0].playing);

        let report = Message::VideoDuration {
            name: "lobby".into(),
            duration_ms: 90_000,
        }
        .encode()
        .unwrap();
        stream.write_all(&report).await.unwrap();

        let mut applied = false;
        for _ in 0..100 {
            if runtime.screen("lobby").await.unwrap().duration_ms == 90_000 {
                applied = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(applied);

        stop_tx.send(()).unwrap();
        serving.await.unwrap().unwrap();
    }
}
