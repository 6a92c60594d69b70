//! WebTransport adapter for the packet host.
//!
//! Each browser session is one peer: it opens a single bidirectional stream
//! that carries length-prefixed reliable frames, while unreliable packets
//! travel as datagrams.

use std::sync::Arc;

use wtransport::endpoint::IncomingSession;
use wtransport::{Connection, Endpoint, RecvStream, SendStream};

use super::framing::{write_frame, FrameReader, FramingError, Route};
use super::tls::TlsConfig;
use super::transport::{Acceptor, Outgoing, PeerInbound};
use crate::metrics::Metrics;

/// WebTransport server feeding a `Host` through its `Acceptor`
pub struct WebTransportServer {
    port: u16,
    tls_config: TlsConfig,
    acceptor: Acceptor,
    metrics: Arc<Metrics>,
}

impl WebTransportServer {
    pub fn new(port: u16, tls_config: TlsConfig, acceptor: Acceptor, metrics: Arc<Metrics>) -> Self {
        Self {
            port,
            tls_config,
            acceptor,
            metrics,
        }
    }

    /// Get the certificate hash for client configuration
    pub fn cert_hash(&self) -> &str {
        self.tls_config.cert_hash()
    }

    /// Accept sessions until the endpoint fails
    pub async fn run(self) -> anyhow::Result<()> {
        // Use with_bind_default for dual-stack (IPv4 + IPv6) support
        let server_config = wtransport::ServerConfig::builder()
            .with_bind_default(self.port)
            .with_identity(self.tls_config.identity)
            .build();

        let server = Endpoint::server(server_config)?;

        tracing::info!("WebTransport server listening on port {}", self.port);

        loop {
            let incoming = server.accept().await;
            let acceptor = self.acceptor.clone();
            let metrics = self.metrics.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_session(incoming, acceptor, metrics).await {
                    tracing::warn!("Session error: {}", e);
                }
            });
        }
    }
}

async fn handle_session(incoming: IncomingSession, acceptor: Acceptor, metrics: Arc<Metrics>) -> anyhow::Result<()> {
    let session_request = incoming.await?;
    tracing::debug!(
        "New session from: {:?}, path: {}",
        session_request.authority(),
        session_request.path()
    );

    let connection = session_request.accept().await?;
    let (mut send, recv) = connection.accept_bi().await?;

    let mut session = acceptor.open();
    let peer = session.peer();
    tracing::debug!("Session accepted as peer {}", peer);

    let mut reader = tokio::spawn(read_stream(recv, session.inbound()));
    let inbound = session.inbound();

    loop {
        tokio::select! {
            datagram = connection.receive_datagram() => {
                match datagram {
                    Ok(data) => {
                        inbound.deliver(data.to_vec());
                    }
                    Err(e) => {
                        tracing::debug!("Datagram receive error: {}", e);
                        break;
                    }
                }
            }

            outgoing = session.recv() => {
                let Some(outgoing) = outgoing else {
                    // the host dropped this peer
                    break;
                };
                if let Err(e) = send_outgoing(&connection, &mut send, outgoing, &metrics).await {
                    tracing::debug!("Send error for peer {}: {}", peer, e);
                    break;
                }
            }

            _ = &mut reader => {
                break;
            }
        }
    }

    reader.abort();
    tracing::debug!("Session closed (peer {})", peer);
    Ok(())
}

async fn read_stream(recv: RecvStream, inbound: PeerInbound) {
    let mut frames = FrameReader::new(recv);
    loop {
        match frames.next_frame().await {
            Ok(Some(data)) => {
                if !inbound.deliver(data) {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Stream read error: {}", e);
                break;
            }
        }
    }
}

async fn send_outgoing(
    connection: &Connection,
    send: &mut SendStream,
    outgoing: Outgoing,
    metrics: &Metrics,
) -> Result<(), FramingError> {
    match Route::for_packet(outgoing.delivery, outgoing.data.len()) {
        Route::Datagram => match connection.send_datagram(&outgoing.data) {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::debug!("Datagram send failed, using stream: {}", e);
                metrics.record_datagram_fallback();
            }
        },
        Route::StreamFallback => metrics.record_datagram_fallback(),
        Route::Stream => {}
    }
    write_frame(send, &outgoing.data).await
}
