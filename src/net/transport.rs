//! Transport seam and the WebTransport client behind it
//!
//! A transport moves opaque frames between this client and the session
//! server. `SessionConnection` owns one and never looks below this trait.
//! The WebTransport implementation opens one bidirectional stream per
//! session and runs a reader and a writer task that only shuttle bytes
//! through channels.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::net::framing::{read_message, write_message, FramingError};
use crate::net::protocol::{decode, PlayerId};

/// Something the transport observed
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// One complete frame body
    Message(Vec<u8>),
    /// The session ended from below (server close, network loss)
    Closed(Option<String>),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),
    #[error("Handshake failed: {0}")]
    Handshake(String),
    #[error("Invalid certificate hash: {0}")]
    InvalidCertHash(String),
    #[error("Transport closed")]
    Closed,
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),
}

/// Frame transport used by [`crate::net::connection::SessionConnection`]
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Open the session; resolves to the identity the server assigned
    async fn open(&mut self) -> Result<PlayerId, TransportError>;

    /// Queue a frame body for delivery. Never blocks.
    fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Next event if one is already buffered
    fn try_recv(&mut self) -> Option<TransportEvent>;

    /// Wait for the next event; `None` once the transport is gone
    async fn recv(&mut self) -> Option<TransportEvent>;

    /// Tear the session down. Idempotent.
    fn close(&mut self);
}

/// First frame the server sends on a fresh stream
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Handshake {
    player_id: PlayerId,
}

/// WebTransport client transport
pub struct WebTransportClient {
    url: String,
    cert_hash: Option<String>,
    outbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
    inbound: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    tasks: Vec<JoinHandle<()>>,
    connection: Option<wtransport::Connection>,
}

impl WebTransportClient {
    /// `cert_hash` pins a self-signed server certificate (base64 SHA-256)
    pub fn new(url: impl Into<String>, cert_hash: Option<String>) -> Self {
        Self {
            url: url.into(),
            cert_hash,
            outbound: None,
            inbound: None,
            tasks: Vec::new(),
            connection: None,
        }
    }

    fn client_config(&self) -> Result<wtransport::ClientConfig, TransportError> {
        use wtransport::tls::Sha256Digest;
        use wtransport::ClientConfig;

        match &self.cert_hash {
            Some(hash) => {
                let digest = decode_cert_hash(hash)?;
                Ok(ClientConfig::builder()
                    .with_bind_default()
                    .with_server_certificate_hashes([Sha256Digest::new(digest)])
                    .build())
            }
            None => Ok(ClientConfig::builder()
                .with_bind_default()
                .with_native_certs()
                .build()),
        }
    }
}

impl Transport for WebTransportClient {
    async fn open(&mut self) -> Result<PlayerId, TransportError> {
        self.close();

        let config = self.client_config()?;
        let endpoint = wtransport::Endpoint::client(config)
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let connection = endpoint
            .connect(&self.url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (mut send, mut recv) = connection
            .open_bi()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let first = read_message(&mut recv).await?;
        let handshake: Handshake =
            decode(&first).map_err(|e| TransportError::Handshake(e.to_string()))?;
        info!(player_id = %handshake.player_id, url = %self.url, "WebTransport session open");

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<TransportEvent>();

        let writer = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = write_message(&mut send, &frame).await {
                    warn!("Stream write error: {}", e);
                    break;
                }
            }
            debug!("Writer task finished");
        });

        let reader = tokio::spawn(async move {
            let reason = loop {
                match read_message(&mut recv).await {
                    Ok(frame) => {
                        if in_tx.send(TransportEvent::Message(frame)).is_err() {
                            return;
                        }
                    }
                    Err(FramingError::ConnectionClosed) => break None,
                    Err(e) => break Some(e.to_string()),
                }
            };
            debug!(?reason, "Reader task finished");
            let _ = in_tx.send(TransportEvent::Closed(reason));
        });

        self.outbound = Some(out_tx);
        self.inbound = Some(in_rx);
        self.tasks = vec![writer, reader];
        self.connection = Some(connection);
        Ok(handshake.player_id)
    }

    fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        match &self.outbound {
            Some(tx) => tx.send(frame).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    fn try_recv(&mut self) -> Option<TransportEvent> {
        self.inbound.as_mut()?.try_recv().ok()
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        match self.inbound.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    fn close(&mut self) {
        self.outbound = None;
        self.inbound = None;
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(connection) = self.connection.take() {
            connection.close(0u32.into(), b"client disconnect");
        }
    }
}

impl Drop for WebTransportClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// Decode a base64 SHA-256 certificate hash
pub fn decode_cert_hash(hash: &str) -> Result<[u8; 32], TransportError> {
    let bytes = STANDARD
        .decode(hash.trim())
        .map_err(|e| TransportError::InvalidCertHash(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| TransportError::InvalidCertHash(format!("expected 32 bytes, got {}", b.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_cert_hash() {
        let raw = [7u8; 32];
        let encoded = STANDARD.encode(raw);
        assert_eq!(decode_cert_hash(&encoded).unwrap(), raw);
    }

    #[test]
    fn test_decode_cert_hash_rejects_wrong_length() {
        let encoded = STANDARD.encode([1u8; 16]);
        assert!(matches!(
            decode_cert_hash(&encoded),
            Err(TransportError::InvalidCertHash(_))
        ));
        assert!(decode_cert_hash("not base64!!").is_err());
    }

    #[test]
    fn test_unopened_client_rejects_send() {
        let mut client = WebTransportClient::new("https://localhost:4433", None);
        assert!(matches!(client.send(b"{}".to_vec()), Err(TransportError::Closed)));
        assert!(client.try_recv().is_none());
        client.close();
        client.close();
    }

    #[test]
    fn test_handshake_parse() {
        let handshake: Handshake = decode(br#"{"playerId":"abc"}"#).unwrap();
        assert_eq!(handshake.player_id, "abc");
    }
}
