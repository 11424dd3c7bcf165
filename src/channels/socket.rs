//! Socket transport: one listening server per consuming node.
//!
//! A node with socket inputs gets one [`SocketServer`] feeding its shared
//! multiplexer. The worker registers the bound address with the
//! orchestrator under `(application, node)`; producer-side workers resolve
//! it by polling, because producer and consumer workers start
//! asynchronously within the same wave.
//!
//! Every connection opens with a handshake frame naming the producing node,
//! so the multiplexer can attribute records and track per-origin close.

use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::{ChannelError, RecordMultiplexer};
use crate::record::{Record, read_frame, write_frame};

use std::sync::Arc;

/// Accepts producer connections for one node and relays their records into
/// the node's multiplexer.
pub struct SocketServer {
    address: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl SocketServer {
    /// Bind an ephemeral local port and start accepting.
    pub async fn spawn(mux: Arc<RecordMultiplexer>) -> Result<Self, ChannelError> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let address = listener.local_addr()?;
        let accept_task = tokio::spawn(accept_loop(listener, mux));
        Ok(Self {
            address,
            accept_task,
        })
    }

    /// The bound address, to be registered with the orchestrator.
    #[must_use]
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Stop accepting new connections. Connections already established keep
    /// draining until their producer closes.
    pub fn shutdown(&self) {
        self.accept_task.abort();
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(listener: TcpListener, mux: Arc<RecordMultiplexer>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, "accepted producer connection");
                tokio::spawn(serve_connection(stream, mux.clone()));
            }
            Err(error) => {
                tracing::warn!(%error, "socket accept failed");
            }
        }
    }
}

async fn serve_connection(mut stream: TcpStream, mux: Arc<RecordMultiplexer>) {
    let origin: String = match read_frame(&mut stream).await {
        Ok(Some(origin)) => origin,
        Ok(None) => {
            tracing::warn!("producer connection closed before the handshake");
            return;
        }
        Err(error) => {
            tracing::warn!(%error, "bad handshake frame on producer connection");
            return;
        }
    };

    loop {
        match read_frame::<_, Record>(&mut stream).await {
            Ok(Some(record)) => {
                if mux.write(&origin, record).await.is_err() {
                    tracing::warn!(origin, "multiplexer gone, dropping connection");
                    break;
                }
            }
            Ok(None) => break,
            Err(error) => {
                tracing::warn!(origin, %error, "error reading producer stream");
                break;
            }
        }
    }

    mux.close(&origin);
}

/// Producer side of a socket edge: connects to the consumer's server and
/// streams records.
pub struct SocketRecordWriter {
    origin: String,
    stream: Option<TcpStream>,
}

impl SocketRecordWriter {
    /// Connect to `address` and announce `origin` (the producing node's
    /// name) as the handshake.
    pub async fn connect(address: SocketAddr, origin: impl Into<String>) -> Result<Self, ChannelError> {
        let origin = origin.into();
        let mut stream = TcpStream::connect(address).await?;
        write_frame(&mut stream, &origin).await?;
        Ok(Self {
            origin,
            stream: Some(stream),
        })
    }

    /// Send one record. Frames are written eagerly so same-wave consumers
    /// see data while the producer is still running.
    pub async fn write(&mut self, record: &Record) -> Result<(), ChannelError> {
        match self.stream.as_mut() {
            Some(stream) => Ok(write_frame(stream, record).await?),
            None => Err(ChannelError::Disconnected {
                channel: self.origin.clone(),
            }),
        }
    }

    /// Shut the stream down; the consumer observes per-origin EOF.
    pub async fn close(&mut self) -> Result<(), ChannelError> {
        if let Some(mut stream) = self.stream.take() {
            use tokio::io::AsyncWriteExt;
            stream.shutdown().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn records_cross_the_wire_with_origin_attribution() {
        let mux = Arc::new(RecordMultiplexer::new(
            ["producer"],
            8,
            Duration::from_millis(10),
        ));
        let server = SocketServer::spawn(mux.clone()).await.unwrap();

        let mut writer = SocketRecordWriter::connect(server.address(), "producer")
            .await
            .unwrap();
        writer.write(&Record::text("hello")).await.unwrap();
        writer.close().await.unwrap();

        let (origin, record) = mux.read_any().await.unwrap();
        assert_eq!(origin, "producer");
        assert_eq!(record.as_text(), Some("hello"));

        // Producer closed, so the stream is done.
        assert!(mux.read_any().await.is_none());
    }

    #[tokio::test]
    async fn two_producers_fan_into_one_server() {
        let mux = Arc::new(RecordMultiplexer::new(
            ["a", "b"],
            8,
            Duration::from_millis(10),
        ));
        let server = SocketServer::spawn(mux.clone()).await.unwrap();

        for name in ["a", "b"] {
            let mut writer = SocketRecordWriter::connect(server.address(), name)
                .await
                .unwrap();
            writer.write(&Record::text(name)).await.unwrap();
            writer.close().await.unwrap();
        }

        let mut seen = Vec::new();
        while let Some((origin, _)) = mux.read_any().await {
            seen.push(origin);
        }
        seen.sort();
        assert_eq!(seen, vec!["a", "b"]);
    }
}
