// src/server.rs
//! TCP front end: accepts tracker connections and feeds their frames to the decoder

use crate::{
    config::DecoderConfig,
    error::{Result, TrackerError},
    protocol::{Gl200Decoder, Position},
    session::{DeviceRegistry, LastPositionStore},
};
use std::{
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{tcp::OwnedWriteHalf, TcpListener, TcpStream},
};
use tracing::{debug, error, info, warn};

/// Longest frame accepted from a tracker, terminator included
pub const MAX_FRAME_LENGTH: usize = 1024;

const FRAME_TERMINATOR: u8 = b'$';
const READ_CHUNK: usize = 512;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Shared decoding state for every connection
#[derive(Clone)]
pub struct TrackerServer {
    decoder: Arc<Gl200Decoder>,
    registry: Arc<DeviceRegistry>,
    store: Arc<LastPositionStore>,
    running: Arc<AtomicBool>,
}

impl TrackerServer {
    pub fn new(config: &DecoderConfig) -> Self {
        let registry = Arc::new(DeviceRegistry::new(config.auto_register));
        for unique_id in &config.devices {
            registry.register(unique_id);
        }
        let store = Arc::new(LastPositionStore::new());
        let decoder = Arc::new(Gl200Decoder::new(
            registry.clone(),
            store.clone(),
            Arc::new(config.clone()),
        ));

        Self {
            decoder,
            registry,
            store,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn registry(&self) -> Arc<DeviceRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn store(&self) -> Arc<LastPositionStore> {
        Arc::clone(&self.store)
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Bind the listening socket
    pub async fn bind(address: &str) -> Result<TcpListener> {
        let listener = TcpListener::bind(address).await.map_err(|e| {
            TrackerError::Connection(format!("Failed to listen on {}: {}", address, e))
        })?;
        info!("Listening for trackers on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Accept connections until stopped. Failed accepts are logged and skipped.
    pub async fn run(&self, listener: TcpListener) {
        while self.is_running() {
            let Some((stream, peer)) = accepted(listener.accept().await) else {
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            };
            info!(%peer, "Tracker connected");

            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, peer).await {
                    warn!(%peer, error = %e, "Closing tracker connection");
                }
                info!(%peer, "Tracker disconnected");
            });
        }
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();
        let mut splitter = FrameSplitter::new();
        let mut chunk = [0u8; READ_CHUNK];

        while self.is_running() {
            let read = reader.read(&mut chunk).await?;
            if read == 0 {
                // EOF: whatever is left is the last sentence
                if let Some(sentence) = splitter.finish() {
                    self.answer(&sentence, &mut writer, peer).await?;
                }
                break;
            }

            for sentence in splitter.push(&chunk[..read])? {
                self.answer(&sentence, &mut writer, peer).await?;
            }
        }
        Ok(())
    }

    async fn answer(
        &self,
        sentence: &str,
        writer: &mut OwnedWriteHalf,
        peer: SocketAddr,
    ) -> Result<()> {
        let mut replies: Vec<String> = Vec::new();
        self.process_frame(sentence, &mut replies);

        for reply in &replies {
            writer.write_all(reply.as_bytes()).await.map_err(|e| {
                TrackerError::Connection(format!("Failed to send acknowledgment: {}", e))
            })?;
            debug!(%peer, reply = reply.as_str(), "Sent acknowledgment");
        }
        Ok(())
    }

    /// Decode one sentence and remember the fix it carried
    pub fn process_frame(&self, sentence: &str, replies: &mut Vec<String>) -> Option<Position> {
        let position = self.decoder.decode(sentence, Some(replies))?;
        info!(
            device_id = %position.device_id,
            valid = position.valid,
            latitude = position.latitude,
            longitude = position.longitude,
            fix_time = %position.fix_time,
            "Decoded position"
        );
        self.store.update(&position);
        Some(position)
    }

    /// Stop the server
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Check if the server is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

fn accepted(
    result: io::Result<(TcpStream, SocketAddr)>,
) -> Option<(TcpStream, SocketAddr)> {
    match result {
        Ok(connection) => Some(connection),
        Err(e) => {
            error!(error = %e, "Accept error");
            None
        }
    }
}

/// Cuts a tracker byte stream into sentences.
///
/// A sentence ends at `$` (kept) or at a line break or NUL (dropped), since
/// some firmware omits the terminator. Bytes still pending when a frame would
/// outgrow [`MAX_FRAME_LENGTH`] make the connection unusable.
#[derive(Debug, Default)]
pub struct FrameSplitter {
    pending: Vec<u8>,
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes read from the socket, returning every sentence they complete
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>> {
        let mut sentences = Vec::new();
        for &byte in bytes {
            match byte {
                b'\r' | b'\n' | 0 => self.flush(&mut sentences),
                _ => {
                    if self.pending.len() >= MAX_FRAME_LENGTH {
                        self.pending.clear();
                        return Err(TrackerError::Connection(format!(
                            "Frame longer than {} bytes",
                            MAX_FRAME_LENGTH
                        )));
                    }
                    self.pending.push(byte);
                    if byte == FRAME_TERMINATOR {
                        self.flush(&mut sentences);
                    }
                }
            }
        }
        Ok(sentences)
    }

    /// The unterminated sentence left when the peer hangs up
    pub fn finish(&mut self) -> Option<String> {
        let mut sentences = Vec::new();
        self.flush(&mut sentences);
        sentences.pop()
    }

    fn flush(&mut self, sentences: &mut Vec<String>) {
        let sentence = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
    }
}
