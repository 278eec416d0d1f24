//! The shared channel's framing boundary: parses inbound bytes into frames
//! and serializes outbound `DATA`/answer/`CLOSE`/`RCONN` records.
//!
//! Grounded in the teacher's codec-at-the-edge placement (`wsh-core::codec`
//! used from `session/manager.rs`'s read loop) but adapted to the fixed
//! binary framing and to feeding a single reactor queue instead of an
//! `mpsc<Envelope>` per session.

use crate::channel::{ChannelReader, ChannelWriter};
use crate::event::ReactorEvent;
use rtun_core::{emit, Command, FrameDecoder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

/// Spawn the task that reads the shared channel, decodes frames, and feeds
/// them into the reactor's event queue. This is the only task with access
/// to `reader` — the reactor never touches it directly.
pub fn spawn_channel_reader(mut reader: ChannelReader, events: mpsc::Sender<ReactorEvent>) {
    tokio::spawn(async move {
        let mut decoder = FrameDecoder::new();
        let mut buf = vec![0u8; 16 * 1024];
        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => {
                    let _ = events.send(ReactorEvent::ChannelClosed).await;
                    return;
                }
                Ok(n) => n,
                Err(e) => {
                    let _ = events.send(ReactorEvent::ChannelError(e)).await;
                    return;
                }
            };
            let frames = match decoder.feed(&buf[..n]) {
                Ok(frames) => frames,
                Err(e) => {
                    let _ = events
                        .send(ReactorEvent::ChannelError(std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            e,
                        )))
                        .await;
                    return;
                }
            };
            for frame in frames {
                if events.send(ReactorEvent::ChannelFrame(frame)).await.is_err() {
                    return;
                }
            }
        }
    });
}

/// Owns the shared channel's write half. The reactor is the only caller —
/// writes are serialized by construction since nothing else touches it.
pub struct ChannelDispatcher {
    writer: ChannelWriter,
}

impl ChannelDispatcher {
    pub fn new(writer: ChannelWriter) -> Self {
        Self { writer }
    }

    async fn write_frame(&mut self, command: Command, tunnel_id: u8, payload: Vec<u8>) -> std::io::Result<()> {
        let bytes = emit(command as u8, tunnel_id, &payload)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await
    }

    pub async fn send_open_ok(&mut self, tunnel_id: u8, is_bind: bool, addr: std::net::SocketAddr) -> std::io::Result<()> {
        let command = if is_bind { Command::Bind } else { Command::Conn };
        self.write_frame(command, tunnel_id, rtun_core::messages::encode_open_ok(addr)).await
    }

    pub async fn send_open_fail(
        &mut self,
        tunnel_id: u8,
        is_bind: bool,
        code: rtun_core::ErrorCode,
    ) -> std::io::Result<()> {
        let command = if is_bind { Command::Bind } else { Command::Conn };
        self.write_frame(command, tunnel_id, rtun_core::messages::encode_open_fail(code)).await
    }

    pub async fn send_rconn(&mut self, listener_id: u8, new_id: u8, client_addr: std::net::SocketAddr) -> std::io::Result<()> {
        self.write_frame(Command::Rconn, listener_id, rtun_core::messages::encode_rconn(new_id, client_addr)).await
    }

    pub async fn send_data(&mut self, tunnel_id: u8, payload: Vec<u8>) -> std::io::Result<()> {
        self.write_frame(Command::Data, tunnel_id, payload).await
    }

    pub async fn send_close(&mut self, tunnel_id: u8) -> std::io::Result<()> {
        self.write_frame(Command::Close, tunnel_id, Vec::new()).await
    }
}
