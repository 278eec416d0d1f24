//! Outbound TCP endpoint (`spec.md` §4.3 `CONN`).

use super::READ_CHUNK;
use crate::event::{ConnectOutcome, ReactorEvent};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tracing::debug;

/// Connect to `target` without blocking the reactor; reports the outcome as
/// a [`ReactorEvent::Connected`]. Mirrors `forwarder.rs`'s deferred connect —
/// unlike a listener bind, a remote connect can take arbitrarily long.
pub fn spawn_connect(id: u8, target: SocketAddr, events: mpsc::Sender<ReactorEvent>) {
    tokio::spawn(async move {
        let outcome = match TcpStream::connect(target).await {
            Ok(stream) => {
                let peer = stream.peer_addr().unwrap_or(target);
                ConnectOutcome::Connected(stream, peer)
            }
            Err(e) => ConnectOutcome::Failed(e),
        };
        let _ = events.send(ReactorEvent::Connected(id, outcome)).await;
    });
}

/// Split `stream` and spawn its read/write pump tasks. Returns the sender
/// the reactor feeds to queue outbound bytes.
pub fn spawn_pumps(
    id: u8,
    stream: TcpStream,
    cancel: Arc<Notify>,
    events: mpsc::Sender<ReactorEvent>,
) -> mpsc::Sender<Vec<u8>> {
    let (read_half, write_half) = stream.into_split();
    let (write_tx, write_rx) = mpsc::channel::<Vec<u8>>(32);

    tokio::spawn(read_pump(id, read_half, cancel.clone(), events.clone()));
    tokio::spawn(write_pump(id, write_half, write_rx, cancel, events));

    write_tx
}

async fn read_pump(
    id: u8,
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    cancel: Arc<Notify>,
    events: mpsc::Sender<ReactorEvent>,
) {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        tokio::select! {
            _ = cancel.notified() => {
                debug!(id, "tcp read pump cancelled");
                return;
            }
            result = read_half.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        let _ = events.send(ReactorEvent::EndpointClosed(id)).await;
                        return;
                    }
                    Ok(n) => {
                        if events.send(ReactorEvent::EndpointData(id, buf[..n].to_vec())).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = events.send(ReactorEvent::EndpointError(id, e)).await;
                        return;
                    }
                }
            }
        }
    }
}

async fn write_pump(
    id: u8,
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
    mut write_rx: mpsc::Receiver<Vec<u8>>,
    cancel: Arc<Notify>,
    events: mpsc::Sender<ReactorEvent>,
) {
    loop {
        tokio::select! {
            _ = cancel.notified() => {
                debug!(id, "tcp write pump cancelled");
                let _ = write_half.shutdown().await;
                return;
            }
            chunk = write_rx.recv() => {
                match chunk {
                    Some(bytes) => {
                        if let Err(e) = write_half.write_all(&bytes).await {
                            let _ = events.send(ReactorEvent::EndpointError(id, e)).await;
                            return;
                        }
                        if events.send(ReactorEvent::SpaceAvailable(id)).await.is_err() {
                            return;
                        }
                    }
                    None => {
                        let _ = write_half.shutdown().await;
                        return;
                    }
                }
            }
        }
    }
}
