//! Stdio-attached child-process endpoint (`spec.md` §4.3 process tunnels).
//!
//! A plain piped child, not a pseudo-terminal — the protocol only ever
//! carries raw bytes in and out, so `tokio::process::Command` with piped
//! stdio is sufficient; there is no terminal emulation in scope.

use super::READ_CHUNK;
use crate::event::ReactorEvent;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::{mpsc, Notify};
use tracing::debug;

/// Spawn `command` with piped stdin/stdout. Fast and local, so the reactor
/// awaits it inline rather than deferring through an event.
pub fn spawn(command: &str, args: &[String]) -> std::io::Result<Child> {
    tokio::process::Command::new(command)
        .args(args)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .spawn()
}

/// Take the piped handles off `child` and spawn its read/write/wait pumps.
/// Returns the sender the reactor feeds to queue outbound bytes.
pub fn spawn_pumps(
    id: u8,
    child: &mut Child,
    cancel: Arc<Notify>,
    events: mpsc::Sender<ReactorEvent>,
) -> mpsc::Sender<Vec<u8>> {
    let stdin = child.stdin.take().expect("piped stdin");
    let stdout = child.stdout.take().expect("piped stdout");
    let (write_tx, write_rx) = mpsc::channel::<Vec<u8>>(32);

    tokio::spawn(read_pump(id, stdout, cancel.clone(), events.clone()));
    tokio::spawn(write_pump(id, stdin, write_rx, cancel, events));

    write_tx
}

/// Wait for `child` to exit and report it; always spawned since exit can
/// take arbitrarily long.
pub fn spawn_wait(id: u8, mut child: Child, events: mpsc::Sender<ReactorEvent>) {
    tokio::spawn(async move {
        if let Ok(status) = child.wait().await {
            let _ = events.send(ReactorEvent::ProcessExited(id, status)).await;
        }
    });
}

async fn read_pump(
    id: u8,
    mut stdout: ChildStdout,
    cancel: Arc<Notify>,
    events: mpsc::Sender<ReactorEvent>,
) {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        tokio::select! {
            _ = cancel.notified() => {
                debug!(id, "process read pump cancelled");
                return;
            }
            result = stdout.read(&mut buf) => {
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
    mut stdin: ChildStdin,
    mut write_rx: mpsc::Receiver<Vec<u8>>,
    cancel: Arc<Notify>,
    events: mpsc::Sender<ReactorEvent>,
) {
    loop {
        tokio::select! {
            _ = cancel.notified() => {
                debug!(id, "process write pump cancelled");
                return;
            }
            chunk = write_rx.recv() => {
                match chunk {
                    Some(bytes) => {
                        if let Err(e) = stdin.write_all(&bytes).await {
                            let _ = events.send(ReactorEvent::EndpointError(id, e)).await;
                            return;
                        }
                        if events.send(ReactorEvent::SpaceAvailable(id)).await.is_err() {
                            return;
                        }
                    }
                    None => return,
                }
            }
        }
    }
}
