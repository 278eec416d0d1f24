//! Reverse-listener TCP endpoint (`spec.md` §4.3 `BIND`/`RCONN`).
//!
//! Binding is a fast local syscall, so it happens inline in the reactor
//! (mirrors `host_bind()` in the original tunnel manager, called
//! synchronously at the point of use). Only the accept loop — which can
//! wait indefinitely for a peer — is spawned, grounded in `listener.rs`'s
//! `accept_loop`.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};
use tracing::debug;

use crate::event::ReactorEvent;

/// Bind a listener on `addr`. Awaited directly by the reactor — expected to
/// resolve immediately for a local bind.
pub async fn bind(addr: SocketAddr) -> std::io::Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind(addr).await?;
    let actual = listener.local_addr()?;
    Ok((listener, actual))
}

/// Spawn the accept loop for a bound listener tunnel `id`. Every accepted
/// connection is reported as [`ReactorEvent::Accepted`] carrying the
/// listener's own id so the reactor can mint a child tunnel id for it.
pub fn spawn_accept_loop(
    id: u8,
    listener: TcpListener,
    cancel: Arc<Notify>,
    events: mpsc::Sender<ReactorEvent>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.notified() => {
                    debug!(id, "accept loop cancelled");
                    return;
                }
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            if events.send(ReactorEvent::Accepted(id, stream, peer)).await.is_err() {
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
    });
}
