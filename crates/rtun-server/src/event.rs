//! The event type flowing into the reactor's single inbound queue.
//!
//! Every spawned pump task — per-tunnel TCP/process I/O, listener accept
//! loops, and the shared-channel reader — reports back through this one
//! enum, fed into one `mpsc::Receiver` that the reactor drains (`engine.rs`).
//! This is the single suspension point called for in `spec.md` §5.

use rtun_core::Frame;
use std::net::SocketAddr;
use tokio::net::TcpStream;

/// Outcome of an in-flight outbound TCP connect attempt (`spec.md` §4.3 CONN).
pub enum ConnectOutcome {
    Connected(TcpStream, SocketAddr),
    Failed(std::io::Error),
}

pub enum ReactorEvent {
    /// A complete frame was parsed off the shared channel.
    ChannelFrame(Frame),
    /// The shared channel hit EOF — the controller went away.
    ChannelClosed,
    /// The shared channel read or write failed.
    ChannelError(std::io::Error),

    /// An outbound `CONN` connect attempt finished.
    Connected(u8, ConnectOutcome),
    /// A `BIND` listener accepted a new inbound connection.
    Accepted(u8, TcpStream, SocketAddr),
    /// A spawned process finished (`spec.md` §4.3 process tunnels).
    ProcessExited(u8, std::process::ExitStatus),

    /// Bytes read from a tunnel's endpoint, to be queued as `DATA`.
    EndpointData(u8, Vec<u8>),
    /// The write-pump task drained its queue and can accept more.
    SpaceAvailable(u8),
    /// The endpoint hit EOF (peer closed, process stdout closed, listener
    /// socket gone).
    EndpointClosed(u8),
    /// The endpoint's read or write side failed.
    EndpointError(u8, std::io::Error),
}
