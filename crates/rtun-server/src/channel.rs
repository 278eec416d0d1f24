//! The shared channel: the single reliable byte pipe to the controller.
//!
//! In production this is the remote-desktop virtual channel, inherited as
//! the process's stdio. For local development and the integration tests in
//! this crate, a Unix socket stands in — the reactor only ever sees a boxed
//! reader/writer pair and does not care which.

use tokio::io::{AsyncRead, AsyncWrite};

/// Read half of the shared channel.
pub type ChannelReader = Box<dyn AsyncRead + Unpin + Send>;
/// Write half of the shared channel.
pub type ChannelWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// The production channel: the process's inherited stdio.
pub fn stdio_channel() -> (ChannelReader, ChannelWriter) {
    (Box::new(tokio::io::stdin()), Box::new(tokio::io::stdout()))
}

/// A development channel backed by a Unix socket, for driving the server
/// under test without a real remote-desktop host (`--channel <path>`).
pub async fn unix_socket_channel(
    path: &std::path::Path,
) -> std::io::Result<(ChannelReader, ChannelWriter)> {
    let stream = tokio::net::UnixStream::connect(path).await?;
    let (read_half, write_half) = tokio::io::split(stream);
    Ok((Box::new(read_half), Box::new(write_half)))
}
