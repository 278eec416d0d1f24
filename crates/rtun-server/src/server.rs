//! Top-level server façade: wires configuration, the shared channel, and the
//! reactor together. Grounded in the teacher's `WshServer` — a thin owner
//! constructed once in `main.rs` and run to completion.

use crate::channel::{ChannelReader, ChannelWriter};
use crate::config::ServerConfig;
use crate::engine::Engine;
use rtun_core::RtunResult;

pub struct Server {
    engine: Engine,
}

impl Server {
    pub fn new(reader: ChannelReader, writer: ChannelWriter, config: ServerConfig) -> Self {
        Self {
            engine: Engine::new(reader, writer, config),
        }
    }

    /// Run until the shared channel closes (clean) or a protocol/channel
    /// fault occurs (fatal) — `spec.md` §6's exit-code contract.
    pub async fn run(self) -> RtunResult<()> {
        self.engine.run().await
    }
}
