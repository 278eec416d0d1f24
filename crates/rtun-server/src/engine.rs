//! The event engine: a single-threaded reactor (`spec.md` §4.6, §5).
//!
//! `Engine` owns the [`TunnelRegistry`], the [`IdAllocator`], and the
//! [`ChannelDispatcher`] outright — nothing else ever touches them, which is
//! how this realizes the spec's "no locks are needed" requirement on top of
//! tokio: every spawned pump task only ever talks to `Engine` by sending a
//! [`ReactorEvent`] into its single queue, never by reaching into its state
//! directly. `Engine::run` is the one suspension point.

use crate::channel::{ChannelReader, ChannelWriter};
use crate::config::ServerConfig;
use crate::dispatcher::{spawn_channel_reader, ChannelDispatcher};
use crate::event::ReactorEvent;
use crate::registry::{IdAllocator, TunnelRegistry};
use rtun_core::RtunResult;
use tokio::sync::mpsc;
use tracing::{error, info};

pub struct Engine {
    pub(crate) registry: TunnelRegistry,
    pub(crate) allocator: IdAllocator,
    pub(crate) dispatcher: ChannelDispatcher,
    pub(crate) events_tx: mpsc::Sender<ReactorEvent>,
    events_rx: mpsc::Receiver<ReactorEvent>,
    pub(crate) config: ServerConfig,
}

/// Event queue depth. Generous relative to any single reactor iteration's
/// fan-out so a burst of endpoint activity never forces a pump task to
/// block mid-report.
const EVENT_QUEUE_DEPTH: usize = 1024;

impl Engine {
    pub fn new(reader: ChannelReader, writer: ChannelWriter, config: ServerConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        spawn_channel_reader(reader, events_tx.clone());
        Self {
            registry: TunnelRegistry::new(),
            allocator: IdAllocator::new(),
            dispatcher: ChannelDispatcher::new(writer),
            events_tx,
            events_rx,
            config,
        }
    }

    /// Run the reactor to completion. Returns `Ok(())` on a clean shutdown
    /// (the controller closed the channel), `Err` on a fatal channel error
    /// or protocol violation (`spec.md` §7).
    pub async fn run(mut self) -> RtunResult<()> {
        loop {
            let event = match self.events_rx.recv().await {
                Some(event) => event,
                None => {
                    // Every task holding a sender is either the channel
                    // reader or a pump owned by a live tunnel; an empty
                    // registry plus a closed queue means a clean shutdown
                    // already happened via ChannelClosed.
                    return Ok(());
                }
            };

            match event {
                ReactorEvent::ChannelFrame(frame) => {
                    if let Err(e) = self.handle_frame(frame).await {
                        error!(error = %e, "protocol fault, shutting down");
                        return Err(e);
                    }
                }
                ReactorEvent::ChannelClosed => {
                    info!("shared channel closed, shutting down");
                    return Ok(());
                }
                ReactorEvent::ChannelError(e) => {
                    error!(error = %e, "shared channel error, shutting down");
                    return Err(e.into());
                }
                ReactorEvent::Connected(id, outcome) => self.handle_connected(id, outcome).await,
                ReactorEvent::Accepted(listener_id, stream, peer) => {
                    self.handle_accepted(listener_id, stream, peer).await
                }
                ReactorEvent::ProcessExited(id, status) => self.handle_process_exited(id, status).await,
                ReactorEvent::EndpointData(id, data) => self.handle_endpoint_data(id, data).await,
                ReactorEvent::SpaceAvailable(id) => self.handle_space_available(id).await,
                ReactorEvent::EndpointClosed(id) => self.handle_endpoint_closed(id).await,
                ReactorEvent::EndpointError(id, e) => self.handle_endpoint_error(id, e).await,
            }
        }
    }
}
