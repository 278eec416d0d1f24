//! Per-tunnel state machine (`spec.md` §4.3).
//!
//! These are methods on [`crate::engine::Engine`] rather than a free-standing
//! `Tunnel` type — every transition needs the registry, the allocator, the
//! dispatcher, and the event-sender together, and `spec.md` §9 calls for
//! exactly that: "a single *Server* value threaded through the reactor."
//! Splitting the `impl` across `tunnel.rs` (state machine) and `engine.rs`
//! (event loop) keeps the module boundary from `spec.md` §2 without
//! threading five parameters through every call.

use crate::endpoint::{process, tcp_client, tcp_listener};
use crate::engine::Engine;
use crate::event::ConnectOutcome;
use crate::registry::{Tunnel, TunnelKind, TunnelState};
use rtun_core::messages::{AfPreference, OpenRequest};
use rtun_core::{ErrorCode, Frame, RtunError, RtunResult};
use std::net::SocketAddr;
use tracing::{info, warn};

impl Engine {
    /// The address-family preference to fall back on when a request's `af`
    /// byte names neither ipv4 nor ipv6 (`spec.md` §4.4, configured via
    /// `ServerConfig::af_preference`).
    fn default_af_preference(&self) -> AfPreference {
        AfPreference::from_config_str(&self.config.af_preference)
    }

    /// Dispatch one inbound frame to the matching state-machine input.
    /// Returns `Err` only for protocol-level faults, which are fatal
    /// (`spec.md` §4.5, §7): unknown command, unknown id on a non-open
    /// record, or a duplicate id on an open record.
    pub(crate) async fn handle_frame(&mut self, frame: Frame) -> RtunResult<()> {
        use rtun_core::Command;
        match Command::from_u8(frame.command)? {
            Command::Conn => self.handle_open(frame, false).await,
            Command::Bind => self.handle_open(frame, true).await,
            Command::Data => self.handle_write_request(frame).await,
            Command::Close => self.handle_close_command(frame).await,
            Command::Rconn => Err(RtunError::MalformedFrame(
                "RCONN is server-to-controller only".into(),
            )),
        }
    }

    async fn handle_open(&mut self, frame: Frame, is_bind: bool) -> RtunResult<()> {
        let tunnel_id = frame.tunnel_id;
        if self.registry.contains(tunnel_id) {
            return Err(RtunError::MalformedFrame(format!(
                "duplicate tunnel id 0x{tunnel_id:02x} on open"
            )));
        }
        let req = OpenRequest::decode(&frame.payload)?;

        if !is_bind && req.port == 0 {
            self.open_process(tunnel_id, &req.host).await;
            return Ok(());
        }

        if is_bind {
            self.open_bind(tunnel_id, req).await;
        } else {
            self.open_connect(tunnel_id, req).await;
        }
        Ok(())
    }

    async fn open_connect(&mut self, tunnel_id: u8, req: OpenRequest) {
        let pref = AfPreference::from_wire(req.address_family, self.default_af_preference());
        let target = match resolve_one(&req.host, req.port, pref).await {
            Ok(addr) => addr,
            Err(code) => {
                warn!(id = tunnel_id, host = %req.host, "resolve failed for CONN");
                let _ = self.dispatcher.send_open_fail(tunnel_id, false, code).await;
                return;
            }
        };

        let tunnel = Tunnel::new(tunnel_id, TunnelKind::TcpClient, false, self.config.buffer_cap);
        self.registry.insert(tunnel);
        tcp_client::spawn_connect(tunnel_id, target, self.events_tx.clone());
        info!(id = tunnel_id, target = %target, "connect in progress");
    }

    async fn open_bind(&mut self, tunnel_id: u8, req: OpenRequest) {
        let pref = AfPreference::from_wire(req.address_family, self.default_af_preference());
        let bind_addr = match resolve_one(&req.host, req.port, pref).await {
            Ok(addr) => addr,
            Err(code) => {
                let _ = self.dispatcher.send_open_fail(tunnel_id, true, code).await;
                return;
            }
        };

        match tcp_listener::bind(bind_addr).await {
            Ok((listener, actual)) => {
                let mut tunnel = Tunnel::new(tunnel_id, TunnelKind::TcpListener, true, self.config.buffer_cap);
                tunnel.state = TunnelState::Established;
                tunnel.peer_addr = Some(actual);
                tunnel.answered = true;
                let cancel = tunnel.cancel.clone();
                self.registry.insert(tunnel);
                tcp_listener::spawn_accept_loop(tunnel_id, listener, cancel, self.events_tx.clone());
                info!(id = tunnel_id, addr = %actual, "listener bound");
                let _ = self.dispatcher.send_open_ok(tunnel_id, true, actual).await;
            }
            Err(e) => {
                warn!(id = tunnel_id, error = %e, "bind failed");
                let code = ErrorCode::from_io_error(&e);
                let _ = self.dispatcher.send_open_fail(tunnel_id, true, code).await;
            }
        }
    }

    async fn open_process(&mut self, tunnel_id: u8, command_line: &str) {
        let mut parts = command_line.split_whitespace();
        let Some(program) = parts.next() else {
            let _ = self
                .dispatcher
                .send_open_fail(tunnel_id, false, ErrorCode::Generic)
                .await;
            return;
        };
        let args: Vec<String> = parts.map(str::to_string).collect();

        match process::spawn(program, &args) {
            Ok(mut child) => {
                let mut tunnel = Tunnel::new(tunnel_id, TunnelKind::Process, false, self.config.buffer_cap);
                tunnel.state = TunnelState::Established;
                tunnel.answered = true;
                let cancel = tunnel.cancel.clone();
                let write_tx = process::spawn_pumps(tunnel_id, &mut child, cancel, self.events_tx.clone());
                tunnel.write_tx = Some(write_tx);
                self.registry.insert(tunnel);
                process::spawn_wait(tunnel_id, child, self.events_tx.clone());
                info!(id = tunnel_id, program, "process spawned");
                // Process tunnels have no socket address; the placeholder
                // satisfies the answer wire format (`spec.md` §6).
                let placeholder: SocketAddr = "0.0.0.0:0".parse().unwrap();
                let _ = self.dispatcher.send_open_ok(tunnel_id, false, placeholder).await;
            }
            Err(e) => {
                warn!(id = tunnel_id, program, error = %e, "process spawn failed");
                let code = ErrorCode::from_io_error(&e);
                let _ = self.dispatcher.send_open_fail(tunnel_id, false, code).await;
            }
        }
    }

    /// *accept* transition (`spec.md` §4.3): a listener produced a new
    /// client socket. Mint an id, create the child tunnel already
    /// established, and notify via `RCONN`. Allocation failure is a soft
    /// error — drop the socket, keep the listener.
    pub(crate) async fn handle_accepted(
        &mut self,
        listener_id: u8,
        stream: tokio::net::TcpStream,
        peer: SocketAddr,
    ) {
        let Some(new_id) = self.allocator.allocate(&self.registry) else {
            warn!(listener_id, "id allocation exhausted, dropping accepted socket");
            drop(stream);
            return;
        };

        let mut tunnel = Tunnel::new(new_id, TunnelKind::TcpClient, false, self.config.buffer_cap);
        tunnel.state = TunnelState::Established;
        tunnel.peer_addr = Some(peer);
        tunnel.answered = true;
        let cancel = tunnel.cancel.clone();
        let write_tx = tcp_client::spawn_pumps(new_id, stream, cancel, self.events_tx.clone());
        tunnel.write_tx = Some(write_tx);
        self.registry.insert(tunnel);

        info!(listener_id, new_id, peer = %peer, "accepted inbound connection");
        let _ = self.dispatcher.send_rconn(listener_id, new_id, peer).await;
    }

    /// Outbound `CONN` connect attempt finished.
    pub(crate) async fn handle_connected(&mut self, id: u8, outcome: ConnectOutcome) {
        match outcome {
            ConnectOutcome::Connected(stream, addr) => {
                let Some(tunnel) = self.registry.get_mut(id) else {
                    return;
                };
                tunnel.state = TunnelState::Established;
                tunnel.peer_addr = Some(addr);
                tunnel.answered = true;
                let cancel = tunnel.cancel.clone();
                let write_tx = tcp_client::spawn_pumps(id, stream, cancel, self.events_tx.clone());
                if let Some(tunnel) = self.registry.get_mut(id) {
                    tunnel.write_tx = Some(write_tx);
                }
                info!(id, addr = %addr, "connect established");
                let _ = self.dispatcher.send_open_ok(id, false, addr).await;
                self.drain_wio(id).await;
            }
            ConnectOutcome::Failed(e) => {
                warn!(id, error = %e, "connect failed");
                let code = ErrorCode::from_io_error(&e);
                let _ = self.dispatcher.send_open_fail(id, false, code).await;
                self.registry.remove(id);
            }
        }
    }

    /// *write-request* transition: queue caller bytes for the endpoint and
    /// attempt an immediate drain (`spec.md` §4.3).
    async fn handle_write_request(&mut self, frame: Frame) -> RtunResult<()> {
        let id = frame.tunnel_id;
        let Some(tunnel) = self.registry.get_mut(id) else {
            return Err(RtunError::MalformedFrame(format!(
                "DATA for unknown tunnel id 0x{id:02x}"
            )));
        };
        if tunnel.server {
            // A listener has no endpoint to write to — `write-request`
            // only ever applies to the tcp-client/process tunnels it
            // itself spawns. Per-tunnel fault, not fatal.
            warn!(id, "write-request targeted a listener tunnel, tearing down");
            self.close_tunnel(id, true).await;
            return Ok(());
        }
        let was_empty = tunnel.buffers.wio.is_empty();
        if tunnel.buffers.wio.append(&frame.payload).is_err() {
            warn!(id, "wio buffer full, tearing down tunnel");
            self.close_tunnel(id, true).await;
            return Ok(());
        }
        if was_empty && tunnel.state == TunnelState::Established {
            self.drain_wio(id).await;
        }
        Ok(())
    }

    /// Move as much of `wio` as the write-pump will currently accept.
    /// Non-blocking: `try_send` either empties the buffer or leaves the
    /// remainder queued for the next `SpaceAvailable` event.
    pub(crate) async fn drain_wio(&mut self, id: u8) {
        let Some(tunnel) = self.registry.get_mut(id) else {
            return;
        };
        let Some(write_tx) = tunnel.write_tx.clone() else {
            return;
        };
        if tunnel.buffers.wio.is_empty() {
            return;
        }
        let chunk = tunnel.buffers.wio.peek().to_vec();
        match write_tx.try_send(chunk.clone()) {
            Ok(()) => {
                tunnel.buffers.wio.consume(chunk.len());
            }
            Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {
                // Left queued in wio; retried on the next SpaceAvailable.
            }
            Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {
                self.close_tunnel(id, true).await;
            }
        }
    }

    /// *data-in* transition: bytes arrived from the endpoint.
    pub(crate) async fn handle_endpoint_data(&mut self, id: u8, data: Vec<u8>) {
        let Some(tunnel) = self.registry.get_mut(id) else {
            return;
        };
        if tunnel.buffers.rio.append(&data).is_err() {
            warn!(id, "rio buffer full, tearing down tunnel");
            self.close_tunnel(id, true).await;
            return;
        }
        self.forward(id).await;
    }

    /// `forward(tun)` (`spec.md` §4.5): drain `rio` into one or more `DATA`
    /// records, bounded per call by `forward_chunk` so one tunnel cannot
    /// starve the others.
    pub(crate) async fn forward(&mut self, id: u8) {
        let chunk_size = self.config.forward_chunk;
        loop {
            let Some(tunnel) = self.registry.get_mut(id) else {
                return;
            };
            if tunnel.buffers.rio.is_empty() {
                return;
            }
            let take = tunnel.buffers.rio.len().min(chunk_size);
            let payload = tunnel.buffers.rio.peek()[..take].to_vec();
            tunnel.buffers.rio.consume(take);
            if self.dispatcher.send_data(id, payload).await.is_err() {
                self.close_tunnel(id, false).await;
                return;
            }
        }
    }

    /// The write-pump drained a chunk and can take more.
    pub(crate) async fn handle_space_available(&mut self, id: u8) {
        self.drain_wio(id).await;
    }

    /// EOF on an endpoint, or a mid-stream error treated the same way
    /// (`spec.md` §4.3's *data-in*/process-exit close rules).
    pub(crate) async fn handle_endpoint_closed(&mut self, id: u8) {
        self.forward(id).await;
        self.close_tunnel(id, true).await;
    }

    pub(crate) async fn handle_endpoint_error(&mut self, id: u8, err: std::io::Error) {
        warn!(id, error = %err, "endpoint error");
        self.close_tunnel(id, true).await;
    }

    pub(crate) async fn handle_process_exited(&mut self, id: u8, status: std::process::ExitStatus) {
        info!(id, status = %status, "process exited");
        self.forward(id).await;
        self.close_tunnel(id, true).await;
    }

    async fn handle_close_command(&mut self, frame: Frame) -> RtunResult<()> {
        let id = frame.tunnel_id;
        if !self.registry.contains(id) {
            return Err(RtunError::MalformedFrame(format!(
                "CLOSE for unknown tunnel id 0x{id:02x}"
            )));
        }
        if let Some(tunnel) = self.registry.get_mut(id) {
            tunnel.closed_by_peer = true;
        }
        // `emit_close: true` here — it is `closed_by_peer`, checked inside
        // `close_tunnel`, that actually suppresses the echoed `CLOSE`.
        self.close_tunnel(id, true).await;
        Ok(())
    }

    /// *close* transition (`spec.md` §4.3): transition through `Closing`,
    /// cancel every pump task working on `id`, remove it from the registry,
    /// and emit `CLOSE` unless the close was itself triggered by an inbound
    /// `CLOSE` record. `emit_close` is `false` only when the caller already
    /// knows the shared channel write would fail (e.g. `forward`'s own
    /// `send_data` just failed) and emission would be pointless.
    pub(crate) async fn close_tunnel(&mut self, id: u8, emit_close: bool) {
        let Some(mut tunnel) = self.registry.remove(id) else {
            return;
        };
        tunnel.state = TunnelState::Closing;
        let suppress_echo = tunnel.closed_by_peer;
        tunnel.cancel.notify_waiters();
        if emit_close && !suppress_echo {
            let _ = self.dispatcher.send_close(id).await;
        }
        info!(id, "tunnel closed");
    }
}

/// Resolve `host:port` to one [`SocketAddr`], honoring `pref`. Literal IPs
/// parse directly; anything else goes through async DNS resolution, mapped
/// to `ErrorCode::Resolve` on failure (`spec.md` §4.4, §7).
async fn resolve_one(host: &str, port: u16, pref: AfPreference) -> Result<SocketAddr, ErrorCode> {
    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    let candidates = tokio::net::lookup_host((host, port))
        .await
        .map_err(|_| ErrorCode::Resolve)?
        .collect::<Vec<_>>();

    let picked = match pref {
        AfPreference::Ipv4 => candidates.iter().find(|a| a.is_ipv4()).copied(),
        AfPreference::Ipv6 => candidates.iter().find(|a| a.is_ipv6()).copied(),
        AfPreference::Any => candidates.first().copied(),
    };
    picked.ok_or(ErrorCode::Resolve)
}
