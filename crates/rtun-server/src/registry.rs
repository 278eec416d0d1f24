//! Tunnel registry: the set of live tunnels keyed by 1-byte id, plus the
//! rotating id allocator (`spec.md` §3).
//!
//! Both live exclusively inside the reactor task (see `engine.rs`) — no
//! `Mutex`/`RwLock` guards either, since nothing outside that one task ever
//! touches them, matching `spec.md` §5's "no locks are needed" invariant.

use crate::buffer::BufferPair;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

/// What kind of endpoint a tunnel is driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelKind {
    TcpClient,
    TcpListener,
    Process,
}

/// Lifecycle state (`spec.md` §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Pending,
    Established,
    Closing,
}

/// A single live tunnel.
///
/// The actual socket/pipe handles are not stored here — they are owned by
/// the spawned per-endpoint pump tasks (`endpoint` module) and reached only
/// through `write_tx` (the channel that feeds the write-pump task) and
/// `cancel` (the shutdown signal shared by every task working on this id).
pub struct Tunnel {
    pub id: u8,
    pub kind: TunnelKind,
    pub state: TunnelState,
    pub peer_addr: Option<SocketAddr>,
    pub server: bool,
    pub buffers: BufferPair,
    /// Sends bytes to the write-pump task; `None` until the endpoint is far
    /// enough along to accept writes (e.g. a process tunnel's stdin pump
    /// starts immediately, a tcp-client's only after connect completes).
    pub write_tx: Option<mpsc::Sender<Vec<u8>>>,
    /// Shared cancellation signal for every task working on this tunnel.
    pub cancel: Arc<Notify>,
    /// Set once the `CONN`/`BIND` answer has been emitted, so the state
    /// machine can assert the exactly-one-answer invariant (`spec.md` §8).
    pub answered: bool,
    /// True if this tunnel's own `close` was requested by an inbound
    /// `CLOSE` record — suppresses the echoed `CLOSE` answer (`spec.md` §4.3).
    pub closed_by_peer: bool,
}

impl Tunnel {
    pub fn new(id: u8, kind: TunnelKind, server: bool, buffer_cap: usize) -> Self {
        let tag = match kind {
            TunnelKind::Process => crate::buffer::BufferTag::Process,
            _ => crate::buffer::BufferTag::Tcp,
        };
        Self {
            id,
            kind,
            state: TunnelState::Pending,
            peer_addr: None,
            server,
            buffers: BufferPair::new(buffer_cap, tag),
            write_tx: None,
            cancel: Arc::new(Notify::new()),
            answered: false,
            closed_by_peer: false,
        }
    }
}

/// The set of live tunnels, keyed by id.
#[derive(Default)]
pub struct TunnelRegistry {
    tunnels: HashMap<u8, Tunnel>,
}

impl TunnelRegistry {
    pub fn new() -> Self {
        Self {
            tunnels: HashMap::new(),
        }
    }

    pub fn insert(&mut self, tunnel: Tunnel) {
        // `spec.md` §3: `server` is true exactly for tcp-listener tunnels.
        debug_assert_eq!(
            tunnel.kind == TunnelKind::TcpListener,
            tunnel.server,
            "tunnel 0x{:02x}: `server` must agree with `kind`",
            tunnel.id
        );
        self.tunnels.insert(tunnel.id, tunnel);
    }

    pub fn get(&self, id: u8) -> Option<&Tunnel> {
        self.tunnels.get(&id)
    }

    pub fn get_mut(&mut self, id: u8) -> Option<&mut Tunnel> {
        self.tunnels.get_mut(&id)
    }

    pub fn contains(&self, id: u8) -> bool {
        self.tunnels.contains_key(&id)
    }

    /// Remove a tunnel, returning it so the caller can signal cancellation
    /// and release its handles.
    pub fn remove(&mut self, id: u8) -> Option<Tunnel> {
        self.tunnels.remove(&id)
    }

}

/// Mints tunnel ids for accepted connections (`spec.md` §3).
///
/// `0xff` is reserved as the exhaustion sentinel and is never handed out.
pub struct IdAllocator {
    last: u8,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { last: 0xff }
    }

    /// Scan forward from `last + 1` and return the first id not currently
    /// in `registry`. Returns `None` (exhaustion) if a full 256-id scan
    /// finds nothing, including the sentinel `0xff` itself.
    pub fn allocate(&mut self, registry: &TunnelRegistry) -> Option<u8> {
        let start = self.last.wrapping_add(1);
        let mut candidate = start;
        loop {
            if candidate != 0xff && !registry.contains(candidate) {
                self.last = candidate;
                return Some(candidate);
            }
            let next = candidate.wrapping_add(1);
            if next == start {
                return None;
            }
            candidate = next;
        }
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tunnel(id: u8) -> Tunnel {
        Tunnel::new(id, TunnelKind::TcpClient, false, 4096)
    }

    #[test]
    fn allocates_first_free_id_never_reusing_live_ones() {
        let mut registry = TunnelRegistry::new();
        let mut alloc = IdAllocator::new();
        let first = alloc.allocate(&registry).unwrap();
        registry.insert(make_tunnel(first));
        let second = alloc.allocate(&registry).unwrap();
        assert_ne!(first, second);
        assert!(!registry.contains(second));
    }

    #[test]
    fn rotates_forward_and_skips_live_ids() {
        let mut registry = TunnelRegistry::new();
        registry.insert(make_tunnel(1));
        registry.insert(make_tunnel(2));
        let mut alloc = IdAllocator::new(); // last = 0xff, so scan starts at 0
        let id = alloc.allocate(&registry).unwrap();
        assert_eq!(id, 0);
    }

    #[test]
    fn exhaustion_when_all_ids_live() {
        let mut registry = TunnelRegistry::new();
        for id in 0..=254u8 {
            registry.insert(make_tunnel(id));
        }
        // 0xff (255) is reserved and never allocated, so with 0..=254 live
        // the registry is full from the allocator's point of view.
        let mut alloc = IdAllocator::new();
        assert!(alloc.allocate(&registry).is_none());
    }

    #[test]
    fn never_returns_id_currently_in_registry() {
        let mut registry = TunnelRegistry::new();
        let mut alloc = IdAllocator::new();
        for _ in 0..50 {
            let id = alloc.allocate(&registry).expect("should not exhaust yet");
            assert!(!registry.contains(id));
            registry.insert(make_tunnel(id));
        }
    }

    #[test]
    fn sentinel_is_never_allocated() {
        let mut registry = TunnelRegistry::new();
        for id in 0..=253u8 {
            registry.insert(make_tunnel(id));
        }
        let mut alloc = IdAllocator::new();
        let id = alloc.allocate(&registry).unwrap();
        assert_eq!(id, 254);
        registry.insert(make_tunnel(254));
        assert!(alloc.allocate(&registry).is_none());
    }
}
