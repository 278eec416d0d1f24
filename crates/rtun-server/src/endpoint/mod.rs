//! Per-tunnel-kind I/O drivers.
//!
//! Every endpoint kind is driven the same way: a read-pump task owns the
//! read half and forwards bytes to the reactor as [`crate::event::ReactorEvent::EndpointData`];
//! a write-pump task owns the write half and drains an `mpsc` queue the
//! reactor feeds; both select against a shared [`tokio::sync::Notify`] so the
//! reactor can tear either down without blocking on them (grounded in
//! `gateway/forwarder.rs`'s `tcp_relay` cancel-channel pattern).
//!
//! Nothing in here touches [`crate::registry::TunnelRegistry`] — each
//! function only ever returns handles and a join set; the reactor is the
//! sole place state is mutated.

pub mod process;
pub mod tcp_client;
pub mod tcp_listener;

/// Bytes read per `read()` call before handing control back to the `select!`
/// in a pump loop. Matches the teacher's relay buffer size.
pub const READ_CHUNK: usize = 8192;
