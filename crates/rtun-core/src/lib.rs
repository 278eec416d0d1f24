//! rtun-core: wire protocol for the rtun tunnel multiplexer.
//!
//! Provides frame (de)framing, the address codec, command payload
//! (de)serialization, and the shared error taxonomy. No I/O lives here —
//! everything is pure, synchronous, and unit-testable in isolation.

pub mod addr;
pub mod codec;
pub mod error;
pub mod messages;

pub use codec::{emit, parse, Frame, FrameDecoder, HEADER_LEN, MAX_PAYLOAD_LEN};
pub use error::{ErrorCode, RtunError, RtunResult};
pub use messages::Command;
