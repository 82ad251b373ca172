//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the text framed protocol:
//! - `Frame` and ordered `Headers`
//! - Serialization and `\r\n` / `\n` line scanning
//! - Frame buffer for accumulating partial reads
//! - Heart-beat negotiation

mod frame;
mod frame_buffer;
mod heartbeat;
mod wire_format;

pub use frame::{Frame, Headers};
pub use frame_buffer::FrameBuffer;
pub use heartbeat::HeartbeatValues;
pub use wire_format::{
    commands, encode_frame, encode_frame_into, find_line, headers, Line, CR,
    DEFAULT_MAX_FRAME_SIZE, EOL, HEARTBEAT, LF, NUL,
};
