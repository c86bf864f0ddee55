//! Protocol constants shared by the socket and session crates.

use std::time::Duration;

/// Liveness probe sent by the client, as a bare text frame.
pub const PING: &str = "ping";

/// Liveness reply expected from the server, as a bare text frame.
pub const PONG: &str = "pong";

/// Interval between liveness probes on an open connection.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Time allowed for the reply to a probe. Must stay below [`PING_INTERVAL`].
pub const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay before the single reconnect attempt after an unclean close.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Maximum inbound message size.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Closed without a close frame (reserved, never sent on the wire).
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Closed by the client after a missed liveness reply.
pub const CLOSE_PING_TIMEOUT: u16 = 4008;

/// Close reason paired with [`CLOSE_PING_TIMEOUT`].
pub const PING_TIMEOUT_REASON: &str = "ping_timeout";

/// `meta` marker carried by every socket control action.
pub const SOCKET_COMMAND: &str = "SOCKET_COMMAND";

/// Returns `true` if a text frame is the liveness reply.
pub fn is_liveness_reply(text: &str) -> bool {
    text == PONG
}
