//! Method names used by the handshake and the tool-call facade.

/// Client → server request opening the session.
pub const INITIALIZE: &str = "initialize";

/// Client → server notification closing the handshake.
pub const INITIALIZED: &str = "initialized";

/// Liveness check, valid in either direction.
pub const PING: &str = "ping";

/// Enumerate the tools a server exposes.
pub const TOOLS_LIST: &str = "tools/list";

/// Invoke a single tool.
pub const TOOLS_CALL: &str = "tools/call";
