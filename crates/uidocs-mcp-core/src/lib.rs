// ABOUTME: Core MCP types shared by the mirror, tools, and server crates
// ABOUTME: Exposes JSON-RPC messages, MCP payloads, and version negotiation without any runtime

pub mod error;
pub mod message;
pub mod protocol;
pub mod version;

pub use error::{McpError, Result};
pub use message::*;
pub use protocol::*;
pub use version::*;
