//! TCP Bouncer
//!
//! A transparent TCP forwarder that relays every accepted connection to a fixed
//! remote address. An optional shared secret gates which client IPs are forwarded.

pub mod auth;
pub mod config;
pub mod forward;
pub mod pipe;
pub mod server;
pub mod stream;

// Re-export commonly used types and functions
pub use auth::{AuthOutcome, TrustedIps, authenticate, contains_secret};
pub use config::Config;
pub use forward::forward;
pub use pipe::{PipeEnd, PipeStats, Side, pipe};
pub use server::{Route, Server, route};
pub use stream::{BUFFER_SIZE, Chunk, ChunkReader, ReadEvent};
