//! HTTP API exposed to browser clients

pub mod protocol;
pub mod server;

pub use protocol::human_readable_size;
pub use server::GatewayServer;
