// shelly-api: Async Rust client for the Shelly Gen2+ RPC-over-HTTP interface

pub mod error;
pub mod rpc;
pub mod transport;

pub use error::Error;
pub use rpc::models;
pub use rpc::{RpcClient, base_url_for};
pub use transport::TransportConfig;
