// RPC client modules
//
// Hand-written client for the Shelly Gen2+ RPC methods, called as plain
// HTTP GETs against `/rpc/<Method>`.

pub mod client;
pub mod components;
pub mod models;
pub mod shelly;

pub use client::{RpcClient, base_url_for};
