//! Push relay: the RPC-facing service producers call to reach live clients.

pub mod rpc;
pub mod service;

pub use rpc::RpcListener;
pub use service::RelayService;
