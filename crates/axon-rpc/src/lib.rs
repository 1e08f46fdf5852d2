//! Request/response RPC over a local stream socket: length-delimited
//! serialized triple, per-call connection.

pub mod error;
pub mod method_table;
pub mod transport;
pub mod uds_client;
pub mod uds_server;

pub use error::RpcError;
pub use method_table::{Handler, MethodTable};
pub use transport::RpcTransport;
pub use uds_client::UdsClient;
pub use uds_server::UdsServer;
