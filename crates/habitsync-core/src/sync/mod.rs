//! Sync: remote gateway, connectivity, conflict resolution, and the engine
//! that ties them to the store.

mod engine;
mod gateway;
mod http;
mod network;
mod resolver;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{SkipReason, SyncEngine, SyncOutcome, SyncReport};
pub use gateway::{
    GatewayError, GatewayResult, PullResponse, RemoteGateway, RemoteRecord, CLIENT_KEY_FIELD,
};
pub use http::HttpGateway;
pub use network::NetworkMonitor;
pub use resolver::resolve;
