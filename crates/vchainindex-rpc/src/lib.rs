//! vchainindex-rpc — chain node adapter for the vchainindex engine.
//!
//! Provides:
//! - [`NodeRpcClient`] — the node calls the indexer needs
//! - [`WsNodeClient`] — wRPC with JSON encoding over a WebSocket
//! - [`RpcChainSource`] — the engine's `ChainSource` over any client
//! - [`IndexerBuilder`] — fluent construction of a ready engine

pub mod builder;
pub mod client;
pub mod source;
pub mod wire;
pub mod wrpc;
pub mod ws;

pub use builder::IndexerBuilder;
pub use client::NodeRpcClient;
pub use source::RpcChainSource;
pub use ws::{WsClientConfig, WsNodeClient};
