//! wRPC node client: JSON-encoded calls over a WebSocket.
//!
//! [`connect`](NodeRpcClient::connect) opens the socket and hands it to a
//! background task that owns it. Calls go to the task over a channel and
//! their responses are matched back by id. A dropped connection fails the
//! calls in flight and is reopened with exponential backoff.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use vchainindex_core::error::IndexerError;

use crate::client::NodeRpcClient;
use crate::wire::{
    GetBlockDagInfoResponse, GetBlocksRequest, GetBlocksResponse,
    GetVirtualChainFromBlockRequest, GetVirtualChainFromBlockResponse, GET_BLOCKS,
    GET_BLOCK_DAG_INFO, GET_VIRTUAL_CHAIN_FROM_BLOCK, PING,
};
use crate::wrpc::{WrpcRequest, WrpcResponse};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Reply = oneshot::Sender<Result<WrpcResponse, IndexerError>>;

/// Configuration for [`WsNodeClient`].
#[derive(Debug, Clone)]
pub struct WsClientConfig {
    /// How long a call waits for its response.
    pub request_timeout: Duration,
    /// Reconnect backoff starting duration.
    pub reconnect_initial: Duration,
    /// Maximum reconnect backoff.
    pub reconnect_max: Duration,
}

impl Default for WsClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(60),
        }
    }
}

enum WsCommand {
    Send { request: WrpcRequest, reply: Reply },
    Close,
}

/// Node client speaking wRPC with JSON encoding.
pub struct WsNodeClient {
    url: String,
    config: WsClientConfig,
    commands: OnceLock<mpsc::UnboundedSender<WsCommand>>,
    next_id: AtomicU64,
}

impl WsNodeClient {
    /// Create a client for `url` (e.g. `ws://127.0.0.1:18110`). Nothing is
    /// opened until `connect`.
    pub fn new(url: impl Into<String>, config: WsClientConfig) -> Self {
        Self {
            url: url.into(),
            config,
            commands: OnceLock::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, IndexerError>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        let commands = self
            .commands
            .get()
            .ok_or_else(|| IndexerError::Connection("wrpc client not connected".into()))?;
        let params =
            serde_json::to_value(params).map_err(|e| IndexerError::Other(e.to_string()))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!(id, method, url = %self.url, "wrpc request");

        let (reply, response) = oneshot::channel();
        commands
            .send(WsCommand::Send {
                request: WrpcRequest::new(id, method, params),
                reply,
            })
            .map_err(|_| IndexerError::Connection("websocket task stopped".into()))?;

        let timeout = self.config.request_timeout;
        let response = time::timeout(timeout, response)
            .await
            .map_err(|_| IndexerError::Fetch(format!("{method}: no response within {timeout:?}")))?
            .map_err(|_| IndexerError::Fetch(format!("{method}: response dropped")))??;

        let result = response
            .into_result()
            .map_err(|e| IndexerError::Fetch(format!("{method}: {e}")))?;
        serde_json::from_value(result)
            .map_err(|e| IndexerError::Fetch(format!("{method}: invalid response: {e}")))
    }
}

impl Drop for WsNodeClient {
    fn drop(&mut self) {
        if let Some(commands) = self.commands.get() {
            let _ = commands.send(WsCommand::Close);
        }
    }
}

#[async_trait]
impl NodeRpcClient for WsNodeClient {
    async fn connect(&self) -> Result<(), IndexerError> {
        if self.commands.get().is_some() {
            return Ok(());
        }
        let (socket, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| IndexerError::Connection(format!("{}: {e}", self.url)))?;
        info!(url = %self.url, "websocket connected");

        let (tx, rx) = mpsc::unbounded_channel();
        if self.commands.set(tx).is_ok() {
            tokio::spawn(ws_task(self.url.clone(), socket, rx, self.config.clone()));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), IndexerError> {
        let _: Value = self.call(PING, &serde_json::json!({})).await?;
        Ok(())
    }

    async fn get_block_dag_info(&self) -> Result<GetBlockDagInfoResponse, IndexerError> {
        self.call(GET_BLOCK_DAG_INFO, &serde_json::json!({})).await
    }

    async fn get_blocks(
        &self,
        request: GetBlocksRequest,
    ) -> Result<GetBlocksResponse, IndexerError> {
        self.call(GET_BLOCKS, &request).await
    }

    async fn get_virtual_chain_from_block(
        &self,
        request: GetVirtualChainFromBlockRequest,
    ) -> Result<GetVirtualChainFromBlockResponse, IndexerError> {
        self.call(GET_VIRTUAL_CHAIN_FROM_BLOCK, &request).await
    }
}

/// Owns the connection for the lifetime of the client.
async fn ws_task(
    url: String,
    socket: Socket,
    mut commands: mpsc::UnboundedReceiver<WsCommand>,
    config: WsClientConfig,
) {
    let mut socket = Some(socket);
    let mut backoff = config.reconnect_initial;

    loop {
        let ws = match socket.take() {
            Some(ws) => ws,
            None => match tokio_tungstenite::connect_async(url.as_str()).await {
                Ok((ws, _)) => {
                    info!(url = %url, "websocket reconnected");
                    backoff = config.reconnect_initial;
                    ws
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "websocket connect failed, retrying in {backoff:?}");
                    time::sleep(backoff).await;
                    backoff = (backoff * 2).min(config.reconnect_max);
                    continue;
                }
            },
        };

        if !serve(ws, &mut commands).await {
            debug!(url = %url, "wrpc client closed");
            return;
        }

        warn!(url = %url, "websocket disconnected, reconnecting in {backoff:?}");
        time::sleep(backoff).await;
        backoff = (backoff * 2).min(config.reconnect_max);
    }
}

/// Pump one connection. Returns `false` once the client has been closed.
async fn serve(ws: Socket, commands: &mut mpsc::UnboundedReceiver<WsCommand>) -> bool {
    let (mut sink, mut stream) = ws.split();
    let mut pending: HashMap<u64, Reply> = HashMap::new();

    let reconnect = loop {
        tokio::select! {
            command = commands.recv() => match command {
                None | Some(WsCommand::Close) => {
                    let _ = sink.close().await;
                    break false;
                }
                Some(WsCommand::Send { request, reply }) => {
                    let text = match serde_json::to_string(&request) {
                        Ok(text) => text,
                        Err(e) => {
                            let _ = reply.send(Err(IndexerError::Other(e.to_string())));
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        let _ = reply.send(Err(IndexerError::Fetch(format!("websocket send failed: {e}"))));
                        break true;
                    }
                    pending.insert(request.id, reply);
                }
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => route(text.as_str(), &mut pending),
                Some(Ok(Message::Close(_))) | None => break true,
                Some(Err(e)) => {
                    warn!(error = %e, "websocket receive error");
                    break true;
                }
                Some(Ok(_)) => {}
            },
        }
    };

    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(IndexerError::Fetch(
            "websocket closed before the response arrived".into(),
        )));
    }
    reconnect
}

fn route(text: &str, pending: &mut HashMap<u64, Reply>) {
    let message: WrpcResponse = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(error = %e, "ignoring unparseable wrpc message");
            return;
        }
    };
    let Some(id) = message.id else {
        trace!(method = ?message.method, "ignoring notification");
        return;
    };
    match pending.remove(&id) {
        Some(reply) => {
            let _ = reply.send(Ok(message));
        }
        None => debug!(id, "response for an unknown request"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    /// A one-connection node that answers each call with `answer(request)`.
    async fn node<F>(answer: F) -> String
    where
        F: Fn(&Value) -> Vec<Value> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            while let Some(Ok(message)) = ws.next().await {
                let Message::Text(text) = message else { continue };
                let request: Value = serde_json::from_str(text.as_str()).unwrap();
                for reply in answer(&request) {
                    ws.send(Message::Text(reply.to_string().into())).await.unwrap();
                }
            }
        });
        format!("ws://{addr}")
    }

    fn quick() -> WsClientConfig {
        WsClientConfig {
            request_timeout: Duration::from_millis(300),
            ..WsClientConfig::default()
        }
    }

    #[tokio::test]
    async fn calls_before_connect_fail() {
        let client = WsNodeClient::new("ws://127.0.0.1:18110", quick());
        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, IndexerError::Connection(_)));
    }

    #[tokio::test]
    async fn unreachable_node_is_a_connection_error() {
        let client = WsNodeClient::new("ws://127.0.0.1:9", quick());
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, IndexerError::Connection(_)));
    }

    #[tokio::test]
    async fn calls_use_the_wrpc_envelope() {
        let url = node(|req| {
            assert_eq!(req["method"], "getBlockDagInfo");
            assert!(req.get("jsonrpc").is_none());
            vec![json!({
                "id": req["id"],
                "method": "getBlockDagInfo",
                "params": { "network": "kaspa-mainnet", "pruningPointHash": "pp" }
            })]
        })
        .await;
        let client = WsNodeClient::new(url, quick());
        client.connect().await.unwrap();

        let info = client.get_block_dag_info().await.unwrap();
        assert_eq!(info.pruning_point_hash.as_str(), "pp");
    }

    #[tokio::test]
    async fn notifications_do_not_answer_calls() {
        let url = node(|req| {
            vec![
                json!({ "method": "blockAddedNotification", "params": {} }),
                json!({ "id": req["id"], "params": { "blockHashes": ["aa"], "blocks": [] } }),
            ]
        })
        .await;
        let client = WsNodeClient::new(url, quick());
        client.connect().await.unwrap();

        let resp = client
            .get_blocks(GetBlocksRequest::with_transactions("aa".into()))
            .await
            .unwrap();
        assert_eq!(resp.block_hashes.len(), 1);
    }

    #[tokio::test]
    async fn node_error_is_a_fetch_error() {
        let url = node(|req| vec![json!({ "id": req["id"], "error": { "message": "block not found" } })])
            .await;
        let client = WsNodeClient::new(url, quick());
        client.connect().await.unwrap();

        let err = client
            .get_virtual_chain_from_block(GetVirtualChainFromBlockRequest::with_accepted_ids(
                "zz".into(),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::Fetch(ref m) if m.contains("block not found")));
    }

    #[tokio::test]
    async fn silent_node_times_out() {
        let url = node(|_| vec![]).await;
        let client = WsNodeClient::new(url, quick());
        client.connect().await.unwrap();

        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, IndexerError::Fetch(ref m) if m.contains("no response")));
    }
}
