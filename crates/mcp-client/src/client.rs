use rmcp::model::{
    CallToolResult, Implementation, InitializeResult, JsonRpcError, JsonRpcMessage,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, JsonRpcVersion2_0, ListToolsResult,
    Notification, NumberOrString, Request, RequestId, ServerCapabilities,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tower::{timeout::TimeoutLayer, Layer, Service, ServiceExt};

use crate::{McpService, TransportHandle};

pub type BoxError = Box<dyn std::error::Error + Sync + Send>;

const PROTOCOL_VERSION: &str = "2025-03-26";
const METHOD_NOT_FOUND: i32 = -32601;

/// Error type for MCP client operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] super::transport::Error),

    #[error("RPC error: code={code}, message={message}")]
    RpcError { code: i32, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected response from server: {0}")]
    UnexpectedResponse(String),

    #[error("Not initialized")]
    NotInitialized,

    #[error("Timeout or service not ready")]
    NotReady,

    #[error("Request timed out")]
    Timeout(#[from] tower::timeout::error::Elapsed),

    #[error("Error from mcp-server: {0}")]
    ServerBoxError(BoxError),

    #[error("Call to '{server}' failed for '{method}'. {source}")]
    McpServerError {
        method: String,
        server: String,
        #[source]
        source: BoxError,
    },
}

// BoxError from the timeout layer gets converted to our Error type
impl From<BoxError> for Error {
    fn from(err: BoxError) -> Self {
        Error::ServerBoxError(err)
    }
}

#[derive(Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

#[derive(Serialize, Deserialize, Default)]
pub struct ClientCapabilities {}

#[derive(Serialize, Deserialize)]
pub struct InitializeParams {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    #[serde(rename = "clientInfo")]
    pub client_info: ClientInfo,
}

/// The subset of MCP the agent relies on: handshake, tool discovery, tool calls
#[async_trait::async_trait]
pub trait McpClientTrait: Send + Sync {
    async fn initialize(
        &mut self,
        info: ClientInfo,
        capabilities: ClientCapabilities,
    ) -> Result<InitializeResult, Error>;

    async fn list_tools(&self, next_cursor: Option<String>) -> Result<ListToolsResult, Error>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, Error>;
}

/// The MCP client is the interface for MCP operations.
pub struct McpClient<T>
where
    T: TransportHandle + Send + Sync + 'static,
{
    service: Mutex<tower::timeout::Timeout<McpService<T>>>,
    next_id_counter: AtomicU64,
    server_capabilities: Option<ServerCapabilities>,
    server_info: Option<Implementation>,
    receive_task: JoinHandle<()>,
}

impl<T> Drop for McpClient<T>
where
    T: TransportHandle + Send + Sync + 'static,
{
    fn drop(&mut self) {
        // the receive loop holds a transport handle; stopping it lets the
        // transport shut the server process down
        self.receive_task.abort();
    }
}

impl<T> McpClient<T>
where
    T: TransportHandle + Send + Sync + 'static,
{
    pub async fn connect(transport: T, timeout: std::time::Duration) -> Result<Self, Error> {
        let service = McpService::new(transport.clone());
        let service_ptr = service.clone();

        let receive_task = tokio::spawn(async move {
            loop {
                match transport.receive().await {
                    Ok(message) => match message {
                        JsonRpcMessage::Response(JsonRpcResponse {
                            id: NumberOrString::Number(id),
                            ..
                        })
                        | JsonRpcMessage::Error(JsonRpcError {
                            id: NumberOrString::Number(id),
                            ..
                        }) => {
                            service_ptr.respond(&id.to_string(), Ok(message)).await;
                        }
                        other => {
                            tracing::debug!(message = ?other, "Ignoring server-initiated message");
                        }
                    },
                    Err(e) => {
                        service_ptr.hangup(e).await;
                        break;
                    }
                }
            }
        });

        let middleware = TimeoutLayer::new(timeout);

        Ok(Self {
            service: Mutex::new(middleware.layer(service)),
            next_id_counter: AtomicU64::new(1),
            server_capabilities: None,
            server_info: None,
            receive_task,
        })
    }

    pub fn server_info(&self) -> Option<&Implementation> {
        self.server_info.as_ref()
    }

    fn server_name(&self) -> String {
        self.server_info
            .as_ref()
            .map(|s| s.name.clone())
            .unwrap_or_default()
    }

    /// Send a JSON-RPC request and check we don't get an error response.
    async fn send_request<R>(&self, method: &str, params: Value) -> Result<R, Error>
    where
        R: for<'de> Deserialize<'de>,
    {
        let mut service = self.service.lock().await;
        service.ready().await.map_err(|_| Error::NotReady)?;
        let id_num = self.next_id_counter.fetch_add(1, Ordering::SeqCst);
        let id = RequestId::Number(id_num as u32);

        let mut params = into_object(params);
        params.insert(
            "_meta".to_string(),
            json!({ "progressToken": format!("prog-{}", id) }),
        );

        let request = JsonRpcMessage::Request(JsonRpcRequest {
            jsonrpc: JsonRpcVersion2_0,
            id,
            request: Request {
                method: method.to_string(),
                params,
                extensions: Default::default(),
            },
        });

        let response_msg = service
            .call(request)
            .await
            .map_err(|e| Error::McpServerError {
                server: self.server_name(),
                method: method.to_string(),
                // params are left out, tool outputs can be really large
                source: Box::<Error>::new(e.into()),
            })?
            .ok_or_else(|| Error::UnexpectedResponse("no reply to request".to_string()))?;

        let expected_id = RequestId::Number(id_num as u32);
        match response_msg {
            JsonRpcMessage::Response(JsonRpcResponse { id, result, .. }) => {
                if id != expected_id {
                    return Err(Error::UnexpectedResponse(
                        "id mismatch for JsonRpcResponse".to_string(),
                    ));
                }
                Ok(serde_json::from_value(serde_json::to_value(result)?)?)
            }
            JsonRpcMessage::Error(JsonRpcError { id, error, .. }) => {
                if id != expected_id {
                    return Err(Error::UnexpectedResponse(
                        "id mismatch for JsonRpcError".to_string(),
                    ));
                }
                Err(Error::RpcError {
                    code: error.code.0,
                    message: error.message.to_string(),
                })
            }
            _ => Err(Error::UnexpectedResponse(
                "unexpected message type".to_string(),
            )),
        }
    }

    /// Send a JSON-RPC notification.
    async fn send_notification(&self, method: &str, params: Value) -> Result<(), Error> {
        let mut service = self.service.lock().await;
        service.ready().await.map_err(|_| Error::NotReady)?;

        let notification = JsonRpcMessage::Notification(JsonRpcNotification {
            jsonrpc: JsonRpcVersion2_0,
            notification: Notification {
                method: method.to_string(),
                params: into_object(params),
                extensions: Default::default(),
            },
        });

        service
            .call(notification)
            .await
            .map_err(|e| Error::McpServerError {
                server: self.server_name(),
                method: method.to_string(),
                source: Box::<Error>::new(e.into()),
            })?;

        Ok(())
    }

    fn capabilities(&self) -> Result<&ServerCapabilities, Error> {
        self.server_capabilities
            .as_ref()
            .ok_or(Error::NotInitialized)
    }
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[async_trait::async_trait]
impl<T> McpClientTrait for McpClient<T>
where
    T: TransportHandle + Send + Sync + 'static,
{
    async fn initialize(
        &mut self,
        info: ClientInfo,
        capabilities: ClientCapabilities,
    ) -> Result<InitializeResult, Error> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            client_info: info,
            capabilities,
        };
        let result: InitializeResult = self
            .send_request("initialize", serde_json::to_value(params)?)
            .await?;

        self.send_notification("notifications/initialized", json!({}))
            .await?;

        self.server_capabilities = Some(result.capabilities.clone());
        self.server_info = Some(result.server_info.clone());

        Ok(result)
    }

    async fn list_tools(&self, next_cursor: Option<String>) -> Result<ListToolsResult, Error> {
        // servers without the tools capability simply have none
        if self.capabilities()?.tools.is_none() {
            return Ok(ListToolsResult {
                tools: vec![],
                next_cursor: None,
            });
        }

        let payload = next_cursor
            .map(|cursor| json!({ "cursor": cursor }))
            .unwrap_or_else(|| json!({}));

        self.send_request("tools/list", payload).await
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, Error> {
        if self.capabilities()?.tools.is_none() {
            return Err(Error::RpcError {
                code: METHOD_NOT_FOUND,
                message: "Server does not support 'tools' capability".to_string(),
            });
        }

        let params = json!({ "name": name, "arguments": arguments });
        self.send_request("tools/call", params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Error as TransportError;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// In-memory MCP server answering the handful of methods the client uses
    #[derive(Clone)]
    struct MockTransport {
        replies_tx: mpsc::Sender<JsonRpcMessage>,
        replies_rx: Arc<Mutex<mpsc::Receiver<JsonRpcMessage>>>,
        with_tools: bool,
        notifications: Arc<Mutex<Vec<String>>>,
    }

    impl MockTransport {
        fn new(with_tools: bool) -> Self {
            let (tx, rx) = mpsc::channel(16);
            Self {
                replies_tx: tx,
                replies_rx: Arc::new(Mutex::new(rx)),
                with_tools,
                notifications: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn answer(&self, id: &RequestId, method: &str, params: &Map<String, Value>) -> Value {
            let id = serde_json::to_value(id).unwrap();
            match method {
                "initialize" => {
                    let capabilities = if self.with_tools {
                        json!({ "tools": {} })
                    } else {
                        json!({})
                    };
                    json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "result": {
                            "protocolVersion": PROTOCOL_VERSION,
                            "capabilities": capabilities,
                            "serverInfo": { "name": "mock-airbnb", "version": "0.0.1" }
                        }
                    })
                }
                "tools/list" => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "tools": [{
                            "name": "airbnb_search",
                            "description": "Search Airbnb listings",
                            "inputSchema": {
                                "type": "object",
                                "properties": { "location": { "type": "string" } }
                            }
                        }]
                    }
                }),
                "tools/call" if params["name"] == "airbnb_search" => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "content": [{
                            "type": "text",
                            "text": format!("listings in {}", params["arguments"]["location"])
                        }],
                        "isError": false
                    }
                }),
                _ => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": METHOD_NOT_FOUND, "message": "unknown tool" }
                }),
            }
        }
    }

    #[async_trait::async_trait]
    impl TransportHandle for MockTransport {
        async fn send(&self, message: JsonRpcMessage) -> Result<(), TransportError> {
            match message {
                JsonRpcMessage::Request(JsonRpcRequest { id, request, .. }) => {
                    let reply = self.answer(&id, &request.method, &request.params);
                    let reply: JsonRpcMessage = serde_json::from_value(reply)?;
                    self.replies_tx
                        .send(reply)
                        .await
                        .map_err(|_| TransportError::Closed)
                }
                JsonRpcMessage::Notification(JsonRpcNotification { notification, .. }) => {
                    self.notifications.lock().await.push(notification.method);
                    Ok(())
                }
                _ => Err(TransportError::NotSendable),
            }
        }

        async fn receive(&self) -> Result<JsonRpcMessage, TransportError> {
            self.replies_rx
                .lock()
                .await
                .recv()
                .await
                .ok_or(TransportError::Closed)
        }
    }

    fn client_info() -> ClientInfo {
        ClientInfo {
            name: "travelpilot-test".to_string(),
            version: "0.0.0".to_string(),
        }
    }

    async fn connected(with_tools: bool) -> (McpClient<MockTransport>, MockTransport) {
        let transport = MockTransport::new(with_tools);
        let client = McpClient::connect(transport.clone(), Duration::from_secs(5))
            .await
            .unwrap();
        (client, transport)
    }

    #[tokio::test]
    async fn test_calls_before_initialize_are_refused() {
        let (client, _) = connected(true).await;

        let err = client.list_tools(None).await.unwrap_err();
        assert!(matches!(err, Error::NotInitialized));

        let err = client
            .call_tool("airbnb_search", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotInitialized));
    }

    #[tokio::test]
    async fn test_initialize_records_server_and_sends_notification() {
        let (mut client, transport) = connected(true).await;

        let result = client
            .initialize(client_info(), ClientCapabilities::default())
            .await
            .unwrap();

        assert_eq!(result.server_info.name, "mock-airbnb");
        assert_eq!(client.server_info().unwrap().name, "mock-airbnb");
        assert_eq!(
            *transport.notifications.lock().await,
            vec!["notifications/initialized".to_string()]
        );
    }

    #[tokio::test]
    async fn test_list_and_call_tools() {
        let (mut client, _) = connected(true).await;
        client
            .initialize(client_info(), ClientCapabilities::default())
            .await
            .unwrap();

        let tools = client.list_tools(None).await.unwrap();
        assert_eq!(tools.tools.len(), 1);
        assert_eq!(tools.tools[0].name, "airbnb_search");

        let result = client
            .call_tool("airbnb_search", json!({ "location": "Goa" }))
            .await
            .unwrap();
        let text = result.content[0].as_text().unwrap().text.clone();
        assert_eq!(text, "listings in \"Goa\"");
        assert_eq!(result.is_error, Some(false));
    }

    #[tokio::test]
    async fn test_rpc_errors_are_surfaced() {
        let (mut client, _) = connected(true).await;
        client
            .initialize(client_info(), ClientCapabilities::default())
            .await
            .unwrap();

        let err = client.call_tool("no_such_tool", json!({})).await.unwrap_err();
        match err {
            Error::RpcError { code, message } => {
                assert_eq!(code, METHOD_NOT_FOUND);
                assert_eq!(message, "unknown tool");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_server_without_tools_capability() {
        let (mut client, _) = connected(false).await;
        client
            .initialize(client_info(), ClientCapabilities::default())
            .await
            .unwrap();

        assert!(client.list_tools(None).await.unwrap().tools.is_empty());
        assert!(matches!(
            client.call_tool("airbnb_search", json!({})).await,
            Err(Error::RpcError { .. })
        ));
    }
}
