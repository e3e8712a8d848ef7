//! Connections to MCP servers that run as child processes.
//!
//! Starting a [`Transport`] launches the server. The [`TransportHandle`] it
//! returns moves whole JSON-RPC messages in both directions; framing and the
//! process itself stay behind the handle.

use async_trait::async_trait;
use rmcp::model::JsonRpcMessage;
use thiserror::Error;

pub mod stdio;
pub use stdio::StdioTransport;

#[derive(Debug, Error)]
pub enum Error {
    /// The server could not be launched, or it exited. Carries its stderr when
    /// there was any.
    #[error("MCP server process failed: {0}")]
    Process(String),

    #[error("Connection to the MCP server is closed")]
    Closed,

    #[error("Could not encode message for the MCP server: {0}")]
    Encode(#[from] serde_json::Error),

    /// Only requests and notifications travel from client to server
    #[error("Only requests and notifications can be sent to an MCP server")]
    NotSendable,
}

impl Error {
    /// Copy handed to each request still waiting when the connection dies.
    /// A process failure keeps its message, anything else reads as closed.
    pub(crate) fn for_waiter(&self) -> Error {
        match self {
            Error::Process(msg) => Error::Process(msg.clone()),
            _ => Error::Closed,
        }
    }
}

#[async_trait]
pub trait Transport {
    type Handle: TransportHandle;

    /// Launch the server and hand back a connection to it
    async fn start(&self) -> Result<Self::Handle, Error>;
}

/// Cloneable connection to a running server
#[async_trait]
pub trait TransportHandle: Send + Sync + Clone + 'static {
    async fn send(&self, message: JsonRpcMessage) -> Result<(), Error>;

    /// Next message from the server. Fails once the server is gone.
    async fn receive(&self) -> Result<JsonRpcMessage, Error>;
}
