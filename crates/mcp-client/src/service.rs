//! Pairs requests with their replies on top of a [`TransportHandle`].
//!
//! A handle only moves whole messages. The client's receive loop reads every
//! reply and passes it to [`McpService::respond`], which wakes the call that
//! sent the request with that id. Wrapping this in a tower `Service` lets a
//! timeout layer bound each call.

use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use rmcp::model::JsonRpcMessage;
use tokio::sync::{oneshot, Mutex};
use tower::Service;

use crate::transport::{Error, TransportHandle};

type Reply = Result<JsonRpcMessage, Error>;

/// Requests written to the server whose reply has not been read yet
#[derive(Default)]
struct Inflight {
    waiting: Mutex<HashMap<String, oneshot::Sender<Reply>>>,
}

impl Inflight {
    async fn register(&self, id: String) -> oneshot::Receiver<Reply> {
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().await.insert(id, tx);
        rx
    }

    async fn forget(&self, id: &str) {
        self.waiting.lock().await.remove(id);
    }

    /// False when no call is waiting on `id`, or it gave up already
    async fn resolve(&self, id: &str, reply: Reply) -> bool {
        match self.waiting.lock().await.remove(id) {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    async fn fail_all(&self, error: &Error) -> usize {
        let mut waiting = self.waiting.lock().await;
        let failed = waiting.len();
        for (_, tx) in waiting.drain() {
            let _ = tx.send(Err(error.for_waiter()));
        }
        failed
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.waiting.lock().await.len()
    }
}

/// Sends one message per call. A request resolves with the server's reply, a
/// notification with `None` once it is written.
#[derive(Clone)]
pub struct McpService<T> {
    handle: Arc<T>,
    inflight: Arc<Inflight>,
}

impl<T: TransportHandle> McpService<T> {
    pub fn new(handle: T) -> Self {
        Self {
            handle: Arc::new(handle),
            inflight: Arc::new(Inflight::default()),
        }
    }

    /// Hand a reply read from the server to the call that sent request `id`
    pub async fn respond(&self, id: &str, reply: Reply) {
        if !self.inflight.resolve(id, reply).await {
            tracing::debug!(id, "Dropping reply nobody is waiting for");
        }
    }

    /// The connection is gone; fail every call still waiting for a reply
    pub async fn hangup(&self, error: Error) {
        let failed = self.inflight.fail_all(&error).await;
        if failed > 0 {
            tracing::warn!(failed, error = %error, "MCP server went away mid-request");
        }
    }
}

impl<T: TransportHandle> Service<JsonRpcMessage> for McpService<T> {
    type Response = Option<JsonRpcMessage>;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, message: JsonRpcMessage) -> Self::Future {
        let handle = self.handle.clone();
        let inflight = self.inflight.clone();

        Box::pin(async move {
            let id = match &message {
                JsonRpcMessage::Request(request) => request.id.to_string(),
                JsonRpcMessage::Notification(_) => {
                    handle.send(message).await?;
                    return Ok(None);
                }
                _ => return Err(Error::NotSendable),
            };

            // registered before sending, a fast server may answer at once
            let reply = inflight.register(id.clone()).await;
            if let Err(e) = handle.send(message).await {
                inflight.forget(&id).await;
                return Err(e);
            }
            reply.await.map_err(|_| Error::Closed)?.map(Some)
        })
    }
}
