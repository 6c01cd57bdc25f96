//! Request/response correlation for bidirectional transports.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::error::{McpError, McpResult};
use super::protocol::{IncomingMessage, JsonRpcResponse, reply_to_server_request};

type Waiter = oneshot::Sender<McpResult<Value>>;

/// In-flight requests awaiting a response from the reader task.
#[derive(Debug)]
pub(crate) struct PendingRequests {
    server: String,
    next_id: AtomicU64,
    closed: AtomicBool,
    waiters: Mutex<HashMap<u64, Waiter>>,
}

impl PendingRequests {
    pub(crate) fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            waiters: Mutex::new(HashMap::new()),
        }
    }

    fn waiters(&self) -> MutexGuard<'_, HashMap<u64, Waiter>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Allocates an id and a slot for its response.
    pub(crate) fn register(&self) -> McpResult<PendingRequest<'_>> {
        if self.is_closed() {
            return Err(McpError::transport(format!(
                "connection to `{}` is closed",
                self.server
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.waiters().insert(id, tx);
        Ok(PendingRequest {
            id,
            rx,
            owner: self,
        })
    }

    /// Routes one inbound frame to its waiter. Returns the reply the
    /// transport must send back when the frame was a server request.
    #[must_use]
    pub(crate) fn dispatch(&self, frame: &str) -> Option<JsonRpcResponse> {
        match IncomingMessage::parse(frame) {
            Ok(IncomingMessage::Response(response)) => {
                let Some(id) = response.numeric_id() else {
                    warn!(server = %self.server, "MCP response without numeric id dropped");
                    return None;
                };
                self.resolve(id, response.into_result());
            }
            Ok(IncomingMessage::Malformed { id, reason }) => {
                warn!(server = %self.server, id, %reason, "malformed MCP response");
                self.resolve(id, Err(McpError::protocol(reason)));
            }
            Ok(IncomingMessage::Request { id, method }) => {
                debug!(server = %self.server, %method, "answering MCP server request");
                return Some(reply_to_server_request(id, &method));
            }
            Ok(IncomingMessage::Notification { method }) => {
                debug!(server = %self.server, %method, "MCP server notification ignored");
            }
            Err(err) => {
                warn!(server = %self.server, error = %err, "unparseable MCP frame dropped");
            }
        }
        None
    }

    fn resolve(&self, id: u64, outcome: McpResult<Value>) {
        if let Some(waiter) = self.waiters().remove(&id) {
            let _ = waiter.send(outcome);
        } else {
            debug!(server = %self.server, id, "MCP response for unknown request dropped");
        }
    }

    /// Marks the connection closed and fails every waiter.
    pub(crate) fn fail_all(&self, reason: &str) {
        self.closed.store(true, Ordering::Release);
        let drained: Vec<_> = self.waiters().drain().collect();
        for (_, waiter) in drained {
            let _ = waiter.send(Err(McpError::transport(reason)));
        }
    }
}

/// A registered request. Dropping it releases its slot.
pub(crate) struct PendingRequest<'a> {
    id: u64,
    rx: oneshot::Receiver<McpResult<Value>>,
    owner: &'a PendingRequests,
}

impl PendingRequest<'_> {
    pub(crate) const fn id(&self) -> u64 {
        self.id
    }

    pub(crate) async fn wait(mut self) -> McpResult<Value> {
        match (&mut self.rx).await {
            Ok(outcome) => outcome,
            Err(_) => Err(McpError::transport(format!(
                "connection to `{}` closed before a response arrived",
                self.owner.server
            ))),
        }
    }
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        self.owner.waiters().remove(&self.id);
    }
}
