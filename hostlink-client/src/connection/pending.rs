//! Outstanding request table for one physical connection

use std::collections::HashMap;
use std::sync::Arc;

use hostlink_protocol::Response;
use hostlink_utils::{HostlinkError, Result};
use parking_lot::Mutex;
use tokio::sync::oneshot;

type Reply = oneshot::Sender<Result<Response>>;

struct Table {
    /// Cleared once the connection dies; nothing may register after that
    open: bool,
    waiters: HashMap<String, Reply>,
}

/// Requests awaiting a response, keyed by correlation id
///
/// Registering and failing happen under the same lock, so a request either
/// lands in the table before it is drained or is refused outright. No
/// request can be stranded by a connection that died mid-registration.
pub(crate) struct PendingRequests {
    table: Mutex<Table>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                open: true,
                waiters: HashMap::new(),
            }),
        }
    }

    /// Reserve a slot for `id`
    pub fn register(self: &Arc<Self>, id: &str) -> Result<Waiter> {
        let (tx, rx) = oneshot::channel();
        {
            let mut table = self.table.lock();
            if !table.open {
                return Err(HostlinkError::ConnectionLost);
            }
            table.waiters.insert(id.to_string(), tx);
        }
        Ok(Waiter {
            id: id.to_string(),
            rx,
            pending: Arc::clone(self),
        })
    }

    /// Complete the request matching the response's id
    ///
    /// Returns `false` when no request is waiting for it.
    pub fn resolve(&self, response: Response) -> bool {
        let Some(id) = response.id.as_deref() else {
            return false;
        };
        let reply = self.table.lock().waiters.remove(id);
        match reply {
            Some(reply) => {
                // The caller may have stopped waiting; that is fine
                let _ = reply.send(Ok(response));
                true
            }
            None => false,
        }
    }

    /// Fail the request waiting on `id` with `error`
    ///
    /// Used when a reply carried a known id but could not be decoded.
    pub fn reject(&self, id: &str, error: HostlinkError) -> bool {
        let reply = self.table.lock().waiters.remove(id);
        match reply {
            Some(reply) => {
                let _ = reply.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Close the table and fail every outstanding request
    pub fn fail_all(&self) -> usize {
        let drained: Vec<Reply> = {
            let mut table = self.table.lock();
            table.open = false;
            table.waiters.drain().map(|(_, reply)| reply).collect()
        };
        let count = drained.len();
        for reply in drained {
            let _ = reply.send(Err(HostlinkError::ConnectionLost));
        }
        count
    }

    pub fn is_open(&self) -> bool {
        self.table.lock().open
    }

    pub fn len(&self) -> usize {
        self.table.lock().waiters.len()
    }

    fn remove(&self, id: &str) {
        self.table.lock().waiters.remove(id);
    }
}

/// Receiving side of one registered request
///
/// Dropping it before completion releases the slot.
pub(crate) struct Waiter {
    id: String,
    rx: oneshot::Receiver<Result<Response>>,
    pending: Arc<PendingRequests>,
}

impl Waiter {
    pub async fn wait(mut self) -> Result<Response> {
        match (&mut self.rx).await {
            Ok(result) => result,
            Err(_) => Err(HostlinkError::ConnectionLost),
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}
