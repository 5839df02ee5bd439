//! Command dispatch
//!
//! Turns one [`Command`] into exactly one [`Response`]. Reads run on the
//! calling task; writes are marshalled to the host main thread and bounded by
//! the write timeout. Handler failures and panics become error responses, so
//! nothing a handler does can take down the connection.

mod operations;
mod params;

pub use operations::{
    Handler, OperationEntry, OperationError, OperationKind, OperationRegistry, OperationResult,
};
pub use params::ParamsExt;

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use hostlink_protocol::{Command, Params, Response};
use serde_json::Value;
use tracing::{debug, warn};

use crate::main_thread::MainThreadHandle;

/// Routes commands to registered operations
pub struct Dispatcher {
    operations: Arc<OperationRegistry>,
    main_thread: MainThreadHandle,
    write_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        operations: OperationRegistry,
        main_thread: MainThreadHandle,
        write_timeout: Duration,
    ) -> Self {
        Self {
            operations: Arc::new(operations),
            main_thread,
            write_timeout,
        }
    }

    /// Scheduling class of a command type, if it is registered
    pub fn kind_of(&self, command_type: &str) -> Option<OperationKind> {
        self.operations.lookup(command_type).map(|entry| entry.kind)
    }

    pub fn operations(&self) -> &OperationRegistry {
        &self.operations
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Execute a command and build its response
    pub async fn dispatch(&self, command: Command) -> Response {
        let Command {
            id,
            command_type,
            params,
        } = command;

        let Some(entry) = self.operations.lookup(&command_type) else {
            warn!(id = ?id, command = %command_type, "Unknown command");
            return Response::error(id, format!("Unknown command: {}", command_type));
        };

        debug!(id = ?id, command = %command_type, kind = %entry.kind, "Dispatching command");

        let outcome = match entry.kind {
            OperationKind::Read => invoke(&entry.handler, &params),
            OperationKind::Write => self.run_write(&entry.handler, params).await,
        };

        match outcome {
            Ok(result) => Response::success(id, result),
            Err(message) => {
                warn!(id = ?id, command = %command_type, %message, "Command failed");
                Response::error(id, message)
            }
        }
    }

    async fn run_write(&self, handler: &Handler, params: Params) -> Result<Value, String> {
        let handler = Arc::clone(handler);
        self.main_thread
            .call(move || invoke(&handler, &params), self.write_timeout)
            .await
            .unwrap_or_else(|e| Err(e.to_string()))
    }
}

/// Run a handler, converting errors and panics to a message
fn invoke(handler: &Handler, params: &Params) -> Result<Value, String> {
    match catch_unwind(AssertUnwindSafe(|| handler(params))) {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(format!("Operation panicked: {}", panic_message(&*panic))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
