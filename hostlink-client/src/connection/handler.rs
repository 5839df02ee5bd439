//! Push event handler trait and utilities

use hostlink_protocol::PushEvent;
use tokio::sync::mpsc;

/// Receives unsolicited events pushed by the host
///
/// Calls arrive one at a time, in wire order, on a task separate from the
/// connection's receive loop. A slow handler delays later events but never
/// responses.
pub trait EventHandler: Send + Sync + 'static {
    fn handle(&self, event: PushEvent);

    /// Called when a connection is established
    fn on_connected(&self) {}

    /// Called when a connection is lost or closed
    fn on_disconnected(&self) {}
}

/// Simple callback-based handler
pub struct CallbackHandler<F>
where
    F: Fn(PushEvent) + Send + Sync + 'static,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: Fn(PushEvent) + Send + Sync + 'static,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> EventHandler for CallbackHandler<F>
where
    F: Fn(PushEvent) + Send + Sync + 'static,
{
    fn handle(&self, event: PushEvent) {
        (self.callback)(event);
    }
}

/// Forward events into a channel
impl EventHandler for mpsc::UnboundedSender<PushEvent> {
    fn handle(&self, event: PushEvent) {
        let _ = self.send(event);
    }
}
