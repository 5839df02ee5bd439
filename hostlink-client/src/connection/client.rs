//! Connection client for the host dispatch server

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use hostlink_protocol::{ClientCodec, Command, Frame, Params, PushEvent, Response, ServerFrame};
use hostlink_utils::{HostlinkError, Result};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::handler::EventHandler;
use super::pending::PendingRequests;
use crate::config::ClientConfig;

/// How long a connection attempt may take before giving up
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Commands buffered for the writer task
const OUTGOING_BUFFER: usize = 100;

type Transport = Framed<TcpStream, ClientCodec>;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Client connection to the host dispatch server
///
/// Cheap to clone; every clone shares one physical connection. The link is
/// opened on first use and reopened on the next request after it drops.
/// Requests that were in flight when it dropped fail with
/// [`HostlinkError::ConnectionLost`]; they are never retried automatically
/// since their outcome on the host is unknown.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    addr: String,
    connect_timeout: Duration,
    /// Guards connection establishment so concurrent callers share one attempt
    link: Mutex<Option<Link>>,
    shared: Arc<Shared>,
}

/// State shared with the background tasks
struct Shared {
    state_tx: watch::Sender<ConnectionState>,
    /// Bumped for every connection attempt so stale tasks cannot clobber state
    generation: AtomicU64,
    handler: RwLock<Option<Arc<dyn EventHandler>>>,
}

impl Shared {
    fn handler(&self) -> Option<Arc<dyn EventHandler>> {
        self.handler.read().clone()
    }

    /// Mark the link from `generation` as gone, unless a newer one replaced it
    ///
    /// `on_disconnected` only fires for a generation that got as far as
    /// `Connected`, so a failed attempt produces no hook calls at all.
    fn mark_disconnected(&self, generation: u64) -> bool {
        let mut was_connected = false;
        let changed = self.state_tx.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation
                || *state == ConnectionState::Disconnected
            {
                return false;
            }
            was_connected = *state == ConnectionState::Connected;
            *state = ConnectionState::Disconnected;
            true
        });

        if was_connected {
            if let Some(handler) = self.handler() {
                handler.on_disconnected();
            }
        }
        changed
    }
}

/// One physical connection and its tasks
struct Link {
    tx: mpsc::Sender<Command>,
    pending: Arc<PendingRequests>,
    tasks: Vec<JoinHandle<()>>,
}

/// What a request needs from a live link
struct LinkHandle {
    tx: mpsc::Sender<Command>,
    pending: Arc<PendingRequests>,
}

impl Link {
    fn spawn(stream: TcpStream, generation: u64, shared: Arc<Shared>) -> Self {
        let (sink, stream) = Framed::new(stream, ClientCodec::new()).split();
        let (tx, rx) = mpsc::channel(OUTGOING_BUFFER);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(PendingRequests::new());

        let tasks = vec![
            tokio::spawn(write_loop(sink, rx, Arc::clone(&pending))),
            tokio::spawn(event_loop(event_rx, Arc::clone(&shared))),
            tokio::spawn(read_loop(
                stream,
                Arc::clone(&pending),
                event_tx,
                shared,
                generation,
            )),
        ];

        Self { tx, pending, tasks }
    }

    fn is_alive(&self) -> bool {
        self.pending.is_open()
    }

    fn handle(&self) -> LinkHandle {
        LinkHandle {
            tx: self.tx.clone(),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Connection {
    /// Create a connection to `addr` (`host:port`); nothing is dialled yet
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_connect_timeout(addr, DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn with_connect_timeout(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                addr: addr.into(),
                connect_timeout,
                link: Mutex::new(None),
                shared: Arc::new(Shared {
                    state_tx,
                    generation: AtomicU64::new(0),
                    handler: RwLock::new(None),
                }),
            }),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.addr())
    }

    pub fn addr(&self) -> &str {
        &self.inner.addr
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        *self.inner.shared.state_tx.borrow()
    }

    /// Watch connection state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state_tx.subscribe()
    }

    /// Install the push event handler, replacing any previous one
    pub fn set_event_handler<H: EventHandler>(&self, handler: H) {
        *self.inner.shared.handler.write() = Some(Arc::new(handler));
    }

    pub fn clear_event_handler(&self) {
        *self.inner.shared.handler.write() = None;
    }

    /// Connect now instead of on the first request
    pub async fn connect(&self) -> Result<()> {
        self.ensure_connected().await.map(|_| ())
    }

    /// Close the link, failing anything still in flight
    pub async fn disconnect(&self) {
        let link = self.inner.link.lock().await.take();
        if let Some(link) = link {
            let failed = link.pending.fail_all();
            drop(link);

            let shared = &self.inner.shared;
            shared.mark_disconnected(shared.generation.load(Ordering::SeqCst));
            info!(failed, "Disconnected from host at {}", self.inner.addr);
        }
    }

    /// Send a command and wait for its response
    pub async fn send(&self, command_type: &str, params: Params) -> Result<Response> {
        self.send_command(Command::new(command_type, params)).await
    }

    /// Send a prepared command under a fresh correlation id
    ///
    /// Any id already on the command is replaced.
    pub async fn send_command(&self, command: Command) -> Result<Response> {
        let id = Uuid::new_v4().to_string();
        let command = command.with_id(id.clone());

        let link = self.ensure_connected().await?;
        let waiter = link.pending.register(&id)?;

        trace!(id = %id, command = %command.command_type, "Sending command");
        if link.tx.send(command).await.is_err() {
            return Err(HostlinkError::ConnectionLost);
        }

        waiter.wait().await
    }

    async fn ensure_connected(&self) -> Result<LinkHandle> {
        let mut link = self.inner.link.lock().await;

        if let Some(existing) = link.as_ref() {
            if existing.is_alive() {
                return Ok(existing.handle());
            }
            debug!("Discarding dead connection to {}", self.inner.addr);
        }
        *link = None;

        let shared = &self.inner.shared;
        let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        shared.state_tx.send_replace(ConnectionState::Connecting);

        let connect = TcpStream::connect(&self.inner.addr);
        let stream = match tokio::time::timeout(self.inner.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                shared.mark_disconnected(generation);
                return Err(HostlinkError::connection(format!(
                    "Failed to connect to {}: {}",
                    self.inner.addr, e
                )));
            }
            Err(_) => {
                shared.mark_disconnected(generation);
                return Err(HostlinkError::ConnectionTimeout {
                    seconds: self.inner.connect_timeout.as_secs(),
                });
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }

        shared.state_tx.send_replace(ConnectionState::Connected);
        let new_link = Link::spawn(stream, generation, Arc::clone(shared));
        let handle = new_link.handle();
        *link = Some(new_link);
        drop(link);

        info!("Connected to host at {}", self.inner.addr);
        if let Some(handler) = shared.handler() {
            handler.on_connected();
        }

        Ok(handle)
    }
}

async fn write_loop(
    mut sink: SplitSink<Transport, Command>,
    mut outgoing: mpsc::Receiver<Command>,
    pending: Arc<PendingRequests>,
) {
    while let Some(command) = outgoing.recv().await {
        if let Err(e) = sink.send(command).await {
            error!("Failed to send command: {}", e);
            pending.fail_all();
            break;
        }
    }
}

async fn read_loop(
    mut stream: SplitStream<Transport>,
    pending: Arc<PendingRequests>,
    events: mpsc::UnboundedSender<PushEvent>,
    shared: Arc<Shared>,
    generation: u64,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Frame::Message(ServerFrame::Response(response))) => {
                let id = response.id.clone();
                if !pending.resolve(response) {
                    debug!(id = ?id, "Dropping response with no waiting request");
                }
            }
            Ok(Frame::Message(ServerFrame::Push(event))) => {
                trace!(event = %event.event_type, "Received push event");
                if events.send(event).is_err() {
                    debug!("Event task gone, dropping push event");
                }
            }
            Ok(Frame::Malformed { error, .. }) => {
                warn!(%error, "Ignoring malformed frame from host");
            }
            Ok(Frame::Invalid { id: Some(id), error }) => {
                warn!(%id, %error, "Undecodable response from host");
                let error = HostlinkError::protocol(format!("Invalid response: {}", error));
                pending.reject(&id, error);
            }
            Ok(Frame::Invalid { id: None, error }) => {
                warn!(%error, "Ignoring unrecognized frame from host");
            }
            Err(e) => {
                error!("Failed to receive from host: {}", e);
                break;
            }
        }
    }

    let failed = pending.fail_all();
    info!(failed, "Host connection closed");
    shared.mark_disconnected(generation);
}

async fn event_loop(mut events: mpsc::UnboundedReceiver<PushEvent>, shared: Arc<Shared>) {
    while let Some(event) = events.recv().await {
        let Some(handler) = shared.handler() else {
            trace!(event = %event.event_type, "No event handler installed");
            continue;
        };
        if catch_unwind(AssertUnwindSafe(|| handler.handle(event))).is_err() {
            error!("Push event handler panicked");
        }
    }
}
