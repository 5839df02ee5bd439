//! Per-connection command loop
//!
//! Lines that are not JSON are logged and skipped. JSON that is not a
//! well-formed command still gets an error response when it carries an id.
//!
//! Each connection gets a writer task draining its outbound queue, and a read
//! loop that decodes commands. Read operations run inline, so their responses
//! go out in arrival order. Write operations are spawned so a slow main thread
//! never blocks the read loop; their responses may overtake or trail others
//! and are matched by id on the client.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use hostlink_protocol::{encode_line, Command, Frame, Response, ServerCodec};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{BytesCodec, FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use crate::dispatch::OperationKind;
use crate::registry::ClientId;
use crate::SharedState;

/// Longest slice of a malformed line echoed into the logs
const MALFORMED_PREVIEW_LEN: usize = 200;

/// Serve one client until it disconnects or the server shuts down
pub async fn handle_client<R, W>(reader: R, writer: W, peer: Option<SocketAddr>, state: SharedState)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Bytes>(state.config.outbound_buffer);
    let client_id = state.registry.register_client(tx.clone(), peer);
    info!(client = %client_id, peer = ?peer, "Client connected");

    tokio::spawn(write_loop(writer, rx, client_id));

    let mut frames = FramedRead::new(reader, ServerCodec::new());
    let mut shutdown_rx = state.subscribe_shutdown();

    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(Ok(Frame::Message(command))) => {
                    handle_command(command, &state, &tx, client_id).await;
                }
                Some(Ok(Frame::Malformed { line, error })) => {
                    warn!(
                        client = %client_id,
                        %error,
                        line = preview(&line),
                        "Ignoring malformed frame"
                    );
                }
                Some(Ok(Frame::Invalid { id: Some(id), error })) => {
                    warn!(client = %client_id, %id, %error, "Rejecting invalid command");
                    let response = Response::error(Some(id), format!("Invalid command: {}", error));
                    send_response(&tx, response, client_id).await;
                }
                Some(Ok(Frame::Invalid { id: None, error })) => {
                    warn!(client = %client_id, %error, "Ignoring invalid command without id");
                }
                Some(Err(e)) => {
                    error!(client = %client_id, error = %e, "Connection read failed");
                    break;
                }
                None => {
                    debug!(client = %client_id, "Client closed connection");
                    break;
                }
            },
            _ = shutdown_rx.recv() => {
                debug!(client = %client_id, "Shutdown signal received, closing connection");
                break;
            }
        }
    }

    // The writer exits once in-flight writes release their queue handles
    state.registry.unregister_client(client_id);
    info!(client = %client_id, "Client disconnected");
}

async fn handle_command(
    command: Command,
    state: &SharedState,
    tx: &mpsc::Sender<Bytes>,
    client_id: ClientId,
) {
    match state.dispatcher.kind_of(&command.command_type) {
        Some(OperationKind::Write) => {
            let dispatcher = Arc::clone(&state.dispatcher);
            let tx = tx.clone();
            tokio::spawn(async move {
                let response = dispatcher.dispatch(command).await;
                send_response(&tx, response, client_id).await;
            });
        }
        _ => {
            let response = state.dispatcher.dispatch(command).await;
            send_response(tx, response, client_id).await;
        }
    }
}

async fn send_response(tx: &mpsc::Sender<Bytes>, response: Response, client_id: ClientId) {
    let line = match encode_line(&response) {
        Ok(line) => line,
        Err(e) => {
            error!(client = %client_id, error = %e, "Failed to encode response");
            let fallback = Response::error(response.id, format!("Failed to encode response: {}", e));
            match encode_line(&fallback) {
                Ok(line) => line,
                Err(_) => return,
            }
        }
    };

    if tx.send(line).await.is_err() {
        debug!(client = %client_id, "Connection gone, dropping response");
    }
}

async fn write_loop<W>(writer: W, mut rx: mpsc::Receiver<Bytes>, client_id: ClientId)
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, BytesCodec::new());
    while let Some(line) = rx.recv().await {
        if let Err(e) = sink.send(line).await {
            warn!(client = %client_id, error = %e, "Connection write failed");
            break;
        }
    }
    debug!(client = %client_id, "Writer finished");
}

fn preview(line: &str) -> &str {
    if line.len() <= MALFORMED_PREVIEW_LEN {
        return line;
    }
    let mut end = MALFORMED_PREVIEW_LEN;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}
