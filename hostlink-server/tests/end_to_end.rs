//! End-to-end tests: real TCP server, raw sockets and the client library

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hostlink_client::{Connection, HostApi, ParameterSync, SyncEventHandler};
use hostlink_protocol::{ParamKey, Params};
use hostlink_server::host::{Host, Project};
use hostlink_server::{
    ClientRegistry, Dispatcher, MainThread, OperationError, OperationRegistry, Server,
    ServerConfig, SharedState,
};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

const WAIT: Duration = Duration::from_secs(3);

struct TestServer {
    addr: SocketAddr,
    registry: Arc<ClientRegistry>,
    shutdown: tokio::sync::broadcast::Sender<()>,
    _main: MainThread,
}

impl TestServer {
    async fn start(ops: OperationRegistry, write_timeout: Duration) -> Self {
        let registry = Arc::new(ClientRegistry::new());
        Self::start_with(ops, registry, write_timeout).await
    }

    async fn start_with(
        ops: OperationRegistry,
        registry: Arc<ClientRegistry>,
        write_timeout: Duration,
    ) -> Self {
        let main = MainThread::spawn("e2e-main", 64).unwrap();
        let dispatcher = Dispatcher::new(ops, main.handle(), write_timeout);
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        let state = SharedState::new(dispatcher, Arc::clone(&registry), config);
        let server = Server::bind(state).await.unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        tokio::spawn(server.run());
        Self {
            addr,
            registry,
            shutdown,
            _main: main,
        }
    }

    /// Demo host wired the way the server binary does it
    async fn demo() -> Self {
        let registry = Arc::new(ClientRegistry::new());
        let host = Host::new(Project::demo(), Arc::clone(&registry));
        let mut ops = OperationRegistry::new();
        host.register_operations(&mut ops);
        Self::start_with(ops, registry, Duration::from_secs(2)).await
    }

    async fn raw(&self) -> RawClient {
        let stream = TcpStream::connect(self.addr).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        RawClient {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    async fn wait_for_clients(&self, count: usize) {
        tokio::time::timeout(WAIT, async {
            while self.registry.client_count() != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("client count never reached");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

struct RawClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl RawClient {
    async fn send_line(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    async fn read_line(&mut self) -> String {
        let mut line = String::new();
        tokio::time::timeout(WAIT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a line")
            .unwrap();
        line.trim_end().to_string()
    }

    async fn read_json(&mut self) -> Value {
        serde_json::from_str(&self.read_line().await).unwrap()
    }
}

fn basic_ops() -> OperationRegistry {
    let mut ops = OperationRegistry::new();
    ops.register_read("get_state", |_| Ok(json!({"x": 1})))
        .register_read("ping", |_| Ok(json!({"pong": true})))
        .register_write("fail", |_| Err(OperationError::failed("Host refused")))
        .register_write("echo", |params: &Params| Ok(Value::Object(params.clone())))
        .register_write("stall", |_| {
            std::thread::sleep(Duration::from_millis(400));
            Ok(json!("late"))
        });
    ops
}

#[tokio::test]
async fn test_read_response_wire_format() {
    let server = TestServer::start(basic_ops(), Duration::from_secs(2)).await;
    let mut client = server.raw().await;

    client.send_line(r#"{"id":"1","type":"get_state"}"#).await;
    assert_eq!(
        client.read_line().await,
        r#"{"id":"1","status":"success","result":{"x":1}}"#
    );
}

#[tokio::test]
async fn test_unknown_command() {
    let server = TestServer::start(basic_ops(), Duration::from_secs(2)).await;
    let mut client = server.raw().await;

    client.send_line(r#"{"id":"u","type":"frobnicate","params":{}}"#).await;
    assert_eq!(
        client.read_json().await,
        json!({"id": "u", "status": "error", "message": "Unknown command: frobnicate"})
    );
}

#[tokio::test]
async fn test_malformed_line_is_skipped() {
    let server = TestServer::start(basic_ops(), Duration::from_secs(2)).await;
    let mut client = server.raw().await;

    client.send_line("{not json").await;
    client.send_line(r#"{"id":"2","type":"ping"}"#).await;

    let response = client.read_json().await;
    assert_eq!(response["id"], "2");
    assert_eq!(response["result"], json!({"pong": true}));
}

#[tokio::test]
async fn test_write_error_then_read_succeeds() {
    let server = TestServer::start(basic_ops(), Duration::from_secs(2)).await;
    let mut client = server.raw().await;

    client.send_line(r#"{"id":"w","type":"fail"}"#).await;
    assert_eq!(
        client.read_json().await,
        json!({"id": "w", "status": "error", "message": "Host refused"})
    );

    client.send_line(r#"{"id":"r","type":"ping"}"#).await;
    let response = client.read_json().await;
    assert_eq!(response["status"], "success");
}

#[tokio::test]
async fn test_write_timeout_reports_error() {
    let server = TestServer::start(basic_ops(), Duration::from_millis(100)).await;
    let mut client = server.raw().await;

    client.send_line(r#"{"id":"t","type":"stall"}"#).await;
    assert_eq!(
        client.read_json().await,
        json!({"id": "t", "status": "error", "message": "Timeout waiting for main thread"})
    );
}

#[tokio::test]
async fn test_concurrent_writes_correlate() {
    let server = TestServer::start(basic_ops(), Duration::from_secs(2)).await;
    let conn = Connection::new(server.addr.to_string());

    let mut tasks = Vec::new();
    for n in 0..16 {
        let conn = conn.clone();
        tasks.push(tokio::spawn(async move {
            let mut params = Params::new();
            params.insert("n".into(), json!(n));
            let result = conn.cmd("echo", params).await.unwrap();
            (n, result)
        }));
    }

    for task in tasks {
        let (n, result) = task.await.unwrap();
        assert_eq!(result, json!({"n": n}));
    }
    server.wait_for_clients(1).await;
}

#[tokio::test]
async fn test_push_events_reach_every_client() {
    let server = TestServer::demo().await;
    let mut watcher = server.raw().await;
    let mut actor = server.raw().await;
    server.wait_for_clients(2).await;

    actor
        .send_line(r#"{"id":"t","type":"set_tempo","params":{"tempo":128}}"#)
        .await;

    let expected = json!({"type": "tempo_changed", "data": {"tempo": 128.0, "old_tempo": 120.0}});
    assert_eq!(watcher.read_json().await, expected);

    // The actor sees the event ahead of its own response
    assert_eq!(actor.read_json().await, expected);
    let response = actor.read_json().await;
    assert_eq!(response["id"], "t");
    assert_eq!(response["result"], json!({"old_tempo": 120.0, "tempo": 128.0}));
}

#[tokio::test]
async fn test_parameter_sync_against_demo_host() {
    let server = TestServer::demo().await;
    let api = HostApi::new(Connection::new(server.addr.to_string()));

    let snapshot = api.get_state().await.unwrap();
    let (sync, mut changes) = ParameterSync::new(Duration::from_millis(150));
    sync.start(&snapshot);
    api.connection()
        .set_event_handler(SyncEventHandler::new(sync.clone()));

    let status = api.start_parameter_listeners().await.unwrap();
    assert!(status.listening);
    assert_eq!(status.parameters, 5);

    let cutoff = ParamKey::new(0, 0, 0);
    for value in [0.6, 0.7, 0.8] {
        api.set_parameter(cutoff, value).await.unwrap();
    }

    let change = tokio::time::timeout(WAIT, changes.recv())
        .await
        .expect("no change reported")
        .unwrap();
    assert_eq!(change.key(), cutoff);
    assert_eq!(change.old_value, 0.5);
    assert_eq!(change.new_value, 0.8);
    assert_eq!(change.names.track, "Bass");
    assert_eq!(change.names.device, "Filter");
    assert_eq!(change.names.parameter, "Cutoff");

    // Nothing else settles: the initial notifications were suppressed
    let extra = tokio::time::timeout(Duration::from_millis(400), changes.recv()).await;
    assert!(extra.is_err());

    let status = api.stop_parameter_listeners().await.unwrap();
    assert!(!status.listening);
    sync.stop();
}

#[tokio::test]
async fn test_rename_updates_synced_names() {
    let server = TestServer::demo().await;
    let api = HostApi::new(Connection::new(server.addr.to_string()));

    let snapshot = api.get_state().await.unwrap();
    let (sync, mut changes) = ParameterSync::new(Duration::from_millis(100));
    sync.start(&snapshot);
    api.connection()
        .set_event_handler(SyncEventHandler::new(sync.clone()));
    api.start_parameter_listeners().await.unwrap();

    let rename = api.rename_track(1, "Kit").await.unwrap();
    assert_eq!(rename.old_name, "Drums");

    api.set_parameter(ParamKey::new(1, 0, 1), 6.0).await.unwrap();

    let change = tokio::time::timeout(WAIT, changes.recv())
        .await
        .expect("no change reported")
        .unwrap();
    assert_eq!(change.names.track, "Kit");
    assert_eq!(change.names.parameter, "Ratio");
    assert_eq!((change.old_value, change.new_value), (4.0, 6.0));
}
