//! hostlink-server - serves the demo host over TCP
//!
//! Wires the main-thread executor, the demo host's operations and the client
//! registry together, then accepts connections until Ctrl-C.

mod cli;

use std::sync::Arc;

use hostlink_server::host::{Host, Project};
use hostlink_server::{
    ClientRegistry, ConfigLoader, Dispatcher, MainThread, OperationKind, OperationRegistry,
    Server, SharedState,
};
use hostlink_utils::{init_logging_with_config, log_dir, Result};
use tracing::{error, info};

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    init_logging_with_config(args.log_config())?;
    info!("hostlink-server starting");
    if args.log_file {
        info!(dir = %log_dir().display(), "Writing logs to file");
    }

    match run(args).await {
        Ok(()) => {
            info!("hostlink-server stopped");
            Ok(())
        }
        Err(e) => {
            error!("hostlink-server error: {}", e);
            Err(e)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_from_path(path)?,
        None => ConfigLoader::load()?,
    };
    args.apply(&mut config.server);
    ConfigLoader::validate(&config)?;

    let main_thread = MainThread::spawn("host-main", config.server.main_queue_capacity)?;
    let registry = Arc::new(ClientRegistry::new());

    let host = Host::new(Project::demo(), Arc::clone(&registry));
    let mut operations = OperationRegistry::new();
    host.register_operations(&mut operations);
    info!(
        reads = ?operations.names(OperationKind::Read),
        writes = ?operations.names(OperationKind::Write),
        "Registered host operations"
    );

    let dispatcher = Dispatcher::new(
        operations,
        main_thread.handle(),
        config.server.write_timeout(),
    );
    let state = SharedState::new(dispatcher, registry, config.server.clone());
    let server = Server::bind(state).await?;

    let shutdown_tx = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                let _ = shutdown_tx.send(());
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await;
    Ok(())
}
