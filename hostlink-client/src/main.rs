//! hostlink - command-line client for the host dispatch server

use hostlink_client::{
    load_settings, load_settings_from, ClientSettings, Connection, ConnectionState, HostApi,
    ParameterSync, SyncEventHandler,
};
use hostlink_protocol::Params;
use hostlink_utils::{init_logging_with_config, HostlinkError, LogConfig, Result};
use serde::Serialize;

mod cli;

use cli::{Action, Args};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    init_logging_with_config(LogConfig::client())?;
    tracing::debug!("CLI args: {:?}", args);

    match run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!("hostlink error: {}", e);
            eprintln!("Error: {}", e);
            Err(e)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut settings = match &args.config {
        Some(path) => load_settings_from(path)?,
        None => load_settings(),
    };
    args.apply(&mut settings);
    settings.validate()?;

    let connection = Connection::from_config(&settings.client);
    let api = HostApi::new(connection.clone());

    match args.action {
        Action::Ping => {
            api.ping().await?;
            println!("pong");
        }
        Action::State => print_json(&api.get_state().await?)?,
        Action::Call {
            command_type,
            params,
        } => {
            let params = parse_params(params.as_deref())?;
            print_json(&connection.cmd(&command_type, params).await?)?;
        }
        Action::Watch { .. } => watch(&api, &settings).await?,
    }

    connection.disconnect().await;
    Ok(())
}

/// Stream debounced parameter changes to stdout until ctrl-c or disconnect
async fn watch(api: &HostApi, settings: &ClientSettings) -> Result<()> {
    let connection = api.connection();
    let snapshot = api.get_state().await?;

    let (sync, mut changes) = ParameterSync::new(settings.sync.window());
    sync.start(&snapshot);
    connection.set_event_handler(SyncEventHandler::new(sync.clone()));

    let status = api.start_parameter_listeners().await?;
    tracing::info!(parameters = status.parameters, "Watching parameter changes");

    let mut state = connection.subscribe_state();
    let result = loop {
        tokio::select! {
            Some(change) = changes.recv() => print_json(&change)?,
            _ = tokio::signal::ctrl_c() => break Ok(()),
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == ConnectionState::Disconnected {
                    break Err(HostlinkError::ConnectionLost);
                }
            }
        }
    };

    if result.is_ok() {
        if let Err(e) = api.stop_parameter_listeners().await {
            tracing::warn!(error = %e, "Failed to stop parameter listeners");
        }
    }
    connection.clear_event_handler();
    sync.stop();
    result
}

fn parse_params(raw: Option<&str>) -> Result<Params> {
    let Some(raw) = raw else {
        return Ok(Params::new());
    };
    match serde_json::from_str(raw)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(HostlinkError::protocol(format!(
            "params must be a JSON object, got {}",
            other
        ))),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
