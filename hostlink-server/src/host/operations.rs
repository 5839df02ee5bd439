//! Host operations exposed through the dispatcher

use std::sync::atomic::Ordering;
use std::sync::Arc;

use hostlink_protocol::{events, Params, RawParameterValue};
use serde::Serialize;
use serde_json::{json, Value};

use super::Host;
use crate::dispatch::{OperationError, OperationRegistry, OperationResult, ParamsExt};

pub(super) fn register(host: &Arc<Host>, ops: &mut OperationRegistry) {
    ops.register_read("ping", bind(host, ping))
        .register_read("get_state", bind(host, get_state))
        .register_read("get_track", bind(host, get_track))
        .register_read("get_parameter", bind(host, get_parameter))
        .register_write("set_parameter", bind(host, set_parameter))
        .register_write("set_tempo", bind(host, set_tempo))
        .register_write("rename_track", bind(host, rename_track))
        .register_write("start_parameter_listeners", bind(host, start_parameter_listeners))
        .register_write("stop_parameter_listeners", bind(host, stop_parameter_listeners));
}

fn bind<F>(host: &Arc<Host>, op: F) -> impl Fn(&Params) -> OperationResult + Send + Sync + 'static
where
    F: Fn(&Host, &Params) -> OperationResult + Send + Sync + 'static,
{
    let host = Arc::clone(host);
    move |params: &Params| op(&host, params)
}

fn to_result<T: Serialize>(value: &T) -> OperationResult {
    serde_json::to_value(value).map_err(|e| OperationError::failed(e.to_string()))
}

fn ping(_host: &Host, _params: &Params) -> OperationResult {
    Ok(json!({ "pong": true }))
}

fn get_state(host: &Host, _params: &Params) -> OperationResult {
    to_result(host.project.read().snapshot())
}

fn get_track(host: &Host, params: &Params) -> OperationResult {
    let track_id = params.require_u32("track_id")?;
    to_result(host.project.read().track(track_id)?)
}

fn get_parameter(host: &Host, params: &Params) -> OperationResult {
    let key = params.require_param_key()?;
    to_result(host.project.read().parameter(key)?)
}

fn set_parameter(host: &Host, params: &Params) -> OperationResult {
    let key = params.require_param_key()?;
    let value = params.require_f64("value")?;

    let old_value = host.project.write().set_parameter(key, value)?;

    if host.is_listening() && old_value.to_bits() != value.to_bits() {
        host.emit(events::PARAMETER_CHANGED, to_result(&RawParameterValue::new(key, value))?);
    }

    Ok(json!({ "old_value": old_value, "value": value }))
}

fn set_tempo(host: &Host, params: &Params) -> OperationResult {
    let tempo = params.require_f64("tempo")?;
    let old_tempo = host.project.write().set_tempo(tempo)?;

    host.emit(events::TEMPO_CHANGED, json!({ "tempo": tempo, "old_tempo": old_tempo }));
    Ok(json!({ "old_tempo": old_tempo, "tempo": tempo }))
}

fn rename_track(host: &Host, params: &Params) -> OperationResult {
    let track_id = params.require_u32("track_id")?;
    let name = params.require_str("name")?;

    let (old_name, name) = {
        let mut project = host.project.write();
        let old_name = project.rename_track(track_id, name)?;
        (old_name, project.track(track_id)?.name.clone())
    };

    host.emit(
        events::TRACK_RENAMED,
        json!({ "track_id": track_id, "name": name, "old_name": old_name }),
    );
    Ok(json!({ "old_name": old_name, "name": name }))
}

/// Install listeners and fire the initial notification for every parameter
fn start_parameter_listeners(host: &Host, _params: &Params) -> OperationResult {
    host.listening.store(true, Ordering::SeqCst);

    let initial: Vec<Value> = host
        .project
        .read()
        .snapshot()
        .parameters()
        .map(|(key, param)| to_result(&RawParameterValue::new(key, param.value)))
        .collect::<Result<_, _>>()?;

    let count = initial.len();
    for data in initial {
        host.emit(events::PARAMETER_CHANGED, data);
    }

    Ok(json!({ "listening": true, "parameters": count }))
}

fn stop_parameter_listeners(host: &Host, _params: &Params) -> OperationResult {
    host.listening.store(false, Ordering::SeqCst);
    Ok(json!({ "listening": false }))
}
