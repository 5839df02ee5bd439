//! Debounced parameter change tracking
//!
//! Hosts report every intermediate value while a knob is being turned. This
//! engine coalesces each burst of raw notifications for one parameter into
//! a single [`ParameterChange`] carrying the value from before the burst and
//! the value it settled on, with names resolved from a cached snapshot.
//!
//! Per parameter:
//! - the first notification after [`ParameterSync::start`] is the host
//!   confirming its listener and is never reported;
//! - a notification repeating the last settled value (or the value already
//!   pending) is ignored;
//! - otherwise the quiet-period timer restarts, keeping the pre-burst value;
//! - when the timer expires the change is emitted, unless the burst ended
//!   where it began.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hostlink_protocol::{
    events, ParamKey, ParameterChange, ParameterNames, ProjectSnapshot, PushEvent,
    RawParameterValue,
};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::connection::EventHandler;

struct PendingBurst {
    /// Value before the burst started
    old_value: f64,
    /// Latest value seen in the burst
    value: f64,
    timer_id: u64,
    timer: JoinHandle<()>,
}

struct ParamState {
    last_value: f64,
    is_initial: bool,
    pending: Option<PendingBurst>,
}

impl ParamState {
    fn new(value: f64) -> Self {
        Self {
            last_value: value,
            is_initial: true,
            pending: None,
        }
    }
}

#[derive(Default)]
struct SyncState {
    /// Incremented on every start/stop; timers from older generations are inert
    generation: u64,
    next_timer_id: u64,
    snapshot: Option<ProjectSnapshot>,
    params: HashMap<ParamKey, ParamState>,
}

impl SyncState {
    fn reset(&mut self) {
        for param in self.params.values_mut() {
            if let Some(burst) = param.pending.take() {
                burst.timer.abort();
            }
        }
        self.params.clear();
        self.snapshot = None;
        self.generation += 1;
    }
}

/// Payload of a `track_renamed` push event
#[derive(Deserialize)]
struct TrackRenamed {
    track_id: u32,
    name: String,
}

/// Parameter change debouncer
///
/// Cheap to clone; clones share state. Timers run on the ambient tokio
/// runtime, so notifications must be fed from within one.
#[derive(Clone)]
pub struct ParameterSync {
    state: Arc<Mutex<SyncState>>,
    window: Duration,
    changes: mpsc::UnboundedSender<ParameterChange>,
}

impl ParameterSync {
    /// Create an engine and the receiver its coalesced changes arrive on
    pub fn new(window: Duration) -> (Self, mpsc::UnboundedReceiver<ParameterChange>) {
        let (changes, rx) = mpsc::unbounded_channel();
        let sync = Self {
            state: Arc::new(Mutex::new(SyncState::default())),
            window,
            changes,
        };
        (sync, rx)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Begin tracking every parameter in `snapshot`
    ///
    /// Discards all state from a previous session, including pending bursts.
    pub fn start(&self, snapshot: &ProjectSnapshot) {
        let mut state = self.state.lock();
        state.reset();
        state.params = snapshot
            .parameters()
            .map(|(key, param)| (key, ParamState::new(param.value)))
            .collect();
        state.snapshot = Some(snapshot.clone());
        info!(
            parameters = state.params.len(),
            window_ms = self.window.as_millis() as u64,
            "Parameter sync started"
        );
    }

    /// Stop tracking; pending bursts are dropped without being reported
    pub fn stop(&self) {
        self.state.lock().reset();
        debug!("Parameter sync stopped");
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().snapshot.is_some()
    }

    pub fn tracked_keys(&self) -> usize {
        self.state.lock().params.len()
    }

    /// Feed a push event; only parameter and track name events matter
    pub fn on_push_event(&self, event: &PushEvent) {
        match event.event_type.as_str() {
            events::PARAMETER_CHANGED => {
                match serde_json::from_value::<RawParameterValue>(event.data.clone()) {
                    Ok(raw) => self.on_raw(raw),
                    Err(e) => warn!(error = %e, "Malformed parameter_changed payload"),
                }
            }
            events::TRACK_RENAMED => {
                match serde_json::from_value::<TrackRenamed>(event.data.clone()) {
                    Ok(renamed) => self.rename_track(renamed.track_id, renamed.name),
                    Err(e) => warn!(error = %e, "Malformed track_renamed payload"),
                }
            }
            _ => {}
        }
    }

    /// Feed one raw value notification
    pub fn on_raw(&self, raw: RawParameterValue) {
        let key = raw.key();
        let value = raw.value;

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(param) = state.params.get_mut(&key) else {
            warn!(%key, "Dropping change for untracked parameter");
            return;
        };

        if param.is_initial {
            param.is_initial = false;
            trace!(%key, value, "Suppressed initial notification");
            return;
        }

        let old_value = match &param.pending {
            Some(burst) => {
                if same_value(burst.value, value) {
                    return;
                }
                burst.timer.abort();
                burst.old_value
            }
            None => {
                if same_value(param.last_value, value) {
                    return;
                }
                param.last_value
            }
        };

        state.next_timer_id += 1;
        let timer_id = state.next_timer_id;
        let timer = self.spawn_timer(key, state.generation, timer_id);
        param.pending = Some(PendingBurst {
            old_value,
            value,
            timer_id,
            timer,
        });
    }

    fn spawn_timer(&self, key: ParamKey, generation: u64, timer_id: u64) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let changes = self.changes.clone();
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            settle(&state, &changes, key, generation, timer_id);
        })
    }

    fn rename_track(&self, track_id: u32, name: String) {
        let mut state = self.state.lock();
        let Some(snapshot) = state.snapshot.as_mut() else {
            return;
        };
        if let Some(track) = snapshot.tracks.iter_mut().find(|t| t.id == track_id) {
            debug!(track_id, %name, "Track renamed");
            track.name = name;
        }
    }
}

/// Timer expiry: close the burst and report it if the value moved
fn settle(
    state: &Mutex<SyncState>,
    changes: &mpsc::UnboundedSender<ParameterChange>,
    key: ParamKey,
    generation: u64,
    timer_id: u64,
) {
    let change = {
        let mut guard = state.lock();
        let state = &mut *guard;
        if state.generation != generation {
            return;
        }
        let Some(param) = state.params.get_mut(&key) else {
            return;
        };
        // A newer notification restarted the window after this timer woke
        if !matches!(&param.pending, Some(burst) if burst.timer_id == timer_id) {
            return;
        }
        let Some(burst) = param.pending.take() else {
            return;
        };
        param.last_value = burst.value;

        if same_value(burst.old_value, burst.value) {
            trace!(%key, "Burst settled on its starting value");
            return;
        }

        let Some((track, device, parameter)) =
            state.snapshot.as_ref().and_then(|s| s.resolve(key))
        else {
            warn!(%key, "Parameter missing from snapshot");
            return;
        };

        ParameterChange {
            track_id: key.track_id,
            device_id: key.device_id,
            param_id: key.param_id,
            names: ParameterNames {
                track: track.name.clone(),
                device: device.name.clone(),
                parameter: parameter.name.clone(),
            },
            old_value: burst.old_value,
            new_value: burst.value,
            min: parameter.min,
            max: parameter.max,
            timestamp: Utc::now(),
        }
    };

    debug!(
        key = %change.key(),
        old = change.old_value,
        new = change.new_value,
        "Parameter change settled"
    );
    if changes.send(change).is_err() {
        trace!("Change receiver dropped");
    }
}

fn same_value(a: f64, b: f64) -> bool {
    a.to_bits() == b.to_bits()
}

/// Feeds a connection's push events into a [`ParameterSync`]
pub struct SyncEventHandler {
    sync: ParameterSync,
}

impl SyncEventHandler {
    pub fn new(sync: ParameterSync) -> Self {
        Self { sync }
    }
}

impl EventHandler for SyncEventHandler {
    fn handle(&self, event: PushEvent) {
        self.sync.on_push_event(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostlink_protocol::{DeviceSnapshot, ParameterSnapshot, TrackSnapshot};
    use serde_json::json;

    const WINDOW: Duration = Duration::from_millis(500);

    fn snapshot() -> ProjectSnapshot {
        ProjectSnapshot {
            tempo: 120.0,
            tracks: vec![TrackSnapshot {
                id: 2,
                name: "Lead".into(),
                devices: vec![DeviceSnapshot {
                    id: 0,
                    name: "Synth".into(),
                    parameters: vec![
                        ParameterSnapshot {
                            id: 5,
                            name: "Cutoff".into(),
                            value: 10.0,
                            min: 0.0,
                            max: 127.0,
                        },
                        ParameterSnapshot {
                            id: 6,
                            name: "Drive".into(),
                            value: 0.0,
                            min: 0.0,
                            max: 1.0,
                        },
                    ],
                }],
            }],
        }
    }

    fn cutoff(value: f64) -> RawParameterValue {
        RawParameterValue::new(ParamKey::new(2, 0, 5), value)
    }

    fn drive(value: f64) -> RawParameterValue {
        RawParameterValue::new(ParamKey::new(2, 0, 6), value)
    }

    fn started() -> (ParameterSync, mpsc::UnboundedReceiver<ParameterChange>) {
        let (sync, rx) = ParameterSync::new(WINDOW);
        sync.start(&snapshot());
        (sync, rx)
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_notification_suppressed() {
        let (sync, mut rx) = started();
        sync.on_raw(cutoff(10.0));
        advance(600).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_to_one_change() {
        let (sync, mut rx) = started();
        sync.on_raw(cutoff(10.0));
        sync.on_raw(cutoff(10.0));
        sync.on_raw(cutoff(11.0));
        sync.on_raw(cutoff(12.0));
        sync.on_raw(cutoff(13.0));

        advance(600).await;
        let change = rx.try_recv().unwrap();
        assert_eq!(change.key(), ParamKey::new(2, 0, 5));
        assert_eq!(change.old_value, 10.0);
        assert_eq!(change.new_value, 13.0);
        assert_eq!(change.names.track, "Lead");
        assert_eq!(change.names.device, "Synth");
        assert_eq!(change.names.parameter, "Cutoff");
        assert_eq!((change.min, change.max), (0.0, 127.0));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_restarts_on_new_value() {
        let (sync, mut rx) = started();
        sync.on_raw(cutoff(10.0));

        sync.on_raw(cutoff(11.0));
        advance(300).await;
        sync.on_raw(cutoff(12.0));

        advance(300).await;
        assert!(rx.try_recv().is_err(), "window should have restarted");

        advance(300).await;
        let change = rx.try_recv().unwrap();
        assert_eq!((change.old_value, change.new_value), (10.0, 12.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_redelivered_pending_value_does_not_restart_window() {
        let (sync, mut rx) = started();
        sync.on_raw(cutoff(10.0));

        sync.on_raw(cutoff(11.0));
        advance(300).await;
        sync.on_raw(cutoff(11.0));

        advance(250).await;
        let change = rx.try_recv().unwrap();
        assert_eq!((change.old_value, change.new_value), (10.0, 11.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_chain_values() {
        let (sync, mut rx) = started();
        sync.on_raw(cutoff(10.0));

        sync.on_raw(cutoff(11.0));
        advance(600).await;
        sync.on_raw(cutoff(12.0));
        advance(600).await;

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!((first.old_value, first.new_value), (10.0, 11.0));
        assert_eq!((second.old_value, second.new_value), (11.0, 12.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_returning_to_start_is_silent() {
        let (sync, mut rx) = started();
        sync.on_raw(cutoff(10.0));

        sync.on_raw(cutoff(11.0));
        sync.on_raw(cutoff(10.0));
        advance(600).await;
        assert!(rx.try_recv().is_err());

        // The settled value is still tracked
        sync.on_raw(cutoff(10.0));
        advance(600).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let (sync, mut rx) = started();
        sync.on_raw(cutoff(10.0));
        sync.on_raw(drive(0.0));

        sync.on_raw(cutoff(20.0));
        sync.on_raw(drive(0.5));
        advance(600).await;

        let mut changes = vec![rx.try_recv().unwrap(), rx.try_recv().unwrap()];
        changes.sort_by_key(|c| c.param_id);
        assert_eq!(changes[0].new_value, 20.0);
        assert_eq!(changes[1].names.parameter, "Drive");
        assert_eq!(changes[1].new_value, 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_key_is_dropped() {
        let (sync, mut rx) = started();
        sync.on_raw(RawParameterValue::new(ParamKey::new(9, 9, 9), 1.0));
        sync.on_raw(RawParameterValue::new(ParamKey::new(9, 9, 9), 2.0));
        advance(600).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(sync.tracked_keys(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_pending_burst() {
        let (sync, mut rx) = started();
        sync.on_raw(cutoff(10.0));
        sync.on_raw(cutoff(50.0));

        sync.stop();
        assert!(!sync.is_active());
        assert_eq!(sync.tracked_keys(), 0);

        advance(600).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resets_initial_suppression() {
        let (sync, mut rx) = started();
        sync.on_raw(cutoff(10.0));
        sync.on_raw(cutoff(30.0));

        sync.start(&snapshot());
        advance(600).await;
        assert!(rx.try_recv().is_err(), "old burst must not fire");

        // First notification after the restart is initial again
        sync.on_raw(cutoff(30.0));
        advance(600).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_events_and_track_rename() {
        let (sync, mut rx) = started();
        let handler = SyncEventHandler::new(sync.clone());

        let raw = |value: f64| {
            PushEvent::new(
                events::PARAMETER_CHANGED,
                json!({"track_id": 2, "device_id": 0, "param_id": 5, "value": value}),
            )
        };
        handler.handle(raw(10.0));
        handler.handle(PushEvent::new(
            events::TRACK_RENAMED,
            json!({"track_id": 2, "name": "Hook", "old_name": "Lead"}),
        ));
        handler.handle(PushEvent::new(events::TEMPO_CHANGED, json!({"tempo": 99})));
        handler.handle(PushEvent::new(events::PARAMETER_CHANGED, json!({"bogus": true})));
        handler.handle(raw(64.0));

        advance(600).await;
        let change = rx.try_recv().unwrap();
        assert_eq!(change.names.track, "Hook");
        assert_eq!(change.new_value, 64.0);
    }

    #[test]
    fn test_same_value_is_bit_exact() {
        assert!(same_value(0.1 + 0.2, 0.1 + 0.2));
        assert!(!same_value(0.1 + 0.2, 0.3));
        assert!(!same_value(0.0, -0.0));
    }
}
