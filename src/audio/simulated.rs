// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! In-memory audio platform.
//!
//! Behaves like a real backend as far as the mixer can tell: writes are
//! echoed back through the registered sinks with the writer's event
//! context, and external changes arrive with no context. Sinks are always
//! invoked after the state lock is released, so a sink may call back into
//! the platform.

use crate::audio::platform::{
    same_sink, AudioPlatform, DeviceEventSink, PlatformError, PlatformResult, SessionEventSink,
    SessionNotificationSink,
};
use crate::audio::types::{
    DataFlow, DeviceHandle, DeviceRole, DisconnectReason, EventContext, GroupingToken,
    SessionHandle, SessionState,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const DEVICE: DeviceHandle = DeviceHandle(1);
const DEVICE_NAME: &str = "Simulated Output";

/// Builder for a session added with [`SimulatedPlatform::add_session`].
#[derive(Debug, Clone)]
pub struct SimSession {
    pid: Option<u32>,
    token: GroupingToken,
    volume: f32,
    muted: bool,
    state: SessionState,
    system_sound: bool,
    peak: f32,
}

impl SimSession {
    /// An inactive session of `pid` at full volume with a fresh token.
    pub fn new(pid: u32) -> Self {
        Self {
            pid: Some(pid),
            token: GroupingToken::new(),
            volume: 1.0,
            muted: false,
            state: SessionState::Inactive,
            system_sound: false,
            peak: 0.0,
        }
    }

    /// A session whose process id cannot be read.
    pub fn without_pid() -> Self {
        Self {
            pid: None,
            ..Self::new(0)
        }
    }

    pub fn token(mut self, token: GroupingToken) -> Self {
        self.token = token;
        self
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }

    pub fn active(mut self) -> Self {
        self.state = SessionState::Active;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.state = SessionState::Inactive;
        self
    }

    pub fn expired(mut self) -> Self {
        self.state = SessionState::Expired;
        self
    }

    pub fn system_sound(mut self) -> Self {
        self.system_sound = true;
        self
    }

    pub fn peak(mut self, peak: f32) -> Self {
        self.peak = peak;
        self
    }
}

struct SessionEntry {
    spec: SimSession,
    sinks: Vec<Arc<dyn SessionEventSink>>,
}

struct State {
    next_handle: u64,
    device_available: bool,
    enumerate_fails: bool,
    device_volume: f32,
    device_muted: bool,
    device_peak: f32,
    sessions: BTreeMap<SessionHandle, SessionEntry>,
    notification_sinks: Vec<Arc<dyn SessionNotificationSink>>,
    device_sinks: Vec<Arc<dyn DeviceEventSink>>,
}

impl State {
    fn entry(&self, session: SessionHandle) -> PlatformResult<&SessionEntry> {
        self.sessions
            .get(&session)
            .ok_or(PlatformError::SessionGone(session))
    }

    fn entry_mut(&mut self, session: SessionHandle) -> PlatformResult<&mut SessionEntry> {
        self.sessions
            .get_mut(&session)
            .ok_or(PlatformError::SessionGone(session))
    }

    fn check_device(&self, device: DeviceHandle) -> PlatformResult<()> {
        if self.device_available && device == DEVICE {
            Ok(())
        } else {
            Err(PlatformError::DeviceNotFound)
        }
    }
}

/// An audio platform with one output device and scripted sessions.
pub struct SimulatedPlatform {
    state: Mutex<State>,
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_handle: 1,
                device_available: true,
                enumerate_fails: false,
                device_volume: 1.0,
                device_muted: false,
                device_peak: 0.0,
                sessions: BTreeMap::new(),
                notification_sinks: Vec::new(),
                device_sinks: Vec::new(),
            }),
        }
    }

    /// Handle of the simulated output device.
    pub fn device(&self) -> DeviceHandle {
        DEVICE
    }

    /// Make the default device disappear (or come back).
    pub fn set_device_available(&self, available: bool) {
        self.state.lock().device_available = available;
    }

    /// Make session enumeration fail.
    pub fn set_enumerate_fails(&self, fails: bool) {
        self.state.lock().enumerate_fails = fails;
    }

    /// Add a session and announce it to the session-created sinks.
    pub fn add_session(&self, spec: SimSession) -> SessionHandle {
        let (handle, sinks) = self.add_session_inner(spec);
        for sink in sinks {
            sink.on_session_created(handle);
        }
        handle
    }

    /// Add a session without announcing it, as if it had existed before
    /// anyone subscribed.
    pub fn add_existing_session(&self, spec: SimSession) -> SessionHandle {
        self.add_session_inner(spec).0
    }

    fn add_session_inner(
        &self,
        spec: SimSession,
    ) -> (SessionHandle, Vec<Arc<dyn SessionNotificationSink>>) {
        let mut state = self.state.lock();
        let handle = SessionHandle(state.next_handle);
        state.next_handle += 1;
        debug!(%handle, pid = ?spec.pid, state = %spec.state, "Simulated session added");
        state.sessions.insert(
            handle,
            SessionEntry {
                spec,
                sinks: Vec::new(),
            },
        );
        (handle, state.notification_sinks.clone())
    }

    fn session_sinks(&self, session: SessionHandle) -> Vec<Arc<dyn SessionEventSink>> {
        self.state
            .lock()
            .sessions
            .get(&session)
            .map(|e| e.sinks.clone())
            .unwrap_or_default()
    }

    /// Change a session's state and notify its sinks.
    pub fn set_state(&self, session: SessionHandle, new_state: SessionState) {
        let sinks = {
            let mut state = self.state.lock();
            let Ok(entry) = state.entry_mut(session) else {
                return;
            };
            entry.spec.state = new_state;
            entry.sinks.clone()
        };
        for sink in sinks {
            sink.on_state_changed(new_state);
        }
    }

    pub fn expire(&self, session: SessionHandle) {
        self.set_state(session, SessionState::Expired);
    }

    /// Disconnect a session. It stays queryable in the expired state.
    pub fn disconnect(&self, session: SessionHandle, reason: DisconnectReason) {
        let sinks = {
            let mut state = self.state.lock();
            let Ok(entry) = state.entry_mut(session) else {
                return;
            };
            entry.spec.state = SessionState::Expired;
            entry.sinks.clone()
        };
        for sink in sinks {
            sink.on_session_disconnected(reason);
        }
    }

    /// Change a session's volume as another application would.
    pub fn change_volume_externally(&self, session: SessionHandle, volume: f32, muted: bool) {
        {
            let mut state = self.state.lock();
            let Ok(entry) = state.entry_mut(session) else {
                return;
            };
            entry.spec.volume = volume;
            entry.spec.muted = muted;
        }
        for sink in self.session_sinks(session) {
            sink.on_simple_volume_changed(volume, muted, None);
        }
    }

    pub fn change_device_volume_externally(&self, volume: f32, muted: bool) {
        let sinks = {
            let mut state = self.state.lock();
            state.device_volume = volume;
            state.device_muted = muted;
            state.device_sinks.clone()
        };
        for sink in sinks {
            sink.on_notify(volume, muted, None);
        }
    }

    pub fn change_grouping(&self, session: SessionHandle, token: GroupingToken) {
        {
            let mut state = self.state.lock();
            let Ok(entry) = state.entry_mut(session) else {
                return;
            };
            entry.spec.token = token;
        }
        for sink in self.session_sinks(session) {
            sink.on_grouping_param_changed(token, None);
        }
    }

    pub fn set_peak(&self, session: SessionHandle, peak: f32) {
        if let Ok(entry) = self.state.lock().entry_mut(session) {
            entry.spec.peak = peak;
        }
    }

    pub fn set_device_peak(&self, peak: f32) {
        self.state.lock().device_peak = peak;
    }

    /// Forget a session entirely; every later call on it fails.
    pub fn vanish(&self, session: SessionHandle) {
        self.state.lock().sessions.remove(&session);
    }

    pub fn session_notification_count(&self) -> usize {
        self.state.lock().notification_sinks.len()
    }

    pub fn session_event_count(&self, session: SessionHandle) -> usize {
        self.state
            .lock()
            .sessions
            .get(&session)
            .map_or(0, |e| e.sinks.len())
    }

    pub fn device_event_count(&self) -> usize {
        self.state.lock().device_sinks.len()
    }

    /// Drive a small, looping cast of sessions from a background thread
    /// until `shutdown` is set or `duration` has passed.
    pub fn spawn_scenario(
        self: &Arc<Self>,
        shutdown: Arc<AtomicBool>,
        duration: Duration,
    ) -> JoinHandle<()> {
        let platform = Arc::clone(self);
        thread::spawn(move || platform.run_scenario(&shutdown, duration))
    }

    fn run_scenario(&self, shutdown: &AtomicBool, duration: Duration) {
        const TICK: Duration = Duration::from_millis(20);
        let started = Instant::now();
        let shared = GroupingToken::new();

        let player = self.add_session(SimSession::new(4242).token(shared).volume(0.5).active());
        let mut extra: Option<SessionHandle> = None;
        let mut chat: Option<SessionHandle> = None;
        let mut step = 0u64;

        info!("Simulated scenario started");
        while !shutdown.load(Ordering::Relaxed) && started.elapsed() < duration {
            let t = started.elapsed().as_secs_f32();
            match step {
                25 => extra = Some(self.add_session(SimSession::new(4242).volume(0.5).active())),
                50 => chat = Some(self.add_session(SimSession::new(1337).volume(0.8).inactive())),
                100 => {
                    if let Some(chat) = chat {
                        self.set_state(chat, SessionState::Active);
                    }
                }
                150 => self.change_volume_externally(player, 0.3, false),
                200 => {
                    if let Some(chat) = chat {
                        self.set_state(chat, SessionState::Inactive);
                    }
                }
                250 => {
                    if let Some(handle) = extra.take() {
                        self.expire(handle);
                    }
                }
                300 => {
                    if let Some(handle) = chat.take() {
                        self.disconnect(handle, DisconnectReason::SessionDisconnected);
                    }
                    step = 0;
                }
                _ => {}
            }

            self.set_peak(player, wave(t, 1.3));
            if let Some(handle) = extra {
                self.set_peak(handle, wave(t, 2.1));
            }
            if let Some(handle) = chat {
                self.set_peak(handle, wave(t, 0.7) * 0.5);
            }
            self.set_device_peak(wave(t, 1.3).max(wave(t, 2.1)));

            step += 1;
            thread::sleep(TICK);
        }

        self.expire(player);
        info!("Simulated scenario finished");
    }
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

fn wave(t: f32, hz: f32) -> f32 {
    ((t * hz * std::f32::consts::TAU).sin() * 0.5 + 0.5).powi(2)
}

impl AudioPlatform for SimulatedPlatform {
    fn default_device(&self, flow: DataFlow, _role: DeviceRole) -> PlatformResult<DeviceHandle> {
        let state = self.state.lock();
        if state.device_available && flow == DataFlow::Render {
            Ok(DEVICE)
        } else {
            Err(PlatformError::DeviceNotFound)
        }
    }

    fn device_name(&self, device: DeviceHandle) -> PlatformResult<String> {
        self.state.lock().check_device(device)?;
        Ok(DEVICE_NAME.to_string())
    }

    fn enumerate_sessions(&self, device: DeviceHandle) -> PlatformResult<Vec<SessionHandle>> {
        let state = self.state.lock();
        state.check_device(device)?;
        if state.enumerate_fails {
            return Err(PlatformError::Backend("enumeration failed".into()));
        }
        Ok(state
            .sessions
            .iter()
            .filter(|(_, e)| e.spec.state != SessionState::Expired)
            .map(|(h, _)| *h)
            .collect())
    }

    fn session_volume(&self, session: SessionHandle) -> PlatformResult<f32> {
        Ok(self.state.lock().entry(session)?.spec.volume)
    }

    fn set_session_volume(
        &self,
        session: SessionHandle,
        volume: f32,
        context: EventContext,
    ) -> PlatformResult<()> {
        let volume = volume.clamp(0.0, 1.0);
        let (muted, sinks) = {
            let mut state = self.state.lock();
            let entry = state.entry_mut(session)?;
            entry.spec.volume = volume;
            (entry.spec.muted, entry.sinks.clone())
        };
        for sink in sinks {
            sink.on_simple_volume_changed(volume, muted, Some(context));
        }
        Ok(())
    }

    fn session_muted(&self, session: SessionHandle) -> PlatformResult<bool> {
        Ok(self.state.lock().entry(session)?.spec.muted)
    }

    fn set_session_muted(
        &self,
        session: SessionHandle,
        muted: bool,
        context: EventContext,
    ) -> PlatformResult<()> {
        let (volume, sinks) = {
            let mut state = self.state.lock();
            let entry = state.entry_mut(session)?;
            entry.spec.muted = muted;
            (entry.spec.volume, entry.sinks.clone())
        };
        for sink in sinks {
            sink.on_simple_volume_changed(volume, muted, Some(context));
        }
        Ok(())
    }

    fn session_peak(&self, session: SessionHandle) -> PlatformResult<f32> {
        Ok(self.state.lock().entry(session)?.spec.peak)
    }

    fn session_state(&self, session: SessionHandle) -> PlatformResult<SessionState> {
        Ok(self.state.lock().entry(session)?.spec.state)
    }

    fn process_id(&self, session: SessionHandle) -> PlatformResult<u32> {
        self.state
            .lock()
            .entry(session)?
            .spec
            .pid
            .ok_or(PlatformError::AccessDenied)
    }

    fn grouping_token(&self, session: SessionHandle) -> PlatformResult<GroupingToken> {
        Ok(self.state.lock().entry(session)?.spec.token)
    }

    fn is_system_sound(&self, session: SessionHandle) -> PlatformResult<bool> {
        Ok(self.state.lock().entry(session)?.spec.system_sound)
    }

    fn device_volume(&self, device: DeviceHandle) -> PlatformResult<f32> {
        let state = self.state.lock();
        state.check_device(device)?;
        Ok(state.device_volume)
    }

    fn set_device_volume(
        &self,
        device: DeviceHandle,
        volume: f32,
        context: EventContext,
    ) -> PlatformResult<()> {
        let volume = volume.clamp(0.0, 1.0);
        let (muted, sinks) = {
            let mut state = self.state.lock();
            state.check_device(device)?;
            state.device_volume = volume;
            (state.device_muted, state.device_sinks.clone())
        };
        for sink in sinks {
            sink.on_notify(volume, muted, Some(context));
        }
        Ok(())
    }

    fn device_muted(&self, device: DeviceHandle) -> PlatformResult<bool> {
        let state = self.state.lock();
        state.check_device(device)?;
        Ok(state.device_muted)
    }

    fn set_device_muted(
        &self,
        device: DeviceHandle,
        muted: bool,
        context: EventContext,
    ) -> PlatformResult<()> {
        let (volume, sinks) = {
            let mut state = self.state.lock();
            state.check_device(device)?;
            state.device_muted = muted;
            (state.device_volume, state.device_sinks.clone())
        };
        for sink in sinks {
            sink.on_notify(volume, muted, Some(context));
        }
        Ok(())
    }

    fn device_peak(&self, device: DeviceHandle) -> PlatformResult<f32> {
        let state = self.state.lock();
        state.check_device(device)?;
        Ok(state.device_peak)
    }

    fn register_session_notification(
        &self,
        device: DeviceHandle,
        sink: Arc<dyn SessionNotificationSink>,
    ) -> PlatformResult<()> {
        let mut state = self.state.lock();
        state.check_device(device)?;
        state.notification_sinks.push(sink);
        Ok(())
    }

    fn unregister_session_notification(
        &self,
        _device: DeviceHandle,
        sink: &Arc<dyn SessionNotificationSink>,
    ) -> PlatformResult<()> {
        let mut state = self.state.lock();
        let before = state.notification_sinks.len();
        state.notification_sinks.retain(|s| !same_sink(s, sink));
        if state.notification_sinks.len() == before {
            return Err(PlatformError::Backend("sink was not registered".into()));
        }
        Ok(())
    }

    fn register_session_events(
        &self,
        session: SessionHandle,
        sink: Arc<dyn SessionEventSink>,
    ) -> PlatformResult<()> {
        self.state.lock().entry_mut(session)?.sinks.push(sink);
        Ok(())
    }

    fn unregister_session_events(
        &self,
        session: SessionHandle,
        sink: &Arc<dyn SessionEventSink>,
    ) -> PlatformResult<()> {
        let mut state = self.state.lock();
        let entry = state.entry_mut(session)?;
        entry.sinks.retain(|s| !same_sink(s, sink));
        // expired sessions are forgotten once nobody listens any more
        if entry.sinks.is_empty() && entry.spec.state == SessionState::Expired {
            state.sessions.remove(&session);
        }
        Ok(())
    }

    fn register_device_events(
        &self,
        device: DeviceHandle,
        sink: Arc<dyn DeviceEventSink>,
    ) -> PlatformResult<()> {
        let mut state = self.state.lock();
        state.check_device(device)?;
        state.device_sinks.push(sink);
        Ok(())
    }

    fn unregister_device_events(
        &self,
        _device: DeviceHandle,
        sink: &Arc<dyn DeviceEventSink>,
    ) -> PlatformResult<()> {
        self.state
            .lock()
            .device_sinks
            .retain(|s| !same_sink(s, sink));
        Ok(())
    }
}
