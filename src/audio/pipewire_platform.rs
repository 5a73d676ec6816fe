// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! PipeWire backend.
//!
//! A dedicated thread runs the PipeWire main loop, watches the registry
//! and keeps a shared cache of playback streams and sinks up to date. The
//! [`AudioPlatform`] methods read that cache and send writes to the thread
//! over a PipeWire channel. Sinks registered with the platform are invoked
//! on the PipeWire thread.
//!
//! Playback streams (`Stream/Output/Audio`) are sessions; the `Audio/Sink`
//! with the highest session priority is the default device.

use crate::audio::platform::{
    same_sink, AudioPlatform, DeviceEventSink, PlatformError, PlatformResult, SessionEventSink,
    SessionNotificationSink,
};
use crate::audio::props::{build_channel_volumes_pod, build_mute_pod, parse_props};
use crate::audio::types::{
    DataFlow, DeviceHandle, DeviceRole, DisconnectReason, EventContext, GroupingToken,
    SessionHandle, SessionState,
};
use parking_lot::{Mutex, RwLock};
use pipewire::node::{Node, NodeListener, NodeState};
use pipewire::spa::param::ParamType;
use pipewire::spa::pod::Pod;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CHANNELS: usize = 2;
/// Largest difference at which a notified volume still counts as the value
/// we wrote. Channel volumes come back as floats from the server.
const VOLUME_TOLERANCE: f32 = 1e-3;

#[derive(Debug, Error)]
pub enum PwError {
    #[error("PipeWire initialization failed: {0}")]
    InitFailed(String),
    #[error("Failed to connect to PipeWire: {0}")]
    ConnectionFailed(String),
    #[error("PipeWire thread error: {0}")]
    ThreadError(String),
}

/// Commands sent from the mixer to the PipeWire thread.
enum PwCommand {
    SetVolume { node: u32, volume: f32, channels: usize },
    SetMute { node: u32, muted: bool },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Stream,
    Sink,
}

impl NodeKind {
    fn from_media_class(class: &str) -> Option<Self> {
        match class {
            "Stream/Output/Audio" => Some(Self::Stream),
            "Audio/Sink" => Some(Self::Sink),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct NodeEntry {
    kind: NodeKind,
    name: String,
    priority: i32,
    pid: Option<u32>,
    client: Option<u32>,
    system_sound: bool,
    state: SessionState,
    volume: f32,
    muted: bool,
    channels: usize,
}

/// A local write whose `Props` notification has not arrived yet.
#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    context: EventContext,
    volume: Option<f32>,
    muted: Option<bool>,
}

impl PendingWrite {
    fn volume(context: EventContext, volume: f32) -> Self {
        Self {
            context,
            volume: Some(volume),
            muted: None,
        }
    }

    fn mute(context: EventContext, muted: bool) -> Self {
        Self {
            context,
            volume: None,
            muted: Some(muted),
        }
    }

    /// Whether a node now at `volume` and `muted` reflects this write.
    fn matches(&self, volume: f32, muted: bool) -> bool {
        self.volume.map_or(true, |v| (v - volume).abs() <= VOLUME_TOLERANCE)
            && self.muted.map_or(true, |m| m == muted)
    }
}

/// State shared between the PipeWire thread and the platform's callers.
#[derive(Default)]
struct Shared {
    nodes: HashMap<u32, NodeEntry>,
    /// Last local write per node. Its context is stamped on the next
    /// `Props` notification for that node if the values match, and
    /// discarded otherwise.
    pending_writes: HashMap<u32, PendingWrite>,
    notification_sinks: Vec<Arc<dyn SessionNotificationSink>>,
    session_sinks: HashMap<u32, Vec<Arc<dyn SessionEventSink>>>,
    device_sinks: HashMap<u32, Vec<Arc<dyn DeviceEventSink>>>,
}

impl Shared {
    fn stream(&self, session: SessionHandle) -> PlatformResult<&NodeEntry> {
        node_id(session.0)
            .and_then(|id| self.nodes.get(&id))
            .filter(|n| n.kind == NodeKind::Stream)
            .ok_or(PlatformError::SessionGone(session))
    }

    fn sink(&self, device: DeviceHandle) -> PlatformResult<&NodeEntry> {
        node_id(device.0)
            .and_then(|id| self.nodes.get(&id))
            .filter(|n| n.kind == NodeKind::Sink)
            .ok_or(PlatformError::DeviceNotFound)
    }
}

fn node_id(raw: u64) -> Option<u32> {
    u32::try_from(raw).ok()
}

type SharedState = Arc<RwLock<Shared>>;

/// [`AudioPlatform`] backed by a PipeWire connection.
pub struct PipeWirePlatform {
    shared: SharedState,
    cmd_tx: Mutex<pipewire::channel::Sender<PwCommand>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl PipeWirePlatform {
    /// Connect to PipeWire and wait until the initial registry contents
    /// have been received.
    pub fn connect() -> Result<Self, PwError> {
        let shared: SharedState = Arc::default();
        let (cmd_tx, cmd_rx) = pipewire::channel::channel::<PwCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), PwError>>();

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("pipewire".to_string())
            .spawn(move || {
                let ready = ready_tx.clone();
                if let Err(e) = run_pipewire_loop(cmd_rx, thread_shared, ready_tx) {
                    error!("PipeWire thread error: {}", e);
                    let _ = ready.send(Err(e));
                }
            })
            .map_err(|e| PwError::ThreadError(e.to_string()))?;

        match ready_rx.recv_timeout(CONNECT_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = cmd_tx.send(PwCommand::Shutdown);
                return Err(PwError::ConnectionFailed(
                    "timed out waiting for the registry".into(),
                ));
            }
        }

        Ok(Self {
            shared,
            cmd_tx: Mutex::new(cmd_tx),
            thread: Mutex::new(Some(handle)),
        })
    }

    fn send(&self, cmd: PwCommand) -> PlatformResult<()> {
        self.cmd_tx
            .lock()
            .send(cmd)
            .map_err(|_| PlatformError::Backend("PipeWire thread is gone".into()))
    }
}

impl Drop for PipeWirePlatform {
    fn drop(&mut self) {
        let _ = self.cmd_tx.lock().send(PwCommand::Shutdown);
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl AudioPlatform for PipeWirePlatform {
    fn default_device(&self, flow: DataFlow, _role: DeviceRole) -> PlatformResult<DeviceHandle> {
        if flow != DataFlow::Render {
            return Err(PlatformError::Unsupported("capture devices"));
        }
        let shared = self.shared.read();
        shared
            .nodes
            .iter()
            .filter(|(_, n)| n.kind == NodeKind::Sink)
            .max_by(|(a_id, a), (b_id, b)| a.priority.cmp(&b.priority).then(b_id.cmp(a_id)))
            .map(|(id, _)| DeviceHandle(u64::from(*id)))
            .ok_or(PlatformError::DeviceNotFound)
    }

    fn device_name(&self, device: DeviceHandle) -> PlatformResult<String> {
        Ok(self.shared.read().sink(device)?.name.clone())
    }

    fn enumerate_sessions(&self, _device: DeviceHandle) -> PlatformResult<Vec<SessionHandle>> {
        let shared = self.shared.read();
        let mut sessions: Vec<SessionHandle> = shared
            .nodes
            .iter()
            .filter(|(_, n)| n.kind == NodeKind::Stream && n.state != SessionState::Expired)
            .map(|(id, _)| SessionHandle(u64::from(*id)))
            .collect();
        sessions.sort();
        Ok(sessions)
    }

    fn session_volume(&self, session: SessionHandle) -> PlatformResult<f32> {
        Ok(self.shared.read().stream(session)?.volume)
    }

    fn set_session_volume(
        &self,
        session: SessionHandle,
        volume: f32,
        context: EventContext,
    ) -> PlatformResult<()> {
        let volume = volume.clamp(0.0, 1.0);
        let pending = PendingWrite::volume(context, volume);
        let channels = stamp_write(&self.shared, session.0, pending, |n| {
            (n.kind == NodeKind::Stream).then(|| {
                n.volume = volume;
                n.channels
            })
        })
        .ok_or(PlatformError::SessionGone(session))?;
        self.send(PwCommand::SetVolume {
            node: session.0 as u32,
            volume,
            channels,
        })
    }

    fn session_muted(&self, session: SessionHandle) -> PlatformResult<bool> {
        Ok(self.shared.read().stream(session)?.muted)
    }

    fn set_session_muted(
        &self,
        session: SessionHandle,
        muted: bool,
        context: EventContext,
    ) -> PlatformResult<()> {
        stamp_write(&self.shared, session.0, PendingWrite::mute(context, muted), |n| {
            (n.kind == NodeKind::Stream).then(|| n.muted = muted)
        })
        .ok_or(PlatformError::SessionGone(session))?;
        self.send(PwCommand::SetMute {
            node: session.0 as u32,
            muted,
        })
    }

    fn session_peak(&self, _session: SessionHandle) -> PlatformResult<f32> {
        Err(PlatformError::Unsupported("peak metering"))
    }

    fn session_state(&self, session: SessionHandle) -> PlatformResult<SessionState> {
        Ok(self.shared.read().stream(session)?.state)
    }

    fn process_id(&self, session: SessionHandle) -> PlatformResult<u32> {
        self.shared
            .read()
            .stream(session)?
            .pid
            .ok_or(PlatformError::AccessDenied)
    }

    /// Streams of one client share a token.
    fn grouping_token(&self, session: SessionHandle) -> PlatformResult<GroupingToken> {
        let shared = self.shared.read();
        let node = shared.stream(session)?;
        let owner = node.client.map_or(u128::from(session.0) << 32, u128::from);
        Ok(GroupingToken(Uuid::from_u128(owner)))
    }

    fn is_system_sound(&self, session: SessionHandle) -> PlatformResult<bool> {
        Ok(self.shared.read().stream(session)?.system_sound)
    }

    fn device_volume(&self, device: DeviceHandle) -> PlatformResult<f32> {
        Ok(self.shared.read().sink(device)?.volume)
    }

    fn set_device_volume(
        &self,
        device: DeviceHandle,
        volume: f32,
        context: EventContext,
    ) -> PlatformResult<()> {
        let volume = volume.clamp(0.0, 1.0);
        let pending = PendingWrite::volume(context, volume);
        let channels = stamp_write(&self.shared, device.0, pending, |n| {
            (n.kind == NodeKind::Sink).then(|| {
                n.volume = volume;
                n.channels
            })
        })
        .ok_or(PlatformError::DeviceNotFound)?;
        self.send(PwCommand::SetVolume {
            node: device.0 as u32,
            volume,
            channels,
        })
    }

    fn device_muted(&self, device: DeviceHandle) -> PlatformResult<bool> {
        Ok(self.shared.read().sink(device)?.muted)
    }

    fn set_device_muted(
        &self,
        device: DeviceHandle,
        muted: bool,
        context: EventContext,
    ) -> PlatformResult<()> {
        stamp_write(&self.shared, device.0, PendingWrite::mute(context, muted), |n| {
            (n.kind == NodeKind::Sink).then(|| n.muted = muted)
        })
        .ok_or(PlatformError::DeviceNotFound)?;
        self.send(PwCommand::SetMute {
            node: device.0 as u32,
            muted,
        })
    }

    fn device_peak(&self, _device: DeviceHandle) -> PlatformResult<f32> {
        Err(PlatformError::Unsupported("peak metering"))
    }

    fn register_session_notification(
        &self,
        device: DeviceHandle,
        sink: Arc<dyn SessionNotificationSink>,
    ) -> PlatformResult<()> {
        let mut shared = self.shared.write();
        shared.sink(device)?;
        shared.notification_sinks.push(sink);
        Ok(())
    }

    fn unregister_session_notification(
        &self,
        _device: DeviceHandle,
        sink: &Arc<dyn SessionNotificationSink>,
    ) -> PlatformResult<()> {
        self.shared
            .write()
            .notification_sinks
            .retain(|s| !same_sink(s, sink));
        Ok(())
    }

    fn register_session_events(
        &self,
        session: SessionHandle,
        sink: Arc<dyn SessionEventSink>,
    ) -> PlatformResult<()> {
        let mut shared = self.shared.write();
        shared.stream(session)?;
        shared
            .session_sinks
            .entry(session.0 as u32)
            .or_default()
            .push(sink);
        Ok(())
    }

    fn unregister_session_events(
        &self,
        session: SessionHandle,
        sink: &Arc<dyn SessionEventSink>,
    ) -> PlatformResult<()> {
        let mut shared = self.shared.write();
        let id = session.0 as u32;
        if let Some(sinks) = shared.session_sinks.get_mut(&id) {
            sinks.retain(|s| !same_sink(s, sink));
            if sinks.is_empty() {
                shared.session_sinks.remove(&id);
            }
        }
        // a removed stream is kept until its last sink lets go
        if !shared.session_sinks.contains_key(&id)
            && shared
                .nodes
                .get(&id)
                .is_some_and(|n| n.state == SessionState::Expired)
        {
            shared.nodes.remove(&id);
        }
        Ok(())
    }

    fn register_device_events(
        &self,
        device: DeviceHandle,
        sink: Arc<dyn DeviceEventSink>,
    ) -> PlatformResult<()> {
        let mut shared = self.shared.write();
        shared.sink(device)?;
        shared
            .device_sinks
            .entry(device.0 as u32)
            .or_default()
            .push(sink);
        Ok(())
    }

    fn unregister_device_events(
        &self,
        device: DeviceHandle,
        sink: &Arc<dyn DeviceEventSink>,
    ) -> PlatformResult<()> {
        if let Some(sinks) = self.shared.write().device_sinks.get_mut(&(device.0 as u32)) {
            sinks.retain(|s| !same_sink(s, sink));
        }
        Ok(())
    }
}

/// Apply `update` to a cached node and remember the write.
fn stamp_write<T>(
    shared: &SharedState,
    raw: u64,
    pending: PendingWrite,
    update: impl FnOnce(&mut NodeEntry) -> Option<T>,
) -> Option<T> {
    let id = node_id(raw)?;
    let mut shared = shared.write();
    let result = update(shared.nodes.get_mut(&id)?)?;
    shared.pending_writes.insert(id, pending);
    Some(result)
}

// ---------------------------------------------------------------------------
// PipeWire thread
// ---------------------------------------------------------------------------

struct BoundNode {
    proxy: Node,
    _listener: NodeListener,
}

type BoundNodes = Rc<RefCell<HashMap<u32, BoundNode>>>;

fn run_pipewire_loop(
    cmd_rx: pipewire::channel::Receiver<PwCommand>,
    shared: SharedState,
    ready_tx: mpsc::Sender<Result<(), PwError>>,
) -> Result<(), PwError> {
    pipewire::init();

    let main_loop = pipewire::main_loop::MainLoopRc::new(None)
        .map_err(|e| PwError::InitFailed(e.to_string()))?;
    let context = pipewire::context::ContextRc::new(&main_loop, None)
        .map_err(|e| PwError::InitFailed(e.to_string()))?;
    let core = context
        .connect_rc(None)
        .map_err(|e| PwError::ConnectionFailed(e.to_string()))?;
    let registry = core
        .get_registry_rc()
        .map_err(|e| PwError::ConnectionFailed(e.to_string()))?;
    info!("Connected to PipeWire");

    let bound: BoundNodes = Rc::default();

    let main_loop_weak = main_loop.downgrade();
    let bound_cmd = Rc::clone(&bound);
    let _cmd_receiver = cmd_rx.attach(main_loop.loop_(), move |cmd| match cmd {
        PwCommand::Shutdown => {
            debug!("Received shutdown command");
            if let Some(main_loop) = main_loop_weak.upgrade() {
                main_loop.quit();
            }
        }
        PwCommand::SetVolume {
            node,
            volume,
            channels,
        } => set_param(&bound_cmd, node, build_channel_volumes_pod(volume, channels)),
        PwCommand::SetMute { node, muted } => set_param(&bound_cmd, node, build_mute_pod(muted)),
    });

    let _registry_listener = setup_registry_listener(&registry, Rc::clone(&bound), Arc::clone(&shared));

    // the registry dump is complete once the core answers this sync
    let pending = core
        .sync(0)
        .map_err(|e| PwError::ConnectionFailed(e.to_string()))?;
    let _core_listener = core
        .add_listener_local()
        .done(move |id, seq| {
            if id == pipewire::core::PW_ID_CORE && seq == pending {
                let _ = ready_tx.send(Ok(()));
            }
        })
        .register();

    main_loop.run();

    info!("PipeWire thread shutting down");
    disconnect_all(&shared);
    Ok(())
}

fn set_param(bound: &BoundNodes, node: u32, pod: Result<Vec<u8>, crate::audio::props::PropsError>) {
    let bytes = match pod {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(node, "Failed to build Props pod: {}", e);
            return;
        }
    };
    let Some(pod) = Pod::from_bytes(&bytes) else {
        warn!(node, "Failed to create Pod from bytes");
        return;
    };
    match bound.borrow().get(&node) {
        Some(b) => {
            b.proxy.set_param(ParamType::Props, 0, pod);
            trace!(node, "Props written");
        }
        None => debug!(node, "Write to unbound node ignored"),
    }
}

/// Tell every session sink its stream is gone when the connection ends.
fn disconnect_all(shared: &SharedState) {
    let sinks: Vec<Arc<dyn SessionEventSink>> = {
        let mut shared = shared.write();
        for node in shared.nodes.values_mut() {
            node.state = SessionState::Expired;
        }
        shared.session_sinks.values().flatten().cloned().collect()
    };
    for sink in sinks {
        sink.on_session_disconnected(DisconnectReason::ServerShutdown);
    }
}

fn map_state(state: &NodeState<'_>) -> Option<SessionState> {
    match state {
        NodeState::Running => Some(SessionState::Active),
        NodeState::Idle | NodeState::Suspended => Some(SessionState::Inactive),
        NodeState::Creating | NodeState::Error(_) => None,
    }
}

fn setup_registry_listener(
    registry: &pipewire::registry::RegistryRc,
    bound: BoundNodes,
    shared: SharedState,
) -> pipewire::registry::Listener {
    let bound_add = Rc::clone(&bound);
    let shared_add = Arc::clone(&shared);
    let registry_clone = registry.clone();

    registry
        .add_listener_local()
        .global(move |global| {
            if global.type_ != pipewire::types::ObjectType::Node {
                return;
            }
            let Some(props) = global.props else {
                return;
            };
            let Some(kind) = props.get("media.class").and_then(NodeKind::from_media_class) else {
                return;
            };

            let id = global.id;
            let name = props
                .get("node.description")
                .or_else(|| props.get("application.name"))
                .or_else(|| props.get("node.name"))
                .unwrap_or_default()
                .to_string();
            let entry = NodeEntry {
                kind,
                name,
                priority: props
                    .get("priority.session")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(0),
                pid: props
                    .get("application.process.id")
                    .and_then(|p| p.parse().ok()),
                client: props.get("client.id").and_then(|c| c.parse().ok()),
                system_sound: matches!(props.get("media.role"), Some("Notification" | "Event")),
                state: SessionState::Inactive,
                volume: 1.0,
                muted: false,
                channels: DEFAULT_CHANNELS,
            };
            debug!(id, kind = ?entry.kind, name = %entry.name, pid = ?entry.pid, "Node added");

            let node: Node = match registry_clone.bind(global) {
                Ok(node) => node,
                Err(e) => {
                    warn!(id, "Failed to bind node: {:?}", e);
                    return;
                }
            };
            node.subscribe_params(&[ParamType::Props]);

            let shared_info = Arc::clone(&shared_add);
            let shared_param = Arc::clone(&shared_add);
            let listener = node
                .add_listener_local()
                .info(move |info| {
                    if let Some(state) = map_state(&info.state()) {
                        on_node_state(&shared_info, id, state);
                    }
                })
                .param(move |_seq, param_type, _index, _next, pod| {
                    if param_type != ParamType::Props {
                        return;
                    }
                    if let Some(pod) = pod {
                        on_node_props(&shared_param, id, pod);
                    }
                })
                .register();

            bound_add.borrow_mut().insert(
                id,
                BoundNode {
                    proxy: node,
                    _listener: listener,
                },
            );

            let created = {
                let mut shared = shared_add.write();
                shared.nodes.insert(id, entry);
                (kind == NodeKind::Stream).then(|| shared.notification_sinks.clone())
            };
            for sink in created.into_iter().flatten() {
                sink.on_session_created(SessionHandle(u64::from(id)));
            }
        })
        .global_remove(move |id| {
            bound.borrow_mut().remove(&id);
            let sinks = {
                let mut shared = shared.write();
                shared.pending_writes.remove(&id);
                match shared.nodes.get_mut(&id) {
                    Some(node) if node.kind == NodeKind::Stream => {
                        node.state = SessionState::Expired;
                        shared.session_sinks.get(&id).cloned().unwrap_or_default()
                    }
                    Some(_) => {
                        shared.nodes.remove(&id);
                        Vec::new()
                    }
                    None => return,
                }
            };
            debug!(id, "Node removed");
            for sink in sinks {
                sink.on_state_changed(SessionState::Expired);
            }
        })
        .register()
}

fn on_node_state(shared: &SharedState, id: u32, state: SessionState) {
    let sinks = {
        let mut shared = shared.write();
        let Some(node) = shared.nodes.get_mut(&id) else {
            return;
        };
        if node.kind != NodeKind::Stream || node.state == state {
            return;
        }
        node.state = state;
        shared.session_sinks.get(&id).cloned().unwrap_or_default()
    };
    trace!(id, %state, "Stream state changed");
    for sink in sinks {
        sink.on_state_changed(state);
    }
}

enum PropsTarget {
    Session(Vec<Arc<dyn SessionEventSink>>),
    Device(Vec<Arc<dyn DeviceEventSink>>),
}

fn on_node_props(shared: &SharedState, id: u32, pod: &Pod) {
    let update = match parse_props(pod.as_bytes()) {
        Ok(update) => update,
        Err(e) => {
            trace!(id, "Ignoring Props param: {}", e);
            return;
        }
    };

    let (volume, muted, context, target) = {
        let mut shared = shared.write();
        let Some(node) = shared.nodes.get_mut(&id) else {
            return;
        };
        let changed = update.volume.is_some_and(|v| (v - node.volume).abs() > f32::EPSILON)
            || update.muted.is_some_and(|m| m != node.muted);
        if let Some(volume) = update.volume {
            node.volume = volume;
        }
        if let Some(muted) = update.muted {
            node.muted = muted;
        }
        if let Some(channels) = update.channels {
            node.channels = channels;
        }
        let (volume, muted, kind) = (node.volume, node.muted, node.kind);
        let context = match shared.pending_writes.remove(&id) {
            Some(pending) if pending.matches(volume, muted) => Some(pending.context),
            Some(_) => {
                trace!(id, volume, muted, "Props change is not our pending write");
                None
            }
            None => None,
        };
        if !changed && context.is_none() {
            return;
        }
        let target = match kind {
            NodeKind::Stream => {
                PropsTarget::Session(shared.session_sinks.get(&id).cloned().unwrap_or_default())
            }
            NodeKind::Sink => {
                PropsTarget::Device(shared.device_sinks.get(&id).cloned().unwrap_or_default())
            }
        };
        (volume, muted, context, target)
    };

    match target {
        PropsTarget::Session(sinks) => {
            for sink in sinks {
                sink.on_simple_volume_changed(volume, muted, context);
            }
        }
        PropsTarget::Device(sinks) => {
            for sink in sinks {
                sink.on_notify(volume, muted, context);
            }
        }
    }
}
