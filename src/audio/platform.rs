// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The audio platform seam.
//!
//! Everything the mixer needs from the operating system's audio stack goes
//! through [`AudioPlatform`]. Notifications flow the other way through the
//! three sink traits, whose methods are invoked on a thread owned by the
//! platform and must return quickly.

use crate::audio::types::{
    DataFlow, DeviceHandle, DeviceRole, DisconnectReason, EventContext, GroupingToken,
    SessionHandle, SessionState,
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlatformError {
    #[error("No audio device available")]
    DeviceNotFound,
    #[error("Audio session {0} is gone")]
    SessionGone(SessionHandle),
    #[error("Access denied")]
    AccessDenied,
    #[error("Not supported by this backend: {0}")]
    Unsupported(&'static str),
    #[error("Audio backend error: {0}")]
    Backend(String),
}

/// Result type for platform calls.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Receives "a new session appeared on this device" notifications.
pub trait SessionNotificationSink: Send + Sync {
    fn on_session_created(&self, session: SessionHandle);
}

/// Receives per-session notifications.
///
/// `context` is the event context of the write that caused the change, if
/// the platform knows it.
pub trait SessionEventSink: Send + Sync {
    fn on_simple_volume_changed(&self, volume: f32, muted: bool, context: Option<EventContext>);
    fn on_state_changed(&self, state: SessionState);
    fn on_grouping_param_changed(&self, token: GroupingToken, context: Option<EventContext>);
    fn on_session_disconnected(&self, reason: DisconnectReason);
}

/// Receives device volume/mute notifications.
pub trait DeviceEventSink: Send + Sync {
    fn on_notify(&self, volume: f32, muted: bool, context: Option<EventContext>);
}

/// Operations offered by an audio backend.
///
/// Volumes are scalar in `0.0..=1.0`. Peaks are the current sample peak in
/// `0.0..=1.0`. Every call may fail when the device or session vanished in
/// the meantime.
pub trait AudioPlatform: Send + Sync {
    fn default_device(&self, flow: DataFlow, role: DeviceRole) -> PlatformResult<DeviceHandle>;
    fn device_name(&self, device: DeviceHandle) -> PlatformResult<String>;
    fn enumerate_sessions(&self, device: DeviceHandle) -> PlatformResult<Vec<SessionHandle>>;

    fn session_volume(&self, session: SessionHandle) -> PlatformResult<f32>;
    fn set_session_volume(
        &self,
        session: SessionHandle,
        volume: f32,
        context: EventContext,
    ) -> PlatformResult<()>;
    fn session_muted(&self, session: SessionHandle) -> PlatformResult<bool>;
    fn set_session_muted(
        &self,
        session: SessionHandle,
        muted: bool,
        context: EventContext,
    ) -> PlatformResult<()>;
    fn session_peak(&self, session: SessionHandle) -> PlatformResult<f32>;
    fn session_state(&self, session: SessionHandle) -> PlatformResult<SessionState>;
    fn process_id(&self, session: SessionHandle) -> PlatformResult<u32>;
    fn grouping_token(&self, session: SessionHandle) -> PlatformResult<GroupingToken>;
    fn is_system_sound(&self, session: SessionHandle) -> PlatformResult<bool>;

    fn device_volume(&self, device: DeviceHandle) -> PlatformResult<f32>;
    fn set_device_volume(
        &self,
        device: DeviceHandle,
        volume: f32,
        context: EventContext,
    ) -> PlatformResult<()>;
    fn device_muted(&self, device: DeviceHandle) -> PlatformResult<bool>;
    fn set_device_muted(
        &self,
        device: DeviceHandle,
        muted: bool,
        context: EventContext,
    ) -> PlatformResult<()>;
    fn device_peak(&self, device: DeviceHandle) -> PlatformResult<f32>;

    fn register_session_notification(
        &self,
        device: DeviceHandle,
        sink: Arc<dyn SessionNotificationSink>,
    ) -> PlatformResult<()>;
    fn unregister_session_notification(
        &self,
        device: DeviceHandle,
        sink: &Arc<dyn SessionNotificationSink>,
    ) -> PlatformResult<()>;

    fn register_session_events(
        &self,
        session: SessionHandle,
        sink: Arc<dyn SessionEventSink>,
    ) -> PlatformResult<()>;
    fn unregister_session_events(
        &self,
        session: SessionHandle,
        sink: &Arc<dyn SessionEventSink>,
    ) -> PlatformResult<()>;

    fn register_device_events(
        &self,
        device: DeviceHandle,
        sink: Arc<dyn DeviceEventSink>,
    ) -> PlatformResult<()>;
    fn unregister_device_events(
        &self,
        device: DeviceHandle,
        sink: &Arc<dyn DeviceEventSink>,
    ) -> PlatformResult<()>;
}

/// Identity comparison for registered sinks.
///
/// Compares the data pointers only; vtable pointers of the same type may
/// differ between codegen units.
pub fn same_sink<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
