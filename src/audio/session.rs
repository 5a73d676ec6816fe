// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Controllable audio sessions.

use crate::audio::notification::{EventSender, SessionEvents, SessionEventsRegistration};
use crate::audio::platform::{AudioPlatform, PlatformResult};
use crate::audio::types::{EventContext, GroupingToken, SessionHandle, SessionState};
use std::sync::Arc;
use tracing::{trace, warn};

/// Volume, mute and peak access shared by sessions and the device.
///
/// Reads return `None` and writes return `false` when the platform call
/// fails; callers decide whether that means the control is gone.
pub trait AudioControl {
    fn volume(&self) -> Option<f32>;
    fn set_volume(&self, volume: f32) -> bool;
    fn muted(&self) -> Option<bool>;
    fn set_muted(&self, muted: bool) -> bool;
    fn peak_value(&self) -> Option<f32>;
}

/// Turn a platform result into the optional form used by [`AudioControl`].
pub(crate) fn ok_or_log<T>(result: PlatformResult<T>, what: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            trace!("{} failed: {}", what, e);
            None
        }
    }
}

/// One audio stream of one application.
///
/// Creating a session registers its notification sink with the platform;
/// dropping it unregisters the sink.
pub struct AudioSession {
    handle: SessionHandle,
    platform: Arc<dyn AudioPlatform>,
    event_context: EventContext,
    /// Owning process, cached after the first successful query.
    pid: Option<u32>,
    events: Option<SessionEventsRegistration>,
}

impl AudioSession {
    /// Wrap a platform session and subscribe to its notifications.
    pub fn new(platform: Arc<dyn AudioPlatform>, handle: SessionHandle, events: &EventSender) -> Self {
        let event_context = EventContext::new();
        let sink = SessionEvents::new(handle, event_context, events.clone());
        let events = match SessionEventsRegistration::new(Arc::clone(&platform), handle, sink) {
            Ok(registration) => Some(registration),
            Err(e) => {
                warn!(%handle, "Failed to subscribe to session notifications: {}", e);
                None
            }
        };

        Self {
            handle,
            platform,
            event_context,
            pid: None,
            events,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    /// Context stamped on every write made through this session.
    pub fn event_context(&self) -> EventContext {
        self.event_context
    }

    /// Whether the session's notification sink is registered.
    pub fn is_subscribed(&self) -> bool {
        self.events.is_some()
    }

    /// Query the owning process id, caching it on success.
    pub fn process_id(&mut self) -> Option<u32> {
        if self.pid.is_none() {
            self.pid = ok_or_log(self.platform.process_id(self.handle), "process_id");
        }
        self.pid
    }

    /// The cached process id, if it has been queried.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn grouping_token(&self) -> Option<GroupingToken> {
        ok_or_log(self.platform.grouping_token(self.handle), "grouping_token")
    }

    pub fn state(&self) -> Option<SessionState> {
        ok_or_log(self.platform.session_state(self.handle), "session_state")
    }

    pub fn is_system_sound(&self) -> bool {
        self.platform
            .is_system_sound(self.handle)
            .unwrap_or(false)
    }

    /// Peak read that keeps the error, so "no meter on this backend" can be
    /// told apart from a vanished session.
    pub fn read_peak(&self) -> PlatformResult<f32> {
        self.platform.session_peak(self.handle).map(|v| v.min(1.0))
    }
}

impl AudioControl for AudioSession {
    fn volume(&self) -> Option<f32> {
        ok_or_log(self.platform.session_volume(self.handle), "session_volume")
    }

    fn set_volume(&self, volume: f32) -> bool {
        self.platform
            .set_session_volume(self.handle, volume, self.event_context)
            .map_err(|e| trace!(handle = %self.handle, "set_session_volume failed: {}", e))
            .is_ok()
    }

    fn muted(&self) -> Option<bool> {
        ok_or_log(self.platform.session_muted(self.handle), "session_muted")
    }

    fn set_muted(&self, muted: bool) -> bool {
        self.platform
            .set_session_muted(self.handle, muted, self.event_context)
            .map_err(|e| trace!(handle = %self.handle, "set_session_muted failed: {}", e))
            .is_ok()
    }

    fn peak_value(&self) -> Option<f32> {
        ok_or_log(self.read_peak(), "session_peak")
    }
}

impl std::fmt::Debug for AudioSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSession")
            .field("handle", &self.handle)
            .field("pid", &self.pid)
            .field("subscribed", &self.events.is_some())
            .finish()
    }
}
