// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Notification bridge between the platform thread and the mixer.
//!
//! Platform callbacks arrive on a thread the mixer does not own. The sinks in
//! this module copy the payload into a [`MixerEvent`] and push it onto an
//! unbounded, ordered queue; the mixer drains that queue on its own thread.
//! Nothing else crosses the thread boundary.
//!
//! Sinks are shared between the platform and the application with `Arc`.
//! The platform keeps its own clone for as long as the sink is registered,
//! and [`Registration`] makes sure the sink is unregistered before the
//! application's reference is released.

use crate::audio::platform::{
    AudioPlatform, DeviceEventSink, PlatformResult, SessionEventSink, SessionNotificationSink,
};
use crate::audio::types::{
    DeviceHandle, DisconnectReason, EventContext, GroupingToken, SessionHandle, SessionState,
};
use std::sync::mpsc;
use std::sync::Arc;
use tracing::{trace, warn};

/// Normalized notification delivered to the mixer.
#[derive(Debug, Clone, PartialEq)]
pub enum MixerEvent {
    /// A new session appeared on the device.
    SessionCreated(SessionHandle),
    /// A session's volume or mute flag changed externally.
    VolumeChanged {
        session: SessionHandle,
        volume: f32,
        muted: bool,
    },
    /// A session changed lifecycle state.
    StateChanged {
        session: SessionHandle,
        state: SessionState,
    },
    /// A session's grouping token changed.
    GroupingChanged {
        session: SessionHandle,
        token: GroupingToken,
    },
    /// The platform disconnected a session.
    Disconnected {
        session: SessionHandle,
        reason: DisconnectReason,
    },
    /// The device volume or mute flag changed externally.
    DeviceVolumeChanged { volume: f32, muted: bool },
}

/// Producer side of the event queue. Cheap to clone; never blocks.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<MixerEvent>,
}

impl EventSender {
    pub fn send(&self, event: MixerEvent) {
        if self.tx.send(event).is_err() {
            trace!("Event queue closed, dropping notification");
        }
    }
}

/// Consumer side of the event queue.
pub type EventReceiver = mpsc::Receiver<MixerEvent>;

/// Create the unbounded event queue.
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel();
    (EventSender { tx }, rx)
}

fn is_own_echo(own: EventContext, incoming: Option<EventContext>) -> bool {
    incoming == Some(own)
}

/// Device-level sink announcing new sessions.
#[derive(Debug)]
pub struct SessionNotification {
    events: EventSender,
}

impl SessionNotification {
    pub fn new(events: EventSender) -> Arc<Self> {
        Arc::new(Self { events })
    }
}

impl SessionNotificationSink for SessionNotification {
    fn on_session_created(&self, session: SessionHandle) {
        trace!(%session, "Session created notification");
        self.events.send(MixerEvent::SessionCreated(session));
    }
}

/// Per-session sink.
///
/// Drops volume and grouping notifications that carry the session's own
/// event context, so a local write is never re-applied as if it came from
/// outside.
#[derive(Debug)]
pub struct SessionEvents {
    session: SessionHandle,
    context: EventContext,
    events: EventSender,
}

impl SessionEvents {
    pub fn new(session: SessionHandle, context: EventContext, events: EventSender) -> Arc<Self> {
        Arc::new(Self {
            session,
            context,
            events,
        })
    }
}

impl SessionEventSink for SessionEvents {
    fn on_simple_volume_changed(&self, volume: f32, muted: bool, context: Option<EventContext>) {
        if is_own_echo(self.context, context) {
            trace!(session = %self.session, "Suppressing echo of local volume change");
            return;
        }
        self.events.send(MixerEvent::VolumeChanged {
            session: self.session,
            volume,
            muted,
        });
    }

    fn on_state_changed(&self, state: SessionState) {
        self.events.send(MixerEvent::StateChanged {
            session: self.session,
            state,
        });
    }

    fn on_grouping_param_changed(&self, token: GroupingToken, context: Option<EventContext>) {
        if is_own_echo(self.context, context) {
            return;
        }
        self.events.send(MixerEvent::GroupingChanged {
            session: self.session,
            token,
        });
    }

    fn on_session_disconnected(&self, reason: DisconnectReason) {
        self.events.send(MixerEvent::Disconnected {
            session: self.session,
            reason,
        });
    }
}

/// Device sink with the same echo suppression as [`SessionEvents`].
#[derive(Debug)]
pub struct DeviceEvents {
    context: EventContext,
    events: EventSender,
}

impl DeviceEvents {
    pub fn new(context: EventContext, events: EventSender) -> Arc<Self> {
        Arc::new(Self { context, events })
    }
}

impl DeviceEventSink for DeviceEvents {
    fn on_notify(&self, volume: f32, muted: bool, context: Option<EventContext>) {
        if is_own_echo(self.context, context) {
            trace!("Suppressing echo of local device volume change");
            return;
        }
        self.events
            .send(MixerEvent::DeviceVolumeChanged { volume, muted });
    }
}

/// A sink kind that can be registered with an [`AudioPlatform`].
pub trait Subscribable: Send + Sync {
    /// The platform object the sink is attached to.
    type Target: Copy + std::fmt::Debug + Send + Sync;

    fn register(platform: &dyn AudioPlatform, target: Self::Target, sink: Arc<Self>) -> PlatformResult<()>;
    fn unregister(platform: &dyn AudioPlatform, target: Self::Target, sink: &Arc<Self>) -> PlatformResult<()>;
}

impl Subscribable for dyn SessionNotificationSink {
    type Target = DeviceHandle;

    fn register(platform: &dyn AudioPlatform, device: DeviceHandle, sink: Arc<Self>) -> PlatformResult<()> {
        platform.register_session_notification(device, sink)
    }

    fn unregister(platform: &dyn AudioPlatform, device: DeviceHandle, sink: &Arc<Self>) -> PlatformResult<()> {
        platform.unregister_session_notification(device, sink)
    }
}

impl Subscribable for dyn SessionEventSink {
    type Target = SessionHandle;

    fn register(platform: &dyn AudioPlatform, session: SessionHandle, sink: Arc<Self>) -> PlatformResult<()> {
        platform.register_session_events(session, sink)
    }

    fn unregister(platform: &dyn AudioPlatform, session: SessionHandle, sink: &Arc<Self>) -> PlatformResult<()> {
        platform.unregister_session_events(session, sink)
    }
}

impl Subscribable for dyn DeviceEventSink {
    type Target = DeviceHandle;

    fn register(platform: &dyn AudioPlatform, device: DeviceHandle, sink: Arc<Self>) -> PlatformResult<()> {
        platform.register_device_events(device, sink)
    }

    fn unregister(platform: &dyn AudioPlatform, device: DeviceHandle, sink: &Arc<Self>) -> PlatformResult<()> {
        platform.unregister_device_events(device, sink)
    }
}

/// A live registration of a sink with the platform.
///
/// Dropping the guard unregisters the sink first and releases the
/// application's reference afterwards, so the platform never calls into a
/// sink the application already gave up.
pub struct Registration<S: ?Sized + Subscribable> {
    platform: Arc<dyn AudioPlatform>,
    target: S::Target,
    sink: Option<Arc<S>>,
}

/// Registration of the device-level session-created sink.
pub type SessionNotificationRegistration = Registration<dyn SessionNotificationSink>;
/// Registration of a per-session sink.
pub type SessionEventsRegistration = Registration<dyn SessionEventSink>;
/// Registration of the device volume sink.
pub type DeviceEventsRegistration = Registration<dyn DeviceEventSink>;

impl<S: ?Sized + Subscribable> Registration<S> {
    /// Register `sink` on `target`.
    pub fn new(platform: Arc<dyn AudioPlatform>, target: S::Target, sink: Arc<S>) -> PlatformResult<Self> {
        S::register(platform.as_ref(), target, Arc::clone(&sink))?;
        Ok(Self {
            platform,
            target,
            sink: Some(sink),
        })
    }

    /// Unregister now instead of on drop.
    pub fn unregister(mut self) -> PlatformResult<()> {
        self.release()
    }

    fn release(&mut self) -> PlatformResult<()> {
        match self.sink.take() {
            Some(sink) => S::unregister(self.platform.as_ref(), self.target, &sink),
            None => Ok(()),
        }
    }
}

impl<S: ?Sized + Subscribable> Drop for Registration<S> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to unregister notification sink on {:?}: {}", self.target, e);
        }
    }
}

impl<S: ?Sized + Subscribable> std::fmt::Debug for Registration<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("target", &self.target)
            .field("active", &self.sink.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::simulated::{SimSession, SimulatedPlatform};

    #[test]
    fn test_session_events_suppress_own_echo() {
        let (tx, rx) = event_channel();
        let context = EventContext::new();
        let sink = SessionEvents::new(SessionHandle(1), context, tx);

        sink.on_simple_volume_changed(0.4, false, Some(context));
        assert!(rx.try_recv().is_err());

        sink.on_simple_volume_changed(0.7, true, Some(EventContext::new()));
        sink.on_simple_volume_changed(0.2, false, None);
        assert_eq!(
            rx.try_recv().unwrap(),
            MixerEvent::VolumeChanged {
                session: SessionHandle(1),
                volume: 0.7,
                muted: true
            }
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            MixerEvent::VolumeChanged { volume, .. } if volume == 0.2
        ));
    }

    #[test]
    fn test_events_keep_platform_order() {
        let (tx, rx) = event_channel();
        let sink = SessionEvents::new(SessionHandle(9), EventContext::new(), tx);

        sink.on_state_changed(SessionState::Active);
        sink.on_simple_volume_changed(0.3, false, None);
        sink.on_state_changed(SessionState::Inactive);
        sink.on_session_disconnected(DisconnectReason::FormatChanged);

        let received: Vec<MixerEvent> = rx.try_iter().collect();
        assert_eq!(received.len(), 4);
        assert!(matches!(received[0], MixerEvent::StateChanged { state: SessionState::Active, .. }));
        assert!(matches!(received[1], MixerEvent::VolumeChanged { .. }));
        assert!(matches!(received[2], MixerEvent::StateChanged { state: SessionState::Inactive, .. }));
        assert!(matches!(received[3], MixerEvent::Disconnected { .. }));
    }

    #[test]
    fn test_events_cross_threads_in_order() {
        let (tx, rx) = event_channel();
        let sink: Arc<dyn SessionEventSink> = SessionEvents::new(SessionHandle(2), EventContext::new(), tx);

        let remote = Arc::clone(&sink);
        std::thread::spawn(move || {
            for i in 0..100 {
                remote.on_simple_volume_changed(i as f32 / 100.0, false, None);
            }
        })
        .join()
        .unwrap();

        let volumes: Vec<f32> = rx
            .try_iter()
            .map(|e| match e {
                MixerEvent::VolumeChanged { volume, .. } => volume,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(volumes.len(), 100);
        assert!(volumes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_device_events_suppress_own_echo() {
        let (tx, rx) = event_channel();
        let context = EventContext::new();
        let sink = DeviceEvents::new(context, tx);

        sink.on_notify(0.5, false, Some(context));
        sink.on_notify(0.6, true, None);
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![MixerEvent::DeviceVolumeChanged {
                volume: 0.6,
                muted: true
            }]
        );
    }

    #[test]
    fn test_registration_releases_platform_reference() {
        let platform = Arc::new(SimulatedPlatform::new());
        let device = platform.device();
        let (tx, _rx) = event_channel();
        let sink: Arc<dyn SessionNotificationSink> = SessionNotification::new(tx);

        let registration = SessionNotificationRegistration::new(
            platform.clone() as Arc<dyn AudioPlatform>,
            device,
            Arc::clone(&sink),
        )
        .unwrap();

        // ours, the guard's and the platform's
        assert_eq!(Arc::strong_count(&sink), 3);
        assert_eq!(platform.session_notification_count(), 1);

        drop(registration);
        assert_eq!(platform.session_notification_count(), 0);
        assert_eq!(Arc::strong_count(&sink), 1);
    }

    #[test]
    fn test_session_created_reaches_queue() {
        let platform = Arc::new(SimulatedPlatform::new());
        let (tx, rx) = event_channel();
        let _registration = SessionNotificationRegistration::new(
            platform.clone() as Arc<dyn AudioPlatform>,
            platform.device(),
            SessionNotification::new(tx),
        )
        .unwrap();

        let handle = platform.add_session(SimSession::new(4242).active());
        assert_eq!(rx.try_recv().unwrap(), MixerEvent::SessionCreated(handle));
    }
}
