// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The consumer side of the mixer.
//!
//! [`Mixer`] owns the session registry and the ordered row list and is the
//! only place either is mutated. Platform notifications reach it through
//! the event queue and are applied one at a time, in arrival order, on the
//! thread that calls [`Mixer::pump`] or [`Mixer::run`].

use crate::audio::{
    event_channel, AudioControl, AudioPlatform, AudioSession, AudioSessionRegistry,
    DeviceAudioControl, EventReceiver, EventSender, MixerEvent, PlatformError, SessionHandle,
    SessionNotification, SessionNotificationRegistration, SessionState,
};
use crate::config::AppConfig;
use crate::info::ProcessMetadata;
use crate::view::{percent_to_volume, volume_to_percent, PeakMeter, RowRenderer, SessionList, ViewItem};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Error)]
pub enum MixerError {
    #[error("No default audio device: {0}")]
    NoDevice(PlatformError),
    #[error("Failed to enumerate audio sessions: {0}")]
    Enumerate(PlatformError),
    #[error("Failed to subscribe to new sessions: {0}")]
    Register(PlatformError),
}

/// A live mixer attached to one output device.
pub struct Mixer<R: RowRenderer> {
    // Field order is drop order: the session-created sink goes first, then
    // the sessions, then the device.
    notification: SessionNotificationRegistration,
    registry: AudioSessionRegistry,
    list: SessionList<R>,
    device: DeviceAudioControl,
    device_meter: PeakMeter,
    device_volume: u8,
    device_muted: bool,
    platform: Arc<dyn AudioPlatform>,
    metadata: Box<dyn ProcessMetadata>,
    icon_size: u32,
    interval: Duration,
    last_tick: Instant,
    events_tx: EventSender,
    events: EventReceiver,
}

impl<R: RowRenderer> Mixer<R> {
    /// Attach to the default device and list the sessions already playing.
    ///
    /// The session-created sink is registered before enumerating, so a
    /// session that appears in between is announced as well as enumerated;
    /// the duplicate announcement is ignored.
    pub fn open(
        platform: Arc<dyn AudioPlatform>,
        metadata: Box<dyn ProcessMetadata>,
        renderer: R,
        config: &AppConfig,
    ) -> Result<Self, MixerError> {
        let (events_tx, events) = event_channel();

        let device = DeviceAudioControl::open_default(
            Arc::clone(&platform),
            config.device.flow,
            config.device.role,
            &events_tx,
        )
        .map_err(MixerError::NoDevice)?;

        let notification = SessionNotificationRegistration::new(
            Arc::clone(&platform),
            device.device(),
            SessionNotification::new(events_tx.clone()),
        )
        .map_err(MixerError::Register)?;

        let handles = platform
            .enumerate_sessions(device.device())
            .map_err(MixerError::Enumerate)?;

        let mut registry = AudioSessionRegistry::new();
        for handle in handles {
            registry.file(AudioSession::new(Arc::clone(&platform), handle, &events_tx));
        }

        let device_volume = volume_to_percent(device.volume().unwrap_or(0.0));
        let device_muted = device.muted().unwrap_or(true);

        let mut mixer = Self {
            notification,
            registry,
            list: SessionList::new(
                renderer,
                config.general.show_inactive,
                config.meter.failure_limit,
            ),
            device,
            device_meter: PeakMeter::default(),
            device_volume,
            device_muted,
            platform,
            metadata,
            icon_size: config.icons.size,
            interval: config.meter.interval(),
            last_tick: Instant::now(),
            events_tx,
            events,
        };

        let handles: Vec<SessionHandle> = mixer.registry.sessions().map(AudioSession::handle).collect();
        let items: Vec<ViewItem> = handles
            .into_iter()
            .filter_map(|handle| mixer.build_item(handle))
            .collect();
        mixer.list.populate(items);
        mixer
            .list
            .renderer_mut()
            .device_changed(mixer.device_volume, mixer.device_muted);

        info!(
            device = %mixer.device.name(),
            sessions = mixer.registry.len(),
            rows = mixer.list.visible().len(),
            "Mixer opened"
        );
        Ok(mixer)
    }

    /// Build the row of a filed session, fetching its process information
    /// on first use.
    ///
    /// An expired session, or one whose state cannot be read, is taken out
    /// of the registry instead.
    fn build_item(&mut self, handle: SessionHandle) -> Option<ViewItem> {
        let (pid, _) = self.registry.locate(handle)?;
        if let Some(pid_group) = self.registry.find_pid_group_mut(pid) {
            pid_group.ensure_info(self.metadata.as_ref(), self.icon_size);
        }

        let state = self.registry.session(handle).and_then(AudioSession::state);
        match state {
            Some(SessionState::Expired) | None => {
                debug!(%handle, pid, ?state, "Dropping session that is already gone");
                self.registry.remove_session(handle);
                None
            }
            Some(state) => {
                let session = self.registry.session(handle)?;
                let info = self.registry.find_pid_group(pid)?.info()?;
                Some(ViewItem::from_session(session, pid, info, state))
            }
        }
    }

    /// Apply one notification.
    pub fn handle_event(&mut self, event: MixerEvent) {
        trace!(?event, "Handling event");
        match event {
            MixerEvent::SessionCreated(handle) => self.on_session_created(handle),
            MixerEvent::StateChanged { session, state } => match state {
                SessionState::Active => self.list.on_session_active(session),
                SessionState::Inactive => self.list.on_session_inactive(session),
                SessionState::Expired => self.remove_session(session),
            },
            MixerEvent::VolumeChanged {
                session,
                volume,
                muted,
            } => self.list.on_volume_changed(session, volume, muted),
            MixerEvent::GroupingChanged { session, token } => {
                // The session stays filed under the token it was created with.
                debug!(
                    %session,
                    %token,
                    filed_under = ?self.registry.locate(session),
                    "Grouping token changed, keeping original group"
                );
            }
            MixerEvent::Disconnected { session, reason } => {
                debug!(%session, %reason, "Session disconnected");
                self.remove_session(session);
            }
            MixerEvent::DeviceVolumeChanged { volume, muted } => {
                self.device_volume = volume_to_percent(volume);
                self.device_muted = muted;
                self.list
                    .renderer_mut()
                    .device_changed(self.device_volume, muted);
            }
        }
    }

    fn on_session_created(&mut self, handle: SessionHandle) {
        if self.registry.contains(handle) {
            trace!(%handle, "Session is already filed");
            return;
        }
        let session = AudioSession::new(Arc::clone(&self.platform), handle, &self.events_tx);
        if self.registry.file(session).is_none() {
            return;
        }
        if let Some(item) = self.build_item(handle) {
            self.list.add_item(item);
        }
    }

    fn remove_session(&mut self, handle: SessionHandle) {
        self.list.on_session_expired(handle);
        if self.registry.remove_session(handle).is_none() {
            trace!(%handle, "Expired session was not filed");
        }
    }

    /// Apply every queued notification without blocking. Returns how many
    /// were applied.
    pub fn pump(&mut self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
            count += 1;
        }
        count
    }

    /// Process notifications and refresh peaks until `shutdown` is set.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        debug!(interval = ?self.interval, "Mixer loop started");
        let mut next_tick = Instant::now() + self.interval;
        while !shutdown.load(Ordering::Relaxed) {
            let timeout = next_tick.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(timeout) {
                Ok(event) => self.handle_event(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            let now = Instant::now();
            if now >= next_tick {
                let dt = now.duration_since(self.last_tick).as_secs_f32();
                self.last_tick = now;
                self.update_peaks(dt);
                next_tick = now + self.interval;
            }
        }
        debug!("Mixer loop stopped");
    }

    /// Sample every visible session and the device once.
    ///
    /// Sessions whose peak reads keep failing are treated as expired.
    pub fn update_peaks(&mut self, dt: f32) {
        for handle in self.list.update_peaks(&self.registry, dt) {
            debug!(%handle, "Treating unreadable session as expired");
            self.remove_session(handle);
        }

        let before = self.device_meter.percent();
        if self.device_muted {
            self.device_meter.reset();
        } else if let Some(peak) = self.device.peak_value() {
            self.device_meter.update(peak, dt);
        }
        let after = self.device_meter.percent();
        if after != before {
            self.list.renderer_mut().device_peak(after);
        }
    }

    pub fn set_session_volume(&mut self, handle: SessionHandle, percent: u8) -> bool {
        self.list.set_volume(handle, percent.min(100), &self.registry)
    }

    pub fn set_session_muted(&mut self, handle: SessionHandle, muted: bool) -> bool {
        self.list.set_muted(handle, muted, &self.registry)
    }

    /// Write the volume of every session of a process.
    ///
    /// Every member is written even if one fails; the result is false if
    /// any write failed. The rows are re-read afterwards either way.
    pub fn set_process_volume(&mut self, pid: u32, percent: u8) -> bool {
        let Some(pid_group) = self.registry.find_pid_group(pid) else {
            warn!(pid, "Volume write for unknown process");
            return false;
        };
        let ok = pid_group.set_volume(percent_to_volume(percent.min(100)));
        self.refresh_process(pid);
        ok
    }

    pub fn set_process_muted(&mut self, pid: u32, muted: bool) -> bool {
        let Some(pid_group) = self.registry.find_pid_group(pid) else {
            warn!(pid, "Mute write for unknown process");
            return false;
        };
        let ok = pid_group.set_muted(muted);
        self.refresh_process(pid);
        ok
    }

    fn refresh_process(&mut self, pid: u32) {
        let Some(pid_group) = self.registry.find_pid_group(pid) else {
            return;
        };
        for session in pid_group.groups().iter().flat_map(|g| g.members()) {
            self.list.refresh(session);
        }
    }

    pub fn set_device_volume(&mut self, percent: u8) -> bool {
        let percent = percent.min(100);
        if !self.device.set_volume(percent_to_volume(percent)) {
            return false;
        }
        self.device_volume = percent;
        self.list
            .renderer_mut()
            .device_changed(percent, self.device_muted);
        true
    }

    pub fn set_device_muted(&mut self, muted: bool) -> bool {
        if !self.device.set_muted(muted) {
            return false;
        }
        self.device_muted = muted;
        self.list
            .renderer_mut()
            .device_changed(self.device_volume, muted);
        true
    }

    pub fn set_show_inactive(&mut self, show: bool) {
        self.list.set_show_inactive(show);
    }

    pub fn registry(&self) -> &AudioSessionRegistry {
        &self.registry
    }

    pub fn list(&self) -> &SessionList<R> {
        &self.list
    }

    pub fn renderer(&self) -> &R {
        self.list.renderer()
    }

    pub fn device(&self) -> &DeviceAudioControl {
        &self.device
    }

    /// Device volume (percent) and mute flag as last rendered.
    pub fn device_state(&self) -> (u8, bool) {
        (self.device_volume, self.device_muted)
    }

    /// Detach from the platform and hand back the renderer.
    ///
    /// The session-created sink is unregistered first, then every session
    /// (each unregistering its own sink), then the device control.
    pub fn close(self) -> R {
        let Self {
            notification,
            mut registry,
            list,
            device,
            ..
        } = self;

        if let Err(e) = notification.unregister() {
            warn!("Failed to unregister session notifications: {}", e);
        }
        registry.clear();
        drop(device);

        info!("Mixer closed");
        list.into_renderer()
    }
}

impl<R: RowRenderer> std::fmt::Debug for Mixer<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer")
            .field("device", &self.device)
            .field("sessions", &self.registry.len())
            .field("rows", &self.list.visible().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{DisconnectReason, GroupingToken, SimSession, SimulatedPlatform};
    use crate::info::tests::FakeMetadata;
    use crate::view::list::tests::{assert_mirrored, MirrorRenderer};

    fn open_with(
        platform: &Arc<SimulatedPlatform>,
        metadata: FakeMetadata,
        config: &AppConfig,
    ) -> Mixer<MirrorRenderer> {
        Mixer::open(
            platform.clone() as Arc<dyn AudioPlatform>,
            Box::new(metadata),
            MirrorRenderer::default(),
            config,
        )
        .unwrap()
    }

    fn open(platform: &Arc<SimulatedPlatform>) -> Mixer<MirrorRenderer> {
        let metadata = FakeMetadata::default()
            .with_name(4242, "App")
            .with_name(1337, "Chat")
            .with_name(7, "Browser");
        open_with(platform, metadata, &AppConfig::default())
    }

    fn rows(mixer: &Mixer<MirrorRenderer>) -> Vec<SessionHandle> {
        mixer.list().visible().iter().map(ViewItem::handle).collect()
    }

    #[test]
    fn test_second_session_of_process_is_listed_in_order() {
        let platform = Arc::new(SimulatedPlatform::new());
        let first = platform.add_existing_session(SimSession::new(4242).volume(0.5).active());
        let mut mixer = open(&platform);

        assert_eq!(mixer.list().identifiers(), vec!["App"]);
        assert_eq!(mixer.list().find(first).unwrap().volume(), 50);

        let second = platform.add_session(SimSession::new(4242).active());
        assert_eq!(mixer.pump(), 1);

        assert_eq!(mixer.list().identifiers(), vec!["App", "App"]);
        assert_eq!(rows(&mixer), vec![first, second]);
        assert!(mixer.list().visible().iter().all(|item| item.pid() == 4242));

        let pid_group = mixer.registry().find_pid_group(4242).unwrap();
        assert_eq!(pid_group.groups().len(), 2);
        assert_eq!(pid_group.info().unwrap().title(), "App");
        assert_mirrored(mixer.list());
    }

    #[test]
    fn test_rows_sorted_by_title() {
        let platform = Arc::new(SimulatedPlatform::new());
        platform.add_existing_session(SimSession::new(4242).active());
        let mut mixer = open(&platform);

        platform.add_session(SimSession::new(7).active());
        platform.add_session(SimSession::new(1337).active());
        mixer.pump();

        assert_eq!(mixer.list().identifiers(), vec!["App", "Browser", "Chat"]);
        assert_mirrored(mixer.list());
    }

    #[test]
    fn test_shared_token_joins_one_group() {
        let platform = Arc::new(SimulatedPlatform::new());
        let mut mixer = open(&platform);
        let token = GroupingToken::new();

        platform.add_session(SimSession::new(4242).token(token).active());
        platform.add_session(SimSession::new(4242).token(token).active());
        mixer.pump();

        let pid_group = mixer.registry().find_pid_group(4242).unwrap();
        assert_eq!(pid_group.groups().len(), 1);
        assert_eq!(pid_group.find_group(token).unwrap().len(), 2);
        assert_eq!(mixer.list().visible().len(), 2);
    }

    #[test]
    fn test_duplicate_created_event_is_ignored() {
        let platform = Arc::new(SimulatedPlatform::new());
        let handle = platform.add_existing_session(SimSession::new(4242).active());
        let mut mixer = open(&platform);

        mixer.handle_event(MixerEvent::SessionCreated(handle));

        assert_eq!(mixer.registry().len(), 1);
        assert_eq!(rows(&mixer), vec![handle]);
        assert_eq!(platform.session_event_count(handle), 1);
    }

    #[test]
    fn test_unusable_sessions_are_dropped() {
        let platform = Arc::new(SimulatedPlatform::new());
        let gone = platform.add_existing_session(SimSession::new(4242).expired());
        let mut mixer = open(&platform);
        assert!(!mixer.registry().contains(gone));

        let expired = platform.add_session(SimSession::new(7).expired());
        let orphan = platform.add_session(SimSession::without_pid().active());
        mixer.pump();

        assert!(mixer.registry().is_empty());
        assert!(mixer.list().visible().is_empty());
        assert_eq!(platform.session_event_count(expired), 0);
        assert_eq!(platform.session_event_count(orphan), 0);
    }

    #[test]
    fn test_activity_toggles_visibility() {
        let platform = Arc::new(SimulatedPlatform::new());
        let mut mixer = open(&platform);
        let chat = platform.add_session(SimSession::new(1337).inactive());
        mixer.pump();
        assert!(mixer.list().visible().is_empty());
        assert_eq!(mixer.list().hidden().len(), 1);

        platform.set_state(chat, SessionState::Active);
        platform.set_state(chat, SessionState::Inactive);
        platform.set_state(chat, SessionState::Active);
        mixer.pump();

        assert_eq!(rows(&mixer), vec![chat]);
        assert!(mixer.list().hidden().is_empty());
        assert_mirrored(mixer.list());
    }

    #[test]
    fn test_show_inactive_toggle() {
        let platform = Arc::new(SimulatedPlatform::new());
        platform.add_existing_session(SimSession::new(4242).active());
        platform.add_existing_session(SimSession::new(1337).inactive());
        let mut mixer = open(&platform);
        assert_eq!(mixer.list().identifiers(), vec!["App"]);

        mixer.set_show_inactive(true);
        assert_eq!(mixer.list().identifiers(), vec!["App", "Chat"]);
        assert_mirrored(mixer.list());

        mixer.set_show_inactive(false);
        assert_eq!(mixer.list().identifiers(), vec!["App"]);
        assert_mirrored(mixer.list());
    }

    #[test]
    fn test_local_write_renders_once() {
        let platform = Arc::new(SimulatedPlatform::new());
        let handle = platform.add_existing_session(SimSession::new(4242).volume(1.0).active());
        let mut mixer = open(&platform);

        assert!(mixer.set_session_volume(handle, 40));
        assert_eq!(mixer.pump(), 0);
        assert_eq!(mixer.renderer().volumes, vec![(0, 40)]);
        assert_eq!(mixer.list().find(handle).unwrap().volume(), 40);

        platform.change_volume_externally(handle, 0.9, true);
        mixer.pump();
        assert_eq!(mixer.renderer().volumes, vec![(0, 40), (0, 90)]);
        assert_eq!(mixer.renderer().mutes, vec![(0, true)]);
    }

    #[test]
    fn test_session_mute_write() {
        let platform = Arc::new(SimulatedPlatform::new());
        let handle = platform.add_existing_session(SimSession::new(4242).active());
        let mut mixer = open(&platform);

        assert!(mixer.set_session_muted(handle, true));
        assert!(mixer.list().find(handle).unwrap().muted());
        assert!(!mixer.set_session_muted(SessionHandle(999), true));
    }

    #[test]
    fn test_process_volume_reaches_every_session() {
        let platform = Arc::new(SimulatedPlatform::new());
        let a = platform.add_existing_session(SimSession::new(4242).volume(0.5).active());
        let b = platform.add_existing_session(SimSession::new(4242).volume(0.8).active());
        let mut mixer = open(&platform);

        assert!(mixer.set_process_volume(4242, 25));
        assert_eq!(mixer.list().find(a).unwrap().volume(), 25);
        assert_eq!(mixer.list().find(b).unwrap().volume(), 25);
        assert_eq!(platform.session_volume(a), Ok(0.25));
        assert_eq!(platform.session_volume(b), Ok(0.25));

        assert!(mixer.set_process_muted(4242, true));
        assert!(mixer.list().visible().iter().all(ViewItem::muted));
        assert!(!mixer.set_process_volume(9999, 10));
    }

    #[test]
    fn test_partial_process_write_reports_failure() {
        let platform = Arc::new(SimulatedPlatform::new());
        let a = platform.add_existing_session(SimSession::new(4242).volume(0.5).active());
        let b = platform.add_existing_session(SimSession::new(4242).volume(0.5).active());
        let mut mixer = open(&platform);

        platform.vanish(a);
        assert!(!mixer.set_process_volume(4242, 70));
        assert_eq!(platform.session_volume(b), Ok(0.7));
        assert_eq!(mixer.list().find(b).unwrap().volume(), 70);
    }

    #[test]
    fn test_expiry_and_disconnect_remove_sessions() {
        let platform = Arc::new(SimulatedPlatform::new());
        let a = platform.add_existing_session(SimSession::new(4242).active());
        let b = platform.add_existing_session(SimSession::new(1337).inactive());
        let mut mixer = open(&platform);

        platform.expire(a);
        platform.disconnect(b, DisconnectReason::SessionLogoff);
        mixer.pump();

        assert!(mixer.list().visible().is_empty());
        assert!(mixer.list().hidden().is_empty());
        assert!(mixer.registry().is_empty());
        assert_eq!(platform.session_event_count(a), 0);
        assert_eq!(platform.session_event_count(b), 0);
        // process info stays cached
        assert!(mixer.registry().find_pid_group(4242).is_some());
        assert_mirrored(mixer.list());
    }

    #[test]
    fn test_unreadable_session_expires_implicitly() {
        let platform = Arc::new(SimulatedPlatform::new());
        let handle = platform.add_existing_session(SimSession::new(4242).active());
        let mut config = AppConfig::default();
        config.meter.failure_limit = 3;
        let mut mixer = open_with(&platform, FakeMetadata::default(), &config);

        platform.vanish(handle);
        mixer.update_peaks(0.016);
        mixer.update_peaks(0.016);
        assert_eq!(rows(&mixer), vec![handle]);
        mixer.update_peaks(0.016);

        assert!(mixer.list().visible().is_empty());
        assert!(!mixer.registry().contains(handle));
    }

    #[test]
    fn test_peaks_are_rendered() {
        let platform = Arc::new(SimulatedPlatform::new());
        let handle = platform.add_existing_session(SimSession::new(4242).active());
        let mut mixer = open(&platform);

        platform.set_peak(handle, 1.0);
        platform.set_device_peak(1.0);
        mixer.update_peaks(0.1);

        assert_eq!(mixer.renderer().peaks.len(), 1);
        assert!(mixer.renderer().peaks[0].1 > 0);
        assert_eq!(mixer.renderer().device_peaks.len(), 1);
    }

    #[test]
    fn test_muted_row_and_device_show_no_peak() {
        let platform = Arc::new(SimulatedPlatform::new());
        let handle = platform.add_existing_session(SimSession::new(4242).muted(true).active());
        let mut mixer = open(&platform);
        assert!(mixer.list().find(handle).unwrap().muted());

        platform.set_peak(handle, 0.8);
        platform.set_device_peak(0.8);
        mixer.update_peaks(0.1);
        assert!(mixer.renderer().peaks.is_empty());
        assert_eq!(mixer.renderer().device_peaks.len(), 1);
        assert!(mixer.renderer().device_peaks[0] > 0);

        assert!(mixer.set_device_muted(true));
        mixer.update_peaks(0.1);
        mixer.update_peaks(0.1);
        assert!(mixer.renderer().peaks.is_empty());
        assert_eq!(mixer.renderer().device_peaks[1..], [0]);

        assert!(mixer.set_device_muted(false));
        mixer.update_peaks(0.1);
        assert!(*mixer.renderer().device_peaks.last().unwrap() > 0);
    }

    #[test]
    fn test_device_writes_and_notifications() {
        let platform = Arc::new(SimulatedPlatform::new());
        let mut mixer = open(&platform);
        assert_eq!(mixer.renderer().device, vec![(100, false)]);

        assert!(mixer.set_device_volume(30));
        assert!(mixer.set_device_muted(true));
        assert_eq!(mixer.pump(), 0);
        assert_eq!(mixer.device_state(), (30, true));

        platform.change_device_volume_externally(0.8, false);
        mixer.pump();
        assert_eq!(
            mixer.renderer().device,
            vec![(100, false), (30, false), (30, true), (80, false)]
        );
    }

    #[test]
    fn test_grouping_change_keeps_original_group() {
        let platform = Arc::new(SimulatedPlatform::new());
        let token = GroupingToken::new();
        let handle = platform.add_existing_session(SimSession::new(4242).token(token).active());
        let mut mixer = open(&platform);

        platform.change_grouping(handle, GroupingToken::new());
        mixer.pump();

        assert_eq!(mixer.registry().locate(handle), Some((4242, token)));
        assert_eq!(rows(&mixer), vec![handle]);
    }

    #[test]
    fn test_open_errors() {
        let platform = Arc::new(SimulatedPlatform::new());
        platform.set_device_available(false);
        let result = Mixer::open(
            platform.clone() as Arc<dyn AudioPlatform>,
            Box::new(FakeMetadata::default()),
            MirrorRenderer::default(),
            &AppConfig::default(),
        );
        assert!(matches!(result, Err(MixerError::NoDevice(_))));

        platform.set_device_available(true);
        platform.set_enumerate_fails(true);
        let result = Mixer::open(
            platform.clone() as Arc<dyn AudioPlatform>,
            Box::new(FakeMetadata::default()),
            MirrorRenderer::default(),
            &AppConfig::default(),
        );
        assert!(matches!(result, Err(MixerError::Enumerate(_))));
        assert_eq!(platform.session_notification_count(), 0);
        assert_eq!(platform.device_event_count(), 0);
    }

    #[test]
    fn test_close_unregisters_everything() {
        let platform = Arc::new(SimulatedPlatform::new());
        let a = platform.add_existing_session(SimSession::new(4242).active());
        let mixer = open(&platform);
        assert_eq!(platform.session_notification_count(), 1);
        assert_eq!(platform.session_event_count(a), 1);
        assert_eq!(platform.device_event_count(), 1);

        let renderer = mixer.close();
        assert_eq!(renderer.rows, vec![a]);
        assert_eq!(platform.session_notification_count(), 0);
        assert_eq!(platform.session_event_count(a), 0);
        assert_eq!(platform.device_event_count(), 0);
    }

    #[test]
    fn test_run_until_shutdown() {
        let platform = Arc::new(SimulatedPlatform::new());
        let mut mixer = open(&platform);
        let shutdown = Arc::new(AtomicBool::new(false));

        let remote = Arc::clone(&platform);
        let flag = Arc::clone(&shutdown);
        let producer = std::thread::spawn(move || {
            let handle = remote.add_session(SimSession::new(1337).active());
            remote.set_peak(handle, 0.8);
            std::thread::sleep(Duration::from_millis(100));
            flag.store(true, Ordering::Relaxed);
            handle
        });

        mixer.run(&shutdown);
        let handle = producer.join().unwrap();

        assert_eq!(rows(&mixer), vec![handle]);
        assert!(!mixer.renderer().peaks.is_empty());
    }
}
