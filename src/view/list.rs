// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Ordered session rows.
//!
//! [`SessionList`] keeps two partitions of [`ViewItem`]s: the visible rows,
//! always sorted by display order and mirrored one-to-one by the renderer,
//! and the hidden rows of inactive sessions. Every change is forwarded to
//! the [`RowRenderer`] as inserts, removals and batched moves; the rendered
//! list is never rebuilt.

use crate::audio::{
    AudioControl, AudioSession, AudioSessionRegistry, PlatformError, SessionHandle, SessionState,
};
use crate::view::item::{percent_to_volume, volume_to_percent, ViewItem};
use crate::view::render::RowRenderer;
use sessionmix_seq::{is_sorted_by, moved_positions, permute, remove_indices, sorted_permutation};
use tracing::{debug, trace, warn};

pub struct SessionList<R: RowRenderer> {
    renderer: R,
    visible: Vec<ViewItem>,
    hidden: Vec<ViewItem>,
    show_inactive: bool,
    /// Consecutive failed peak reads after which a session counts as
    /// expired. Zero disables the check.
    failure_limit: u32,
}

impl<R: RowRenderer> SessionList<R> {
    pub fn new(renderer: R, show_inactive: bool, failure_limit: u32) -> Self {
        Self {
            renderer,
            visible: Vec::new(),
            hidden: Vec::new(),
            show_inactive,
            failure_limit,
        }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn into_renderer(self) -> R {
        self.renderer
    }

    pub fn show_inactive(&self) -> bool {
        self.show_inactive
    }

    /// Rows in rendered order.
    pub fn visible(&self) -> &[ViewItem] {
        &self.visible
    }

    pub fn hidden(&self) -> &[ViewItem] {
        &self.hidden
    }

    /// Identifiers of the visible rows, in rendered order.
    pub fn identifiers(&self) -> Vec<&str> {
        self.visible.iter().map(ViewItem::identifier).collect()
    }

    pub fn find(&self, handle: SessionHandle) -> Option<&ViewItem> {
        self.visible
            .iter()
            .chain(self.hidden.iter())
            .find(|item| item.handle() == handle)
    }

    pub fn contains(&self, handle: SessionHandle) -> bool {
        self.find(handle).is_some()
    }

    fn visible_position(&self, handle: SessionHandle) -> Option<usize> {
        self.visible.iter().position(|item| item.handle() == handle)
    }

    fn hidden_position(&self, handle: SessionHandle) -> Option<usize> {
        self.hidden.iter().position(|item| item.handle() == handle)
    }

    fn is_shown(&self, state: SessionState) -> bool {
        match state {
            SessionState::Active => true,
            SessionState::Inactive => self.show_inactive,
            SessionState::Expired => false,
        }
    }

    /// Initial population: append every shown item, then sort once.
    pub fn populate(&mut self, items: impl IntoIterator<Item = ViewItem>) {
        for item in items {
            self.place(item);
        }
        self.sort_visible();
    }

    /// Add one item, keeping the visible rows sorted.
    ///
    /// Returns false if the item was discarded (expired or already listed).
    pub fn add_item(&mut self, item: ViewItem) -> bool {
        let shown = self.is_shown(item.state());
        if !self.place(item) {
            return false;
        }
        if shown {
            self.sort_visible();
        }
        true
    }

    fn place(&mut self, item: ViewItem) -> bool {
        let handle = item.handle();
        if self.contains(handle) {
            warn!(%handle, "Session is already listed");
            return false;
        }
        match item.state() {
            SessionState::Expired => {
                debug!(%handle, "Discarding expired session");
                false
            }
            state if self.is_shown(state) => {
                debug!(%handle, title = %item.identifier(), row = self.visible.len(), "Inserting row");
                self.renderer.insert_row(self.visible.len(), &item);
                self.visible.push(item);
                true
            }
            _ => {
                debug!(%handle, title = %item.identifier(), "Hiding inactive session");
                self.hidden.push(item);
                true
            }
        }
    }

    /// Bring the visible rows into display order, moving only rows that are
    /// out of place.
    fn sort_visible(&mut self) {
        let permutation = sorted_permutation(&self.visible, ViewItem::display_cmp);
        let (from, to) = moved_positions(&permutation);
        if !from.is_empty() {
            self.renderer.move_rows(&from, &to);
            permute(&mut self.visible, permutation);
        }
        debug_assert!(is_sorted_by(&self.visible, ViewItem::display_cmp));
        trace!(rows = ?self.identifiers(), "Sorted rows");
    }

    pub fn on_session_active(&mut self, handle: SessionHandle) {
        if let Some(i) = self.visible_position(handle) {
            self.visible[i].set_state(SessionState::Active);
            return;
        }
        let Some(j) = self.hidden_position(handle) else {
            warn!(%handle, "Tried to reactivate a session that is not listed");
            return;
        };
        let mut item = self.hidden.remove(j);
        item.set_state(SessionState::Active);
        debug!(%handle, title = %item.identifier(), "Showing reactivated session");
        self.renderer.insert_row(self.visible.len(), &item);
        self.visible.push(item);
        self.sort_visible();
    }

    pub fn on_session_inactive(&mut self, handle: SessionHandle) {
        if let Some(j) = self.hidden_position(handle) {
            self.hidden[j].set_state(SessionState::Inactive);
            return;
        }
        let Some(i) = self.visible_position(handle) else {
            warn!(%handle, "Tried to deactivate a session that is not listed");
            return;
        };
        self.visible[i].set_state(SessionState::Inactive);
        if self.show_inactive {
            trace!(%handle, "Showing inactive sessions, row stays");
            return;
        }
        debug!(%handle, row = i, "Hiding deactivated session");
        self.renderer.remove_row(i);
        let item = self.visible.remove(i);
        self.hidden.push(item);
    }

    /// Drop the row of an expired or disconnected session.
    ///
    /// Returns the removed item, or `None` (logged) if it was not listed.
    pub fn on_session_expired(&mut self, handle: SessionHandle) -> Option<ViewItem> {
        if let Some(i) = self.visible_position(handle) {
            debug!(%handle, row = i, "Removing expired session");
            self.renderer.remove_row(i);
            return Some(self.visible.remove(i));
        }
        if let Some(j) = self.hidden_position(handle) {
            debug!(%handle, "Removing expired hidden session");
            return Some(self.hidden.remove(j));
        }
        warn!(%handle, "Expired session is in neither partition");
        None
    }

    /// Show or hide inactive sessions, re-sorting once.
    pub fn set_show_inactive(&mut self, show: bool) {
        if show == self.show_inactive {
            return;
        }
        self.show_inactive = show;
        debug!(show, "Show inactive changed");

        if show {
            if self.hidden.is_empty() {
                return;
            }
            for item in std::mem::take(&mut self.hidden) {
                self.renderer.insert_row(self.visible.len(), &item);
                self.visible.push(item);
            }
            self.sort_visible();
        } else {
            let rows: Vec<usize> = self
                .visible
                .iter()
                .enumerate()
                .filter(|(_, item)| item.state() == SessionState::Inactive)
                .map(|(i, _)| i)
                .collect();
            if rows.is_empty() {
                return;
            }
            debug!(?rows, "Hiding inactive rows");
            self.renderer.remove_rows(&rows);
            let len = remove_indices(&mut self.visible, &rows);
            self.hidden.extend(self.visible.drain(len..));
        }
    }

    /// Record an externally driven volume/mute change. Only visible rows
    /// are re-rendered.
    pub fn on_volume_changed(&mut self, handle: SessionHandle, volume: f32, muted: bool) {
        let percent = volume_to_percent(volume);
        if let Some(i) = self.visible_position(handle) {
            let item = &mut self.visible[i];
            if item.set_volume(percent) {
                self.renderer.volume_changed(i, percent);
            }
            if item.set_muted(muted) {
                self.renderer.mute_changed(i, muted);
            }
        } else if let Some(j) = self.hidden_position(handle) {
            let item = &mut self.hidden[j];
            item.set_volume(percent);
            item.set_muted(muted);
        } else {
            trace!(%handle, "Volume change for unlisted session");
        }
    }

    /// Re-read a session's volume and mute into its row.
    pub fn refresh(&mut self, session: &AudioSession) {
        if let (Some(volume), Some(muted)) = (session.volume(), session.muted()) {
            self.on_volume_changed(session.handle(), volume, muted);
        }
    }

    /// Local slider move: write the session, then update the row.
    pub fn set_volume(&mut self, handle: SessionHandle, percent: u8, registry: &AudioSessionRegistry) -> bool {
        let Some(session) = registry.session(handle) else {
            warn!(%handle, "Volume write for unknown session");
            return false;
        };
        if !session.set_volume(percent_to_volume(percent)) {
            return false;
        }
        let muted = self.find(handle).map_or(false, ViewItem::muted);
        self.on_volume_changed(handle, percent_to_volume(percent), muted);
        true
    }

    /// Local mute toggle: write the session, then update the row.
    pub fn set_muted(&mut self, handle: SessionHandle, muted: bool, registry: &AudioSessionRegistry) -> bool {
        let Some(session) = registry.session(handle) else {
            warn!(%handle, "Mute write for unknown session");
            return false;
        };
        if !session.set_muted(muted) {
            return false;
        }
        let volume = self.find(handle).map_or(100, ViewItem::volume);
        self.on_volume_changed(handle, percent_to_volume(volume), muted);
        true
    }

    /// Sample the peak of every visible row. Muted rows are not read and
    /// show no peak.
    ///
    /// Returns the sessions whose reads kept failing; the caller treats
    /// them as expired.
    pub fn update_peaks(&mut self, registry: &AudioSessionRegistry, dt: f32) -> Vec<SessionHandle> {
        let mut failed = Vec::new();
        for (i, item) in self.visible.iter_mut().enumerate() {
            if item.muted() {
                if item.silence() {
                    self.renderer.peak_updated(i, 0);
                }
                continue;
            }
            match registry.session(item.handle()).map(AudioSession::read_peak) {
                Some(Ok(peak)) => {
                    if item.update_peak(peak, dt) {
                        self.renderer.peak_updated(i, item.peak());
                    }
                }
                Some(Err(PlatformError::Unsupported(_))) => {}
                _ => {
                    let failures = item.record_failure();
                    if self.failure_limit > 0 && failures == self.failure_limit {
                        debug!(handle = %item.handle(), failures, "Peak reads keep failing");
                        failed.push(item.handle());
                    }
                }
            }
        }
        failed
    }
}

impl<R: RowRenderer + std::fmt::Debug> std::fmt::Debug for SessionList<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionList")
            .field("renderer", &self.renderer)
            .field("visible", &self.identifiers())
            .field("hidden", &self.hidden.len())
            .field("show_inactive", &self.show_inactive)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::{event_channel, AudioPlatform, MixerEvent, SimSession, SimulatedPlatform};
    use std::sync::Arc;

    /// Renderer that applies every operation to its own row list.
    #[derive(Debug, Default)]
    pub(crate) struct MirrorRenderer {
        pub rows: Vec<SessionHandle>,
        pub inserts: usize,
        pub removes: usize,
        pub move_batches: usize,
        pub volumes: Vec<(usize, u8)>,
        pub mutes: Vec<(usize, bool)>,
        pub peaks: Vec<(usize, u8)>,
        pub device: Vec<(u8, bool)>,
        pub device_peaks: Vec<u8>,
    }

    impl RowRenderer for MirrorRenderer {
        fn insert_row(&mut self, index: usize, item: &ViewItem) {
            assert!(index <= self.rows.len());
            self.rows.insert(index, item.handle());
            self.inserts += 1;
        }

        fn remove_row(&mut self, index: usize) {
            self.rows.remove(index);
            self.removes += 1;
        }

        fn move_rows(&mut self, from: &[usize], to: &[usize]) {
            assert_eq!(from.len(), to.len());
            let mut sorted_from = from.to_vec();
            let mut sorted_to = to.to_vec();
            sorted_from.sort_unstable();
            sorted_to.sort_unstable();
            assert_eq!(sorted_from, sorted_to, "moves must permute rows");

            let old = self.rows.clone();
            for (&f, &t) in from.iter().zip(to) {
                self.rows[t] = old[f];
            }
            self.move_batches += 1;
        }

        fn volume_changed(&mut self, index: usize, volume: u8) {
            self.volumes.push((index, volume));
        }

        fn mute_changed(&mut self, index: usize, muted: bool) {
            self.mutes.push((index, muted));
        }

        fn peak_updated(&mut self, index: usize, peak: u8) {
            self.peaks.push((index, peak));
        }

        fn device_changed(&mut self, volume: u8, muted: bool) {
            self.device.push((volume, muted));
        }

        fn device_peak(&mut self, peak: u8) {
            self.device_peaks.push(peak);
        }
    }

    pub(crate) fn assert_mirrored(list: &SessionList<MirrorRenderer>) {
        let expected: Vec<SessionHandle> = list.visible().iter().map(ViewItem::handle).collect();
        assert_eq!(list.renderer().rows, expected);
        assert!(is_sorted_by(list.visible(), ViewItem::display_cmp));
        for item in list.visible() {
            assert!(list.hidden().iter().all(|h| h.handle() != item.handle()));
        }
    }

    fn item(handle: u64, title: &str, state: SessionState) -> ViewItem {
        ViewItem::new(SessionHandle(handle), 100 + handle as u32, title, state)
    }

    fn list() -> SessionList<MirrorRenderer> {
        SessionList::new(MirrorRenderer::default(), false, 3)
    }

    #[test]
    fn test_populate_sorts_and_hides_inactive() {
        let mut list = list();
        list.populate([
            item(1, "mpv", SessionState::Active),
            item(2, "Discord", SessionState::Inactive),
            item(3, "Firefox", SessionState::Active),
            item(4, "Gone", SessionState::Expired),
        ]);

        assert_eq!(list.identifiers(), vec!["Firefox", "mpv"]);
        assert_eq!(list.hidden().len(), 1);
        assert!(!list.contains(SessionHandle(4)));
        assert_eq!(list.renderer().move_batches, 1);
        assert_mirrored(&list);
    }

    #[test]
    fn test_add_item_keeps_order() {
        let mut list = list();
        for (handle, title) in [(1, "b"), (2, "d"), (3, "a"), (4, "c")] {
            assert!(list.add_item(item(handle, title, SessionState::Active)));
            assert_mirrored(&list);
        }
        assert_eq!(list.identifiers(), vec!["a", "b", "c", "d"]);
        assert_eq!(list.renderer().inserts, 4);
    }

    #[test]
    fn test_add_item_in_place_emits_no_moves() {
        let mut list = list();
        list.add_item(item(1, "a", SessionState::Active));
        list.add_item(item(2, "b", SessionState::Active));
        assert_eq!(list.renderer().move_batches, 0);
    }

    #[test]
    fn test_add_item_rejects_expired_and_duplicates() {
        let mut list = list();
        assert!(!list.add_item(item(1, "a", SessionState::Expired)));
        assert!(list.add_item(item(2, "b", SessionState::Active)));
        assert!(!list.add_item(item(2, "b", SessionState::Active)));
        assert_eq!(list.visible().len(), 1);
        assert_mirrored(&list);
    }

    #[test]
    fn test_equal_titles_sorted_by_handle() {
        let mut list = list();
        list.add_item(item(9, "App", SessionState::Active));
        list.add_item(item(4, "App", SessionState::Active));
        let handles: Vec<_> = list.visible().iter().map(ViewItem::handle).collect();
        assert_eq!(handles, vec![SessionHandle(4), SessionHandle(9)]);
        assert_mirrored(&list);
    }

    #[test]
    fn test_active_inactive_active_is_listed_once() {
        let mut list = list();
        list.add_item(item(1, "a", SessionState::Active));
        list.add_item(item(2, "b", SessionState::Active));

        list.on_session_active(SessionHandle(1));
        list.on_session_inactive(SessionHandle(1));
        assert_eq!(list.identifiers(), vec!["b"]);
        assert_eq!(list.hidden().len(), 1);
        assert_mirrored(&list);

        list.on_session_active(SessionHandle(1));
        list.on_session_active(SessionHandle(1));
        assert_eq!(list.identifiers(), vec!["a", "b"]);
        assert!(list.hidden().is_empty());
        assert_eq!(list.find(SessionHandle(1)).unwrap().state(), SessionState::Active);
        assert_mirrored(&list);
    }

    #[test]
    fn test_state_changes_keep_rows_while_showing_inactive() {
        let mut list = SessionList::new(MirrorRenderer::default(), true, 3);
        list.add_item(item(1, "a", SessionState::Inactive));
        list.add_item(item(2, "b", SessionState::Active));
        assert_eq!(list.identifiers(), vec!["a", "b"]);

        list.on_session_inactive(SessionHandle(2));
        list.on_session_active(SessionHandle(1));
        assert_eq!(list.identifiers(), vec!["a", "b"]);
        assert_eq!(list.renderer().removes, 0);
        assert_eq!(list.find(SessionHandle(2)).unwrap().state(), SessionState::Inactive);
    }

    #[test]
    fn test_show_inactive_toggle() {
        let mut list = list();
        list.populate([
            item(1, "e", SessionState::Active),
            item(2, "a", SessionState::Inactive),
            item(3, "c", SessionState::Active),
            item(4, "b", SessionState::Inactive),
            item(5, "d", SessionState::Inactive),
        ]);
        assert_eq!(list.identifiers(), vec!["c", "e"]);

        let batches = list.renderer().move_batches;
        list.set_show_inactive(true);
        assert_eq!(list.identifiers(), vec!["a", "b", "c", "d", "e"]);
        assert!(list.hidden().is_empty());
        assert_eq!(list.renderer().move_batches, batches + 1);
        assert_mirrored(&list);

        list.set_show_inactive(false);
        assert_eq!(list.identifiers(), vec!["c", "e"]);
        assert_eq!(list.hidden().len(), 3);
        assert_mirrored(&list);

        // no-op when unchanged
        let removes = list.renderer().removes;
        list.set_show_inactive(false);
        assert_eq!(list.renderer().removes, removes);
    }

    #[test]
    fn test_hiding_uses_cached_state() {
        let mut list = SessionList::new(MirrorRenderer::default(), true, 3);
        list.add_item(item(1, "a", SessionState::Active));
        list.add_item(item(2, "b", SessionState::Active));
        list.on_session_inactive(SessionHandle(1));

        list.set_show_inactive(false);
        assert_eq!(list.identifiers(), vec!["b"]);
        assert_mirrored(&list);
    }

    #[test]
    fn test_expiry_from_either_partition() {
        let mut list = list();
        list.add_item(item(1, "a", SessionState::Active));
        list.add_item(item(2, "b", SessionState::Inactive));

        assert!(list.on_session_expired(SessionHandle(1)).is_some());
        assert!(list.on_session_expired(SessionHandle(2)).is_some());
        assert!(list.on_session_expired(SessionHandle(3)).is_none());
        assert!(list.visible().is_empty());
        assert!(list.hidden().is_empty());
        assert_mirrored(&list);
    }

    #[test]
    fn test_external_volume_rendered_only_when_visible() {
        let mut list = list();
        list.add_item(item(1, "a", SessionState::Active));
        list.add_item(item(2, "b", SessionState::Inactive));

        list.on_volume_changed(SessionHandle(1), 0.25, true);
        list.on_volume_changed(SessionHandle(2), 0.75, true);
        list.on_volume_changed(SessionHandle(1), 0.25, true);

        assert_eq!(list.renderer().volumes, vec![(0, 25)]);
        assert_eq!(list.renderer().mutes, vec![(0, true)]);
        let hidden = list.find(SessionHandle(2)).unwrap();
        assert_eq!((hidden.volume(), hidden.muted()), (75, true));
    }

    /// xorshift, enough to shuffle operations deterministically
    fn next(seed: &mut u64) -> u64 {
        *seed ^= *seed << 13;
        *seed ^= *seed >> 7;
        *seed ^= *seed << 17;
        *seed
    }

    #[test]
    fn test_random_operations_keep_render_in_sync() {
        let titles = ["alpha", "beta", "gamma", "delta", "App", "App"];
        let mut seed = 0x2545_f491_4f6c_dd1d;
        let mut list = list();
        let mut next_handle = 1;

        for _ in 0..2000 {
            let handle = SessionHandle(next(&mut seed) % (next_handle + 1));
            match next(&mut seed) % 6 {
                0 => {
                    let title = titles[(next(&mut seed) % titles.len() as u64) as usize];
                    let state = if next(&mut seed) % 2 == 0 {
                        SessionState::Active
                    } else {
                        SessionState::Inactive
                    };
                    list.add_item(ViewItem::new(SessionHandle(next_handle), 1, title, state));
                    next_handle += 1;
                }
                1 => list.on_session_active(handle),
                2 => list.on_session_inactive(handle),
                3 => {
                    list.on_session_expired(handle);
                }
                4 => list.set_show_inactive(!list.show_inactive()),
                _ => list.on_volume_changed(handle, 0.5, false),
            }
            assert_mirrored(&list);
            let listed = list.visible().len() + list.hidden().len();
            let mut handles: Vec<_> = list
                .visible()
                .iter()
                .chain(list.hidden())
                .map(ViewItem::handle)
                .collect();
            handles.sort();
            handles.dedup();
            assert_eq!(handles.len(), listed, "session listed twice");
        }
    }

    struct Live {
        platform: Arc<SimulatedPlatform>,
        registry: AudioSessionRegistry,
        rx: crate::audio::EventReceiver,
        list: SessionList<MirrorRenderer>,
    }

    fn live(sessions: &[SimSession]) -> (Live, Vec<SessionHandle>) {
        let platform = Arc::new(SimulatedPlatform::new());
        let (tx, rx) = event_channel();
        let mut registry = AudioSessionRegistry::new();
        let mut list = list();
        let mut handles = Vec::new();
        for sim in sessions {
            let handle = platform.add_session(sim.clone());
            let session = AudioSession::new(platform.clone() as Arc<dyn AudioPlatform>, handle, &tx);
            let handle = registry.file(session).unwrap();
            let session = registry.session(handle).unwrap();
            let state = session.state().unwrap();
            let mut item = ViewItem::new(handle, 1, format!("app{}", handle.0), state);
            item.set_volume(volume_to_percent(session.volume().unwrap()));
            list.add_item(item);
            handles.push(handle);
        }
        (
            Live {
                platform,
                registry,
                rx,
                list,
            },
            handles,
        )
    }

    impl Live {
        fn drain(&mut self) {
            while let Ok(event) = self.rx.try_recv() {
                if let MixerEvent::VolumeChanged { session, volume, muted } = event {
                    self.list.on_volume_changed(session, volume, muted);
                }
            }
        }
    }

    #[test]
    fn test_local_write_renders_once() {
        let (mut live, handles) = live(&[SimSession::new(1).volume(0.5).active()]);

        assert!(live.list.set_volume(handles[0], 40, &live.registry));
        live.drain();
        assert_eq!(live.list.renderer().volumes, vec![(0, 40)]);
        assert_eq!(live.platform.session_volume(handles[0]), Ok(0.4));

        assert!(live.list.set_muted(handles[0], true, &live.registry));
        live.drain();
        assert_eq!(live.list.renderer().mutes, vec![(0, true)]);

        live.platform.change_volume_externally(handles[0], 0.9, true);
        live.drain();
        assert_eq!(live.list.renderer().volumes, vec![(0, 40), (0, 90)]);
    }

    #[test]
    fn test_write_to_vanished_session_fails() {
        let (mut live, handles) = live(&[SimSession::new(1).active()]);
        live.platform.vanish(handles[0]);
        assert!(!live.list.set_volume(handles[0], 10, &live.registry));
        assert!(!live.list.set_muted(SessionHandle(999), true, &live.registry));
        assert!(live.list.renderer().volumes.is_empty());
    }

    #[test]
    fn test_peaks_and_implicit_expiry() {
        let (mut live, handles) = live(&[
            SimSession::new(1).active(),
            SimSession::new(2).active(),
        ]);
        live.platform.set_peak(handles[0], 0.8);

        let failed = live.list.update_peaks(&live.registry, 1.0 / 60.0);
        assert!(failed.is_empty());
        assert_eq!(live.list.renderer().peaks.len(), 1);
        assert_eq!(live.list.renderer().peaks[0].0, 0);

        live.platform.vanish(handles[1]);
        assert!(live.list.update_peaks(&live.registry, 1.0 / 60.0).is_empty());
        assert!(live.list.update_peaks(&live.registry, 1.0 / 60.0).is_empty());
        assert_eq!(live.list.update_peaks(&live.registry, 1.0 / 60.0), vec![handles[1]]);
        // reported once, not on every later tick
        assert!(live.list.update_peaks(&live.registry, 1.0 / 60.0).is_empty());
    }

    #[test]
    fn test_muted_row_shows_no_peak() {
        let (mut live, handles) = live(&[SimSession::new(1).active()]);
        live.platform.set_peak(handles[0], 0.8);
        live.list.update_peaks(&live.registry, 0.1);
        assert!(live.list.renderer().peaks[0].1 > 0);

        assert!(live.list.set_muted(handles[0], true, &live.registry));
        live.list.update_peaks(&live.registry, 0.1);
        live.list.update_peaks(&live.registry, 0.1);
        assert_eq!(live.list.renderer().peaks.len(), 2);
        assert_eq!(live.list.renderer().peaks[1], (0, 0));
        assert_eq!(live.list.find(handles[0]).unwrap().peak(), 0);

        // a muted session is not read, so a vanished one does not count failures
        live.platform.vanish(handles[0]);
        for _ in 0..5 {
            assert!(live.list.update_peaks(&live.registry, 0.1).is_empty());
        }
    }
}
