// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Renderable projection of one session.

use crate::audio::{AudioControl, AudioSession, SessionHandle, SessionState};
use crate::info::{IconImage, ProcessInfo};
use crate::view::meter::PeakMeter;
use std::cmp::Ordering;
use std::sync::Arc;

/// One row of the mixer.
#[derive(Debug, Clone)]
pub struct ViewItem {
    handle: SessionHandle,
    pid: u32,
    identifier: String,
    icon: Option<Arc<IconImage>>,
    /// Slider position, 0..=100.
    volume: u8,
    muted: bool,
    meter: PeakMeter,
    state: SessionState,
    read_failures: u32,
}

/// Convert a scalar volume to the slider's 0..=100 scale.
pub fn volume_to_percent(volume: f32) -> u8 {
    (volume * 100.0).round().clamp(0.0, 100.0) as u8
}

pub fn percent_to_volume(percent: u8) -> f32 {
    f32::from(percent.min(100)) / 100.0
}

impl ViewItem {
    pub fn new(
        handle: SessionHandle,
        pid: u32,
        identifier: impl Into<String>,
        state: SessionState,
    ) -> Self {
        Self {
            handle,
            pid,
            identifier: identifier.into(),
            icon: None,
            volume: 100,
            muted: false,
            meter: PeakMeter::default(),
            state,
            read_failures: 0,
        }
    }

    /// Build an item from a live session and its process information.
    pub fn from_session(session: &AudioSession, pid: u32, info: &ProcessInfo, state: SessionState) -> Self {
        let mut item = Self::new(session.handle(), pid, info.title(), state);
        item.icon = info.icon().cloned();
        item.volume = volume_to_percent(session.volume().unwrap_or(0.0));
        item.muted = session.muted().unwrap_or(true);
        item
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn icon(&self) -> Option<&Arc<IconImage>> {
        self.icon.as_ref()
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn peak(&self) -> u8 {
        self.meter.percent()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    /// Store a new slider value. Returns whether it differed.
    pub(crate) fn set_volume(&mut self, volume: u8) -> bool {
        let volume = volume.min(100);
        std::mem::replace(&mut self.volume, volume) != volume
    }

    pub(crate) fn set_muted(&mut self, muted: bool) -> bool {
        std::mem::replace(&mut self.muted, muted) != muted
    }

    /// Feed a peak reading. Returns whether the displayed value changed.
    pub(crate) fn update_peak(&mut self, sample: f32, dt: f32) -> bool {
        let before = self.meter.percent();
        self.meter.update(sample, dt);
        self.read_failures = 0;
        before != self.meter.percent()
    }

    /// Drop the displayed peak to zero, as for a muted row. Returns whether
    /// the displayed value changed.
    pub(crate) fn silence(&mut self) -> bool {
        let before = self.meter.percent();
        self.meter.reset();
        before != 0
    }

    /// Count a failed peak read and return the running total.
    pub(crate) fn record_failure(&mut self) -> u32 {
        self.read_failures += 1;
        self.read_failures
    }

    /// Display order: identifier, then session handle.
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        self.identifier
            .cmp(&other.identifier)
            .then(self.handle.cmp(&other.handle))
    }
}
