// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Session grouping: process id, then grouping token.
//!
//! The registry owns every live [`AudioSession`]. Sessions with the same
//! `(pid, token)` share one [`AudioSessionGroup`] and are controlled as one
//! row; all groups of one process live in an [`AudioSessionPidGroup`],
//! which also caches the process's [`ProcessInfo`].

use crate::audio::session::{AudioControl, AudioSession};
use crate::audio::types::{GroupingToken, SessionHandle};
use crate::info::{ProcessInfo, ProcessMetadata};
use tracing::{debug, trace};

/// Sessions of one process sharing a grouping token.
#[derive(Debug)]
pub struct AudioSessionGroup {
    token: GroupingToken,
    members: Vec<AudioSession>,
}

impl AudioSessionGroup {
    pub fn new(token: GroupingToken) -> Self {
        Self {
            token,
            members: Vec::new(),
        }
    }

    pub fn token(&self) -> GroupingToken {
        self.token
    }

    pub fn insert(&mut self, session: AudioSession) {
        self.members.push(session);
    }

    pub fn members(&self) -> &[AudioSession] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn find(&self, handle: SessionHandle) -> Option<&AudioSession> {
        self.members.iter().find(|s| s.handle() == handle)
    }

    pub fn find_mut(&mut self, handle: SessionHandle) -> Option<&mut AudioSession> {
        self.members.iter_mut().find(|s| s.handle() == handle)
    }

    /// Remove and return a member, keeping the others in insertion order.
    pub fn remove(&mut self, handle: SessionHandle) -> Option<AudioSession> {
        let pos = self.members.iter().position(|s| s.handle() == handle)?;
        Some(self.members.remove(pos))
    }

    pub fn handles(&self) -> impl Iterator<Item = SessionHandle> + '_ {
        self.members.iter().map(AudioSession::handle)
    }

    pub fn is_system_sound(&self) -> bool {
        self.members.iter().any(AudioSession::is_system_sound)
    }
}

impl AudioControl for AudioSessionGroup {
    /// Members move in lock-step, so the first one speaks for the group.
    /// An empty group reads as full volume.
    fn volume(&self) -> Option<f32> {
        match self.members.first() {
            Some(first) => first.volume(),
            None => Some(1.0),
        }
    }

    fn set_volume(&self, volume: f32) -> bool {
        // every member is written even after a failure
        self.members
            .iter()
            .fold(true, |ok, s| s.set_volume(volume) && ok)
    }

    fn muted(&self) -> Option<bool> {
        let mut any = false;
        for member in &self.members {
            any |= member.muted()?;
        }
        Some(any)
    }

    fn set_muted(&self, muted: bool) -> bool {
        self.members
            .iter()
            .fold(true, |ok, s| s.set_muted(muted) && ok)
    }

    fn peak_value(&self) -> Option<f32> {
        self.members
            .iter()
            .filter_map(AudioSession::peak_value)
            .reduce(f32::max)
    }
}

/// Every group belonging to one process.
#[derive(Debug)]
pub struct AudioSessionPidGroup {
    pid: u32,
    groups: Vec<AudioSessionGroup>,
    info: Option<ProcessInfo>,
}

impl AudioSessionPidGroup {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            groups: Vec::new(),
            info: None,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn groups(&self) -> &[AudioSessionGroup] {
        &self.groups
    }

    pub fn find_group(&self, token: GroupingToken) -> Option<&AudioSessionGroup> {
        self.groups.iter().find(|g| g.token == token)
    }

    pub fn find_or_create_group(&mut self, token: GroupingToken) -> &mut AudioSessionGroup {
        let pos = match self.groups.iter().position(|g| g.token == token) {
            Some(pos) => pos,
            None => {
                trace!(pid = self.pid, %token, "Creating session group");
                self.groups.push(AudioSessionGroup::new(token));
                self.groups.len() - 1
            }
        };
        &mut self.groups[pos]
    }

    pub fn insert(&mut self, token: GroupingToken, session: AudioSession) {
        self.find_or_create_group(token).insert(session);
    }

    pub fn session_count(&self) -> usize {
        self.groups.iter().map(AudioSessionGroup::len).sum()
    }

    pub fn is_system_sound(&self) -> bool {
        self.groups.iter().any(AudioSessionGroup::is_system_sound)
    }

    pub fn info(&self) -> Option<&ProcessInfo> {
        self.info.as_ref()
    }

    /// Fetch the process's title and icon the first time they are asked for.
    pub fn ensure_info(&mut self, metadata: &dyn ProcessMetadata, icon_size: u32) -> &ProcessInfo {
        let pid = self.pid;
        let system_sound = self.is_system_sound();
        self.info
            .get_or_insert_with(|| ProcessInfo::for_process(pid, system_sound, metadata, icon_size))
    }

    fn sessions(&self) -> impl Iterator<Item = &AudioSession> + '_ {
        self.groups.iter().flat_map(|g| g.members.iter())
    }
}

impl AudioControl for AudioSessionPidGroup {
    fn volume(&self) -> Option<f32> {
        match self.groups.first() {
            Some(first) => first.volume(),
            None => Some(1.0),
        }
    }

    fn set_volume(&self, volume: f32) -> bool {
        self.groups
            .iter()
            .fold(true, |ok, g| g.set_volume(volume) && ok)
    }

    fn muted(&self) -> Option<bool> {
        let mut any = false;
        for group in &self.groups {
            any |= group.muted()?;
        }
        Some(any)
    }

    fn set_muted(&self, muted: bool) -> bool {
        self.groups
            .iter()
            .fold(true, |ok, g| g.set_muted(muted) && ok)
    }

    fn peak_value(&self) -> Option<f32> {
        self.groups
            .iter()
            .filter_map(AudioSessionGroup::peak_value)
            .reduce(f32::max)
    }
}

/// Root of the grouping model.
///
/// Lookup is a linear scan; live process counts stay in the tens.
#[derive(Debug, Default)]
pub struct AudioSessionRegistry {
    groups: Vec<AudioSessionPidGroup>,
}

impl AudioSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pid_groups(&self) -> &[AudioSessionPidGroup] {
        &self.groups
    }

    pub fn find_pid_group(&self, pid: u32) -> Option<&AudioSessionPidGroup> {
        self.groups.iter().find(|g| g.pid == pid)
    }

    pub fn find_pid_group_mut(&mut self, pid: u32) -> Option<&mut AudioSessionPidGroup> {
        self.groups.iter_mut().find(|g| g.pid == pid)
    }

    pub fn find_or_create_pid_group(&mut self, pid: u32) -> &mut AudioSessionPidGroup {
        let pos = match self.groups.iter().position(|g| g.pid == pid) {
            Some(pos) => pos,
            None => {
                debug!(pid, "Creating pid group");
                self.groups.push(AudioSessionPidGroup::new(pid));
                self.groups.len() - 1
            }
        };
        &mut self.groups[pos]
    }

    pub fn insert(&mut self, pid: u32, token: GroupingToken, session: AudioSession) {
        self.find_or_create_pid_group(pid).insert(token, session);
    }

    /// File a session under its process and grouping token.
    ///
    /// Returns the session's handle, or `None` when the process id or the
    /// grouping token cannot be read, in which case the session is dropped.
    pub fn file(&mut self, mut session: AudioSession) -> Option<SessionHandle> {
        let handle = session.handle();
        let Some(pid) = session.process_id() else {
            debug!(%handle, "Dropping session without process id");
            return None;
        };
        let Some(token) = session.grouping_token() else {
            debug!(%handle, pid, "Dropping session without grouping token");
            return None;
        };
        self.insert(pid, token, session);
        debug!(%handle, pid, %token, "Filed session");
        Some(handle)
    }

    pub fn contains(&self, handle: SessionHandle) -> bool {
        self.session(handle).is_some()
    }

    pub fn session(&self, handle: SessionHandle) -> Option<&AudioSession> {
        self.sessions().find(|s| s.handle() == handle)
    }

    pub fn session_mut(&mut self, handle: SessionHandle) -> Option<&mut AudioSession> {
        self.groups
            .iter_mut()
            .flat_map(|p| p.groups.iter_mut())
            .find_map(|g| g.find_mut(handle))
    }

    /// The `(pid, token)` a session is filed under.
    pub fn locate(&self, handle: SessionHandle) -> Option<(u32, GroupingToken)> {
        self.groups.iter().find_map(|p| {
            p.groups
                .iter()
                .find(|g| g.find(handle).is_some())
                .map(|g| (p.pid, g.token))
        })
    }

    /// Take a session out of the registry.
    ///
    /// A group left empty is removed; the pid group is kept so its process
    /// information need not be fetched again.
    pub fn remove_session(&mut self, handle: SessionHandle) -> Option<AudioSession> {
        for pid_group in &mut self.groups {
            let Some(pos) = pid_group
                .groups
                .iter()
                .position(|g| g.find(handle).is_some())
            else {
                continue;
            };
            let removed = pid_group.groups[pos].remove(handle);
            if pid_group.groups[pos].is_empty() {
                let group = pid_group.groups.remove(pos);
                trace!(pid = pid_group.pid, token = %group.token, "Removed empty session group");
            }
            return removed;
        }
        None
    }

    /// Every session, in registry order.
    pub fn sessions(&self) -> impl Iterator<Item = &AudioSession> + '_ {
        self.groups.iter().flat_map(AudioSessionPidGroup::sessions)
    }

    /// Drop every session (unregistering their sinks) and cached info.
    pub fn clear(&mut self) {
        self.groups.clear();
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.groups.iter().map(AudioSessionPidGroup::session_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
