// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Value types shared between the platform backends and the mixer.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque handle of one audio session, as issued by the platform.
///
/// Handles are ordered so they can serve as a stable tie-breaker when two
/// rows carry the same title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionHandle(pub u64);

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Opaque handle of an output or input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceHandle(pub u64);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

/// Identity shared by sessions that should be controlled as one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupingToken(pub Uuid);

impl GroupingToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GroupingToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GroupingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Token stamped on every locally initiated write.
///
/// Notifications carrying a control's own context are echoes of its own
/// changes and are not delivered back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventContext(pub Uuid);

impl EventContext {
    /// Create a fresh, unique context.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle state of a session.
///
/// `Inactive <-> Active -> Expired`, and `Inactive -> Expired`. Expired is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Inactive,
    Active,
    Expired,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the platform disconnected a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// The device the session was rendering to was removed.
    DeviceRemoval,
    /// The audio server shut down.
    ServerShutdown,
    /// The stream format changed.
    FormatChanged,
    /// The user logged off.
    SessionLogoff,
    /// The session was disconnected by the server.
    SessionDisconnected,
    /// Another client took the device in exclusive mode.
    ExclusiveModeOverride,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeviceRemoval => "device removed",
            Self::ServerShutdown => "server shut down",
            Self::FormatChanged => "format changed",
            Self::SessionLogoff => "user logged off",
            Self::SessionDisconnected => "session disconnected",
            Self::ExclusiveModeOverride => "exclusive-mode override",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of audio through a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFlow {
    /// Playback.
    #[default]
    Render,
    /// Recording.
    Capture,
}

/// Which default device to pick for a data flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    Console,
    #[default]
    Multimedia,
    Communications,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_contexts_are_unique() {
        assert_ne!(EventContext::new(), EventContext::new());
    }

    #[test]
    fn test_session_handle_ordering() {
        let mut handles = vec![SessionHandle(3), SessionHandle(1), SessionHandle(2)];
        handles.sort();
        assert_eq!(handles, vec![SessionHandle(1), SessionHandle(2), SessionHandle(3)]);
        assert_eq!(SessionHandle(7).to_string(), "session#7");
    }

    #[test]
    fn test_disconnect_reason_text() {
        assert_eq!(DisconnectReason::DeviceRemoval.to_string(), "device removed");
        assert_eq!(
            DisconnectReason::ExclusiveModeOverride.as_str(),
            "exclusive-mode override"
        );
    }
}
