// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Audio subsystem - platform seam, sessions and notifications.

pub mod device;
pub mod groups;
pub mod notification;
#[cfg(feature = "pipewire")]
pub mod pipewire_platform;
pub mod platform;
#[cfg(feature = "pipewire")]
pub mod props;
pub mod session;
pub mod simulated;
pub mod types;

pub use device::DeviceAudioControl;
pub use groups::{AudioSessionGroup, AudioSessionPidGroup, AudioSessionRegistry};
pub use notification::{
    event_channel, EventReceiver, EventSender, MixerEvent, Registration, SessionNotification,
    SessionNotificationRegistration,
};
#[cfg(feature = "pipewire")]
pub use pipewire_platform::{PipeWirePlatform, PwError};
pub use platform::{AudioPlatform, PlatformError, PlatformResult};
pub use session::{AudioControl, AudioSession};
pub use simulated::{SimSession, SimulatedPlatform};
pub use types::*;
