// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Output device control.

use crate::audio::notification::{DeviceEvents, DeviceEventsRegistration, EventSender};
use crate::audio::platform::{AudioPlatform, PlatformResult};
use crate::audio::session::{ok_or_log, AudioControl};
use crate::audio::types::{DataFlow, DeviceHandle, DeviceRole, EventContext};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Volume control of the single device the mixer is attached to.
pub struct DeviceAudioControl {
    device: DeviceHandle,
    platform: Arc<dyn AudioPlatform>,
    event_context: EventContext,
    name: String,
    events: Option<DeviceEventsRegistration>,
}

impl DeviceAudioControl {
    /// Resolve the default device for `flow`/`role` and subscribe to its
    /// volume notifications.
    pub fn open_default(
        platform: Arc<dyn AudioPlatform>,
        flow: DataFlow,
        role: DeviceRole,
        events: &EventSender,
    ) -> PlatformResult<Self> {
        let device = platform.default_device(flow, role)?;
        Ok(Self::new(platform, device, events))
    }

    pub fn new(platform: Arc<dyn AudioPlatform>, device: DeviceHandle, events: &EventSender) -> Self {
        let event_context = EventContext::new();
        let name = platform
            .device_name(device)
            .unwrap_or_else(|_| device.to_string());

        let sink = DeviceEvents::new(event_context, events.clone());
        let events = match DeviceEventsRegistration::new(Arc::clone(&platform), device, sink) {
            Ok(registration) => Some(registration),
            Err(e) => {
                warn!(%device, "Failed to subscribe to device notifications: {}", e);
                None
            }
        };

        debug!(%device, name = %name, "Opened device control");
        Self {
            device,
            platform,
            event_context,
            name,
            events,
        }
    }

    pub fn device(&self) -> DeviceHandle {
        self.device
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn event_context(&self) -> EventContext {
        self.event_context
    }

    pub fn is_subscribed(&self) -> bool {
        self.events.is_some()
    }
}

impl AudioControl for DeviceAudioControl {
    fn volume(&self) -> Option<f32> {
        ok_or_log(self.platform.device_volume(self.device), "device_volume")
    }

    fn set_volume(&self, volume: f32) -> bool {
        self.platform
            .set_device_volume(self.device, volume, self.event_context)
            .map_err(|e| trace!("set_device_volume failed: {}", e))
            .is_ok()
    }

    fn muted(&self) -> Option<bool> {
        ok_or_log(self.platform.device_muted(self.device), "device_muted")
    }

    fn set_muted(&self, muted: bool) -> bool {
        self.platform
            .set_device_muted(self.device, muted, self.event_context)
            .map_err(|e| trace!("set_device_muted failed: {}", e))
            .is_ok()
    }

    fn peak_value(&self) -> Option<f32> {
        ok_or_log(self.platform.device_peak(self.device), "device_peak").map(|v| v.min(1.0))
    }
}

impl std::fmt::Debug for DeviceAudioControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceAudioControl")
            .field("device", &self.device)
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::notification::{event_channel, MixerEvent};
    use crate::audio::simulated::SimulatedPlatform;

    #[test]
    fn test_device_control_round_trip() {
        let platform = Arc::new(SimulatedPlatform::new());
        let (tx, rx) = event_channel();
        let device = DeviceAudioControl::open_default(
            platform.clone() as Arc<dyn AudioPlatform>,
            DataFlow::Render,
            DeviceRole::Multimedia,
            &tx,
        )
        .unwrap();

        assert_eq!(device.name(), "Simulated Output");
        assert!(device.set_volume(0.25));
        assert!(device.set_muted(true));
        assert_eq!(device.volume(), Some(0.25));
        assert_eq!(device.muted(), Some(true));
        // both writes were ours
        assert!(rx.try_recv().is_err());

        platform.change_device_volume_externally(0.8, false);
        assert_eq!(
            rx.try_recv().unwrap(),
            MixerEvent::DeviceVolumeChanged {
                volume: 0.8,
                muted: false
            }
        );
    }

    #[test]
    fn test_device_drop_unregisters() {
        let platform = Arc::new(SimulatedPlatform::new());
        let (tx, _rx) = event_channel();
        let device = DeviceAudioControl::new(
            platform.clone() as Arc<dyn AudioPlatform>,
            platform.device(),
            &tx,
        );
        assert!(device.is_subscribed());
        assert_eq!(platform.device_event_count(), 1);
        drop(device);
        assert_eq!(platform.device_event_count(), 0);
    }
}
