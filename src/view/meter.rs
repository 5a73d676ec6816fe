// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Peak meter smoothing.

/// Displayed peak of one row.
///
/// Raw peak samples jump between refresh ticks; the meter rises quickly
/// towards a louder sample and falls slowly towards a quieter one.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeakMeter {
    level: f32,
}

impl PeakMeter {
    /// Attack time constant in seconds.
    const ATTACK_TIME: f32 = 0.015;
    /// Decay time constant in seconds.
    const DECAY_TIME: f32 = 0.25;

    /// Alpha for `level += alpha * (target - level)` after `dt` seconds.
    #[inline]
    fn smooth_coeff(dt: f32, time_constant: f32) -> f32 {
        1.0 - (-dt / time_constant).exp()
    }

    /// Feed a raw sample in `0.0..=1.0` taken `dt` seconds after the
    /// previous one. Returns the new displayed level.
    pub fn update(&mut self, sample: f32, dt: f32) -> f32 {
        let sample = sample.clamp(0.0, 1.0);
        let time_constant = if sample > self.level {
            Self::ATTACK_TIME
        } else {
            Self::DECAY_TIME
        };
        self.level += Self::smooth_coeff(dt.max(0.0), time_constant) * (sample - self.level);
        self.level
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    /// Displayed level on the 0..=100 scale used by rows.
    pub fn percent(&self) -> u8 {
        (self.level * 100.0).round().clamp(0.0, 100.0) as u8
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: f32 = 1.0 / 60.0;

    #[test]
    fn test_attack_is_faster_than_decay() {
        let mut rising = PeakMeter::default();
        let up = rising.update(1.0, TICK);

        let mut falling = PeakMeter { level: 1.0 };
        let down = 1.0 - falling.update(0.0, TICK);

        assert!(up > 0.6, "attack too slow: {}", up);
        assert!(down < 0.1, "decay too fast: {}", down);
    }

    #[test]
    fn test_decay_is_monotonic_and_settles() {
        let mut meter = PeakMeter { level: 0.8 };
        let mut last = meter.level();
        for _ in 0..120 {
            let level = meter.update(0.0, TICK);
            assert!(level <= last);
            last = level;
        }
        assert_eq!(meter.percent(), 0);
    }

    #[test]
    fn test_samples_are_clamped() {
        let mut meter = PeakMeter::default();
        for _ in 0..60 {
            meter.update(4.0, TICK);
        }
        assert!(meter.level() <= 1.0);
        assert_eq!(meter.percent(), 100);

        meter.reset();
        assert_eq!(meter.level(), 0.0);
    }
}
