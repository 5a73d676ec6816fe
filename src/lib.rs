// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! SessionMix - a live per-application volume mixer.
//!
//! Audio sessions reported by the platform are filed by process and
//! grouping token, their notifications are bridged onto one consumer
//! thread, and an ordered list of rows is kept in step with them through
//! incremental insert, remove and move operations.

pub mod audio;
pub mod config;
pub mod info;
pub mod mixer;
pub mod view;

pub use mixer::{Mixer, MixerError};
