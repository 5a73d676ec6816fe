// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Rows shown to the user and how they are kept in order.

pub mod item;
pub mod list;
pub mod meter;
pub mod render;

pub use item::{percent_to_volume, volume_to_percent, ViewItem};
pub use list::SessionList;
pub use meter::PeakMeter;
pub use render::{LogRenderer, RowRenderer};
