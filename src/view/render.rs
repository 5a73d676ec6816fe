// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The render side of the view: row operations emitted by the list.

use crate::view::item::ViewItem;
use tracing::info;

/// Receives incremental row updates.
///
/// Indices refer to the rendered row list as it stands when the call is
/// made. The list is never replaced wholesale.
pub trait RowRenderer {
    /// Insert `item` so that it becomes row `index`.
    fn insert_row(&mut self, index: usize, item: &ViewItem);

    fn remove_row(&mut self, index: usize);

    /// Remove several rows; `indices` is strictly ascending.
    fn remove_rows(&mut self, indices: &[usize]) {
        for &index in indices.iter().rev() {
            self.remove_row(index);
        }
    }

    /// Reorder rows: the row at `from[k]` moves to `to[k]`, all at once.
    fn move_rows(&mut self, from: &[usize], to: &[usize]);

    fn volume_changed(&mut self, index: usize, volume: u8);
    fn mute_changed(&mut self, index: usize, muted: bool);
    fn peak_updated(&mut self, index: usize, peak: u8);

    /// The device row, kept apart from the session rows.
    fn device_changed(&mut self, volume: u8, muted: bool);
    fn device_peak(&mut self, peak: u8);
}

/// Renderer that reports row operations to the log.
#[derive(Debug, Default)]
pub struct LogRenderer {
    rows: Vec<String>,
}

impl LogRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifiers of the rows, in rendered order.
    pub fn rows(&self) -> &[String] {
        &self.rows
    }
}

impl RowRenderer for LogRenderer {
    fn insert_row(&mut self, index: usize, item: &ViewItem) {
        self.rows.insert(index, item.identifier().to_string());
        info!(
            index,
            session = %item.handle(),
            title = %item.identifier(),
            volume = item.volume(),
            muted = item.muted(),
            "Row inserted"
        );
    }

    fn remove_row(&mut self, index: usize) {
        if index < self.rows.len() {
            let title = self.rows.remove(index);
            info!(index, title = %title, "Row removed");
        }
    }

    fn move_rows(&mut self, from: &[usize], to: &[usize]) {
        let old = self.rows.clone();
        for (&f, &t) in from.iter().zip(to) {
            self.rows[t] = old[f].clone();
        }
        info!(?from, ?to, rows = ?self.rows, "Rows moved");
    }

    fn volume_changed(&mut self, index: usize, volume: u8) {
        info!(index, volume, "Row volume changed");
    }

    fn mute_changed(&mut self, index: usize, muted: bool) {
        info!(index, muted, "Row mute changed");
    }

    fn peak_updated(&mut self, _index: usize, _peak: u8) {}

    fn device_changed(&mut self, volume: u8, muted: bool) {
        info!(volume, muted, "Device volume changed");
    }

    fn device_peak(&mut self, _peak: u8) {}
}
