// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Process metadata (display titles and icons) for session rows.

pub mod procfs;

pub use procfs::ProcfsMetadata;

use std::sync::Arc;
use tracing::debug;

/// Title used for the system sounds group.
pub const SYSTEM_SOUNDS_TITLE: &str = "System Sounds";

/// An RGBA icon bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconImage {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA8 pixels, `width * height * 4` bytes.
    pub rgba: Vec<u8>,
}

/// Looks up human-facing information about a process.
pub trait ProcessMetadata {
    /// Product name of the process executable.
    fn display_name(&self, pid: u32) -> Option<String>;
    /// Title of the process's main window.
    fn main_window_title(&self, pid: u32) -> Option<String>;
    /// Icon of the process scaled to `size` pixels. Pid 0 asks for the
    /// system sounds icon.
    fn process_icon(&self, pid: u32, size: u32) -> Option<IconImage>;
}

/// Title and icon of one process, fetched once per pid group.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    title: String,
    icon: Option<Arc<IconImage>>,
}

impl ProcessInfo {
    pub fn new(title: impl Into<String>, icon: Option<IconImage>) -> Self {
        Self {
            title: title.into(),
            icon: icon.map(Arc::new),
        }
    }

    /// Collect the title and icon for `pid`.
    ///
    /// Title fallback order: system sounds label, executable display name,
    /// main window title, `"Process <pid>"`.
    pub fn for_process(
        pid: u32,
        is_system_sound: bool,
        metadata: &dyn ProcessMetadata,
        icon_size: u32,
    ) -> Self {
        let title = if is_system_sound {
            SYSTEM_SOUNDS_TITLE.to_string()
        } else {
            metadata
                .display_name(pid)
                .filter(|name| !name.is_empty())
                .or_else(|| {
                    metadata
                        .main_window_title(pid)
                        .filter(|title| !title.is_empty())
                })
                .unwrap_or_else(|| format!("Process {}", pid))
        };

        let icon = metadata.process_icon(pid, icon_size);
        debug!(pid, title = %title, has_icon = icon.is_some(), "Collected process information");
        Self::new(title, icon)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn icon(&self) -> Option<&Arc<IconImage>> {
        self.icon.as_ref()
    }
}
