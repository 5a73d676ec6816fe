// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Process metadata read from `/proc`.

use crate::info::{IconImage, ProcessMetadata};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

/// [`ProcessMetadata`] backed by the Linux proc filesystem.
///
/// Titles come from the executable name; window titles and icons are not
/// available from procfs.
#[derive(Debug, Clone)]
pub struct ProcfsMetadata {
    root: PathBuf,
}

impl ProcfsMetadata {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Read from a different procfs mount (used by tests).
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn exe_name(&self, pid: u32) -> Option<String> {
        let exe = fs::read_link(self.root.join(pid.to_string()).join("exe")).ok()?;
        exe_display_name(&exe)
    }

    fn comm(&self, pid: u32) -> Option<String> {
        let comm = fs::read_to_string(self.root.join(pid.to_string()).join("comm")).ok()?;
        let comm = comm.trim();
        (!comm.is_empty()).then(|| comm.to_string())
    }
}

impl Default for ProcfsMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Executable file stem, with a " (deleted)" suffix removed.
fn exe_display_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy();
    let name = name.trim_end_matches(" (deleted)");
    let stem = Path::new(name).file_stem()?.to_string_lossy().to_string();
    (!stem.is_empty()).then_some(stem)
}

impl ProcessMetadata for ProcfsMetadata {
    fn display_name(&self, pid: u32) -> Option<String> {
        if pid == 0 {
            return None;
        }
        let name = self.exe_name(pid).or_else(|| self.comm(pid));
        trace!(pid, name = ?name, "procfs display name");
        name
    }

    fn main_window_title(&self, _pid: u32) -> Option<String> {
        None
    }

    fn process_icon(&self, _pid: u32, _size: u32) -> Option<IconImage> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exe_display_name() {
        assert_eq!(
            exe_display_name(Path::new("/usr/lib/firefox/firefox")).as_deref(),
            Some("firefox")
        );
        assert_eq!(
            exe_display_name(Path::new("/opt/app/player.bin (deleted)")).as_deref(),
            Some("player")
        );
    }

    #[test]
    fn test_comm_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let pid_dir = dir.path().join("4242");
        fs::create_dir_all(&pid_dir).unwrap();
        fs::write(pid_dir.join("comm"), "mpv\n").unwrap();

        let metadata = ProcfsMetadata::with_root(dir.path());
        assert_eq!(metadata.display_name(4242).as_deref(), Some("mpv"));
        assert_eq!(metadata.display_name(4243), None);
        assert_eq!(metadata.display_name(0), None);
    }
}
