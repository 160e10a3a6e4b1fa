// SPDX-License-Identifier: MPL-2.0-only

//! The window and workspace model of the compositor the isolator runs against.
//!
//! The isolator owns none of these objects. It only keeps indices and
//! [`WindowHandle`]s, and every query may come back empty because the host
//! destroyed the window in the meantime.

use std::fmt;

use anyhow::Result;

/// Opaque, stable identity of a host window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowHandle(pub u64);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Notifications delivered by the host, one at a time, on the event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// a new window appeared
    WindowCreated(WindowHandle),
    /// the fullscreen state of a window changed, query the host for the new value
    FullscreenChanged(WindowHandle),
    /// a window was closed
    WindowUnmanaged(WindowHandle),
    /// workspaces were added or removed
    WorkspaceCountChanged,
    /// the active workspace changed to the given index
    WorkspaceSwitched(usize),
}

/// Capabilities the isolator needs from the host.
///
/// Workspace indices are 0-based and shift when a workspace below them is
/// removed. Queries about a window the host no longer knows return `None`.
pub trait WorkspaceManager {
    /// every window currently managed
    fn windows(&self) -> Vec<WindowHandle>;

    fn window_workspace(&self, window: WindowHandle) -> Option<usize>;

    fn is_fullscreen(&self, window: WindowHandle) -> Option<bool>;

    /// windows hidden from the taskbar (docks, desktop icons, popups) do not
    /// count as occupying a workspace
    fn skips_taskbar(&self, window: WindowHandle) -> Option<bool>;

    fn windows_on(&self, workspace: usize) -> Vec<WindowHandle>;

    fn n_workspaces(&self) -> usize;

    fn active_workspace(&self) -> usize;

    fn move_window(&mut self, window: WindowHandle, workspace: usize) -> Result<()>;

    fn activate_workspace(&mut self, workspace: usize) -> Result<()>;

    /// append a workspace at the end, returning its index
    fn append_workspace(&mut self) -> Result<usize>;

    /// remove a workspace, the host re-indexes everything above it
    fn remove_workspace(&mut self, workspace: usize) -> Result<()>;

    /// whether the host reclaims empty workspaces by itself
    fn dynamic_workspaces(&self) -> bool;

    /// maximum number of workspaces the host accepts
    fn workspace_limit(&self) -> usize;

    /// windows on a workspace that show up in the taskbar
    fn taskbar_windows_on(&self, workspace: usize) -> Vec<WindowHandle> {
        self.windows_on(workspace)
            .into_iter()
            .filter(|w| self.skips_taskbar(*w) == Some(false))
            .collect()
    }

    fn is_workspace_empty(&self, workspace: usize) -> bool {
        self.taskbar_windows_on(workspace).is_empty()
    }

    /// index of the highest workspace holding a taskbar window, main if none
    fn last_occupied_workspace(&self) -> usize {
        (0..self.n_workspaces())
            .rev()
            .find(|i| !self.is_workspace_empty(*i))
            .unwrap_or(0)
    }
}
