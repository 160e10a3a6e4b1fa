// SPDX-License-Identifier: MPL-2.0-only

//! Moves fullscreen windows onto a workspace of their own and back.
//!
//! A window that stays fullscreen for the isolate delay is moved to the
//! workspace right after the one it was on, making room by shifting occupied
//! workspaces to the right when needed. Only the occupied run starting at that
//! workspace moves, up to the first empty workspace after it, so workspaces
//! further right keep their index. When it leaves fullscreen it is moved
//! back after the restore delay. Workspaces left empty are reclaimed after the
//! cleanup delay, and one empty workspace is always kept at the end.
//!
//! Workspace indices are tracked by value, so every structural change made here
//! has to be mirrored in the bookkeeping (see [`Isolator::shift_right`] and
//! [`Isolator::workspace_removed`]).

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    time::Duration,
};

use fullscreen_isolator_config::{IsolatorConfig, MAX_WORKSPACES, MIN_WORKSPACES};
use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::{
    host::{HostEvent, WindowHandle, WorkspaceManager},
    scheduler::{Scheduler, Task, TimerId},
};

/// index of the main workspace, never removed and never an isolation target
pub const MAIN_WORKSPACE: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub isolate: Duration,
    pub restore: Duration,
    pub cleanup: Duration,
}

impl From<&IsolatorConfig> for Timings {
    fn from(config: &IsolatorConfig) -> Self {
        Self {
            isolate: config.isolate_delay(),
            restore: config.restore_delay(),
            cleanup: config.cleanup_delay(),
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self::from(&IsolatorConfig::default())
    }
}

/// What the isolator remembers about a window it does not own
#[derive(Debug, Clone, Default)]
struct TrackedWindow {
    original_workspace: usize,
    isolated: bool,
    fullscreen_workspace: Option<usize>,
    /// where a pending restore will move the window
    restore_to: Option<usize>,
    /// a pending restore was cancelled by re-entering fullscreen,
    /// keep `original_workspace` on the next isolation
    resumed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Purpose {
    Isolate,
    Restore,
}

impl Purpose {
    fn task(self, window: WindowHandle) -> Task {
        match self {
            Purpose::Isolate => Task::Isolate(window),
            Purpose::Restore => Task::Restore(window),
        }
    }
}

#[derive(Debug)]
pub struct Isolator {
    timings: Timings,
    windows: HashMap<WindowHandle, TrackedWindow>,
    /// workspace index -> the one window isolated there
    fullscreen_workspaces: BTreeMap<usize, WindowHandle>,
    pending: HashMap<(WindowHandle, Purpose), TimerId>,
    cleanup_timer: Option<TimerId>,
    cleanup_candidates: BTreeSet<usize>,
    active_workspace: usize,
    /// workspace count we left the host in, notifications reporting it are our own
    expected_workspaces: Option<usize>,
}

impl Isolator {
    /// start tracking every window the host already manages
    pub fn enable(
        timings: Timings,
        host: &mut impl WorkspaceManager,
        scheduler: &mut impl Scheduler,
    ) -> Self {
        let mut isolator = Self {
            timings,
            windows: HashMap::new(),
            fullscreen_workspaces: BTreeMap::new(),
            pending: HashMap::new(),
            cleanup_timer: None,
            cleanup_candidates: BTreeSet::new(),
            active_workspace: host.active_workspace(),
            expected_workspaces: None,
        };

        for window in host.windows() {
            if isolator.track(&*host, window).is_none() {
                continue;
            }
            if host.is_fullscreen(window) == Some(true) {
                isolator.schedule_window_task(scheduler, window, Purpose::Isolate);
            }
        }
        isolator.ensure_trailing_workspace(host);

        info!(
            "Fullscreen isolation enabled, tracking {} windows on {} workspaces",
            isolator.windows.len(),
            host.n_workspaces()
        );
        isolator
    }

    /// cancel everything pending and forget all bookkeeping
    pub fn disable(mut self, scheduler: &mut impl Scheduler) {
        for (_, id) in self.pending.drain() {
            scheduler.cancel(id);
        }
        if let Some(id) = self.cleanup_timer.take() {
            scheduler.cancel(id);
        }
        self.windows.clear();
        self.fullscreen_workspaces.clear();
        self.cleanup_candidates.clear();
        info!("Fullscreen isolation disabled");
    }

    pub fn handle_event(
        &mut self,
        event: HostEvent,
        host: &mut impl WorkspaceManager,
        scheduler: &mut impl Scheduler,
    ) {
        match event {
            HostEvent::WindowCreated(window) => self.window_created(window, host, scheduler),
            HostEvent::FullscreenChanged(window) => {
                self.fullscreen_changed(window, host, scheduler)
            },
            HostEvent::WindowUnmanaged(window) => self.window_unmanaged(window, host, scheduler),
            HostEvent::WorkspaceCountChanged => self.workspaces_changed(host, scheduler),
            HostEvent::WorkspaceSwitched(index) => self.workspace_switched(index, scheduler),
        }
    }

    /// a task scheduled by this isolator came due
    pub fn handle_timer(
        &mut self,
        id: TimerId,
        task: Task,
        host: &mut impl WorkspaceManager,
        scheduler: &mut impl Scheduler,
    ) {
        match task {
            Task::Isolate(window) => {
                if self.take_pending(window, Purpose::Isolate, id) {
                    self.isolate(window, host, scheduler);
                }
            },
            Task::Restore(window) => {
                if self.take_pending(window, Purpose::Restore, id) {
                    self.restore(window, host, scheduler);
                }
            },
            Task::Cleanup => {
                if self.cleanup_timer == Some(id) {
                    self.cleanup_timer = None;
                    self.cleanup(host);
                } else {
                    debug!("Ignoring stale cleanup timer {:?}", id);
                }
            },
        }
    }

    pub fn fullscreen_workspaces(&self) -> &BTreeMap<usize, WindowHandle> {
        &self.fullscreen_workspaces
    }

    #[cfg(test)]
    pub fn is_isolated(&self, window: WindowHandle) -> bool {
        self.windows.get(&window).is_some_and(|t| t.isolated)
    }

    #[cfg(test)]
    pub fn original_workspace(&self, window: WindowHandle) -> Option<usize> {
        self.windows.get(&window).map(|t| t.original_workspace)
    }

    pub fn pending_tasks(&self) -> usize {
        self.pending.len() + usize::from(self.cleanup_timer.is_some())
    }

    fn track(
        &mut self,
        host: &impl WorkspaceManager,
        window: WindowHandle,
    ) -> Option<&mut TrackedWindow> {
        if !self.windows.contains_key(&window) {
            let workspace = host.window_workspace(window)?;
            self.windows.insert(
                window,
                TrackedWindow { original_workspace: workspace, ..Default::default() },
            );
        }
        self.windows.get_mut(&window)
    }

    fn window_created(
        &mut self,
        window: WindowHandle,
        host: &mut impl WorkspaceManager,
        scheduler: &mut impl Scheduler,
    ) {
        let Some(workspace) = host.window_workspace(window) else {
            debug!("Window {} is gone before it could be tracked", window);
            return;
        };
        if self.track(&*host, window).is_none() {
            return;
        }

        if host.is_fullscreen(window) == Some(true) {
            self.schedule_window_task(scheduler, window, Purpose::Isolate);
            return;
        }

        let lands_on_fullscreen = workspace != MAIN_WORKSPACE
            && self.fullscreen_workspaces.get(&workspace).is_some_and(|w| *w != window);
        // transients of the fullscreen window stay with it
        if !lands_on_fullscreen || host.skips_taskbar(window) != Some(false) {
            return;
        }

        if let Err(err) = host.move_window(window, MAIN_WORKSPACE) {
            warn!("Failed to redirect window {} to the main workspace: {}", window, err);
            return;
        }
        if let Some(tracked) = self.windows.get_mut(&window) {
            tracked.original_workspace = MAIN_WORKSPACE;
        }
        debug!(
            "Redirected new window {} from fullscreen workspace {} to the main workspace",
            window, workspace
        );
    }

    fn fullscreen_changed(
        &mut self,
        window: WindowHandle,
        host: &mut impl WorkspaceManager,
        scheduler: &mut impl Scheduler,
    ) {
        let Some(fullscreen) = host.is_fullscreen(window) else {
            debug!("Fullscreen change for vanished window {}", window);
            return;
        };
        if self.track(&*host, window).is_none() {
            return;
        }

        self.cancel_window_task(scheduler, window, Purpose::Isolate);

        if fullscreen {
            if self.cancel_window_task(scheduler, window, Purpose::Restore) {
                if let Some(tracked) = self.windows.get_mut(&window) {
                    if let Some(original) = tracked.restore_to.take() {
                        tracked.original_workspace = original;
                        tracked.resumed = true;
                    }
                }
            }
            self.schedule_window_task(scheduler, window, Purpose::Isolate);
            return;
        }

        let Some(tracked) = self.windows.get_mut(&window) else {
            return;
        };
        // a resumed window is still away from its original workspace
        if !tracked.isolated && !std::mem::take(&mut tracked.resumed) {
            return;
        }
        tracked.isolated = false;
        tracked.restore_to = Some(tracked.original_workspace);
        if let Some(workspace) = tracked.fullscreen_workspace.take() {
            if self.fullscreen_workspaces.get(&workspace) == Some(&window) {
                self.fullscreen_workspaces.remove(&workspace);
            }
        }
        self.schedule_window_task(scheduler, window, Purpose::Restore);
    }

    fn window_unmanaged(
        &mut self,
        window: WindowHandle,
        host: &mut impl WorkspaceManager,
        scheduler: &mut impl Scheduler,
    ) {
        self.cancel_window_task(scheduler, window, Purpose::Isolate);
        self.cancel_window_task(scheduler, window, Purpose::Restore);
        self.fullscreen_workspaces.retain(|_, w| *w != window);

        let Some(tracked) = self.windows.remove(&window) else {
            return;
        };
        if let Some(workspace) = tracked.fullscreen_workspace {
            debug!("Isolated window {} closed, releasing workspace {}", window, workspace);
            self.schedule_cleanup(Some(workspace), scheduler);
        } else if !host.dynamic_workspaces() {
            self.schedule_cleanup(None, scheduler);
        }
    }

    fn workspaces_changed(
        &mut self,
        host: &mut impl WorkspaceManager,
        scheduler: &mut impl Scheduler,
    ) {
        let n = host.n_workspaces();
        if self.expected_workspaces.take() == Some(n) {
            debug!("Workspace count {} is our own doing", n);
            return;
        }

        self.reconcile(&*host);
        self.ensure_trailing_workspace(host);
        if !host.dynamic_workspaces() {
            self.schedule_cleanup(None, scheduler);
        }
    }

    fn workspace_switched(&mut self, index: usize, scheduler: &mut impl Scheduler) {
        let previous = std::mem::replace(&mut self.active_workspace, index);
        if previous != index && previous != MAIN_WORKSPACE {
            self.schedule_cleanup(Some(previous), scheduler);
        }
    }

    fn isolate(
        &mut self,
        window: WindowHandle,
        host: &mut impl WorkspaceManager,
        scheduler: &mut impl Scheduler,
    ) {
        if host.is_fullscreen(window) != Some(true) {
            debug!("Window {} left fullscreen before it was isolated", window);
            return;
        }
        let Some(current) = host.window_workspace(window) else {
            return;
        };
        match self.track(&*host, window) {
            Some(tracked) if !tracked.isolated => {}
            _ => return,
        }

        let shared = host
            .taskbar_windows_on(current)
            .into_iter()
            .any(|w| w != window);
        if current != MAIN_WORKSPACE && !shared {
            debug!("Window {} is already alone on workspace {}", window, current);
            self.mark_isolated(window, current, current);
            return;
        }

        let target = current + 1;
        if !self.make_room(target, host) {
            warn!("No room next to workspace {} for fullscreen window {}", current, window);
            return;
        }
        if let Err(err) = host.move_window(window, target) {
            warn!("Failed to move window {} to workspace {}: {}", window, target, err);
            return;
        }
        if let Err(err) = host.activate_workspace(target) {
            warn!("Failed to activate workspace {}: {}", target, err);
        }
        self.active_workspace = target;
        self.mark_isolated(window, target, current);
        info!("Isolated fullscreen window {} on workspace {}", window, target);

        if current != MAIN_WORKSPACE {
            self.schedule_cleanup(Some(current), scheduler);
        }
        self.ensure_trailing_workspace(host);
    }

    fn mark_isolated(&mut self, window: WindowHandle, workspace: usize, current: usize) {
        self.fullscreen_workspaces.retain(|_, w| *w != window);
        if let Some(previous) = self.fullscreen_workspaces.insert(workspace, window) {
            // the host moved it away without us noticing
            if let Some(stale) = self.windows.get_mut(&previous) {
                stale.isolated = false;
                stale.fullscreen_workspace = None;
            }
        }
        if let Some(tracked) = self.windows.get_mut(&window) {
            if !std::mem::take(&mut tracked.resumed) {
                tracked.original_workspace = current;
            }
            tracked.isolated = true;
            tracked.fullscreen_workspace = Some(workspace);
        }
    }

    fn restore(
        &mut self,
        window: WindowHandle,
        host: &mut impl WorkspaceManager,
        scheduler: &mut impl Scheduler,
    ) {
        let Some(original) = self.windows.get_mut(&window).and_then(|t| t.restore_to.take())
        else {
            return;
        };
        let Some(from) = host.window_workspace(window) else {
            debug!("Window {} is gone before it could be restored", window);
            return;
        };

        let target = if original < host.n_workspaces() { original } else { MAIN_WORKSPACE };
        if from != target {
            if let Err(err) = host.move_window(window, target) {
                warn!("Failed to restore window {} to workspace {}: {}", window, target, err);
                return;
            }
            if let Err(err) = host.activate_workspace(target) {
                warn!("Failed to activate workspace {}: {}", target, err);
            }
            self.active_workspace = target;
            info!("Restored window {} to workspace {}", window, target);
        }
        if let Some(tracked) = self.windows.get_mut(&window) {
            tracked.original_workspace = target;
        }

        if from != MAIN_WORKSPACE && from != target {
            self.schedule_cleanup(Some(from), scheduler);
        }
        self.ensure_trailing_workspace(host);
    }

    /// make `target` an empty workspace, returns false if the ceiling is in the way
    /// or the host refused to shift a window
    fn make_room(&mut self, target: usize, host: &mut impl WorkspaceManager) -> bool {
        let n = host.n_workspaces();
        if target >= n {
            return self.append_workspace(host).is_some();
        }
        if host.is_workspace_empty(target) {
            return true;
        }

        let free = match (target + 1..n).find(|i| host.is_workspace_empty(*i)) {
            Some(free) => free,
            None => match self.append_workspace(host) {
                Some(free) => free,
                None => return false,
            },
        };
        for index in (target..free).rev() {
            for window in host.windows_on(index) {
                if let Err(err) = host.move_window(window, index + 1) {
                    warn!("Failed to shift window {} to workspace {}: {}", window, index + 1, err);
                    // part of the run may have moved already
                    self.reconcile(&*host);
                    return false;
                }
            }
        }
        debug!("Shifted workspaces {}..{} one to the right", target, free);
        self.shift_right(target, free);
        true
    }

    fn ceiling(host: &impl WorkspaceManager) -> usize {
        host.workspace_limit().min(MAX_WORKSPACES)
    }

    fn append_workspace(&mut self, host: &mut impl WorkspaceManager) -> Option<usize> {
        let ceiling = Self::ceiling(&*host);
        if host.n_workspaces() >= ceiling {
            warn!("Not creating a workspace, the limit of {} is reached", ceiling);
            return None;
        }
        match host.append_workspace() {
            Ok(index) => {
                self.expected_workspaces = Some(host.n_workspaces());
                debug!("Appended workspace {}", index);
                Some(index)
            },
            Err(err) => {
                warn!("Failed to append a workspace: {}", err);
                None
            },
        }
    }

    /// keep at least main plus a spare, and one empty workspace after the last occupied one
    fn ensure_trailing_workspace(&mut self, host: &mut impl WorkspaceManager) {
        for _ in host.n_workspaces()..MIN_WORKSPACES {
            if self.append_workspace(host).is_none() {
                return;
            }
        }
        if host.last_occupied_workspace() + 1 >= host.n_workspaces() {
            self.append_workspace(host);
        }
    }

    fn schedule_cleanup(&mut self, candidate: Option<usize>, scheduler: &mut impl Scheduler) {
        if let Some(index) = candidate.filter(|i| *i != MAIN_WORKSPACE) {
            self.cleanup_candidates.insert(index);
        }
        if let Some(id) = self.cleanup_timer.take() {
            scheduler.cancel(id);
        }
        self.cleanup_timer = Some(scheduler.schedule(self.timings.cleanup, Task::Cleanup));
    }

    fn cleanup(&mut self, host: &mut impl WorkspaceManager) {
        let candidates = std::mem::take(&mut self.cleanup_candidates);
        // fixed-count hosts never reclaim workspaces themselves
        let indices = if host.dynamic_workspaces() {
            candidates.into_iter().collect_vec()
        } else {
            (1..host.n_workspaces()).collect_vec()
        };

        // highest first so a removal never shifts an index still to check
        for index in indices.into_iter().rev() {
            if !self.is_removable(index, &*host) {
                continue;
            }
            match host.remove_workspace(index) {
                Ok(()) => {
                    self.expected_workspaces = Some(host.n_workspaces());
                    self.workspace_removed(index);
                    debug!("Removed empty workspace {}", index);
                },
                Err(err) => warn!("Failed to remove workspace {}: {}", index, err),
            }
        }
        self.ensure_trailing_workspace(host);
    }

    fn is_removable(&self, index: usize, host: &impl WorkspaceManager) -> bool {
        let n = host.n_workspaces();
        index != MAIN_WORKSPACE
            && index + 1 < n
            && n > MIN_WORKSPACES
            && index != host.active_workspace()
            && !self.fullscreen_workspaces.contains_key(&index)
            && host.windows_on(index).is_empty()
    }

    /// windows on `from..free` moved one workspace to the right
    fn shift_right(&mut self, from: usize, free: usize) {
        let shift = |i: usize| if (from..free).contains(&i) { i + 1 } else { i };
        self.remap(shift, |i| Some(shift(i)));
    }

    /// the host removed workspace `removed` and re-indexed everything above it
    fn workspace_removed(&mut self, removed: usize) {
        let shift = |i: usize| match i.cmp(&removed) {
            std::cmp::Ordering::Less => Some(i),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => Some(i - 1),
        };
        self.remap(|i| shift(i).unwrap_or(MAIN_WORKSPACE), shift);
        if self.active_workspace > removed {
            self.active_workspace -= 1;
        }
    }

    /// apply an index shift to everything tracked: `window` for indices a window
    /// refers back to, `workspace` for indices of workspaces we manage (`None` drops them)
    fn remap(&mut self, window: impl Fn(usize) -> usize, workspace: impl Fn(usize) -> Option<usize>) {
        self.fullscreen_workspaces = std::mem::take(&mut self.fullscreen_workspaces)
            .into_iter()
            .filter_map(|(i, w)| workspace(i).map(|i| (i, w)))
            .collect();
        self.cleanup_candidates = std::mem::take(&mut self.cleanup_candidates)
            .into_iter()
            .filter_map(&workspace)
            .collect();
        for tracked in self.windows.values_mut() {
            tracked.original_workspace = window(tracked.original_workspace);
            tracked.restore_to = tracked.restore_to.map(&window);
            tracked.fullscreen_workspace = tracked.fullscreen_workspace.and_then(&workspace);
            if tracked.fullscreen_workspace.is_none() {
                tracked.isolated = false;
            }
        }
    }

    /// rebuild the fullscreen map from where the host actually has the windows
    fn reconcile(&mut self, host: &impl WorkspaceManager) {
        let n = host.n_workspaces();
        self.active_workspace = host.active_workspace();
        self.fullscreen_workspaces.clear();
        self.cleanup_candidates.retain(|i| *i < n);

        for (window, tracked) in self.windows.iter_mut().sorted_by_key(|(w, _)| **w) {
            if tracked.original_workspace >= n {
                tracked.original_workspace = MAIN_WORKSPACE;
            }
            if !tracked.isolated {
                continue;
            }
            match host.window_workspace(*window) {
                Some(workspace) if !self.fullscreen_workspaces.contains_key(&workspace) => {
                    self.fullscreen_workspaces.insert(workspace, *window);
                    tracked.fullscreen_workspace = Some(workspace);
                },
                _ => {
                    tracked.isolated = false;
                    tracked.fullscreen_workspace = None;
                },
            }
        }
    }

    fn schedule_window_task(
        &mut self,
        scheduler: &mut impl Scheduler,
        window: WindowHandle,
        purpose: Purpose,
    ) {
        self.cancel_window_task(scheduler, window, purpose);
        let delay = match purpose {
            Purpose::Isolate => self.timings.isolate,
            Purpose::Restore => self.timings.restore,
        };
        let id = scheduler.schedule(delay, purpose.task(window));
        self.pending.insert((window, purpose), id);
    }

    /// returns whether a task was pending
    fn cancel_window_task(
        &mut self,
        scheduler: &mut impl Scheduler,
        window: WindowHandle,
        purpose: Purpose,
    ) -> bool {
        match self.pending.remove(&(window, purpose)) {
            Some(id) => {
                scheduler.cancel(id);
                true
            },
            None => false,
        }
    }

    fn take_pending(&mut self, window: WindowHandle, purpose: Purpose, id: TimerId) -> bool {
        if self.pending.get(&(window, purpose)) == Some(&id) {
            self.pending.remove(&(window, purpose));
            true
        } else {
            debug!("Ignoring stale {:?} timer {:?} for window {}", purpose, id, window);
            false
        }
    }
}
