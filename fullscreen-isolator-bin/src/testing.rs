// SPDX-License-Identifier: MPL-2.0-only

//! In-memory host and manual clock used by the tests.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    time::Duration,
};

use anyhow::{bail, Result};
use fullscreen_isolator_config::MAX_WORKSPACES;

use crate::{
    host::{HostEvent, WindowHandle, WorkspaceManager},
    isolator::{Isolator, Timings},
    scheduler::{Scheduler, Task, TimerId},
};

#[derive(Debug, Clone)]
pub struct FakeHost {
    pub workspaces: Vec<Vec<WindowHandle>>,
    pub fullscreen: HashSet<WindowHandle>,
    pub skip_taskbar: HashSet<WindowHandle>,
    /// windows the host refuses to move
    pub pinned: HashSet<WindowHandle>,
    pub active: usize,
    pub dynamic: bool,
    pub limit: usize,
}

impl FakeHost {
    /// `layout[i]` lists the window ids on workspace `i`
    pub fn new(layout: &[&[u64]]) -> Self {
        Self {
            workspaces: layout
                .iter()
                .map(|ws| ws.iter().map(|id| WindowHandle(*id)).collect())
                .collect(),
            fullscreen: HashSet::new(),
            skip_taskbar: HashSet::new(),
            pinned: HashSet::new(),
            active: 0,
            dynamic: true,
            limit: MAX_WORKSPACES,
        }
    }

    pub fn open(&mut self, id: u64, workspace: usize) -> WindowHandle {
        let window = WindowHandle(id);
        self.workspaces[workspace].push(window);
        window
    }

    pub fn close(&mut self, window: WindowHandle) {
        for ws in &mut self.workspaces {
            ws.retain(|w| *w != window);
        }
        self.fullscreen.remove(&window);
    }

    pub fn layout(&self) -> Vec<Vec<u64>> {
        self.workspaces
            .iter()
            .map(|ws| ws.iter().map(|w| w.0).collect())
            .collect()
    }
}

impl WorkspaceManager for FakeHost {
    fn windows(&self) -> Vec<WindowHandle> {
        self.workspaces.iter().flatten().copied().collect()
    }

    fn window_workspace(&self, window: WindowHandle) -> Option<usize> {
        self.workspaces.iter().position(|ws| ws.contains(&window))
    }

    fn is_fullscreen(&self, window: WindowHandle) -> Option<bool> {
        self.window_workspace(window)?;
        Some(self.fullscreen.contains(&window))
    }

    fn skips_taskbar(&self, window: WindowHandle) -> Option<bool> {
        self.window_workspace(window)?;
        Some(self.skip_taskbar.contains(&window))
    }

    fn windows_on(&self, workspace: usize) -> Vec<WindowHandle> {
        self.workspaces.get(workspace).cloned().unwrap_or_default()
    }

    fn n_workspaces(&self) -> usize {
        self.workspaces.len()
    }

    fn active_workspace(&self) -> usize {
        self.active
    }

    fn move_window(&mut self, window: WindowHandle, workspace: usize) -> Result<()> {
        if workspace >= self.workspaces.len() {
            bail!("no workspace {}", workspace);
        }
        let Some(from) = self.window_workspace(window) else {
            bail!("no window {}", window);
        };
        if self.pinned.contains(&window) {
            bail!("window {} is pinned", window);
        }
        self.workspaces[from].retain(|w| *w != window);
        self.workspaces[workspace].push(window);
        Ok(())
    }

    fn activate_workspace(&mut self, workspace: usize) -> Result<()> {
        if workspace >= self.workspaces.len() {
            bail!("no workspace {}", workspace);
        }
        self.active = workspace;
        Ok(())
    }

    fn append_workspace(&mut self) -> Result<usize> {
        self.workspaces.push(Vec::new());
        Ok(self.workspaces.len() - 1)
    }

    fn remove_workspace(&mut self, workspace: usize) -> Result<()> {
        if workspace >= self.workspaces.len() {
            bail!("no workspace {}", workspace);
        }
        let orphans = self.workspaces.remove(workspace);
        self.workspaces[workspace.saturating_sub(1)].extend(orphans);
        if self.active >= workspace && self.active > 0 {
            self.active -= 1;
        }
        Ok(())
    }

    fn dynamic_workspaces(&self) -> bool {
        self.dynamic
    }

    fn workspace_limit(&self) -> usize {
        self.limit
    }
}

/// [`Scheduler`] driven by hand instead of a clock
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now: Duration,
    next_id: u64,
    queue: BTreeMap<(Duration, TimerId), Task>,
    deadlines: HashMap<TimerId, Duration>,
}

impl ManualScheduler {
    /// next task due at or before `until`, moving the clock to its deadline
    fn pop_due(&mut self, until: Duration) -> Option<(TimerId, Task)> {
        let (&(at, id), _) = self.queue.iter().next()?;
        if at > until {
            return None;
        }
        let task = self.queue.remove(&(at, id))?;
        self.deadlines.remove(&id);
        self.now = at;
        Some((id, task))
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration, task: Task) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let at = self.now + delay;
        self.queue.insert((at, id), task);
        self.deadlines.insert(id, at);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(at) = self.deadlines.remove(&id) {
            self.queue.remove(&(at, id));
        }
    }
}

/// an isolator wired to a [`FakeHost`] and a [`ManualScheduler`]
#[derive(Debug)]
pub struct Harness {
    pub host: FakeHost,
    pub scheduler: ManualScheduler,
    pub isolator: Isolator,
}

impl Harness {
    pub fn new(mut host: FakeHost) -> Self {
        let mut scheduler = ManualScheduler::default();
        let isolator = Isolator::enable(Timings::default(), &mut host, &mut scheduler);
        Self { host, scheduler, isolator }
    }

    pub fn send(&mut self, event: HostEvent) {
        self.isolator.handle_event(event, &mut self.host, &mut self.scheduler);
    }

    pub fn set_fullscreen(&mut self, id: u64, fullscreen: bool) {
        let window = WindowHandle(id);
        if fullscreen {
            self.host.fullscreen.insert(window);
        } else {
            self.host.fullscreen.remove(&window);
        }
        self.send(HostEvent::FullscreenChanged(window));
    }

    /// run every task due within `duration`
    pub fn advance(&mut self, duration: Duration) {
        let until = self.scheduler.now + duration;
        while let Some((id, task)) = self.scheduler.pop_due(until) {
            self.isolator.handle_timer(id, task, &mut self.host, &mut self.scheduler);
        }
        self.scheduler.now = until;
    }

    pub fn advance_ms(&mut self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    /// run until nothing is pending
    pub fn settle(&mut self) {
        for _ in 0..100 {
            if self.scheduler.pending() == 0 {
                return;
            }
            self.advance(Duration::from_secs(1));
        }
        panic!("timers keep rescheduling");
    }

    /// property every settled state must satisfy
    pub fn assert_invariants(&self) {
        let n = self.host.n_workspaces();
        assert!(n >= 2, "fewer than two workspaces: {:?}", self.host.layout());
        if n < self.host.limit.min(MAX_WORKSPACES) {
            assert!(
                self.host.is_workspace_empty(n - 1),
                "no trailing empty workspace: {:?}",
                self.host.layout()
            );
            assert!(
                n == 2 || !self.host.is_workspace_empty(n - 2),
                "more than one trailing empty workspace: {:?}",
                self.host.layout()
            );
        }
        assert!(!self.isolator.fullscreen_workspaces().contains_key(&0));
        for (index, window) in self.isolator.fullscreen_workspaces() {
            assert_eq!(self.host.window_workspace(*window), Some(*index));
            let isolated_on = self
                .isolator
                .fullscreen_workspaces()
                .values()
                .filter(|w| *w == window)
                .count();
            assert_eq!(isolated_on, 1);
        }
    }
}
