// SPDX-License-Identifier: MPL-2.0-only

//! One-shot deferred tasks on the event loop.

use std::{collections::HashMap, time::Duration};

use calloop::{
    timer::{TimeoutAction, Timer},
    LoopHandle, RegistrationToken,
};
use tracing::error;

use crate::{host::WindowHandle, shared_state::GlobalState};

/// Identifies one scheduled task, never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Work the isolator defers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    /// isolate a window that entered fullscreen, if it still is
    Isolate(WindowHandle),
    /// move a window that left fullscreen back to its original workspace
    Restore(WindowHandle),
    /// reclaim empty workspaces
    Cleanup,
}

pub trait Scheduler {
    /// run `task` once after `delay`
    fn schedule(&mut self, delay: Duration, task: Task) -> TimerId;

    /// drop a pending task, no-op if it already ran
    fn cancel(&mut self, id: TimerId);
}

/// [`Scheduler`] backed by calloop timer sources
pub struct LoopScheduler {
    handle: LoopHandle<'static, GlobalState>,
    tokens: HashMap<TimerId, RegistrationToken>,
    next_id: u64,
}

impl std::fmt::Debug for LoopScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopScheduler")
            .field("pending", &self.tokens.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl LoopScheduler {
    pub fn new(handle: LoopHandle<'static, GlobalState>) -> Self {
        Self { handle, tokens: HashMap::new(), next_id: 0 }
    }

    /// a timer fired, its source is dropped by calloop
    pub(crate) fn forget(&mut self, id: TimerId) {
        self.tokens.remove(&id);
    }

    pub fn pending(&self) -> usize {
        self.tokens.len()
    }
}

impl Scheduler for LoopScheduler {
    fn schedule(&mut self, delay: Duration, task: Task) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;

        match self.handle.insert_source(
            Timer::from_duration(delay),
            move |_, _, state: &mut GlobalState| {
                state.fire(id, task);
                TimeoutAction::Drop
            },
        ) {
            Ok(token) => {
                self.tokens.insert(id, token);
            },
            Err(err) => {
                error!("Failed to insert timer for {:?}: {}", task, err.error);
            },
        }
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(token) = self.tokens.remove(&id) {
            self.handle.remove(token);
        }
    }
}
