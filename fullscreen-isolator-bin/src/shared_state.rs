// SPDX-License-Identifier: MPL-2.0-only

use calloop::LoopSignal;
use fullscreen_isolator_config::IsolatorConfig;
use tracing::{debug, info};

use crate::{
    host::HostEvent,
    hyprland::HyprlandHost,
    isolator::{Isolator, Timings},
    scheduler::{LoopScheduler, Task, TimerId},
};

/// the state every event loop callback receives
#[allow(missing_debug_implementations)]
pub struct GlobalState {
    /// present while isolation is enabled
    pub isolator: Option<Isolator>,
    pub host: HyprlandHost,
    pub scheduler: LoopScheduler,
    pub config: IsolatorConfig,
    pub signal: LoopSignal,
}

impl GlobalState {
    pub(crate) fn new(
        config: IsolatorConfig,
        host: HyprlandHost,
        scheduler: LoopScheduler,
        signal: LoopSignal,
    ) -> Self {
        let mut state = Self { isolator: None, host, scheduler, config, signal };
        state.enable();
        state
    }

    pub(crate) fn enable(&mut self) {
        if !self.config.enabled {
            info!("Fullscreen isolation is turned off in the configuration");
            return;
        }
        if self.isolator.is_none() {
            self.isolator = Some(Isolator::enable(
                Timings::from(&self.config),
                &mut self.host,
                &mut self.scheduler,
            ));
        }
    }

    pub(crate) fn disable(&mut self) {
        if let Some(isolator) = self.isolator.take() {
            debug!(
                "{} workspaces isolated, {} tasks pending",
                isolator.fullscreen_workspaces().len(),
                isolator.pending_tasks()
            );
            isolator.disable(&mut self.scheduler);
        }
        debug!("{} timers left on the loop", self.scheduler.pending());
    }

    pub(crate) fn handle_event(&mut self, event: HostEvent) {
        if let Some(isolator) = self.isolator.as_mut() {
            isolator.handle_event(event, &mut self.host, &mut self.scheduler);
        }
    }

    /// a timer inserted by [`LoopScheduler`] fired
    pub(crate) fn fire(&mut self, id: TimerId, task: Task) {
        self.scheduler.forget(id);
        if let Some(isolator) = self.isolator.as_mut() {
            isolator.handle_timer(id, task, &mut self.host, &mut self.scheduler);
        }
    }

    /// restart isolation with a reloaded configuration
    pub(crate) fn set_config(&mut self, config: IsolatorConfig) {
        if config == self.config {
            return;
        }
        info!("Configuration changed, restarting fullscreen isolation");
        self.disable();
        self.host.apply_config(&config);
        self.config = config;
        self.enable();
    }
}
