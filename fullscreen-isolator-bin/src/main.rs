// SPDX-License-Identifier: MPL-2.0-only

use std::time::Duration;

use anyhow::{anyhow, Result};
use calloop::{channel, EventLoop};
use fullscreen_isolator_config::IsolatorConfig;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::{hyprland::HyprlandHost, scheduler::LoopScheduler, shared_state::GlobalState};

mod config_watching;
mod host;
mod hyprland;
mod isolator;
mod scheduler;
mod shared_state;
#[cfg(test)]
mod testing;

fn main() -> Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_default();
    let journald_layer = tracing_journald::layer().ok();
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(journald_layer)
        .init();
    log_panics::init();

    let arg = std::env::args().nth(1);
    let usage = "USAGE: fullscreen-isolator [--write-default-config]";
    let config = match arg.as_deref() {
        Some("--help") | Some("-h") => {
            println!("{}", usage);
            std::process::exit(1);
        },
        Some("--write-default-config") => {
            let config = IsolatorConfig::default();
            config.write()?;
            info!("Wrote default configuration to {}", IsolatorConfig::path()?.display());
            return Ok(());
        },
        None => match IsolatorConfig::load() {
            Ok(c) => c,
            Err(e) => {
                warn!("Falling back to default configuration: {}", e);
                IsolatorConfig::default()
            },
        },
        _ => {
            println!("{}", usage);
            std::process::exit(1);
        },
    };

    let event_loop = EventLoop::try_new()?;
    run(config, event_loop)
}

/// connect to Hyprland and isolate fullscreen windows until its event socket closes
fn run(config: IsolatorConfig, mut event_loop: EventLoop<'static, GlobalState>) -> Result<()> {
    let host = HyprlandHost::connect(&config)?;
    let handle = event_loop.handle();

    let (event_tx, event_rx) = channel::sync_channel(100);
    hyprland::events::spawn_reader(&host.event_socket(), event_tx)?;
    handle
        .insert_source(event_rx, |event, _, state: &mut GlobalState| match event {
            channel::Event::Msg(event) => state.handle_event(event),
            channel::Event::Closed => {
                warn!("Lost the Hyprland event stream, exiting");
                state.signal.stop();
            },
        })
        .map_err(|err| anyhow!("Failed to insert host event source: {}", err))?;

    let _watcher = match config_watching::watch_config(handle.clone()) {
        Ok(watcher) => Some(watcher),
        Err(err) => {
            warn!("Configuration changes will not be picked up: {}", err);
            None
        },
    };

    let mut state = GlobalState::new(
        config,
        host,
        LoopScheduler::new(handle),
        event_loop.get_signal(),
    );
    event_loop.run(None::<Duration>, &mut state, |_| {})?;
    state.disable();
    Ok(())
}
