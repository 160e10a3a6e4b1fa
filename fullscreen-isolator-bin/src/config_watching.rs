// SPDX-License-Identifier: MPL-2.0-only

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use calloop::{channel, LoopHandle};
use fullscreen_isolator_config::IsolatorConfig;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{error, warn};

use crate::shared_state::GlobalState;

fn touches(event: &notify::Event, config_path: &Path) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_))
        && event.paths.iter().any(|p| p == config_path)
}

/// Reload the configuration whenever its file changes.
///
/// The returned watcher must be kept alive for as long as reloading is wanted.
pub fn watch_config(
    handle: LoopHandle<'static, GlobalState>,
) -> anyhow::Result<RecommendedWatcher> {
    let config_path: PathBuf = IsolatorConfig::path()?;
    let config_dir = config_path
        .parent()
        .context("Config file has no parent directory")?
        .to_path_buf();

    let (changed_tx, changed_rx) = channel::sync_channel::<()>(30);
    handle
        .insert_source(changed_rx, |event, _, state| match event {
            channel::Event::Msg(()) => match IsolatorConfig::load() {
                Ok(config) => state.set_config(config),
                Err(err) => warn!("Keeping the current configuration: {}", err),
            },
            channel::Event::Closed => {}
        })
        .map_err(|err| anyhow!("Failed to insert config watcher source: {}", err))?;

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) if touches(&event, &config_path) => {
                // a reload is already queued when full
                let _ = changed_tx.try_send(());
            },
            Ok(_) => {}
            Err(err) => error!("Config watcher error: {}", err),
        },
        notify::Config::default(),
    )?;
    watcher.watch(&config_dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}
