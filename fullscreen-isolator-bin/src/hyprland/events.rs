// SPDX-License-Identifier: MPL-2.0-only

//! Hyprland's event socket, `.socket2.sock`, translated to [`HostEvent`]s.

use std::{
    io::{BufRead, BufReader},
    os::unix::net::UnixStream,
    path::Path,
    thread::JoinHandle,
};

use anyhow::{Context, Result};
use calloop::channel::SyncSender;
use tracing::{debug, error, info};

use super::{parse_address, workspace_index};
use crate::host::{HostEvent, WindowHandle};

/// Stateful line parser, `fullscreen>>` does not name its window
#[derive(Debug, Default)]
pub struct EventParser {
    active_window: Option<WindowHandle>,
}

impl EventParser {
    pub fn parse(&mut self, line: &str) -> Option<HostEvent> {
        let (name, data) = line.split_once(">>")?;
        match name {
            "activewindowv2" => {
                self.active_window = parse_address(data);
                None
            },
            "openwindow" => {
                let address = data.split(',').next()?;
                parse_address(address).map(HostEvent::WindowCreated)
            },
            "closewindow" => {
                let window = parse_address(data)?;
                if self.active_window == Some(window) {
                    self.active_window = None;
                }
                Some(HostEvent::WindowUnmanaged(window))
            },
            "fullscreen" => self.active_window.map(HostEvent::FullscreenChanged),
            "workspace" => {
                let id = data.trim().parse::<i64>().ok()?;
                workspace_index(id).map(HostEvent::WorkspaceSwitched)
            },
            "createworkspace" | "destroyworkspace" => Some(HostEvent::WorkspaceCountChanged),
            _ => None,
        }
    }
}

/// Read events on a dedicated thread until the socket closes.
///
/// Dropping `sender` when the thread ends closes the channel.
pub fn spawn_reader(socket: &Path, sender: SyncSender<HostEvent>) -> Result<JoinHandle<()>> {
    let stream = UnixStream::connect(socket)
        .with_context(|| format!("Failed to connect to {}", socket.display()))?;

    let handle = std::thread::Builder::new()
        .name("hyprland-events".into())
        .spawn(move || {
            let mut parser = EventParser::default();
            for line in BufReader::new(stream).lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        error!("Failed to read Hyprland event: {}", err);
                        break;
                    },
                };
                let Some(event) = parser.parse(&line) else {
                    continue;
                };
                debug!("{} -> {:?}", line, event);
                if sender.send(event).is_err() {
                    return;
                }
            }
            info!("Hyprland event socket closed");
        })?;
    Ok(handle)
}
