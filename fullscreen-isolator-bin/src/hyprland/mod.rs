// SPDX-License-Identifier: MPL-2.0-only

//! Hyprland host, driven through its IPC sockets.
//!
//! Workspace index `i` is Hyprland workspace id `i + 1`. Hyprland creates
//! numbered workspaces lazily and, with dynamic workspaces, destroys them once
//! empty. The dynamic count therefore follows the clients: everything up to the
//! last occupied workspace plus one spare. Fixed workspaces are counted here
//! instead: appending a workspace only reserves the next id, and removing one
//! moves every window above it down by one id.

use std::{
    io::{Read, Write},
    os::unix::net::UnixStream,
    path::PathBuf,
};

use anyhow::{anyhow, bail, Context, Result};
use fullscreen_isolator_config::{IsolatorConfig, MIN_WORKSPACES};
use itertools::Itertools;
use serde::Deserialize;
use tracing::{debug, warn};
use xdg::BaseDirectories;

use crate::host::{WindowHandle, WorkspaceManager};

pub mod events;

/// Hyprland client as reported by `j/clients`
#[derive(Debug, Clone, Deserialize)]
struct Client {
    address: String,
    workspace: ClientWorkspace,
    /// `bool` up to 0.41, fullscreen mode bits after
    #[serde(default)]
    fullscreen: serde_json::Value,
    /// 0 fullscreen, 1 maximized; only sent while `fullscreen` was a bool
    #[serde(default, rename = "fullscreenMode")]
    fullscreen_mode: Option<i64>,
    #[serde(default)]
    hidden: bool,
    #[serde(default = "default_mapped")]
    mapped: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ClientWorkspace {
    id: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct ActiveWorkspace {
    id: i64,
}

fn default_mapped() -> bool {
    true
}

impl Client {
    fn handle(&self) -> Option<WindowHandle> {
        parse_address(&self.address)
    }

    fn workspace_index(&self) -> Option<usize> {
        workspace_index(self.workspace.id)
    }

    fn is_fullscreen(&self) -> bool {
        match &self.fullscreen {
            serde_json::Value::Bool(fullscreen) => *fullscreen && self.fullscreen_mode != Some(1),
            // 1 is maximized, 2 fullscreen
            serde_json::Value::Number(mode) => mode.as_u64().is_some_and(|m| m & 2 != 0),
            _ => false,
        }
    }

    fn skips_taskbar(&self) -> bool {
        self.hidden || !self.mapped
    }
}

/// window address as printed by Hyprland, with or without `0x`
pub(crate) fn parse_address(address: &str) -> Option<WindowHandle> {
    let address = address.trim();
    let digits = address.strip_prefix("0x").unwrap_or(address);
    u64::from_str_radix(digits, 16).ok().map(WindowHandle)
}

/// special and named workspaces have ids below 1 and are left alone
pub(crate) fn workspace_index(id: i64) -> Option<usize> {
    usize::try_from(id).ok().and_then(|id| id.checked_sub(1))
}

fn workspace_id(index: usize) -> usize {
    index + 1
}

/// workspaces Hyprland keeps alive on its own, plus the trailing spare
fn dynamic_workspace_count(clients: &[Client], limit: usize) -> usize {
    let occupied = clients.iter().filter_map(Client::workspace_index).max().map_or(0, |i| i + 1);
    let spare = clients
        .iter()
        .filter(|c| !c.skips_taskbar())
        .filter_map(Client::workspace_index)
        .max()
        .map_or(0, |i| i + 2);
    spare.min(limit).max(occupied).max(MIN_WORKSPACES)
}

/// `[[BATCH]]` answers every dispatch, the replies run together
fn batch_succeeded(response: &str, dispatches: usize) -> bool {
    response.split_whitespace().collect::<String>() == "ok".repeat(dispatches)
}

fn find_socket_dir() -> Result<PathBuf> {
    let signature = std::env::var("HYPRLAND_INSTANCE_SIGNATURE")
        .context("HYPRLAND_INSTANCE_SIGNATURE is not set, is Hyprland running?")?;

    let mut candidates = Vec::new();
    if let Ok(dirs) = BaseDirectories::new() {
        if let Ok(runtime_dir) = dirs.get_runtime_directory() {
            candidates.push(runtime_dir.join("hypr").join(&signature));
        }
    }
    // Hyprland before 0.40 kept its sockets in /tmp
    candidates.push(PathBuf::from("/tmp/hypr").join(&signature));

    candidates
        .into_iter()
        .find(|dir| dir.join(".socket.sock").exists())
        .ok_or_else(|| anyhow!("No Hyprland socket found for instance {}", signature))
}

#[derive(Debug)]
pub struct HyprlandHost {
    socket_dir: PathBuf,
    workspace_count: usize,
    dynamic_workspaces: bool,
    workspace_limit: usize,
}

impl HyprlandHost {
    pub fn connect(config: &IsolatorConfig) -> Result<Self> {
        let socket_dir = find_socket_dir()?;
        let mut host = Self {
            socket_dir,
            workspace_count: MIN_WORKSPACES,
            dynamic_workspaces: config.dynamic_workspaces,
            workspace_limit: config.workspace_ceiling(),
        };

        let response = host.request("j/workspaces")?;
        let workspaces: Vec<ClientWorkspace> = serde_json::from_str(&response)
            .with_context(|| format!("Failed to parse workspaces: {}", response))?;
        if let Some(highest) = workspaces.iter().filter_map(|w| workspace_index(w.id)).max() {
            host.workspace_count = host.workspace_count.max(highest + 1);
        }
        debug!(
            "Connected to Hyprland at {}, {} workspaces",
            host.socket_dir.display(),
            host.workspace_count
        );
        Ok(host)
    }

    pub fn apply_config(&mut self, config: &IsolatorConfig) {
        self.dynamic_workspaces = config.dynamic_workspaces;
        self.workspace_limit = config.workspace_ceiling();
    }

    pub fn event_socket(&self) -> PathBuf {
        self.socket_dir.join(".socket2.sock")
    }

    fn request(&self, command: &str) -> Result<String> {
        let socket = self.socket_dir.join(".socket.sock");
        let mut stream = UnixStream::connect(&socket)
            .with_context(|| format!("Failed to connect to {}", socket.display()))?;
        stream.write_all(command.as_bytes())?;
        stream.flush()?;

        let mut response = String::new();
        stream.read_to_string(&mut response)?;
        Ok(response)
    }

    fn dispatch(&self, args: &str) -> Result<()> {
        let response = self.request(&format!("dispatch {}", args))?;
        if response.trim() != "ok" {
            bail!("dispatch {} failed: {}", args, response.trim());
        }
        Ok(())
    }

    fn batch(&self, dispatches: &[String]) -> Result<()> {
        if dispatches.is_empty() {
            return Ok(());
        }
        let batch = dispatches.iter().map(|d| format!("dispatch {}", d)).join(" ; ");
        let response = self.request(&format!("[[BATCH]]{}", batch))?;
        if !batch_succeeded(&response, dispatches.len()) {
            bail!("batch of {} dispatches failed: {}", dispatches.len(), response.trim());
        }
        Ok(())
    }

    fn clients(&self) -> Vec<Client> {
        let response = match self.request("j/clients") {
            Ok(response) => response,
            Err(err) => {
                warn!("Failed to list Hyprland clients: {}", err);
                return Vec::new();
            },
        };
        match serde_json::from_str::<Vec<Client>>(&response) {
            Ok(clients) => clients,
            Err(err) => {
                warn!("Failed to parse Hyprland clients: {}", err);
                Vec::new()
            },
        }
    }

    fn client(&self, window: WindowHandle) -> Option<Client> {
        self.clients().into_iter().find(|c| c.handle() == Some(window))
    }
}

fn move_dispatch(window: WindowHandle, index: usize) -> String {
    format!("movetoworkspacesilent {},address:{}", workspace_id(index), window)
}

impl WorkspaceManager for HyprlandHost {
    fn windows(&self) -> Vec<WindowHandle> {
        self.clients()
            .iter()
            .filter(|c| c.workspace_index().is_some())
            .filter_map(Client::handle)
            .collect()
    }

    fn window_workspace(&self, window: WindowHandle) -> Option<usize> {
        self.client(window)?.workspace_index()
    }

    fn is_fullscreen(&self, window: WindowHandle) -> Option<bool> {
        self.client(window).map(|c| c.is_fullscreen())
    }

    fn skips_taskbar(&self, window: WindowHandle) -> Option<bool> {
        self.client(window).map(|c| c.skips_taskbar())
    }

    fn windows_on(&self, workspace: usize) -> Vec<WindowHandle> {
        self.clients()
            .iter()
            .filter(|c| c.workspace_index() == Some(workspace))
            .filter_map(Client::handle)
            .collect()
    }

    fn n_workspaces(&self) -> usize {
        let clients = self.clients();
        if self.dynamic_workspaces {
            return dynamic_workspace_count(&clients, self.workspace_limit);
        }
        let highest = clients.iter().filter_map(Client::workspace_index).max();
        highest.map_or(self.workspace_count, |i| self.workspace_count.max(i + 1))
    }

    fn active_workspace(&self) -> usize {
        let active = self
            .request("j/activeworkspace")
            .and_then(|r| Ok(serde_json::from_str::<ActiveWorkspace>(&r)?));
        match active {
            Ok(active) => workspace_index(active.id).unwrap_or(0),
            Err(err) => {
                warn!("Failed to query the active workspace: {}", err);
                0
            },
        }
    }

    fn move_window(&mut self, window: WindowHandle, workspace: usize) -> Result<()> {
        self.dispatch(&move_dispatch(window, workspace))?;
        self.workspace_count = self.workspace_count.max(workspace + 1);
        Ok(())
    }

    fn activate_workspace(&mut self, workspace: usize) -> Result<()> {
        self.dispatch(&format!("workspace {}", workspace_id(workspace)))
    }

    fn append_workspace(&mut self) -> Result<usize> {
        self.workspace_count = self.n_workspaces() + 1;
        Ok(self.workspace_count - 1)
    }

    fn remove_workspace(&mut self, workspace: usize) -> Result<()> {
        let n = self.n_workspaces();
        if workspace == 0 || workspace >= n {
            bail!("Cannot remove workspace {} of {}", workspace, n);
        }
        let active = self.active_workspace();

        let mut dispatches = self
            .clients()
            .iter()
            .filter_map(|c| Some((c.handle()?, c.workspace_index()?)))
            .filter(|(_, index)| *index >= workspace)
            .map(|(window, index)| move_dispatch(window, index - 1))
            .collect_vec();
        if active > workspace {
            dispatches.push(format!("workspace {}", workspace_id(active - 1)));
        }
        self.batch(&dispatches)?;
        self.workspace_count = n - 1;
        Ok(())
    }

    fn taskbar_windows_on(&self, workspace: usize) -> Vec<WindowHandle> {
        self.clients()
            .iter()
            .filter(|c| c.workspace_index() == Some(workspace) && !c.skips_taskbar())
            .filter_map(Client::handle)
            .collect()
    }

    fn last_occupied_workspace(&self) -> usize {
        self.clients()
            .iter()
            .filter(|c| !c.skips_taskbar())
            .filter_map(Client::workspace_index)
            .max()
            .unwrap_or(0)
    }

    fn dynamic_workspaces(&self) -> bool {
        self.dynamic_workspaces
    }

    fn workspace_limit(&self) -> usize {
        self.workspace_limit
    }
}
