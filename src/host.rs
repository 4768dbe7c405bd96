//! Host resource detection.
//!
//! Snapshots the shareable resources of the current host (display server,
//! audio devices, home directory, session bus, timezone, allowlisted
//! device nodes) so grant resolution can be a pure function over the
//! snapshot. Detection runs once per process; `run` therefore honors host
//! drift since `create` because every invocation re-detects.

use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::{LOCALTIME_FILE, SOUND_DEVICE_DIR, X11_SOCKET_DIR};

/// Detected display server, with everything needed to share it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayServer {
    /// Wayland compositor: the socket lives under `XDG_RUNTIME_DIR`.
    Wayland {
        /// Directory containing the compositor socket.
        runtime_dir: PathBuf,
        /// Socket name (`WAYLAND_DISPLAY`, e.g. `wayland-0`).
        name: String,
    },
    /// X11 server: sockets live in `/tmp/.X11-unix`.
    X11 {
        /// The X11 socket directory.
        socket_dir: PathBuf,
        /// Display identifier (`DISPLAY`, e.g. `:0`).
        display: String,
    },
}

/// Where the host's timezone can be read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimezoneSource {
    /// `/etc/localtime` exists and can be bind-mounted.
    File(PathBuf),
    /// No definition file, but `TZ` is set in the environment.
    Env(String),
    /// Neither available.
    Unavailable,
}

/// Snapshot of host resources available for sharing into a container.
///
/// Built once via [`Host::detect`]; tests construct it directly to model
/// arbitrary hosts.
#[derive(Debug, Clone)]
pub struct Host {
    /// Display server, if one is reachable.
    pub display: Option<DisplayServer>,
    /// Audio device nodes, sorted for stable grant ordering.
    pub audio_devices: Vec<PathBuf>,
    /// Home directory of the invoking user.
    pub home_dir: Option<PathBuf>,
    /// Session bus socket path, if a bus is reachable.
    pub session_bus: Option<PathBuf>,
    /// Timezone source.
    pub timezone: TimezoneSource,
    /// Allowlisted device nodes that actually exist on this host.
    pub extra_devices: Vec<PathBuf>,
}

impl Host {
    /// Detects the current host's shareable resources.
    ///
    /// `device_allowlist` is the caller-configured set of device nodes the
    /// `devices` flag may expose; entries that do not exist are dropped
    /// here so grant resolution only ever sees live nodes.
    pub fn detect(device_allowlist: &[PathBuf]) -> Self {
        let host = Self {
            display: detect_display(),
            audio_devices: detect_audio_devices(Path::new(SOUND_DEVICE_DIR)),
            home_dir: dirs::home_dir(),
            session_bus: detect_session_bus(),
            timezone: detect_timezone(),
            extra_devices: device_allowlist
                .iter()
                .filter(|p| p.exists())
                .cloned()
                .collect(),
        };

        debug!(
            display = host.display.is_some(),
            audio = host.audio_devices.len(),
            bus = host.session_bus.is_some(),
            devices = host.extra_devices.len(),
            "detected host resources"
        );

        host
    }

    /// A host with nothing shareable. Test scaffolding for "worst case"
    /// environments and a base for building synthetic hosts.
    pub fn empty() -> Self {
        Self {
            display: None,
            audio_devices: Vec::new(),
            home_dir: None,
            session_bus: None,
            timezone: TimezoneSource::Unavailable,
            extra_devices: Vec::new(),
        }
    }
}

/// Prefers Wayland when both servers are reachable.
fn detect_display() -> Option<DisplayServer> {
    if let (Ok(name), Ok(runtime_dir)) = (env::var("WAYLAND_DISPLAY"), env::var("XDG_RUNTIME_DIR"))
    {
        let runtime_dir = PathBuf::from(runtime_dir);
        if runtime_dir.join(&name).exists() {
            return Some(DisplayServer::Wayland { runtime_dir, name });
        }
    }

    if let Ok(display) = env::var("DISPLAY") {
        let socket_dir = PathBuf::from(X11_SOCKET_DIR);
        if socket_dir.is_dir() {
            return Some(DisplayServer::X11 {
                socket_dir,
                display,
            });
        }
    }

    None
}

/// Enumerates device nodes under `/dev/snd`, sorted.
///
/// Explicit enumeration rather than exposing the directory wholesale: the
/// grant list names exactly what crosses the container boundary.
fn detect_audio_devices(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut devices: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| !p.is_dir())
        .collect();
    devices.sort();
    devices
}

/// Resolves the session bus socket path.
///
/// `DBUS_SESSION_BUS_ADDRESS=unix:path=/run/user/1000/bus` wins; the
/// conventional `$XDG_RUNTIME_DIR/bus` location is the fallback.
fn detect_session_bus() -> Option<PathBuf> {
    if let Ok(address) = env::var("DBUS_SESSION_BUS_ADDRESS") {
        for part in address.split(',') {
            if let Some(path) = part.strip_prefix("unix:path=") {
                let path = PathBuf::from(path);
                if path.exists() {
                    return Some(path);
                }
            }
        }
    }

    let runtime_dir = env::var("XDG_RUNTIME_DIR").ok()?;
    let bus = PathBuf::from(runtime_dir).join("bus");
    bus.exists().then_some(bus)
}

fn detect_timezone() -> TimezoneSource {
    let localtime = PathBuf::from(LOCALTIME_FILE);
    if localtime.exists() {
        return TimezoneSource::File(localtime);
    }
    match env::var("TZ") {
        Ok(tz) if !tz.is_empty() => TimezoneSource::Env(tz),
        _ => TimezoneSource::Unavailable,
    }
}
