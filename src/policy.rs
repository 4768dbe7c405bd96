//! # Integration Policy
//!
//! Pure mapping from requested integration flags to the ordered set of
//! host-resource grants that cross the container boundary.
//!
//! ## Grant Model
//!
//! ```text
//! IntegrationFlags + Host snapshot ──resolve()──► Vec<ResourceGrant>
//!                                                 ├── BindMount
//!                                                 ├── DeviceExpose
//!                                                 └── EnvVar
//! ```
//!
//! Resolution is deterministic and idempotent: the same flags against the
//! same snapshot always yield the same sequence, in the same order.
//! Categories resolve in the fixed order display, sound, home,
//! notifications, timezone, devices; ordering carries no semantics but
//! keeps engine invocations reproducible.
//!
//! ## Failure Mode
//!
//! A requested flag whose backing resource is absent fails with
//! `ResourceUnavailable` instead of silently degrading. The `test`
//! command exists precisely so callers can probe availability first; see
//! [`probe`].

use crate::error::{Error, Result};
use crate::host::{DisplayServer, Host, TimezoneSource};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// =============================================================================
// Flags
// =============================================================================

/// Boolean requests for each class of host-resource sharing.
///
/// Flags are independent; no combination is invalid. They are persisted
/// verbatim in the registry so `run` regenerates grants from the same
/// request the program was created with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationFlags {
    /// Share the host display server (X11 or Wayland).
    #[serde(default)]
    pub display: bool,
    /// Expose host audio device nodes.
    #[serde(default)]
    pub sound: bool,
    /// Bind-mount the host home directory read-write.
    #[serde(default)]
    pub home: bool,
    /// Share the host session bus (desktop notifications).
    #[serde(default)]
    pub notifications: bool,
    /// Share the host timezone.
    #[serde(default)]
    pub timezone: bool,
    /// Expose allowlisted host device nodes.
    #[serde(default)]
    pub devices: bool,
}

impl IntegrationFlags {
    /// Returns true when no sharing is requested.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// =============================================================================
// Grants
// =============================================================================

/// A single host-resource exposure into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceGrant {
    /// Bind-mount a host path into the container.
    BindMount {
        host: PathBuf,
        container: PathBuf,
        read_only: bool,
    },
    /// Expose a host device node.
    DeviceExpose { device: PathBuf },
    /// Set an environment variable inside the container.
    EnvVar { key: String, value: String },
}

/// The closed set of grant categories, one per integration flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantCategory {
    Display,
    Sound,
    Home,
    Notifications,
    Timezone,
    Devices,
}

impl GrantCategory {
    /// All categories, in canonical resolution order.
    pub const ALL: [GrantCategory; 6] = [
        GrantCategory::Display,
        GrantCategory::Sound,
        GrantCategory::Home,
        GrantCategory::Notifications,
        GrantCategory::Timezone,
        GrantCategory::Devices,
    ];
}

impl fmt::Display for GrantCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GrantCategory::Display => "display",
            GrantCategory::Sound => "sound",
            GrantCategory::Home => "home",
            GrantCategory::Notifications => "notifications",
            GrantCategory::Timezone => "timezone",
            GrantCategory::Devices => "devices",
        };
        write!(f, "{name}")
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Resolves flags against a host snapshot into an ordered grant sequence.
///
/// # Errors
///
/// [`Error::ResourceUnavailable`] naming the first category whose backing
/// resource is missing.
pub fn resolve(flags: &IntegrationFlags, host: &Host) -> Result<Vec<ResourceGrant>> {
    let mut grants = Vec::new();

    for category in GrantCategory::ALL {
        if !requested(flags, category) {
            continue;
        }
        resolve_category(category, host, &mut grants)?;
    }

    Ok(grants)
}

fn requested(flags: &IntegrationFlags, category: GrantCategory) -> bool {
    match category {
        GrantCategory::Display => flags.display,
        GrantCategory::Sound => flags.sound,
        GrantCategory::Home => flags.home,
        GrantCategory::Notifications => flags.notifications,
        GrantCategory::Timezone => flags.timezone,
        GrantCategory::Devices => flags.devices,
    }
}

fn resolve_category(
    category: GrantCategory,
    host: &Host,
    grants: &mut Vec<ResourceGrant>,
) -> Result<()> {
    let unavailable = |reason: &str| Error::ResourceUnavailable {
        category: category.to_string(),
        reason: reason.to_string(),
    };

    match category {
        GrantCategory::Display => match &host.display {
            Some(DisplayServer::Wayland { runtime_dir, name }) => {
                let socket = runtime_dir.join(name);
                grants.push(ResourceGrant::BindMount {
                    host: socket.clone(),
                    container: socket,
                    read_only: true,
                });
                grants.push(ResourceGrant::EnvVar {
                    key: "WAYLAND_DISPLAY".into(),
                    value: name.clone(),
                });
                grants.push(ResourceGrant::EnvVar {
                    key: "XDG_RUNTIME_DIR".into(),
                    value: runtime_dir.to_string_lossy().into_owned(),
                });
            }
            Some(DisplayServer::X11 {
                socket_dir,
                display,
            }) => {
                grants.push(ResourceGrant::BindMount {
                    host: socket_dir.clone(),
                    container: socket_dir.clone(),
                    read_only: true,
                });
                grants.push(ResourceGrant::EnvVar {
                    key: "DISPLAY".into(),
                    value: display.clone(),
                });
            }
            None => return Err(unavailable("no X11 or Wayland socket on host")),
        },

        GrantCategory::Sound => {
            if host.audio_devices.is_empty() {
                return Err(unavailable("no audio device nodes on host"));
            }
            for device in &host.audio_devices {
                grants.push(ResourceGrant::DeviceExpose {
                    device: device.clone(),
                });
            }
        }

        GrantCategory::Home => match &host.home_dir {
            Some(home) => {
                // Same path inside the container so the program sees its
                // usual dotfiles and document locations.
                grants.push(ResourceGrant::BindMount {
                    host: home.clone(),
                    container: home.clone(),
                    read_only: false,
                });
                grants.push(ResourceGrant::EnvVar {
                    key: "HOME".into(),
                    value: home.to_string_lossy().into_owned(),
                });
            }
            None => return Err(unavailable("cannot determine host home directory")),
        },

        GrantCategory::Notifications => match &host.session_bus {
            Some(bus) => {
                grants.push(ResourceGrant::BindMount {
                    host: bus.clone(),
                    container: bus.clone(),
                    read_only: false,
                });
                grants.push(ResourceGrant::EnvVar {
                    key: "DBUS_SESSION_BUS_ADDRESS".into(),
                    value: format!("unix:path={}", bus.to_string_lossy()),
                });
            }
            None => return Err(unavailable("no session bus socket on host")),
        },

        GrantCategory::Timezone => match &host.timezone {
            TimezoneSource::File(path) => {
                grants.push(ResourceGrant::BindMount {
                    host: path.clone(),
                    container: path.clone(),
                    read_only: true,
                });
            }
            TimezoneSource::Env(tz) => {
                grants.push(ResourceGrant::EnvVar {
                    key: "TZ".into(),
                    value: tz.clone(),
                });
            }
            TimezoneSource::Unavailable => {
                return Err(unavailable("no timezone definition or TZ variable"))
            }
        },

        GrantCategory::Devices => {
            if host.extra_devices.is_empty() {
                return Err(unavailable(
                    "device allowlist is empty or no listed node exists",
                ));
            }
            for device in &host.extra_devices {
                grants.push(ResourceGrant::DeviceExpose {
                    device: device.clone(),
                });
            }
        }
    }

    Ok(())
}

// =============================================================================
// Probing
// =============================================================================

/// Availability report for one grant category.
#[derive(Debug, Clone)]
pub struct CategoryProbe {
    pub category: GrantCategory,
    pub available: bool,
    /// Human-readable detail: what was found, or why it is missing.
    pub detail: String,
}

/// Probes host availability for every grant category.
///
/// Registry-independent: this inspects the host snapshot only, so callers
/// can check what `create`/`run` would be able to satisfy before touching
/// any program.
pub fn probe(host: &Host) -> Vec<CategoryProbe> {
    GrantCategory::ALL
        .iter()
        .map(|&category| {
            let mut scratch = Vec::new();
            match resolve_category(category, host, &mut scratch) {
                Ok(()) => CategoryProbe {
                    category,
                    available: true,
                    detail: describe(category, host),
                },
                Err(err) => CategoryProbe {
                    category,
                    available: false,
                    detail: match err {
                        Error::ResourceUnavailable { reason, .. } => reason,
                        other => other.to_string(),
                    },
                },
            }
        })
        .collect()
}

fn describe(category: GrantCategory, host: &Host) -> String {
    match category {
        GrantCategory::Display => match &host.display {
            Some(DisplayServer::Wayland { name, .. }) => format!("wayland ({name})"),
            Some(DisplayServer::X11 { display, .. }) => format!("x11 ({display})"),
            None => "none".into(),
        },
        GrantCategory::Sound => format!("{} device node(s)", host.audio_devices.len()),
        GrantCategory::Home => host
            .home_dir
            .as_ref()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_default(),
        GrantCategory::Notifications => host
            .session_bus
            .as_ref()
            .map(|b| b.to_string_lossy().into_owned())
            .unwrap_or_default(),
        GrantCategory::Timezone => match &host.timezone {
            TimezoneSource::File(p) => p.to_string_lossy().into_owned(),
            TimezoneSource::Env(tz) => format!("TZ={tz}"),
            TimezoneSource::Unavailable => "none".into(),
        },
        GrantCategory::Devices => format!("{} allowlisted node(s)", host.extra_devices.len()),
    }
}
