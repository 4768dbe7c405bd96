//! # Bridge Constants
//!
//! Defines the limits, naming conventions, and base-image compatibility
//! table for the bridge layer. These constants are the single source of
//! truth for bounds and identifiers throughout the codebase.
//!
//! ## Cross-References
//!
//! - [`crate::package`]: uses archive size limits during descriptor extraction
//! - [`crate::image`]: uses the base-image table and tag prefix
//! - [`crate::engine`]: uses the container name prefix
//! - [`crate::registry`]: uses the default storage file names

// =============================================================================
// Size Limits
// =============================================================================
//
// These limits bound descriptor extraction from untrusted archives. A .deb
// is attacker-controlled input; the control tarball is decompressed into
// memory, so both the envelope and the extracted control file are capped.
// =============================================================================

/// Maximum size of a control tarball member inside a `.deb` (16 MiB).
///
/// **Security**: the control tarball is decompressed in memory during
/// descriptor extraction. Real control archives are a few KiB; anything
/// near this limit is a compression bomb.
pub const MAX_CONTROL_TARBALL_SIZE: u64 = 16 * 1024 * 1024;

/// Maximum size of the extracted `control` metadata file (1 MiB).
///
/// **Security**: prevents memory exhaustion from pathological control
/// files. Legitimate control files are under 10 KiB.
pub const MAX_CONTROL_FILE_SIZE: u64 = 1024 * 1024;

/// Maximum length of a program name (128 bytes).
///
/// **Security**: program names become image tags and container names;
/// bounding the length keeps engine invocations well-formed.
pub const MAX_PROGRAM_NAME_LEN: usize = 128;

// =============================================================================
// Naming
// =============================================================================

/// Prefix for container names managed by the bridge.
///
/// Namespacing engine-side state lets `is_running` checks and removals
/// target only bridge-owned containers.
pub const CONTAINER_NAME_PREFIX: &str = "debridge";

/// Prefix for image tags built by the bridge.
pub const IMAGE_TAG_PREFIX: &str = "debridge";

/// File name of the package archive inside a build context.
pub const CONTEXT_ARCHIVE_NAME: &str = "package.deb";

// =============================================================================
// Storage
// =============================================================================

/// Directory (under the home directory) holding bridge state.
pub const STATE_DIR_NAME: &str = ".debridge";

/// Registry directory name inside the state directory. Each installed
/// program gets its own entry file in here.
pub const REGISTRY_DIR_NAME: &str = "registry";

/// Settings file name inside the state directory.
pub const SETTINGS_FILE_NAME: &str = "config.json";

// =============================================================================
// Base Image Compatibility
// =============================================================================

/// Default base image for Debian package installation.
pub const DEFAULT_BASE_IMAGE: &str = "debian:bookworm-slim";

/// Architectures the default base image can host.
///
/// `all` and `any` are architecture-independent packages; the rest are the
/// Debian ports the bookworm-slim image is published for. Packages
/// declaring anything else fail with `UnsupportedBase` instead of building
/// an image that cannot run.
pub const SUPPORTED_ARCHITECTURES: &[&str] = &["all", "any", "amd64", "arm64", "armhf", "i386"];

/// Returns the base image reference for a declared architecture, if any.
pub fn base_image_for(arch: &str) -> Option<&'static str> {
    if SUPPORTED_ARCHITECTURES.contains(&arch) {
        Some(DEFAULT_BASE_IMAGE)
    } else {
        None
    }
}

// =============================================================================
// Host Paths
// =============================================================================

/// X11 socket directory on the host.
pub const X11_SOCKET_DIR: &str = "/tmp/.X11-unix";

/// ALSA device directory on the host.
pub const SOUND_DEVICE_DIR: &str = "/dev/snd";

/// Timezone definition file on the host.
pub const LOCALTIME_FILE: &str = "/etc/localtime";
