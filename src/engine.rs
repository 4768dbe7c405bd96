//! # Bridge Engine
//!
//! Orchestrates the program lifecycle by combining the descriptor reader,
//! integration policy, image builder, and registry, and delegating image
//! build/run to an external container engine.
//!
//! ## Lifecycle
//!
//! ```text
//!   Uninstalled ──create──► Building ──► Installed ──run──► Running
//!        ▲                     │              ▲                │
//!        │     build failure   │              └── process exit ┘
//!        └─────────────────────┘
//!   Installed ──remove──► Removed        (remove while Running → InUse)
//! ```
//!
//! ## Atomicity
//!
//! `create` persists a registry entry only after descriptor read, grant
//! resolution, and image build have all succeeded. A failure at any step
//! leaves nothing observably persisted; an insert collision after a
//! successful build (a concurrent create won the race) rolls the freshly
//! built image back.
//!
//! ## Engine Boundary
//!
//! The external engine is reached only through [`ContainerEngine`].
//! [`DockerCli`] shells out to the `docker` binary; tests substitute a
//! recording mock. Run invocations inherit the terminal, so interrupts
//! reach the containerized process directly.

use crate::constants::{CONTAINER_NAME_PREFIX, IMAGE_TAG_PREFIX};
use crate::error::{Error, Result};
use crate::host::Host;
use crate::image::ImageSpec;
use crate::package::PackageDescriptor;
use crate::policy::{self, CategoryProbe, IntegrationFlags, ResourceGrant};
use crate::registry::{BridgeEntry, Registry};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{debug, info, warn};

// =============================================================================
// Engine Boundary
// =============================================================================

/// Everything the bridge asks of a run invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInvocation {
    /// Image reference to run.
    pub image: String,
    /// Container name (namespaced, see [`container_name`]).
    pub container_name: String,
    /// Command line to execute inside the container.
    pub command: String,
    /// Host-resource grants, in canonical order.
    pub grants: Vec<ResourceGrant>,
}

/// External container engine interface.
///
/// The bridge never builds or supervises containers itself; every engine
/// interaction crosses this trait.
pub trait ContainerEngine {
    /// Builds an image from a context directory, tagging it `tag`.
    /// Returns the engine's reference for the built image.
    fn build_image(&self, context: &Path, tag: &str) -> Result<String>;

    /// Runs a container to completion and returns its exit code.
    fn run(&self, invocation: &RunInvocation) -> Result<i32>;

    /// Removes an image. A reference the engine no longer knows is not
    /// an error; removal is about releasing, not about existence.
    fn remove_image(&self, image: &str) -> Result<()>;

    /// Reports whether a container with this name is currently running.
    /// Must consult live engine state, not cached bookkeeping.
    fn is_running(&self, container: &str) -> Result<bool>;
}

/// Shared engine handles delegate to the inner engine.
impl<E: ContainerEngine + ?Sized> ContainerEngine for Arc<E> {
    fn build_image(&self, context: &Path, tag: &str) -> Result<String> {
        (**self).build_image(context, tag)
    }
    fn run(&self, invocation: &RunInvocation) -> Result<i32> {
        (**self).run(invocation)
    }
    fn remove_image(&self, image: &str) -> Result<()> {
        (**self).remove_image(image)
    }
    fn is_running(&self, container: &str) -> Result<bool> {
        (**self).is_running(container)
    }
}

// =============================================================================
// Naming
// =============================================================================

/// Image tag for a program (`debridge/<name>`).
pub fn image_tag(name: &str) -> String {
    format!("{IMAGE_TAG_PREFIX}/{name}")
}

/// Container name for a program (`debridge_<name>`).
///
/// The prefix namespaces engine-side state so liveness checks and
/// removals only ever touch bridge-owned containers.
pub fn container_name(name: &str) -> String {
    format!("{CONTAINER_NAME_PREFIX}_{name}")
}

/// Maps grants onto engine command-line arguments, preserving order.
pub fn grant_args(grants: &[ResourceGrant]) -> Vec<String> {
    let mut args = Vec::new();
    for grant in grants {
        match grant {
            ResourceGrant::BindMount {
                host,
                container,
                read_only,
            } => {
                let suffix = if *read_only { ":ro" } else { "" };
                args.push("-v".into());
                args.push(format!(
                    "{}:{}{suffix}",
                    host.display(),
                    container.display()
                ));
            }
            ResourceGrant::DeviceExpose { device } => {
                args.push("--device".into());
                args.push(device.display().to_string());
            }
            ResourceGrant::EnvVar { key, value } => {
                args.push("-e".into());
                args.push(format!("{key}={value}"));
            }
        }
    }
    args
}

// =============================================================================
// Bridge
// =============================================================================

/// Parameters for `create`.
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    /// Path to the package archive.
    pub archive: PathBuf,
    /// Requested host integrations.
    pub flags: IntegrationFlags,
    /// Command override; defaults to the package's executable name.
    pub custom_command: Option<String>,
    /// Extra dependencies, appended to the package's declared set.
    pub extra_dependencies: Vec<String>,
    /// Desktop icon path to persist, if any.
    pub desktop_icon: Option<PathBuf>,
}

/// The package-to-container bridge coordinator.
pub struct Bridge<E: ContainerEngine> {
    registry: Registry,
    engine: E,
    host: Host,
}

impl<E: ContainerEngine> Bridge<E> {
    /// Creates a bridge over the given registry, engine, and host
    /// snapshot.
    pub fn new(registry: Registry, engine: E, host: Host) -> Self {
        Self {
            registry,
            engine,
            host,
        }
    }

    /// Installs a package: descriptor read, grant resolution, image
    /// build, registry insert, in that order.
    ///
    /// Grant resolution runs before the (expensive) build so an
    /// unsatisfiable flag fails fast; the resolved grants themselves are
    /// discarded because `run` re-resolves against the live host.
    pub fn create(&self, request: &CreateRequest) -> Result<BridgeEntry> {
        let descriptor = PackageDescriptor::read(&request.archive)?;

        // Collision pre-check before spending time on a build. The
        // insert below re-checks, which catches concurrent creates.
        match self.registry.get(&descriptor.name) {
            Ok(_) => return Err(Error::AlreadyExists(descriptor.name)),
            Err(Error::NotInstalled(_)) => {}
            Err(other) => return Err(other),
        }

        policy::resolve(&request.flags, &self.host)?;

        let spec = ImageSpec::build(
            &descriptor,
            &request.archive,
            request.custom_command.as_deref(),
            &request.extra_dependencies,
        )?;

        let context = tempfile::tempdir()?;
        spec.write_context(context.path())?;

        let tag = image_tag(&descriptor.name);
        info!(name = %descriptor.name, tag = %tag, "building image");
        let image = self.engine.build_image(context.path(), &tag)?;

        let entry = BridgeEntry {
            name: descriptor.name.clone(),
            image,
            flags: request.flags,
            custom_command: request.custom_command.clone(),
            desktop_icon: request.desktop_icon.clone(),
            created_at: Utc::now(),
        };

        if let Err(err) = self.registry.insert(entry.clone()) {
            // A concurrent create won the race after our build; release
            // the image we just built so nothing leaks.
            warn!(name = %entry.name, "insert failed after build, releasing image");
            if let Err(release) = self.engine.remove_image(&entry.image) {
                warn!(image = %entry.image, error = %release, "image release failed");
            }
            return Err(err);
        }

        info!(name = %entry.name, "program installed");
        Ok(entry)
    }

    /// Runs an installed program and returns its exit code.
    ///
    /// Grants are regenerated from the current host state rather than
    /// replayed from create time, so host drift (a new timezone, a
    /// different display) is honored. This is a stated contract.
    pub fn run(&self, name: &str) -> Result<i32> {
        let entry = self.registry.get(name)?;
        let grants = policy::resolve(&entry.flags, &self.host)?;

        let invocation = RunInvocation {
            image: entry.image.clone(),
            container_name: container_name(name),
            command: entry
                .custom_command
                .clone()
                .unwrap_or_else(|| entry.name.clone()),
            grants,
        };

        debug!(name, image = %entry.image, "running program");
        self.engine.run(&invocation)
    }

    /// Removes an installed program and releases its image.
    ///
    /// # Errors
    ///
    /// - [`Error::NotInstalled`] for unknown names
    /// - [`Error::InUse`] while the program is running; the check is
    ///   against live engine state, so it clears as soon as the process
    ///   exits
    pub fn remove(&self, name: &str) -> Result<()> {
        let entry = self.registry.get(name)?;

        if self.engine.is_running(&container_name(name))? {
            return Err(Error::InUse(name.to_string()));
        }

        self.engine.remove_image(&entry.image)?;
        self.registry.remove(name)?;
        info!(name, "program removed");
        Ok(())
    }

    /// Lists installed programs in insertion order.
    pub fn list(&self) -> Result<Vec<BridgeEntry>> {
        self.registry.list()
    }

    /// Probes host availability for every grant category.
    ///
    /// Stateless with respect to the registry: reports what `create`
    /// and `run` would be able to satisfy on this host.
    pub fn probe(&self) -> Vec<CategoryProbe> {
        policy::probe(&self.host)
    }
}

// =============================================================================
// Docker CLI Engine
// =============================================================================

/// Production engine: shells out to the `docker` binary.
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    /// Uses an alternative engine binary (e.g. `podman`).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn engine_failure(&self, operation: &str, message: impl Into<String>) -> Error {
        Error::EngineFailure {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// Runs the engine binary capturing output; nonzero exit becomes
    /// `EngineFailure` carrying the engine's stderr verbatim.
    fn capture(&self, operation: &str, args: &[String]) -> Result<String> {
        debug!(engine = %self.binary, ?args, "invoking engine");
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|e| self.engine_failure(operation, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(self.engine_failure(operation, stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerEngine for DockerCli {
    fn build_image(&self, context: &Path, tag: &str) -> Result<String> {
        let args = vec![
            "build".to_string(),
            "-q".to_string(),
            "-t".to_string(),
            tag.to_string(),
            context.display().to_string(),
        ];
        let stdout = self.capture("build", &args)?;
        // `-q` prints the image id; fall back to the tag if the engine
        // printed nothing.
        if stdout.is_empty() {
            Ok(tag.to_string())
        } else {
            Ok(stdout)
        }
    }

    fn run(&self, invocation: &RunInvocation) -> Result<i32> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            invocation.container_name.clone(),
        ];
        args.extend(grant_args(&invocation.grants));
        args.push(invocation.image.clone());
        args.push("sh".to_string());
        args.push("-c".to_string());
        args.push(invocation.command.clone());

        debug!(engine = %self.binary, container = %invocation.container_name, "running container");

        // Inherit the terminal: the program gets stdio, and an interrupt
        // reaches the child process group directly.
        let status = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| self.engine_failure("run", e.to_string()))?;

        Ok(status.code().unwrap_or(1))
    }

    fn remove_image(&self, image: &str) -> Result<()> {
        let args = vec!["rmi".to_string(), image.to_string()];
        match self.capture("rmi", &args) {
            Ok(_) => Ok(()),
            // The engine may have pruned the image already; removal is
            // about releasing, so a missing image is success.
            Err(Error::EngineFailure { message, .. }) if message.contains("No such image") => {
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn is_running(&self, container: &str) -> Result<bool> {
        let args = vec![
            "ps".to_string(),
            "-q".to_string(),
            "--filter".to_string(),
            format!("name=^{container}$"),
        ];
        let stdout = self.capture("ps", &args)?;
        Ok(!stdout.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naming_is_prefixed_and_deterministic() {
        assert_eq!(image_tag("gimp"), "debridge/gimp");
        assert_eq!(container_name("gimp"), "debridge_gimp");
        assert_eq!(container_name("gimp"), container_name("gimp"));
    }

    #[test]
    fn grant_args_map_each_variant() {
        let grants = vec![
            ResourceGrant::BindMount {
                host: PathBuf::from("/tmp/.X11-unix"),
                container: PathBuf::from("/tmp/.X11-unix"),
                read_only: true,
            },
            ResourceGrant::BindMount {
                host: PathBuf::from("/home/user"),
                container: PathBuf::from("/home/user"),
                read_only: false,
            },
            ResourceGrant::DeviceExpose {
                device: PathBuf::from("/dev/snd/timer"),
            },
            ResourceGrant::EnvVar {
                key: "DISPLAY".into(),
                value: ":0".into(),
            },
        ];

        assert_eq!(
            grant_args(&grants),
            vec![
                "-v",
                "/tmp/.X11-unix:/tmp/.X11-unix:ro",
                "-v",
                "/home/user:/home/user",
                "--device",
                "/dev/snd/timer",
                "-e",
                "DISPLAY=:0",
            ]
        );
    }

    #[test]
    fn grant_args_preserve_order() {
        let grants = vec![
            ResourceGrant::EnvVar {
                key: "A".into(),
                value: "1".into(),
            },
            ResourceGrant::EnvVar {
                key: "B".into(),
                value: "2".into(),
            },
        ];
        assert_eq!(grant_args(&grants), vec!["-e", "A=1", "-e", "B=2"]);
    }
}
