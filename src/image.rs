//! # Image Spec Builder
//!
//! Composes a buildable container image definition from a package
//! descriptor: base layer, dependency install step, package install step,
//! and runtime entrypoint.
//!
//! ## Build Context
//!
//! ```text
//! <context dir>/
//! ├── Dockerfile     (rendered from the ImageSpec)
//! └── package.deb    (copy of the source archive)
//! ```
//!
//! The context is handed to the external engine; nothing from the package
//! payload touches the host filesystem outside the context directory.
//!
//! ## Determinism
//!
//! [`ImageSpec::build`] and [`ImageSpec::dockerfile`] are deterministic
//! given their inputs; dependency order follows declaration order, with
//! extra dependencies appended (additive, never substituted).

use crate::constants::{base_image_for, CONTEXT_ARCHIVE_NAME};
use crate::error::{Error, Result};
use crate::package::PackageDescriptor;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A buildable container image definition.
///
/// Built once per `create`, consumed once by the external engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    /// Base image reference (from the architecture compatibility table).
    pub base_reference: String,
    /// Path to the source package archive on the host.
    pub archive_path: PathBuf,
    /// Dependencies declared by the package itself.
    pub dependencies: Vec<String>,
    /// Caller-supplied extra dependencies, appended to the declared set.
    pub extra_dependencies: Vec<String>,
    /// Caller-supplied command override, if any.
    pub custom_command: Option<String>,
    /// Resolved runtime entrypoint.
    entrypoint: String,
}

impl ImageSpec {
    /// Builds an image spec from a descriptor and caller overrides.
    ///
    /// The entrypoint defaults to the package's own name when no custom
    /// command is given. Extra dependencies are appended after the
    /// declared ones, never replacing them.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedBase`] if no base image is known for the
    ///   descriptor's architecture
    /// - [`Error::MalformedPackage`] if any dependency name contains
    ///   characters unsafe for the install command
    pub fn build(
        descriptor: &PackageDescriptor,
        archive_path: &Path,
        custom_command: Option<&str>,
        extra_dependencies: &[String],
    ) -> Result<Self> {
        let base_reference = base_image_for(&descriptor.architecture)
            .ok_or_else(|| Error::UnsupportedBase {
                arch: descriptor.architecture.clone(),
            })?
            .to_string();

        for dep in descriptor.depends.iter().chain(extra_dependencies) {
            validate_dependency(dep).map_err(|reason| Error::MalformedPackage {
                path: archive_path.to_path_buf(),
                reason,
            })?;
        }

        let entrypoint = custom_command
            .map(str::to_string)
            .unwrap_or_else(|| descriptor.name.clone());

        Ok(Self {
            base_reference,
            archive_path: archive_path.to_path_buf(),
            dependencies: descriptor.depends.clone(),
            extra_dependencies: extra_dependencies.to_vec(),
            custom_command: custom_command.map(str::to_string),
            entrypoint,
        })
    }

    /// The command the container runs by default.
    pub fn entrypoint(&self) -> &str {
        &self.entrypoint
    }

    /// All dependencies to install: declared first, extras appended.
    pub fn install_set(&self) -> Vec<&str> {
        self.dependencies
            .iter()
            .chain(&self.extra_dependencies)
            .map(String::as_str)
            .collect()
    }

    /// The shell command that installs dependencies and the package.
    pub fn install_command(&self) -> String {
        let mut cmd = String::from("apt-get update");
        let deps = self.install_set();
        if !deps.is_empty() {
            cmd.push_str(" \\\n    && apt-get install -y --no-install-recommends ");
            cmd.push_str(&deps.join(" "));
        }
        cmd.push_str(&format!(
            " \\\n    && apt-get install -y /tmp/{CONTEXT_ARCHIVE_NAME} \\\n    && rm -f /tmp/{CONTEXT_ARCHIVE_NAME} \\\n    && rm -rf /var/lib/apt/lists/*"
        ));
        cmd
    }

    /// Renders the Dockerfile for this spec.
    ///
    /// `CMD` uses shell form: the entrypoint may be a multi-word command
    /// line, and shell form runs it through `sh -c` exactly like the
    /// bridge's own run path does.
    pub fn dockerfile(&self) -> String {
        format!(
            "FROM {base}\n\
             ENV DEBIAN_FRONTEND=noninteractive\n\
             COPY {archive} /tmp/{archive}\n\
             RUN {install}\n\
             CMD {entrypoint}\n",
            base = self.base_reference,
            archive = CONTEXT_ARCHIVE_NAME,
            install = self.install_command(),
            entrypoint = self.entrypoint,
        )
    }

    /// Materializes the build context (Dockerfile + archive copy).
    pub fn write_context(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        fs::copy(&self.archive_path, dir.join(CONTEXT_ARCHIVE_NAME))?;
        fs::write(dir.join("Dockerfile"), self.dockerfile())?;
        debug!(context = %dir.display(), "wrote image build context");
        Ok(())
    }
}

/// Dependency names end up inside a shell `RUN` line; restrict them to
/// the Debian package name alphabet.
fn validate_dependency(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("empty dependency name".into());
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '-' | '.' | '+'))
    {
        return Err(format!("unsafe character '{bad}' in dependency '{name}'"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> PackageDescriptor {
        PackageDescriptor {
            name: "hello".into(),
            version: "2.10-3".into(),
            architecture: "amd64".into(),
            depends: vec!["libc6".into()],
            description: None,
        }
    }

    #[test]
    fn entrypoint_defaults_to_package_name() {
        let spec = ImageSpec::build(&descriptor(), Path::new("hello.deb"), None, &[]).unwrap();
        assert_eq!(spec.entrypoint(), "hello");
    }

    #[test]
    fn custom_command_overrides_entrypoint() {
        let spec =
            ImageSpec::build(&descriptor(), Path::new("hello.deb"), Some("hello --gui"), &[])
                .unwrap();
        assert_eq!(spec.entrypoint(), "hello --gui");
    }

    #[test]
    fn extra_dependencies_are_appended_not_substituted() {
        let extras = vec!["libgtk-3-0".into()];
        let spec = ImageSpec::build(&descriptor(), Path::new("hello.deb"), None, &extras).unwrap();
        assert_eq!(spec.install_set(), vec!["libc6", "libgtk-3-0"]);

        let without = ImageSpec::build(&descriptor(), Path::new("hello.deb"), None, &[]).unwrap();
        for dep in without.install_set() {
            assert!(spec.install_set().contains(&dep), "lost declared dep {dep}");
        }
    }

    #[test]
    fn unsupported_architecture_is_rejected() {
        let mut d = descriptor();
        d.architecture = "m68k".into();
        let err = ImageSpec::build(&d, Path::new("hello.deb"), None, &[]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedBase { .. }));
    }

    #[test]
    fn unsafe_extra_dependency_is_rejected() {
        let extras = vec!["libfoo; curl evil.sh".into()];
        let err = ImageSpec::build(&descriptor(), Path::new("hello.deb"), None, &extras)
            .unwrap_err();
        assert!(matches!(err, Error::MalformedPackage { .. }));
    }

    #[test]
    fn dockerfile_is_deterministic() {
        let a = ImageSpec::build(&descriptor(), Path::new("hello.deb"), None, &[]).unwrap();
        let b = ImageSpec::build(&descriptor(), Path::new("hello.deb"), None, &[]).unwrap();
        assert_eq!(a.dockerfile(), b.dockerfile());
    }

    #[test]
    fn dockerfile_installs_package_and_sets_cmd() {
        let spec = ImageSpec::build(&descriptor(), Path::new("hello.deb"), None, &[]).unwrap();
        let df = spec.dockerfile();
        assert!(df.starts_with("FROM debian:bookworm-slim\n"));
        assert!(df.contains("COPY package.deb /tmp/package.deb"));
        assert!(df.contains("apt-get install -y /tmp/package.deb"));
        assert!(df.ends_with("CMD hello\n"));
    }

    #[test]
    fn multiword_command_renders_as_one_shell_line() {
        let spec = ImageSpec::build(
            &descriptor(),
            Path::new("hello.deb"),
            Some("hello --gui --lang \"en US\""),
            &[],
        )
        .unwrap();
        // Shell form: the whole command line after CMD, verbatim, so the
        // baked default matches what the bridge itself executes.
        assert!(spec
            .dockerfile()
            .ends_with("CMD hello --gui --lang \"en US\"\n"));
    }
}
