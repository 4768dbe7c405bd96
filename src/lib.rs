//! # debridge
//!
//! **Debian package to container bridge**
//!
//! Runs native Debian packages inside an isolated container runtime
//! without installing their dependencies on the host. Each package gets
//! its own image; host resources (display, audio, home directory,
//! session bus, timezone, device nodes) are exposed into the container
//! through an explicit, per-flag grant model.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Bridge Engine                           │
//! │        create / run / list / remove / probe (lifecycle)          │
//! ├───────────────┬───────────────┬───────────────┬──────────────────┤
//! │ Descriptor    │ Integration   │ Image Spec    │    Registry      │
//! │ Reader        │ Policy        │ Builder       │                  │
//! │ .deb control  │ flags + host  │ base + deps   │ durable JSON,    │
//! │ metadata      │ → grants      │ → Dockerfile  │ atomic writes    │
//! ├───────────────┴───────────────┴───────────────┴──────────────────┤
//! │               ContainerEngine trait (DockerCli)                  │
//! │          build / run / remove image / liveness check             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! ```text
//!   Uninstalled ──create──► Building ──► Installed ──run──► Running
//!        ▲                     │              ▲                │
//!        │     build failure   │              └── process exit ┘
//!        └─────────────────────┘
//!   Installed ──remove──► Removed   (remove while Running → InUse)
//! ```
//!
//! # Key Properties
//!
//! - **Atomic create**: a registry entry appears only after descriptor
//!   read, grant resolution, and image build all succeed.
//! - **Deterministic grants**: the same flags against the same host
//!   snapshot always yield the same ordered grant sequence.
//! - **Live re-resolution**: `run` regenerates grants from the current
//!   host, honoring drift since install time.
//! - **Explicit exposure**: audio and extra devices are enumerated node
//!   by node; there is no blanket `/dev` grant.
//!
//! # Example
//!
//! ```rust,ignore
//! use debridge::{Bridge, CreateRequest, DockerCli, Host, IntegrationFlags, Registry};
//!
//! let registry = Registry::open("/home/user/.debridge/registry")?;
//! let host = Host::detect(&[]);
//! let bridge = Bridge::new(registry, DockerCli::new(), host);
//!
//! bridge.create(&CreateRequest {
//!     archive: "./gimp.deb".into(),
//!     flags: IntegrationFlags { display: true, home: true, ..Default::default() },
//!     ..Default::default()
//! })?;
//! let exit = bridge.run("gimp")?;
//! ```

pub mod constants;
pub mod engine;
pub mod error;
pub mod host;
pub mod image;
pub mod package;
pub mod policy;
pub mod registry;
pub mod settings;

// Re-exports
pub use engine::{
    container_name, grant_args, image_tag, Bridge, ContainerEngine, CreateRequest, DockerCli,
    RunInvocation,
};
pub use error::{Error, Result};
pub use host::{DisplayServer, Host, TimezoneSource};
pub use image::ImageSpec;
pub use package::PackageDescriptor;
pub use policy::{probe, resolve, CategoryProbe, GrantCategory, IntegrationFlags, ResourceGrant};
pub use registry::{BridgeEntry, Registry};
pub use settings::Settings;
