//! debridge - Debian package to container bridge CLI
//!
//! Installs Debian packages into per-package container images and runs
//! them with selectively shared host resources.
//!
//! ## Usage
//!
//! ```sh
//! debridge create ./gimp.deb -d -s --home
//! debridge run gimp
//! debridge list
//! debridge remove gimp
//! debridge test
//! ```

use clap::{ArgAction, Parser, Subcommand};
use debridge::{Bridge, CreateRequest, DockerCli, Host, IntegrationFlags, Registry, Settings};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Default icon installed alongside the bridge, used for
/// `--desktop-icon default`.
const DEFAULT_ICON_NAME: &str = "debridge.png";

#[derive(Parser, Debug)]
#[command(
    name = "debridge",
    version,
    about = "Run Debian packages inside containers with selective host integration",
    subcommand_required = true,
    arg_required_else_help = true
)]
struct Cli {
    /// Configuration file (default: ~/.debridge/config.json)
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Raise diagnostic verbosity (repeatable: -v, -vv, ...)
    #[arg(short = 'v', global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install a package archive as a containerized program
    Create(CreateArgs),

    /// Run an installed program
    Run {
        /// Program name
        name: String,
    },

    /// Remove an installed program and release its image
    Remove {
        /// Program name
        name: String,
    },

    /// List installed programs
    List,

    /// Probe host availability for each integration category
    Test,
}

/// Arguments for the create command.
///
/// `-h` is taken by `--home` (matching the documented flag set), so the
/// automatic help short flag is disabled and `--help` re-added by hand.
#[derive(Parser, Debug)]
#[command(disable_help_flag = true)]
struct CreateArgs {
    /// Path to the .deb package archive
    package: PathBuf,

    /// Command to run inside the container (default: the package name)
    #[arg(long, value_name = "CMD")]
    command: Option<String>,

    /// Extra dependencies to install, comma separated
    #[arg(long, value_name = "DEPS", value_delimiter = ',')]
    dependencies: Vec<String>,

    /// Share the host display server
    #[arg(short = 'd', long)]
    display: bool,

    /// Expose host audio devices
    #[arg(short = 's', long)]
    sound: bool,

    /// Bind-mount the host home directory
    #[arg(short = 'h', long)]
    home: bool,

    /// Share the host session bus (desktop notifications)
    #[arg(short = 'n', long)]
    notifications: bool,

    /// Share the host timezone
    #[arg(short = 't', long)]
    timezone: bool,

    /// Expose allowlisted host device nodes (see config)
    #[arg(short = 'i', long)]
    devices: bool,

    /// Desktop icon: a path, or "default"
    #[arg(long, value_name = "PATH|default")]
    desktop_icon: Option<String>,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match execute(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn execute(cli: Cli) -> debridge::Result<ExitCode> {
    let settings_path = cli.config.unwrap_or_else(Settings::default_path);
    let settings = Settings::load(&settings_path)?;

    let registry = Registry::open(&settings.registry_path)?;
    let host = Host::detect(&settings.device_allowlist);
    let bridge = Bridge::new(registry, DockerCli::new(), host);

    match cli.command {
        Commands::Create(args) => {
            let request = CreateRequest {
                archive: args.package,
                flags: IntegrationFlags {
                    display: args.display,
                    sound: args.sound,
                    home: args.home,
                    notifications: args.notifications,
                    timezone: args.timezone,
                    devices: args.devices,
                },
                custom_command: args.command,
                extra_dependencies: args.dependencies,
                desktop_icon: args.desktop_icon.map(resolve_icon_path),
            };
            let entry = bridge.create(&request)?;
            println!("Program '{}' installed", entry.name);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Run { name } => {
            let exit = bridge.run(&name)?;
            Ok(ExitCode::from(exit.clamp(0, 255) as u8))
        }

        Commands::Remove { name } => {
            bridge.remove(&name)?;
            println!("Program '{name}' removed");
            Ok(ExitCode::SUCCESS)
        }

        Commands::List => {
            let entries = bridge.list()?;
            if entries.is_empty() {
                println!("No programs installed yet");
            } else {
                for entry in entries {
                    println!("{}", entry.name);
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Test => {
            let report = bridge.probe();
            let mut all_pass = true;
            for probe in &report {
                let verdict = if probe.available { "pass" } else { "fail" };
                all_pass &= probe.available;
                println!("{:<15} {:<5} {}", probe.category.to_string(), verdict, probe.detail);
            }
            if all_pass {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

/// Resolves `--desktop-icon default` to the bridge's bundled icon path.
fn resolve_icon_path(value: String) -> PathBuf {
    if value == "default" {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".icons")
            .join(DEFAULT_ICON_NAME)
    } else {
        PathBuf::from(value)
    }
}
