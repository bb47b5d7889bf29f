use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "converge")]
#[command(about = "Converge - Drive deployed services toward a desired unit count")]
pub struct Cli {
    /// Environment to operate on
    #[arg(short, long, default_value = "default")]
    pub environment: String,

    /// Orchestration tool to invoke
    #[arg(long, default_value = "fleetctl")]
    pub tool: String,

    /// Use the in-memory simulated backend instead of the live cluster
    #[arg(long)]
    pub simulate: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show environment status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Converge a service toward a desired number of units
    Ensure {
        /// Service name
        service: String,

        /// Desired unit count; omit to destroy the service
        #[arg(short, long)]
        num_units: Option<u32>,

        /// Ordinals that must survive a scale-down (comma-separated)
        #[arg(long, value_delimiter = ',')]
        keep: Vec<u32>,

        /// Also release each destroyed unit's machine
        #[arg(long)]
        terminate: bool,

        /// Delay between unit destruction and machine release (e.g. "5s")
        #[arg(long, default_value = "5s")]
        grace: String,
    },
    /// Deploy a charm as a new service
    Deploy {
        /// Charm name
        charm: String,

        /// Service name (defaults to the charm name)
        service: Option<String>,

        /// Initial number of units
        #[arg(short, long, default_value = "1")]
        num_units: u32,

        /// Service configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Machine constraints (e.g. "mem=4G")
        #[arg(long)]
        constraints: Option<String>,

        /// Deploy from a local charm repository
        #[arg(long)]
        local: bool,

        /// Charm repository path (with --local)
        #[arg(long)]
        repository: Option<PathBuf>,

        /// Release series to deploy from
        #[arg(long)]
        release: Option<String>,

        /// Expose the service after deploying
        #[arg(long)]
        expose: bool,
    },
    /// Destroy a service and all of its units
    DestroyService {
        /// Service name
        service: String,
    },
    /// Bootstrap the environment
    Bootstrap {
        /// Wait for the control machine to start
        #[arg(long)]
        wait: bool,

        /// Give up waiting after this long (e.g. "600s", "10m")
        #[arg(long, default_value = "10m")]
        timeout: String,

        /// Interval between status polls while waiting
        #[arg(long, default_value = "10s")]
        poll: String,
    },
    /// Destroy every machine that hosts no unit
    CleanupMachines,
    /// Manage the environments registry
    #[command(subcommand)]
    Env(EnvCommands),
}

#[derive(Subcommand)]
pub enum EnvCommands {
    /// Register a new environment and bootstrap it
    Add {
        /// Environment name
        name: String,

        /// Provider type (e.g. local, ec2)
        #[arg(long, default_value = "local")]
        provider: String,

        /// Provider options as key=value pairs
        #[arg(long, value_delimiter = ',')]
        option: Vec<String>,
    },
    /// Tear down an environment
    Destroy {
        /// Environment name
        name: String,

        /// Also remove the registry entry
        #[arg(long)]
        remove: bool,

        /// Allow destroying the default environment
        #[arg(long)]
        remove_default: bool,
    },
    /// List registered environments
    List,
}

/// Parse a human-readable duration: `"500ms"`, `"30s"`, `"5m"`. A bare
/// number is taken as seconds. Returns `None` for anything unparseable.
pub fn parse_duration_string(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(millis) = s.strip_suffix("ms") {
        millis.parse().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse().ok().map(Duration::from_secs)
    } else if let Some(minutes) = s.strip_suffix('m') {
        minutes.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse().ok().map(Duration::from_secs)
    }
}
