use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// payloadctl - Inspect and check installer software selections
#[derive(Parser, Debug)]
#[command(name = "payloadctl")]
#[command(about = "Check software selections against repository metadata")]
#[command(version)]
pub struct Cli {
    /// Payload configuration file (defaults are used without it)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve a software selection and print the validation report
    Check {
        /// Repository metadata (JSON)
        #[arg(short, long)]
        metadata: PathBuf,
        /// Software selection (JSON)
        #[arg(short, long)]
        selection: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the groups of the selected environment
    Groups {
        /// Repository metadata (JSON)
        #[arg(short, long)]
        metadata: PathBuf,
        /// Software selection (JSON); the default environment without it
        #[arg(short, long)]
        selection: Option<PathBuf>,
    },
    /// Show the status line of a software selection
    Status {
        /// Repository metadata (JSON)
        #[arg(short, long)]
        metadata: PathBuf,
        /// Software selection (JSON)
        #[arg(short, long)]
        selection: PathBuf,
        /// The selection comes from a kickstart file
        #[arg(short, long)]
        kickstarted: bool,
    },
    /// Validate a payload configuration file
    ValidateConfig {
        /// Path to the configuration file
        #[arg(value_name = "CONFIG")]
        file: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
