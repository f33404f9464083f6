//! cn: Ceph Nano CLI
//!
//! A command-line tool to run single-node Ceph object storage clusters in
//! containers and talk S3 to them.

mod commands;
mod config;
mod output;
mod registry;

use clap::{Parser, Subcommand, ValueEnum};
use nano_lib::config::DEFAULT_WORK_DIRECTORY;
use nano_lib::{init_tracing, NanoError};
use std::path::PathBuf;
use std::process::ExitCode;

/// Ceph Nano CLI
#[derive(Parser)]
#[command(name = "cn")]
#[command(author, version, about = "Ceph Nano: S3 object storage clusters in a container", long_about = None)]
pub struct Cli {
    /// Configuration file (default: cn.{toml,yaml,yml,json} in /etc/cn, ~/.cn or .)
    #[arg(long, global = true, env = "CN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format for listings
    #[arg(long, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Log line format on stderr
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interact with a particular Ceph cluster
    #[command(subcommand)]
    Cluster(ClusterCommands),

    /// Interact with a particular S3 object server
    #[command(subcommand)]
    S3(S3Commands),

    /// Interact with cn's container image(s)
    #[command(subcommand)]
    Image(ImageCommands),

    /// Interact with flavors
    #[command(subcommand)]
    Flavors(FlavorsCommands),
}

#[derive(Subcommand)]
pub enum ClusterCommands {
    /// Start an object storage server
    Start {
        /// Cluster name
        name: String,

        /// Directory to work from
        #[arg(long, short = 'd', default_value = DEFAULT_WORK_DIRECTORY)]
        work_dir: String,

        /// Container image or alias, format is 'registry/username/image:tag'
        #[arg(long, short = 'i')]
        image: Option<String>,

        /// Directory or block device to keep Ceph's data in
        #[arg(long, short = 'b', default_value = "")]
        data: String,

        /// Size of the data store when using a directory (e.g. 20GB)
        #[arg(long, short = 's', default_value = "")]
        size: String,

        /// Flavor to start the cluster with
        #[arg(long, short = 'f', default_value = "default")]
        flavor: String,

        /// Start the container in privileged mode
        #[arg(long)]
        privileged: bool,
    },

    /// Stop an object storage server
    Stop {
        /// Cluster name
        name: String,
    },

    /// Restart an object storage server
    Restart {
        /// Cluster name
        name: String,
    },

    /// Print an object storage server status
    Status {
        /// Cluster name
        name: String,
    },

    /// Purge an object storage server. DANGEROUS!
    Purge {
        /// Cluster name
        name: String,

        /// I know what I'm doing and I want to purge
        #[arg(long)]
        yes_i_am_sure: bool,

        /// Also delete the container image
        #[arg(long)]
        all: bool,
    },

    /// Print the list of object storage servers
    Ls,

    /// Print an object storage server logs
    Logs {
        /// Cluster name
        name: String,
    },

    /// Exec into an object storage server
    Enter {
        /// Cluster name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum S3Commands {
    /// Make bucket
    Mb {
        cluster: String,
        bucket: String,
        /// Run S3 commands in debug mode
        #[arg(long, short)]
        debug: bool,
    },

    /// Remove bucket
    Rb {
        cluster: String,
        bucket: String,
        /// Run S3 commands in debug mode
        #[arg(long, short)]
        debug: bool,
    },

    /// List objects or buckets
    Ls {
        cluster: String,
        bucket: Option<String>,
        /// Run S3 commands in debug mode
        #[arg(long, short)]
        debug: bool,
    },

    /// List all objects in all buckets
    La {
        cluster: String,
        /// Run S3 commands in debug mode
        #[arg(long, short)]
        debug: bool,
    },

    /// Put file into bucket
    Put {
        cluster: String,
        file: PathBuf,
        bucket: String,
        /// Run S3 commands in debug mode
        #[arg(long, short)]
        debug: bool,
    },

    /// Get file out of a bucket
    Get {
        cluster: String,
        /// BUCKET/OBJECT
        object: String,
        /// Where to copy the object on the host
        local: Option<PathBuf>,
        /// Skip over files that exist at the destination (default)
        #[arg(long, short = 's')]
        skip: bool,
        /// Force overwrite files that exist at the destination
        #[arg(long, short = 'f')]
        force: bool,
        /// Continue getting a partially downloaded file
        #[arg(long = "continue", short = 'c')]
        resume: bool,
        /// Run S3 commands in debug mode
        #[arg(long, short)]
        debug: bool,
    },

    /// Delete file from bucket
    Del {
        cluster: String,
        /// BUCKET/OBJECT
        object: String,
        /// Run S3 commands in debug mode
        #[arg(long, short)]
        debug: bool,
    },

    /// Disk usage by buckets
    Du {
        cluster: String,
        /// BUCKET/PREFIX
        prefix: String,
        /// Run S3 commands in debug mode
        #[arg(long, short)]
        debug: bool,
    },

    /// Get various information about buckets or files
    Info {
        cluster: String,
        /// BUCKET/OBJECT
        target: String,
        /// Run S3 commands in debug mode
        #[arg(long, short)]
        debug: bool,
    },

    /// Copy object
    Cp {
        cluster: String,
        /// BUCKET1/OBJECT1
        from: String,
        /// BUCKET2/OBJECT2
        to: String,
        /// Run S3 commands in debug mode
        #[arg(long, short)]
        debug: bool,
    },

    /// Move object
    Mv {
        cluster: String,
        /// BUCKET1/OBJECT1
        from: String,
        /// BUCKET2/OBJECT2
        to: String,
        /// Run S3 commands in debug mode
        #[arg(long, short)]
        debug: bool,
    },

    /// Synchronize a directory tree to S3
    Sync {
        cluster: String,
        local_dir: PathBuf,
        bucket: String,
        /// Run S3 commands in debug mode
        #[arg(long, short)]
        debug: bool,
    },
}

#[derive(Subcommand)]
pub enum ImageCommands {
    /// Update a given container image (makes sense when running on a 'latest')
    Update {
        /// Image to pull again
        image: String,
    },

    /// List container image tags (the first 100 unless --all)
    Ls {
        /// List all the tags of the container image
        #[arg(long, short)]
        all: bool,
    },

    /// Print the list of image aliases
    ShowAliases,
}

#[derive(Subcommand)]
pub enum FlavorsCommands {
    /// Print the list of flavors
    Ls,

    /// Show a flavor
    Show {
        /// Flavor name
        name: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, matches!(cli.log_format, LogFormat::Json));

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(err),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Cluster(cmd) => commands::cluster::run(cmd, config_path, cli.format).await,
        Commands::S3(cmd) => commands::s3::run(cmd).await,
        Commands::Image(cmd) => commands::image::run(cmd, config_path, cli.format).await,
        Commands::Flavors(cmd) => commands::flavors::run(cmd, config_path, cli.format),
    }
}

/// Print the error and pick the exit code.
///
/// "Does not exist" and "not running" are information, not failures.
fn report(err: anyhow::Error) -> ExitCode {
    let Some(nano) = err.downcast_ref::<NanoError>() else {
        output::print_error(&format!("{:#}", err));
        return ExitCode::FAILURE;
    };

    if nano.is_precondition() {
        output::print_info(&nano.to_string());
    } else {
        if let Some(logs) = nano.captured_logs().filter(|l| !l.trim().is_empty()) {
            eprintln!("Showing the logs captured while waiting:");
            eprintln!("{}", logs);
        }
        output::print_error(&nano.to_string());
    }
    ExitCode::from(u8::try_from(nano.exit_code()).unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_start_defaults() {
        let cli = Cli::parse_from(["cn", "cluster", "start", "alpha"]);
        match cli.command {
            Commands::Cluster(ClusterCommands::Start {
                name,
                work_dir,
                image,
                flavor,
                privileged,
                ..
            }) => {
                assert_eq!(name, "alpha");
                assert_eq!(work_dir, DEFAULT_WORK_DIRECTORY);
                assert_eq!(image, None);
                assert_eq!(flavor, "default");
                assert!(!privileged);
            }
            _ => panic!("expected cluster start"),
        }
    }

    #[test]
    fn test_precondition_exits_zero() {
        let code = report(NanoError::ClusterAbsent("alpha".into()).into());
        assert_eq!(format!("{:?}", code), format!("{:?}", ExitCode::SUCCESS));
    }

    #[test]
    fn test_confirmation_exits_one() {
        let code = report(NanoError::ConfirmationRequired.into());
        assert_eq!(format!("{:?}", code), format!("{:?}", ExitCode::from(1)));
    }
}
