//! jbyarn: bring up a domain-mode server cluster on shared compute.
//!
//! # Usage
//!
//! ```text
//! jbyarn master --num-containers 3 --app-artifact /opt/jbyarn/jbyarn \
//!     --dist-artifact /opt/dist/jboss-as-7.1.1.Final.tar.gz
//! jbyarn configure --home <server home> --server-group <group> --server <name> \
//!     --port-offset 150 --admin-user yarn --admin-password yarn \
//!     --domain-controller node-1 --host node-2
//! ```
//!
//! `master` exits 0 when every slot succeeded, 2 when the run failed,
//! and 1 on a fatal error.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "jbyarn",
    about = "Clustered application server bring-up on a shared compute cluster",
    version,
    propagate_version = true
)]
struct Cli {
    /// Log format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the application master until every slot has completed.
    Master(commands::master::MasterArgs),
    /// Register this instance in the server's domain configuration.
    Configure(commands::configure::ConfigureArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let debug = matches!(&cli.command, Command::Master(args) if args.debug);
    init_tracing(cli.log_format, debug);

    match cli.command {
        Command::Master(args) => commands::master::run(args).await,
        Command::Configure(args) => {
            commands::configure::run(args)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(format: LogFormat, debug: bool) {
    let default = if debug { "debug" } else { "info,jbyarn=debug" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Expand a leading `~/` in user-supplied paths.
pub(crate) fn expand_home(path: PathBuf) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path,
    }
}
