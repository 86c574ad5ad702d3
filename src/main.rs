use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;

#[derive(Parser)]
#[command(name = "backspace")]
#[command(version, about = "Run a coding agent against a repository and open a pull request")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Settings file (defaults to ./backspace.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one session and print its result as JSON
    Run {
        /// Repository to clone
        #[arg(long)]
        repo_url: String,

        /// Task for the agent
        #[arg(long)]
        prompt: String,

        /// Id events are reported under (generated when omitted)
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Serve the HTTP invocation endpoint
    Serve {
        #[arg(short, long, default_value_t = backspace::server::DEFAULT_PORT)]
        port: u16,

        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
    /// Show the effective configuration
    Config,
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    // stdout carries the result JSON; logs go to stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match &cli.command {
        Commands::Run {
            repo_url,
            prompt,
            session_id,
        } => {
            let success =
                cmd::cmd_run(cli.config.as_deref(), repo_url, prompt, session_id.clone()).await?;
            return Ok(if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            });
        }
        Commands::Serve { port, host } => cmd::cmd_serve(cli.config.as_deref(), host, *port).await?,
        Commands::Config => cmd::cmd_config(cli.config.as_deref())?,
    }

    Ok(ExitCode::SUCCESS)
}
