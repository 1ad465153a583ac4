mod cli;
mod commands;
mod util;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::{
    SimulateArgs, cmd_config, cmd_convert, cmd_exec, cmd_kinds, cmd_simulate, cmd_units,
};
use util::load_config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so command output on stdout stays machine-readable
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let output = cli.output.as_ref();

    match cli.command {
        Commands::Simulate {
            kinds,
            samples,
            interval_ms,
            format,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let args = SimulateArgs {
                kinds,
                samples,
                interval: Duration::from_millis(interval_ms),
                format,
            };
            cmd_simulate(config, args, output).await?;
        }
        Commands::Kinds { format } => cmd_kinds(format, output)?,
        Commands::Convert { value, from, to } => cmd_convert(value, &from, &to, output)?,
        Commands::Units => cmd_units(output)?,
        Commands::Config { save } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_config(&config, save.as_ref(), output)?;
        }
        Commands::Exec { file, events } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_exec(config, file.as_ref(), events, output).await?;
        }
    }

    Ok(())
}
