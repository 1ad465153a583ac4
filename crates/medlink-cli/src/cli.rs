//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "medlink")]
#[command(author, version, about = "Demo host for the medlink device bridge", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (defaults to medlink.toml in the working directory)
    #[arg(short, long, global = true, env = "MEDLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a simulated session against mock devices and print every event
    Simulate {
        /// Device kinds to create (repeatable or comma-separated)
        #[arg(
            short,
            long = "kind",
            value_delimiter = ',',
            default_value = "accu_chek,wellue,yuwell"
        )]
        kinds: Vec<String>,

        /// Number of data samples each device emits
        #[arg(short = 'n', long, default_value = "3")]
        samples: u32,

        /// Delay between samples in milliseconds
        #[arg(short, long, default_value = "200")]
        interval_ms: u64,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List supported device kinds and their attributes
    Kinds {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Convert a value between measurement units
    Convert {
        /// Value to convert
        #[arg(allow_negative_numbers = true)]
        value: f64,

        /// Source unit, such as MILLIMOLES_PER_LITER
        from: String,

        /// Target unit, such as MILLIGRAMS_PER_DECILITER
        to: String,
    },

    /// List every measurement unit grouped by dimension
    Units,

    /// Print the effective configuration as TOML
    Config {
        /// Also write the effective configuration to this path
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Execute JSON-lines commands against a mock bridge
    Exec {
        /// File of commands, one JSON object per line (defaults to stdin)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Print events published while each command ran
        #[arg(long)]
        events: bool,
    },
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
    fn test_simulate_kind_list() {
        let cli = Cli::try_parse_from(["medlink", "simulate", "--kind", "wellue,yuwell", "-n", "5"])
            .unwrap();
        match cli.command {
            Commands::Simulate { kinds, samples, .. } => {
                assert_eq!(kinds, vec!["wellue", "yuwell"]);
                assert_eq!(samples, 5);
            }
            _ => panic!("expected simulate"),
        }
    }

    #[test]
    fn test_convert_accepts_negative_values() {
        let cli =
            Cli::try_parse_from(["medlink", "convert", "-40", "CELSIUS", "FAHRENHEIT"]).unwrap();
        match cli.command {
            Commands::Convert { value, from, to } => {
                assert_eq!(value, -40.0);
                assert_eq!(from, "CELSIUS");
                assert_eq!(to, "FAHRENHEIT");
            }
            _ => panic!("expected convert"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["medlink", "kinds", "--quiet", "--format", "json"]).unwrap();
        assert!(cli.quiet);
        assert!(matches!(
            cli.command,
            Commands::Kinds {
                format: OutputFormat::Json
            }
        ));
    }
}
