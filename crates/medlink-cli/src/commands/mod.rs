//! Command implementations for the CLI.

mod config;
mod convert;
mod exec;
mod kinds;
mod simulate;

pub use config::cmd_config;
pub use convert::{cmd_convert, cmd_units};
pub use exec::cmd_exec;
pub use kinds::cmd_kinds;
pub use simulate::{SimulateArgs, cmd_simulate};
