//! Command trait definition for CLI commands.
//!
//! Subcommands implement [`Command`]; `enum_dispatch` routes the parsed
//! subcommand enum to the right implementation without boxing.

use anyhow::Result;
use enum_dispatch::enum_dispatch;

/// Trait implemented by all matefix CLI commands.
///
/// The `command_line` parameter contains the full invocation for the @PG record.
#[enum_dispatch]
pub trait Command {
    #[allow(clippy::missing_errors_doc)]
    fn execute(&self, command_line: &str) -> Result<()>;
}
