//! CLI command dispatch.

pub mod run;
pub mod version;

use crate::cli::args::{Cli, Commands};
use crate::error::TimetrialError;

/// Dispatches a parsed CLI invocation to its command handler.
///
/// # Errors
///
/// Returns an error if the dispatched command handler fails.
pub async fn dispatch(cli: Cli) -> Result<(), TimetrialError> {
    match cli.command {
        Commands::Run(args) => run::run(&args).await,
        Commands::Version(args) => {
            version::run(&args);
            Ok(())
        }
    }
}
