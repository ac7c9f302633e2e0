//! `version` command.

use serde_json::json;

use crate::cli::args::{OutputFormat, VersionArgs};

/// Prints version information.
pub fn run(args: &VersionArgs) {
    match args.format {
        OutputFormat::Human => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        }
        OutputFormat::Json => {
            let payload = json!({
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            });
            println!("{payload}");
        }
    }
}
