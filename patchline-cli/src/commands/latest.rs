//! `latest` command.

use tracing::info;

use super::common;
use crate::error::CliError;

/// Print the newest published version id.
pub fn run() -> Result<(), CliError> {
    let config = common::load_config()?;
    let metadata = common::metadata(&config)?;

    let version = metadata.latest_version_id()?;
    info!(version, "Resolved latest version");
    println!("{}", version);
    Ok(())
}
