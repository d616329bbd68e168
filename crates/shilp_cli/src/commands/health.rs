//! Health command implementation.

use super::{emit, CommandResult, Format};
use shilp_client::ShilpClient;

/// Runs the health command.
pub async fn run(client: &ShilpClient, format: Format) -> CommandResult {
    let health = client.health().check().await?;
    emit(format, &health, |h| {
        let status = if h.success { "healthy" } else { "unhealthy" };
        println!("{} is {status} (version {})", client.base_url(), h.version);
    })
}
