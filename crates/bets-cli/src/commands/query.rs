//! Query command implementation.

use anyhow::Result;
use bets_core::codec::QueryOutcome;
use bets_core::{ClientConfig, ClientSession};
use tracing::info;

/// Ask the server for this agency's results on a fresh connection.
pub async fn run(config: ClientConfig) -> Result<()> {
    info!(
        agency = %config.client.agency,
        server = %config.server.address,
        "Querying results"
    );

    let agency = config.client.agency.clone();
    let mut session = ClientSession::new(config);
    session.connect().await?;

    match session.run_query().await? {
        QueryOutcome::Ready { winners } => {
            println!("Agency {agency}: {winners} winners");
        }
        QueryOutcome::NotReady { message } => {
            println!("Agency {agency}: results not available yet ({message})");
        }
    }
    Ok(())
}
