//! Send-one command implementation.

use anyhow::{bail, Result};
use bets_core::engine::send_single_record;
use bets_core::{ClientConfig, Record};
use clap::Args;
use tracing::info;

/// The bet to submit. Each field can also come from the environment.
#[derive(Args, Debug, Clone)]
pub struct BetArgs {
    /// First name
    #[arg(long, env = "NOMBRE")]
    nombre: String,

    /// Last name
    #[arg(long, env = "APELLIDO")]
    apellido: String,

    /// Document number
    #[arg(long, env = "DOCUMENTO")]
    documento: String,

    /// Birth date (YYYY-MM-DD)
    #[arg(long, env = "NACIMIENTO")]
    nacimiento: String,

    /// Number bet on
    #[arg(long, env = "NUMERO")]
    numero: String,
}

impl BetArgs {
    fn into_record(self, agency: &str) -> Record {
        Record {
            nombre: Some(self.nombre),
            apellido: Some(self.apellido),
            doc: Some(self.documento),
            nacimiento: Some(self.nacimiento),
            numero: Some(self.numero),
            agencia: agency.to_string(),
        }
    }
}

/// Submit one bet over the length-prefixed protocol.
pub async fn run(config: ClientConfig, bet: BetArgs) -> Result<()> {
    let record = bet.into_record(&config.client.agency);
    info!(
        agency = %record.agencia,
        doc = record.doc.as_deref().unwrap_or_default(),
        "Sending single bet"
    );

    let response = send_single_record(&config, &record).await?;
    if !response.is_ok() {
        bail!(
            "Server did not store bet: status={}, result={}",
            response.status,
            response.result
        );
    }

    println!(
        "Bet stored: doc={} numero={}",
        record.doc.as_deref().unwrap_or_default(),
        record.numero.as_deref().unwrap_or_default()
    );
    Ok(())
}
