//! Standalone Partyline server.
//!
//! ```text
//! PORT=3001 RUST_LOG=partyline=debug cargo run -p party-server
//! ```

use partyline::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_PORT: u16 = 3001;

fn port_from_env() -> u16 {
    match std::env::var("PORT") {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(%raw, "PORT is not a valid port, using {DEFAULT_PORT}");
            DEFAULT_PORT
        }),
        Err(_) => DEFAULT_PORT,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port = port_from_env();
    let server = PartylineServerBuilder::new()
        .bind(&format!("0.0.0.0:{port}"))
        .build()
        .await?;
    tracing::info!(%port, "party server listening");

    server.run().await?;
    Ok(())
}
