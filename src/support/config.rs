//! CLI argument parsing for the two demo binaries (spec §1 ambient
//! additions), grounded on the teacher's `CliArgs` (`src/config.rs`):
//! `clap::Parser` with `env` fallbacks, no JSON config file since the demo
//! has nothing worth persisting to one.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "nuwa-payee-demo")]
#[command(about = "Runs a demo payee service exposing a billable route over HTTP")]
pub struct PayeeArgs {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: std::net::IpAddr,
    #[arg(long, env = "PORT", default_value_t = 8787)]
    pub port: u16,
    #[arg(long, env = "ASSET_ID", default_value = "demo-usdc")]
    pub asset_id: String,
    #[arg(long, env = "PRICE_PICO_USD", default_value_t = 1_000_000_000)]
    pub price_pico_usd: u64,
    #[arg(long, env = "PAYEE_DID", default_value = "did:example:payee")]
    pub payee_did: String,
    /// Payer DIDs allowed to call the `nuwa.admin.*` routes.
    #[arg(long, env = "ADMIN_DIDS", value_delimiter = ',', default_value = "did:example:payer")]
    pub admin_dids: Vec<String>,
}

#[derive(Parser, Debug)]
#[command(name = "nuwa-payer-demo")]
#[command(about = "Drives one billed request against a running payee demo")]
pub struct PayerArgs {
    #[arg(long, env = "PAYEE_URL", default_value = "http://127.0.0.1:8787")]
    pub payee_url: String,
    #[arg(long, env = "RESOURCE_PATH", default_value = "/chat")]
    pub resource_path: String,
    #[arg(long, env = "PAYER_DID", default_value = "did:example:payer")]
    pub payer_did: String,
    #[arg(long, env = "ASSET_ID", default_value = "demo-usdc")]
    pub asset_id: String,
}
