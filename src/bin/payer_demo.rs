//! Demo payer client: opens (or recovers) a channel against a running
//! `nuwa-payee-demo`, then drives one billed request through it, grounded on
//! the teacher's `x402-reqwest` example client wiring.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;
use reqwest_middleware::ClientBuilder;

use nuwa_payment_channel::support::config::PayerArgs;
use nuwa_payment_channel::support::crypto::DemoSigner;
use nuwa_payment_channel::support::did_auth::DemoDidAuth;
use nuwa_payment_channel::support::telemetry::Telemetry;

use subrav_contract::testing::MockContract;
use subrav_http::payer::{HttpPayeeTransport, SubravPayments};
use subrav_payer::{InMemoryPayerStateRepository, PayerClient, PayerClientConfig, PayerClientState};
use subrav_types::channel::VmIdFragment;

const DEMO_CHAIN_ID: u64 = 31337;
const DEMO_VM_ID_FRAGMENT: &str = "demo-key";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let args = PayerArgs::parse();
    let _telemetry = Telemetry::new(env!("CARGO_PKG_NAME"));

    let contract = Arc::new(MockContract::new(DEMO_CHAIN_ID));
    let http_client = reqwest::Client::new();
    let transport = HttpPayeeTransport::new(http_client, args.payee_url.clone());
    let state_repo = InMemoryPayerStateRepository::new();
    let key_id = format!("{}#{DEMO_VM_ID_FRAGMENT}", args.payer_did);
    let initial_state =
        PayerClientState::new(args.payee_url.clone(), args.payee_url.clone(), args.asset_id.clone(), key_id, VmIdFragment::from(DEMO_VM_ID_FRAGMENT));

    let auth = DemoDidAuth::new(&args.payer_did);
    let client = PayerClient::new(transport, state_repo, contract, DemoSigner, auth, PayerClientConfig::default(), initial_state);

    let http = ClientBuilder::new(reqwest::Client::new()).with(SubravPayments::new(client.clone())).build();

    let url = format!("{}{}", args.payee_url.trim_end_matches('/'), args.resource_path);
    tracing::info!(%url, "sending demo request");
    let response = http.post(&url).json(&serde_json::json!({})).timeout(Duration::from_secs(30)).send().await?;

    let status = response.status();
    let body = response.text().await?;
    println!("status: {status}\nbody: {body}");

    let snapshot = client.snapshot().await;
    println!(
        "channel: {:?}\nhighest observed nonce: {:?}",
        snapshot.channel_id, snapshot.highest_observed_nonce
    );

    Ok(())
}
