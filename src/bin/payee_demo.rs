//! Demo payee server: one billable route behind [`PaymentLayer`], plus the
//! `nuwa.*` control-plane routes, grounded on the teacher's
//! `x402-axum-example` (`examples/x402-axum-example/src/main.rs`) server
//! wiring.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::routing::post;
use axum::{Json, Router};
use clap::Parser;
use dotenvy::dotenv;

use nuwa_payment_channel::support::config::PayeeArgs;
use nuwa_payment_channel::support::crypto::{DemoResolver, DemoVerifier};
use nuwa_payment_channel::support::did_auth::DemoDidAuth;
use nuwa_payment_channel::support::rate::DemoRate;
use nuwa_payment_channel::support::shutdown::SigDown;
use nuwa_payment_channel::support::telemetry::Telemetry;

use subrav_contract::testing::MockContract;
use subrav_http::payee::{nuwa_routes, NuwaRoutesState, PaymentLayer, PaymentLayerConfig};
use subrav_payee::scheduler::ClaimScheduler;
use subrav_payee::{PaymentProcessor, ProcessorConfig, SchedulerPolicy};
use subrav_storage::{ChannelRepository, InMemoryChannelRepository, InMemoryPendingSubRAVRepository, InMemoryRAVRepository, SubChannelPatch};
use subrav_types::billing::{BillingRule, RuleMatch, StrategyConfig};
use subrav_types::channel::{ChannelEpoch, ChannelId, ChannelInfo, ChannelStatus, VmIdFragment};
use subrav_types::money::PicoUsd;

const DEMO_CHAIN_ID: u64 = 31337;
const DEMO_VM_ID_FRAGMENT: &str = "demo-key";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let args = PayeeArgs::parse();
    let _telemetry = Telemetry::new(env!("CARGO_PKG_NAME"));

    let channel_repo = Arc::new(InMemoryChannelRepository::new());
    let rav_repo = Arc::new(InMemoryRAVRepository::new());
    let pending_repo = Arc::new(InMemoryPendingSubRAVRepository::new());
    let contract = Arc::new(MockContract::new(DEMO_CHAIN_ID));
    contract.set_asset_price(&args.asset_id, PicoUsd(args.price_pico_usd as u128));

    let channel_id = seed_demo_channel(&channel_repo, &args).await?;

    let rate = DemoRate::new(&args.asset_id, 6, PicoUsd(args.price_pico_usd as u128));
    let scheduler =
        ClaimScheduler::spawn(contract.clone(), rav_repo.clone(), channel_repo.clone(), rate.clone(), SchedulerPolicy::default());

    let processor = Arc::new(
        PaymentProcessor::new(
            channel_repo.clone(),
            rav_repo.clone(),
            pending_repo.clone(),
            contract.clone(),
            rate,
            DemoResolver,
            DemoVerifier,
            ProcessorConfig { admins: args.admin_dids.iter().cloned().collect::<HashSet<_>>() },
        )
        .with_notifier(scheduler.clone()),
    );

    let rules = Arc::new(vec![chat_rule(args.price_pico_usd)]);
    let layer_config = PaymentLayerConfig {
        rules: rules.clone(),
        host_channel_id: Some(channel_id),
        host_vm_id_fragment: Some(VmIdFragment::from(DEMO_VM_ID_FRAGMENT)),
    };
    let auth = DemoDidAuth::new(&args.payee_did);
    let payment_layer = PaymentLayer::new(processor.clone(), auth.clone(), layer_config);

    let billable = Router::new().route("/chat", post(chat_handler)).layer(payment_layer);

    let nuwa_state = NuwaRoutesState {
        channel_repo: channel_repo.clone(),
        rav_repo: rav_repo.clone(),
        pending_repo,
        scheduler,
        resolver: DemoResolver,
        verifier: DemoVerifier,
        auth,
        admins: args.admin_dids.iter().cloned().collect(),
        discovery: subrav_types::proto::DiscoveryInfo {
            version: 1,
            service_id: "nuwa-payee-demo".to_string(),
            service_did: args.payee_did.clone(),
            network: "demo".to_string(),
            default_asset_id: args.asset_id.clone(),
            default_price_pico_usd: Some(PicoUsd(args.price_pico_usd as u128)),
            base_path: "/".to_string(),
        },
    };

    let app = billable.merge(nuwa_routes(nuwa_state)).layer(tower_http::trace::TraceLayer::new_for_http());

    let addr = SocketAddr::new(args.host, args.port);
    tracing::info!("starting payee demo at http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let sig_down = SigDown::try_new()?;
    let cancellation_token = sig_down.cancellation_token();
    axum::serve(listener, app).with_graceful_shutdown(async move { cancellation_token.cancelled().await }).await?;

    Ok(())
}

async fn chat_handler(Json(_body): Json<serde_json::Value>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "reply": "hello from the demo payee" }))
}

fn chat_rule(price_pico_usd: u64) -> BillingRule {
    BillingRule {
        id: "chat".to_string(),
        when: Some(RuleMatch { path: Some("/chat".to_string()), ..Default::default() }),
        default: false,
        strategy: StrategyConfig::PerRequest { price_pico_usd: PicoUsd(price_pico_usd as u128) },
        auth_required: false,
        admin_only: false,
        payment_required: true,
    }
}

async fn seed_demo_channel(
    channel_repo: &Arc<InMemoryChannelRepository>,
    args: &PayeeArgs,
) -> Result<ChannelId, Box<dyn std::error::Error>> {
    let channel_id = ChannelId::from_str(&format!("0x{}", "1".repeat(64)))?;
    channel_repo
        .set_channel_metadata(ChannelInfo {
            channel_id,
            payer_did: "did:example:payer".to_string(),
            payee_did: args.payee_did.clone(),
            asset_id: args.asset_id.clone(),
            chain_id: DEMO_CHAIN_ID,
            epoch: ChannelEpoch(0),
            status: ChannelStatus::Active,
        })
        .await?;
    channel_repo.update_sub_channel_state(channel_id, VmIdFragment::from(DEMO_VM_ID_FRAGMENT), SubChannelPatch::default()).await?;
    Ok(channel_id)
}
