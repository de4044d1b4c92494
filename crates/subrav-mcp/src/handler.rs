//! Wraps an MCP tool call's own business logic with the payee payment
//! pipeline (spec §4.4, §4.7), the MCP counterpart of
//! [`subrav_http::payee::layer::PaymentLayer`]. There is no MCP server
//! framework in this workspace's corpus to hang a `tower`-style layer off
//! of, so this is a plain async wrapper function instead: an embedder's MCP
//! tool-call dispatcher calls [`McpPaymentHandler::handle_call`] around the
//! tool's own handler, the same way the HTTP adapter's middleware wraps an
//! axum `Service`.

use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};

use subrav_billing::{RateProvider, RequestMeta};
use subrav_codec::{DidResolver, SignatureVerifier};
use subrav_contract::PaymentChannelContract;
use subrav_payee::PaymentProcessor;
use subrav_storage::{ChannelRepository, PendingSubRAVRepository, RAVRepository};
use subrav_types::billing::{BillingContext, BillingRule};
use subrav_types::channel::{ChannelId, VmIdFragment};
use subrav_types::error::ProtocolError;
use subrav_types::subrav::SignedSubRAV;

use crate::codec::{extract_request, PAYMENT_PARAM};
use crate::result::McpToolResult;
use crate::usage::UsageCell;

pub use crate::usage::UsageRecorder;

/// Static, per-tool configuration an [`McpPaymentHandler`] needs beyond the
/// processor itself. Mirrors [`subrav_http::payee::layer::PaymentLayerConfig`].
#[derive(Clone)]
pub struct McpHandlerConfig {
    pub rules: Arc<Vec<BillingRule>>,
    pub host_channel_id: Option<ChannelId>,
    pub host_vm_id_fragment: Option<VmIdFragment>,
}

/// Drives [`PaymentProcessor`]'s three-step pipeline around one MCP tool
/// call.
pub struct McpPaymentHandler<CR, RR, PR, CT, RT, DR, SV> {
    processor: Arc<PaymentProcessor<CR, RR, PR, CT, RT, DR, SV>>,
    config: McpHandlerConfig,
}

impl<CR, RR, PR, CT, RT, DR, SV> McpPaymentHandler<CR, RR, PR, CT, RT, DR, SV> {
    pub fn new(processor: Arc<PaymentProcessor<CR, RR, PR, CT, RT, DR, SV>>, config: McpHandlerConfig) -> Self {
        McpPaymentHandler { processor, config }
    }
}

impl<CR, RR, PR, CT, RT, DR, SV> McpPaymentHandler<CR, RR, PR, CT, RT, DR, SV>
where
    CR: ChannelRepository + Send + Sync + 'static,
    RR: RAVRepository + Send + Sync + 'static,
    PR: PendingSubRAVRepository + Send + Sync + 'static,
    CT: PaymentChannelContract + Send + Sync + 'static,
    RT: RateProvider + Send + Sync + 'static,
    DR: DidResolver + Send + Sync + 'static,
    SV: SignatureVerifier + Send + Sync + 'static,
{
    /// Runs one tool call through pre-process/settle/persist. `tool_name`
    /// and `method` feed the same [`RequestMeta`] rule matching the HTTP
    /// adapter uses, with the MCP tool name standing in for an HTTP path.
    /// `did_auth` is the payer DID, already authenticated by the caller
    /// against the `__nuwa_auth` parameter — verification itself is out of
    /// this crate's scope the same way it is in `subrav-http`.
    ///
    /// `call` receives the tool's own parameters with the two reserved keys
    /// already stripped, plus a [`UsageRecorder`] for deferred-billing tools
    /// to report usage against; it returns the tool's own JSON result.
    pub async fn handle_call<F, Fut>(
        &self,
        tool_name: &str,
        mut params: Map<String, Value>,
        did_auth: Option<String>,
        call: F,
    ) -> McpToolResult
    where
        F: FnOnce(Map<String, Value>, UsageRecorder) -> Fut,
        Fut: Future<Output = Result<Value, ProtocolError>>,
    {
        let request_meta = RequestMeta { path: tool_name.to_string(), method: "MCP".to_string(), extra: Default::default() };

        let envelope = match extract_request(&params) {
            Ok(envelope) => envelope,
            Err(e) => return McpToolResult::error(ProtocolError::bad_request(e.to_string())),
        };
        params.remove(PAYMENT_PARAM);
        params.remove(crate::codec::AUTH_PARAM);

        let client_tx_ref = envelope.as_ref().map(|e| e.client_tx_ref.clone()).unwrap_or_default();
        let mut ctx = BillingContext::new("payee", "", client_tx_ref);
        ctx.did_auth = did_auth.is_some();
        ctx.payer_did = did_auth;
        if let Some(envelope) = &envelope {
            ctx.max_amount = envelope.max_amount.as_deref().and_then(|s| s.parse().ok());
            if let Some(wire) = &envelope.signed_sub_rav {
                match SignedSubRAV::try_from(wire) {
                    Ok(signed) => ctx.signed_sub_rav = Some(signed),
                    Err(e) => return McpToolResult::error(ProtocolError::bad_request(e.to_string())),
                }
            }
        }
        ctx.vm_id_fragment = ctx
            .signed_sub_rav
            .as_ref()
            .map(|s| s.sub_rav.vm_id_fragment.clone())
            .or_else(|| self.config.host_vm_id_fragment.clone());

        if let Err(e) = self.processor.pre_process(&mut ctx, &self.config.rules, &request_meta, self.config.host_channel_id).await {
            return McpToolResult::error(e);
        }

        if ctx.rule.is_none() {
            // Not billable: run the tool's own logic with no usage tracking or envelope.
            let usage = UsageCell::default();
            return match call(params, UsageRecorder::new(usage.clone())).await {
                Ok(result) => McpToolResult::ok(result, None),
                Err(e) => McpToolResult::error(e),
            };
        }

        if let Some(err) = ctx.state.error.clone() {
            return McpToolResult::error(err);
        }

        let (channel_id, vm_id_fragment) = match (ctx.channel_id, ctx.vm_id_fragment.clone()) {
            (Some(c), Some(v)) => (c, v),
            _ => return McpToolResult::error(ProtocolError::bad_request("no sub-channel identity")),
        };
        let _guard = self.processor.lock(channel_id, vm_id_fragment).await;

        let usage_cell = UsageCell::default();
        let result = match call(params, UsageRecorder::new(usage_cell.clone())).await {
            Ok(result) => result,
            Err(error) => {
                self.processor.settle_after_handler_failure(&mut ctx);
                if let Err(e) = self.processor.persist(&ctx).await {
                    tracing::warn!(error = %e, "best-effort persist after handler failure also failed");
                }
                return McpToolResult::error(error);
            }
        };

        let usage = usage_cell.snapshot();
        if let Err(e) = self.processor.settle(&mut ctx, usage).await {
            return McpToolResult::error(e);
        }
        if let Err(e) = self.processor.persist(&ctx).await {
            return McpToolResult::error(e);
        }

        let response = crate::response::success_envelope(&ctx);
        McpToolResult::ok(result, Some(response))
    }
}
