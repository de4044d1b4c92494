//! Lets a business handler record deferred-billing usage (spec §4.3:
//! `meta.usage[usageKey]`, `finalCostPicoUSD`) for [`PaymentLayer`](super::layer::PaymentLayer)
//! to read back after the handler returns.

use std::sync::{Arc, Mutex};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;

use subrav_types::billing::UsageMeta;
use subrav_types::money::PicoUsd;

#[derive(Clone, Default)]
pub(crate) struct UsageCell(pub Arc<Mutex<UsageMeta>>);

/// An axum extractor a handler pulls in to record `PerToken`/`FinalCost`
/// usage for the request currently in flight.
#[derive(Clone)]
pub struct UsageRecorder(Arc<Mutex<UsageMeta>>);

impl UsageRecorder {
    pub fn record(&self, usage_key: impl Into<String>, amount: u64) {
        let mut usage = self.0.lock().expect("usage mutex poisoned");
        *usage.counters.entry(usage_key.into()).or_insert(0) += amount;
    }

    pub fn set_final_cost_pico_usd(&self, cost: PicoUsd) {
        self.0.lock().expect("usage mutex poisoned").final_cost_pico_usd = Some(cost);
    }
}

impl<S> FromRequestParts<S> for UsageRecorder
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UsageCell>()
            .map(|cell| UsageRecorder(cell.0.clone()))
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "no payment middleware installed on this route"))
    }
}
