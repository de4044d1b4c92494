//! Lets a tool's own handler record deferred-billing usage (spec §4.3) for
//! [`McpPaymentHandler`](crate::handler::McpPaymentHandler) to read back
//! after the handler returns. Mirrors `subrav_http::payee::usage`.

use std::sync::{Arc, Mutex};

use subrav_types::billing::UsageMeta;
use subrav_types::money::PicoUsd;

#[derive(Clone, Default)]
pub(crate) struct UsageCell(Arc<Mutex<UsageMeta>>);

impl UsageCell {
    pub(crate) fn snapshot(&self) -> UsageMeta {
        self.0.lock().expect("usage mutex poisoned").clone()
    }
}

/// Handed to a tool's own handler to record `PerToken`/`FinalCost` usage for
/// the call currently in flight.
#[derive(Clone)]
pub struct UsageRecorder(Arc<Mutex<UsageMeta>>);

impl UsageRecorder {
    pub(crate) fn new(cell: UsageCell) -> Self {
        UsageRecorder(cell.0)
    }

    pub fn record(&self, usage_key: impl Into<String>, amount: u64) {
        let mut usage = self.0.lock().expect("usage mutex poisoned");
        *usage.counters.entry(usage_key.into()).or_insert(0) += amount;
    }

    pub fn set_final_cost_pico_usd(&self, cost: PicoUsd) {
        self.0.lock().expect("usage mutex poisoned").final_cost_pico_usd = Some(cost);
    }
}
