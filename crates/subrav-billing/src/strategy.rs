//! The three billing strategies evaluate to a picoUSD cost (spec §4.3).

use subrav_types::billing::{StrategyConfig, UsageMeta};
use subrav_types::money::PicoUsd;

/// Evaluates `strategy` against recorded usage, producing a picoUSD cost.
/// [`StrategyConfig::is_deferred`] tells the caller whether this must be
/// called again after the handler runs (`PerToken`, `FinalCost`) or can be
/// computed up front (`PerRequest`).
pub fn evaluate(strategy: &StrategyConfig, usage: &UsageMeta) -> PicoUsd {
    match strategy {
        StrategyConfig::PerRequest { price_pico_usd } => *price_pico_usd,
        StrategyConfig::PerToken { unit_price_pico_usd, usage_key } => {
            let count = usage.get(usage_key).unwrap_or(0);
            unit_price_pico_usd.checked_mul_u64(count).unwrap_or(PicoUsd::ZERO)
        }
        StrategyConfig::FinalCost => usage.final_cost_pico_usd.unwrap_or(PicoUsd::ZERO),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_request_ignores_usage() {
        let cost = evaluate(&StrategyConfig::PerRequest { price_pico_usd: PicoUsd(1_000_000_000) }, &UsageMeta::default());
        assert_eq!(cost, PicoUsd(1_000_000_000));
    }

    #[test]
    fn per_token_multiplies_recorded_usage_matching_scenario_3() {
        let mut usage = UsageMeta::default();
        usage.counters.insert("total_tokens".to_string(), 150);
        let strategy = StrategyConfig::PerToken { unit_price_pico_usd: PicoUsd(20_000), usage_key: "total_tokens".into() };
        assert_eq!(evaluate(&strategy, &usage), PicoUsd(3_000_000));
    }

    #[test]
    fn final_cost_reads_the_handler_supplied_total() {
        let mut usage = UsageMeta::default();
        usage.final_cost_pico_usd = Some(PicoUsd(42));
        assert_eq!(evaluate(&StrategyConfig::FinalCost, &usage), PicoUsd(42));
    }

    #[test]
    fn missing_usage_defaults_to_zero_cost() {
        let strategy = StrategyConfig::PerToken { unit_price_pico_usd: PicoUsd(1), usage_key: "missing".into() };
        assert_eq!(evaluate(&strategy, &UsageMeta::default()), PicoUsd::ZERO);
    }
}
