//! First-match rule matching with a bounded, LRU-cached `pathRegex` compiler
//! (spec §4.3, §9: "the regex cache in the rule matcher (bounded, LRU)").
//! Matching is synchronous and non-blocking (spec §5), so the cache is
//! guarded by a plain `std::sync::Mutex` rather than an async one.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use regex::Regex;
use subrav_types::billing::BillingRule;

/// The bound on the compiled-`pathRegex` cache (spec §9: "~100").
const REGEX_CACHE_CAPACITY: usize = 100;

/// Request attributes a [`BillingRule::when`] predicate is matched against.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub path: String,
    pub method: String,
    pub extra: BTreeMap<String, String>,
}

/// Matches request metadata against an ordered rule list (spec §4.3, P5).
pub struct RuleMatcher {
    regex_cache: Mutex<LruCache<String, Regex>>,
}

impl Default for RuleMatcher {
    fn default() -> Self {
        RuleMatcher { regex_cache: Mutex::new(LruCache::new(NonZeroUsize::new(REGEX_CACHE_CAPACITY).unwrap())) }
    }
}

impl RuleMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the first rule in `rules` whose predicate matches `meta`; if
    /// none does, the `default: true` rule (if any), regardless of its
    /// position in `rules` (P5). Returns `None` if nothing applies.
    pub fn match_rule<'a>(&self, rules: &'a [BillingRule], meta: &RequestMeta) -> Option<&'a BillingRule> {
        let mut default_rule = None;
        for rule in rules {
            if rule.default {
                default_rule.get_or_insert(rule);
                continue;
            }
            if self.predicate_matches(rule, meta) {
                return Some(rule);
            }
        }
        default_rule
    }

    fn predicate_matches(&self, rule: &BillingRule, meta: &RequestMeta) -> bool {
        let Some(when) = &rule.when else { return false };

        if let Some(path) = &when.path
            && path != &meta.path
        {
            return false;
        }
        if let Some(pattern) = &when.path_regex
            && !self.path_regex_matches(pattern, &meta.path)
        {
            return false;
        }
        if let Some(method) = &when.method
            && method.to_ascii_uppercase() != meta.method.to_ascii_uppercase()
        {
            return false;
        }
        for (key, expected) in &when.extra {
            if meta.extra.get(key) != Some(expected) {
                return false;
            }
        }
        true
    }

    fn path_regex_matches(&self, pattern: &str, path: &str) -> bool {
        let mut cache = self.regex_cache.lock().expect("regex cache mutex poisoned");
        if let Some(regex) = cache.get(pattern) {
            return regex.is_match(path);
        }
        let Ok(regex) = Regex::new(pattern) else {
            return false;
        };
        let matched = regex.is_match(path);
        cache.put(pattern.to_string(), regex);
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subrav_types::billing::{RuleMatch, StrategyConfig};
    use subrav_types::money::PicoUsd;

    fn rule(id: &str, when: Option<RuleMatch>, default: bool) -> BillingRule {
        BillingRule {
            id: id.to_string(),
            when,
            default,
            strategy: StrategyConfig::PerRequest { price_pico_usd: PicoUsd(1) },
            auth_required: false,
            admin_only: false,
            payment_required: false,
        }
    }

    #[test]
    fn first_match_wins_and_default_only_considered_last() {
        let matcher = RuleMatcher::new();
        let rules = vec![
            rule("specific", Some(RuleMatch { path: Some("/a".into()), ..Default::default() }), false),
            rule("fallback", None, true),
        ];
        let meta = RequestMeta { path: "/a".into(), method: "GET".into(), extra: Default::default() };
        assert_eq!(matcher.match_rule(&rules, &meta).unwrap().id, "specific");

        let meta_other = RequestMeta { path: "/b".into(), method: "GET".into(), extra: Default::default() };
        assert_eq!(matcher.match_rule(&rules, &meta_other).unwrap().id, "fallback");
    }

    #[test]
    fn default_ordering_in_list_does_not_matter() {
        let matcher = RuleMatcher::new();
        let rules = vec![
            rule("fallback", None, true),
            rule("specific", Some(RuleMatch { path: Some("/a".into()), ..Default::default() }), false),
        ];
        let meta = RequestMeta { path: "/a".into(), method: "GET".into(), extra: Default::default() };
        assert_eq!(matcher.match_rule(&rules, &meta).unwrap().id, "specific");
    }

    #[test]
    fn path_regex_is_cached_and_reused() {
        let matcher = RuleMatcher::new();
        let rules = vec![rule(
            "billing",
            Some(RuleMatch { path_regex: Some("^/items/\\d+$".into()), ..Default::default() }),
            false,
        )];
        let meta = RequestMeta { path: "/items/42".into(), method: "GET".into(), extra: Default::default() };
        assert!(matcher.match_rule(&rules, &meta).is_some());
        // second call exercises the cache hit path
        assert!(matcher.match_rule(&rules, &meta).is_some());
    }

    #[test]
    fn no_rule_matches_returns_none() {
        let matcher = RuleMatcher::new();
        let rules = vec![rule("specific", Some(RuleMatch { path: Some("/a".into()), ..Default::default() }), false)];
        let meta = RequestMeta { path: "/b".into(), method: "GET".into(), extra: Default::default() };
        assert!(matcher.match_rule(&rules, &meta).is_none());
    }
}
