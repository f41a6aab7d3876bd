//! Subscription filter matching.

use sigsettle_core::{normalize_symbol, Signal, SubscriptionFilter};

/// True when every filter the subscription declares is satisfied by `signal`.
pub fn matches(filter: &SubscriptionFilter, signal: &Signal) -> bool {
    if let Some(provider) = &filter.provider {
        if !provider.eq_ignore_ascii_case(&signal.provider) {
            return false;
        }
    }
    if let Some(token) = &filter.token {
        if normalize_symbol(token) != signal.token {
            return false;
        }
    }
    if let Some(category) = &filter.category {
        match &signal.category {
            Some(c) if c.eq_ignore_ascii_case(category) => {}
            _ => return false,
        }
    }
    if let Some(risk) = filter.risk_level {
        if signal.risk_level != Some(risk) {
            return false;
        }
    }
    if let Some(min) = filter.min_confidence {
        // A signal without a declared confidence cannot satisfy a minimum.
        match signal.confidence {
            Some(c) if c >= min => {}
            _ => return false,
        }
    }
    if let Some(min) = filter.min_collateral_usd {
        if signal.collateral_usd < min {
            return false;
        }
    }
    true
}
