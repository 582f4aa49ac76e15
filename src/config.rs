use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};

/// engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// flat convenience fee added to every installment invoice
    pub convenience_fee: Money,
    /// due window for the final balance invoice at termination
    pub final_invoice_due_days: i64,
    /// system-wide interest policy applied at schedule generation time
    pub interest_policy: InterestPolicy,
    /// event name for metered verification usage
    pub metered_event_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            convenience_fee: Money::from_decimal(dec!(2.50)),
            final_invoice_due_days: 30,
            interest_policy: InterestPolicy::Standard,
            metered_event_name: "identity_verification".to_string(),
        }
    }
}

/// interest policy hook
///
/// Applied as a pure transform at schedule generation time, never stored on
/// the loan record. Toggling it changes computed schedules only when they
/// are regenerated; persisted loan terms are untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestPolicy {
    /// use the rate stored on the loan
    Standard,
    /// force the effective rate to zero system-wide
    InterestFree,
}

impl InterestPolicy {
    /// effective annual rate for a stored loan rate
    pub fn effective_rate(&self, stored: Rate) -> Rate {
        match self {
            InterestPolicy::Standard => stored,
            InterestPolicy::InterestFree => Rate::ZERO,
        }
    }
}
