//! Gateway wire bodies
//!
//! int64 fields travel as JSON strings and money as `{currencyCode, units, nanos}`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::approval::payload::{
    Attribute, BillingPeriod, ConsumptionPricingType, KvmEntryPayload, RatePlanPayload,
    RatePlanState,
};
use crate::money::{MoneyError, WireMoney, int64};

// ============================================================================
// Rate plans
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatePlanBody<'a> {
    pub display_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
    pub billing_period: BillingPeriod,
    pub currency_code: &'a str,
    pub fixed_fee_frequency: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_fee: Option<WireMoney>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_recurring_fee: Option<WireMoney>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumption_pricing_type: Option<ConsumptionPricingType>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub consumption_pricing_rates: Vec<RateRangeBody>,
    #[serde(serialize_with = "int64::serialize")]
    pub start_time: i64,
    #[serde(
        serialize_with = "int64::serialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_time: Option<i64>,
    pub state: RatePlanState,
}

#[derive(Debug, Serialize)]
pub struct RateRangeBody {
    #[serde(serialize_with = "int64::serialize")]
    pub start: i64,
    #[serde(serialize_with = "int64::serialize")]
    pub end: i64,
    pub fee: WireMoney,
}

impl<'a> From<&'a RatePlanPayload> for RatePlanBody<'a> {
    fn from(plan: &'a RatePlanPayload) -> Self {
        Self {
            display_name: &plan.display_name,
            description: plan.description.as_deref(),
            billing_period: plan.billing_period,
            currency_code: &plan.currency_code,
            fixed_fee_frequency: plan.fixed_fee_frequency,
            setup_fee: plan.setup_fee.as_ref().map(|f| f.to_wire()),
            fixed_recurring_fee: plan.fixed_recurring_fee.as_ref().map(|f| f.to_wire()),
            consumption_pricing_type: plan.consumption_pricing_type,
            consumption_pricing_rates: plan
                .consumption_pricing_rates
                .iter()
                .map(|r| RateRangeBody {
                    start: r.start,
                    end: r.end,
                    fee: r.fee.to_wire(),
                })
                .collect(),
            start_time: plan.start_time,
            end_time: plan.end_time,
            state: plan.state,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatePlanResponse {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

// ============================================================================
// App attributes
// ============================================================================

#[derive(Debug, Serialize)]
pub struct AttributesBody<'a> {
    pub attribute: &'a [Attribute],
}

// ============================================================================
// KVM entries
// ============================================================================

#[derive(Debug, Serialize)]
pub struct KvmEntryBody<'a> {
    pub name: &'a str,
    pub value: String,
}

impl<'a> From<&'a KvmEntryPayload> for KvmEntryBody<'a> {
    fn from(entry: &'a KvmEntryPayload) -> Self {
        Self {
            name: &entry.name,
            value: entry.value_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct KvmEntryResponse {
    pub name: String,
}

// ============================================================================
// Wallet
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditBody<'a> {
    pub transaction_amount: WireMoney,
    pub transaction_id: &'a str,
}

/// A positive adjustment reduces the developer's balance
#[derive(Debug, Serialize)]
pub struct AdjustBody {
    pub adjustment: WireMoney,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeveloperBalance {
    #[serde(default)]
    pub wallets: Vec<Wallet>,
}

#[derive(Debug, Deserialize)]
pub struct Wallet {
    pub balance: WireMoney,
}

impl DeveloperBalance {
    /// Balance of the wallet in `currency_code`; no wallet means zero
    pub fn balance_for(&self, currency_code: &str) -> Result<Decimal, MoneyError> {
        match self
            .wallets
            .iter()
            .find(|w| w.balance.currency_code.eq_ignore_ascii_case(currency_code))
        {
            Some(wallet) => wallet.balance.to_decimal(),
            None => Ok(Decimal::ZERO),
        }
    }
}
