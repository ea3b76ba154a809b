//! Domain payloads
//!
//! Each change domain has its own typed payload. Decoding from console JSON
//! catches shape errors (missing `fee.nanos`, non-numeric `units`, ...);
//! `validator` rules then catch value errors. Both surface as
//! [`ApprovalError::Validation`] before anything is written or sent.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use super::error::ApprovalError;
use super::types::ChangeDomain;
use crate::money::{WireMoney, int64};

/// Proposed change, one variant per domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", content = "data", rename_all = "snake_case")]
pub enum ChangePayload {
    RatePlan(RatePlanPayload),
    AppAttributes(AppAttributesPayload),
    WalletTransaction(WalletPayload),
    KvmEntry(KvmEntryPayload),
}

impl ChangePayload {
    /// Decode console JSON for `domain` into a typed payload
    pub fn parse(domain: ChangeDomain, value: serde_json::Value) -> Result<Self, ApprovalError> {
        fn decode<T: serde::de::DeserializeOwned>(
            value: serde_json::Value,
        ) -> Result<T, ApprovalError> {
            serde_json::from_value(value).map_err(|e| ApprovalError::Validation(e.to_string()))
        }

        let mut payload = match domain {
            ChangeDomain::RatePlan => ChangePayload::RatePlan(decode(value)?),
            ChangeDomain::AppAttributes => ChangePayload::AppAttributes(decode(value)?),
            ChangeDomain::WalletTransaction => ChangePayload::WalletTransaction(decode(value)?),
            ChangeDomain::KvmEntry => ChangePayload::KvmEntry(decode(value)?),
        };
        payload.normalize();
        Ok(payload)
    }

    pub fn domain(&self) -> ChangeDomain {
        match self {
            ChangePayload::RatePlan(_) => ChangeDomain::RatePlan,
            ChangePayload::AppAttributes(_) => ChangeDomain::AppAttributes,
            ChangePayload::WalletTransaction(_) => ChangeDomain::WalletTransaction,
            ChangePayload::KvmEntry(_) => ChangeDomain::KvmEntry,
        }
    }

    /// Resource the change affects; used for single-flight checks and history
    pub fn subject_ref(&self) -> String {
        match self {
            ChangePayload::RatePlan(p) => format!(
                "apiproducts/{}/rateplans/{}",
                p.api_product,
                p.existing_name.as_deref().unwrap_or(&p.display_name)
            ),
            ChangePayload::AppAttributes(p) => {
                format!("developers/{}/apps/{}", p.developer_email, p.app_name)
            }
            ChangePayload::WalletTransaction(p) => {
                format!("developers/{}/balance/{}", p.developer_email, p.currency_code)
            }
            ChangePayload::KvmEntry(p) => format!(
                "environments/{}/keyvaluemaps/{}/entries/{}",
                p.environment, p.map_name, p.name
            ),
        }
    }

    /// Gateway name known without asking the gateway
    ///
    /// Used as `external_ref` when the gateway answers with an idempotent
    /// conflict and therefore does not echo the resource.
    pub fn natural_ref(&self) -> Option<String> {
        match self {
            ChangePayload::RatePlan(p) => p.existing_name.clone(),
            ChangePayload::AppAttributes(p) => Some(format!(
                "developers/{}/apps/{}",
                p.developer_email, p.app_name
            )),
            ChangePayload::WalletTransaction(p) => p.transaction_id.clone(),
            ChangePayload::KvmEntry(p) => Some(p.name.clone()),
        }
    }

    pub fn validate(&self) -> Result<(), ApprovalError> {
        let result = match self {
            ChangePayload::RatePlan(p) => p.validate(),
            ChangePayload::AppAttributes(p) => p.validate(),
            ChangePayload::WalletTransaction(p) => p.validate(),
            ChangePayload::KvmEntry(p) => p.validate(),
        };
        result.map_err(|errors| ApprovalError::Validation(describe(&errors)))
    }

    /// Canonical casing for currency codes
    ///
    /// Subjects and the wallet balance cache are keyed by currency, so "usd"
    /// and "USD" must not name different resources.
    pub fn normalize(&mut self) {
        match self {
            ChangePayload::RatePlan(p) => {
                p.currency_code.make_ascii_uppercase();
                let fees = p
                    .setup_fee
                    .iter_mut()
                    .chain(p.fixed_recurring_fee.iter_mut())
                    .chain(p.consumption_pricing_rates.iter_mut().map(|r| &mut r.fee));
                for fee in fees {
                    fee.currency_code.make_ascii_uppercase();
                }
            }
            ChangePayload::WalletTransaction(p) => p.currency_code.make_ascii_uppercase(),
            ChangePayload::AppAttributes(_) | ChangePayload::KvmEntry(_) => {}
        }
    }

    /// Whether resending this change after a lost response cannot apply it twice
    ///
    /// Credits carry a `transactionId` the gateway deduplicates on, updates
    /// and upserts address a named resource. Debits and new rate plans have
    /// neither, so a second send would be a second write.
    pub fn replay_safe(&self) -> bool {
        match self {
            ChangePayload::RatePlan(p) => p.existing_name.is_some(),
            ChangePayload::WalletTransaction(p) => p.kind == TransactionKind::Credit,
            ChangePayload::AppAttributes(_) | ChangePayload::KvmEntry(_) => true,
        }
    }

    /// Give wallet transactions a stable gateway `transactionId`
    ///
    /// Generated once at submission so that re-approving after an unknown
    /// outcome replays the same id.
    pub fn assign_transaction_id(&mut self) {
        if let ChangePayload::WalletTransaction(p) = self
            && p.transaction_id.is_none()
        {
            p.transaction_id = Some(ulid::Ulid::new().to_string());
        }
    }

    pub fn as_wallet(&self) -> Option<&WalletPayload> {
        match self {
            ChangePayload::WalletTransaction(p) => Some(p),
            _ => None,
        }
    }
}

// ============================================================================
// Rate plans
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingPeriod {
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsumptionPricingType {
    FixedPerUnit,
    Banded,
    Tiered,
    Stairstep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RatePlanState {
    Draft,
    Published,
}

/// Money as entered on the console: all three parts are required
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Fee {
    #[validate(length(equal = 3, message = "must be a 3-letter ISO 4217 code"))]
    pub currency_code: String,
    #[serde(deserialize_with = "int64::deserialize")]
    pub units: i64,
    #[validate(range(min = -999_999_999, max = 999_999_999))]
    pub nanos: i32,
}

impl Fee {
    pub fn to_wire(&self) -> WireMoney {
        WireMoney {
            currency_code: self.currency_code.clone(),
            units: self.units,
            nanos: self.nanos,
        }
    }
}

/// One consumption pricing band
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_band"))]
pub struct RateRange {
    #[serde(deserialize_with = "int64::deserialize")]
    pub start: i64,
    #[serde(deserialize_with = "int64::deserialize")]
    pub end: i64,
    #[validate(nested)]
    pub fee: Fee,
}

fn validate_band(band: &RateRange) -> Result<(), ValidationError> {
    if band.start < 0 || band.end <= band.start {
        return Err(ValidationError::new("band_range")
            .with_message("band requires 0 <= start < end".into()));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_rate_plan"))]
pub struct RatePlanPayload {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub api_product: String,
    /// Gateway rate plan name when this change edits an existing plan
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "must not be empty"))]
    pub existing_name: Option<String>,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub billing_period: BillingPeriod,
    #[validate(length(equal = 3, message = "must be a 3-letter ISO 4217 code"))]
    pub currency_code: String,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub fixed_fee_frequency: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub setup_fee: Option<Fee>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub fixed_recurring_fee: Option<Fee>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumption_pricing_type: Option<ConsumptionPricingType>,
    #[serde(default)]
    #[validate(nested)]
    pub consumption_pricing_rates: Vec<RateRange>,
    #[serde(deserialize_with = "int64::deserialize")]
    pub start_time: i64,
    #[serde(
        default,
        deserialize_with = "int64::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_time: Option<i64>,
    pub state: RatePlanState,
}

fn validate_rate_plan(plan: &RatePlanPayload) -> Result<(), ValidationError> {
    match (
        plan.consumption_pricing_type,
        plan.consumption_pricing_rates.is_empty(),
    ) {
        (Some(_), true) => {
            return Err(ValidationError::new("consumption_rates")
                .with_message("consumptionPricingRates required when a pricing type is set".into()));
        }
        (None, false) => {
            return Err(ValidationError::new("consumption_type")
                .with_message("consumptionPricingType required when rates are given".into()));
        }
        _ => {}
    }

    let fees = plan
        .setup_fee
        .iter()
        .chain(plan.fixed_recurring_fee.iter())
        .chain(plan.consumption_pricing_rates.iter().map(|r| &r.fee));
    for fee in fees {
        if fee.currency_code != plan.currency_code {
            return Err(ValidationError::new("currency_mismatch")
                .with_message(format!("fee currency {} differs from plan currency", fee.currency_code).into()));
        }
    }

    if let Some(end) = plan.end_time
        && end <= plan.start_time
    {
        return Err(ValidationError::new("time_range")
            .with_message("endTime must be after startTime".into()));
    }
    Ok(())
}

// ============================================================================
// App attributes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Attribute {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AppAttributesPayload {
    #[validate(email)]
    pub developer_email: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub app_name: String,
    #[validate(length(min = 1, message = "at least one attribute required"), nested)]
    pub attributes: Vec<Attribute>,
}

// ============================================================================
// KVM entries
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_kvm_entry"))]
pub struct KvmEntryPayload {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub environment: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub map_name: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub name: String,
    pub value: serde_json::Value,
    /// Entry already exists on the gateway and is being replaced
    #[serde(default)]
    pub replace: bool,
}

fn validate_kvm_entry(entry: &KvmEntryPayload) -> Result<(), ValidationError> {
    if entry.value.is_null() {
        return Err(ValidationError::new("value").with_message("value must not be null".into()));
    }
    Ok(())
}

impl KvmEntryPayload {
    /// KVM values are stored as strings; structured values are JSON-encoded
    pub fn value_string(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

// ============================================================================
// Wallet transactions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Credit,
    Debit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WalletPayload {
    #[validate(email)]
    pub developer_email: String,
    #[validate(length(equal = 3, message = "must be a 3-letter ISO 4217 code"))]
    pub currency_code: String,
    #[validate(custom(function = "validate_amount"))]
    pub amount: Decimal,
    pub kind: TransactionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

fn validate_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_negative() || amount.is_zero() {
        return Err(ValidationError::new("amount")
            .with_message("amount must be greater than zero".into()));
    }
    WireMoney::from_decimal("", *amount)
        .map(|_| ())
        .map_err(|e| ValidationError::new("amount").with_message(e.to_string().into()))
}

impl WalletPayload {
    pub fn wire_amount(&self) -> Result<WireMoney, crate::money::MoneyError> {
        WireMoney::from_decimal(&self.currency_code, self.amount)
    }
}

// ============================================================================
// Error flattening
// ============================================================================

/// Flatten nested validator errors into `path: message` pairs
fn describe(errors: &ValidationErrors) -> String {
    let mut out = Vec::new();
    flatten("", errors, &mut out);
    out.sort();
    out.join("; ")
}

fn flatten(prefix: &str, errors: &ValidationErrors, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let name: &str = field.as_ref();
        let path = match (prefix.is_empty(), name) {
            (true, "__all__") => "payload".to_string(),
            (false, "__all__") => prefix.to_string(),
            (true, name) => name.to_string(),
            (false, name) => format!("{prefix}.{name}"),
        };
        match kind {
            ValidationErrorsKind::Field(errs) => {
                for e in errs {
                    let msg = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("invalid ({})", e.code));
                    out.push(format!("{path}: {msg}"));
                }
            }
            ValidationErrorsKind::Struct(inner) => flatten(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    flatten(&format!("{path}[{index}]"), inner, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rate_plan_json() -> serde_json::Value {
        json!({
            "apiProduct": "payments-api",
            "displayName": "Standard",
            "billingPeriod": "MONTHLY",
            "currencyCode": "USD",
            "fixedFeeFrequency": 1,
            "setupFee": {"currencyCode": "USD", "units": "10", "nanos": 0},
            "consumptionPricingType": "BANDED",
            "consumptionPricingRates": [
                {"start": "0", "end": "1000", "fee": {"currencyCode": "USD", "units": "0", "nanos": 500000000}},
                {"start": 1000, "end": 5000, "fee": {"currencyCode": "USD", "units": 0, "nanos": 250000000}}
            ],
            "startTime": "1767225600000",
            "state": "PUBLISHED"
        })
    }

    #[test]
    fn test_parse_valid_rate_plan() {
        let payload = ChangePayload::parse(ChangeDomain::RatePlan, rate_plan_json()).unwrap();
        payload.validate().unwrap();

        let ChangePayload::RatePlan(plan) = &payload else {
            panic!("expected rate plan");
        };
        assert_eq!(plan.consumption_pricing_rates.len(), 2);
        assert_eq!(plan.consumption_pricing_rates[1].start, 1000);
        assert_eq!(plan.start_time, 1_767_225_600_000);
        assert_eq!(
            payload.subject_ref(),
            "apiproducts/payments-api/rateplans/Standard"
        );
        assert_eq!(payload.natural_ref(), None);
    }

    #[test]
    fn test_parse_uppercases_currency_codes() {
        let mut value = rate_plan_json();
        value["currencyCode"] = json!("usd");
        value["setupFee"]["currencyCode"] = json!("Usd");
        value["consumptionPricingRates"][1]["fee"]["currencyCode"] = json!("usd");

        let payload = ChangePayload::parse(ChangeDomain::RatePlan, value).unwrap();
        payload.validate().unwrap();
        let ChangePayload::RatePlan(plan) = &payload else {
            panic!("expected rate plan");
        };
        assert_eq!(plan.currency_code, "USD");
        assert_eq!(plan.setup_fee.as_ref().unwrap().currency_code, "USD");
        assert_eq!(plan.consumption_pricing_rates[1].fee.currency_code, "USD");

        let wallet = ChangePayload::parse(
            ChangeDomain::WalletTransaction,
            json!({"developerEmail": "dev@example.com", "currencyCode": "usd", "amount": "5", "kind": "credit"}),
        )
        .unwrap();
        assert_eq!(wallet.subject_ref(), "developers/dev@example.com/balance/USD");
    }

    #[test]
    fn test_rate_missing_fee_nanos_is_validation_error() {
        let mut value = rate_plan_json();
        value["consumptionPricingRates"][0]["fee"]
            .as_object_mut()
            .unwrap()
            .remove("nanos");

        let err = ChangePayload::parse(ChangeDomain::RatePlan, value).unwrap_err();
        assert!(matches!(err, ApprovalError::Validation(ref m) if m.contains("nanos")));
    }

    #[test]
    fn test_rate_non_numeric_units_is_validation_error() {
        let mut value = rate_plan_json();
        value["consumptionPricingRates"][0]["fee"]["units"] = json!("ten");

        let err = ChangePayload::parse(ChangeDomain::RatePlan, value).unwrap_err();
        assert!(matches!(err, ApprovalError::Validation(_)));
    }

    #[test]
    fn test_rate_band_and_currency_rules() {
        let mut value = rate_plan_json();
        value["consumptionPricingRates"][1]["end"] = json!("900");
        value["consumptionPricingRates"][0]["fee"]["currencyCode"] = json!("US");

        let payload = ChangePayload::parse(ChangeDomain::RatePlan, value).unwrap();
        let ApprovalError::Validation(msg) = payload.validate().unwrap_err() else {
            panic!("expected validation error");
        };
        assert!(msg.contains("consumption_pricing_rates[0].fee.currency_code"), "{msg}");
        assert!(msg.contains("consumption_pricing_rates[1]: band requires"), "{msg}");
    }

    #[test]
    fn test_rate_type_without_rates() {
        let mut value = rate_plan_json();
        value["consumptionPricingRates"] = json!([]);

        let payload = ChangePayload::parse(ChangeDomain::RatePlan, value).unwrap();
        let err = payload.validate().unwrap_err();
        assert!(matches!(err, ApprovalError::Validation(ref m) if m.starts_with("payload:")));
    }

    #[test]
    fn test_app_attributes_rules() {
        let payload = ChangePayload::parse(
            ChangeDomain::AppAttributes,
            json!({"developerEmail": "not-an-email", "appName": "", "attributes": []}),
        )
        .unwrap();

        let ApprovalError::Validation(msg) = payload.validate().unwrap_err() else {
            panic!("expected validation error");
        };
        assert!(msg.contains("developer_email"));
        assert!(msg.contains("app_name"));
        assert!(msg.contains("attributes: at least one attribute required"));
    }

    #[test]
    fn test_kvm_value_string() {
        let payload = ChangePayload::parse(
            ChangeDomain::KvmEntry,
            json!({"environment": "prod", "mapName": "routing", "name": "std", "value": "10"}),
        )
        .unwrap();
        payload.validate().unwrap();

        let ChangePayload::KvmEntry(entry) = &payload else {
            panic!("expected kvm entry");
        };
        assert_eq!(entry.value_string(), "10");
        assert!(!entry.replace);
        assert_eq!(payload.natural_ref().as_deref(), Some("std"));

        let structured = KvmEntryPayload {
            value: json!({"weight": 3}),
            ..entry.clone()
        };
        assert_eq!(structured.value_string(), r#"{"weight":3}"#);
    }

    #[test]
    fn test_kvm_null_value_rejected() {
        let payload = ChangePayload::parse(
            ChangeDomain::KvmEntry,
            json!({"environment": "prod", "mapName": "routing", "name": "std", "value": null}),
        )
        .unwrap();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_wallet_amount_rules() {
        for amount in ["0", "-5", "0.0000000001"] {
            let payload = ChangePayload::parse(
                ChangeDomain::WalletTransaction,
                json!({"developerEmail": "dev@example.com", "currencyCode": "USD", "amount": amount, "kind": "debit"}),
            )
            .unwrap();
            assert!(payload.validate().is_err(), "amount {amount} should be rejected");
        }
    }

    #[test]
    fn test_wallet_transaction_id_assigned_once() {
        let mut payload = ChangePayload::parse(
            ChangeDomain::WalletTransaction,
            json!({"developerEmail": "dev@example.com", "currencyCode": "USD", "amount": "12.50", "kind": "credit"}),
        )
        .unwrap();
        payload.validate().unwrap();

        payload.assign_transaction_id();
        let first = payload.natural_ref().unwrap();
        payload.assign_transaction_id();
        assert_eq!(payload.natural_ref().unwrap(), first);
    }

    #[test]
    fn test_only_deduplicated_writes_are_replay_safe() {
        let wallet = |kind: &str| {
            ChangePayload::parse(
                ChangeDomain::WalletTransaction,
                json!({"developerEmail": "dev@example.com", "currencyCode": "USD", "amount": "1", "kind": kind}),
            )
            .unwrap()
        };
        assert!(wallet("credit").replay_safe());
        assert!(!wallet("debit").replay_safe());

        let create = ChangePayload::parse(ChangeDomain::RatePlan, rate_plan_json()).unwrap();
        assert!(!create.replay_safe());
        let mut value = rate_plan_json();
        value["existingName"] = json!("rp-1");
        let update = ChangePayload::parse(ChangeDomain::RatePlan, value).unwrap();
        assert!(update.replay_safe());
    }

    #[test]
    fn test_payload_storage_roundtrip_keeps_domain_tag() {
        let payload = ChangePayload::parse(ChangeDomain::RatePlan, rate_plan_json()).unwrap();
        let text = serde_json::to_string(&payload).unwrap();
        assert!(text.starts_with(r#"{"domain":"rate_plan""#));
        let back: ChangePayload = serde_json::from_str(&text).unwrap();
        assert_eq!(back, payload);
    }
}
