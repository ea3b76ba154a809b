//! HTTP gateway adapter
//!
//! Every call obtains its bearer token from the [`CredentialBroker`]. Writes
//! never fail with an error: whatever happens is classified into a
//! [`SyncOutcome`].

use async_trait::async_trait;
use reqwest::{Method, Url};
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use super::GatewaySync;
use super::error::GatewayError;
use super::outcome::{Applied, SyncOutcome, classify_error};
use super::requests::{
    AdjustBody, AttributesBody, CreditBody, DeveloperBalance, KvmEntryBody, KvmEntryResponse,
    RatePlanBody, RatePlanResponse,
};
use crate::approval::payload::{
    AppAttributesPayload, ChangePayload, KvmEntryPayload, RatePlanPayload, TransactionKind,
    WalletPayload,
};
use crate::config::GatewayConfig;
use crate::credential::CredentialBroker;

pub struct HttpGatewaySync {
    base_url: Url,
    http_client: reqwest::Client,
    broker: Arc<CredentialBroker>,
}

/// Raw gateway answer
struct Reply {
    status: u16,
    body: String,
}

impl Reply {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl HttpGatewaySync {
    pub fn new(config: &GatewayConfig, broker: Arc<CredentialBroker>) -> Result<Self, GatewayError> {
        let base_url =
            Url::parse(&config.base_url).map_err(|e| GatewayError::Url(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::Url(config.base_url.clone()));
        }
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url,
            http_client,
            broker,
        })
    }

    /// Append already-unescaped path segments to the base url
    fn url(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::Url(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<Reply, GatewayError> {
        let token = self.broker.get_token().await?;

        tracing::debug!(method = %method, url = %url, "Gateway request");
        let mut request = self
            .http_client
            .request(method, url)
            .bearer_auth(&token.access_token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(Reply { status, body })
    }

    /// Send a write and classify the answer; `on_success` builds the [`Applied`]
    async fn write<B, F>(&self, method: Method, url: Url, body: &B, on_success: F) -> SyncOutcome
    where
        B: Serialize + ?Sized,
        F: FnOnce(&str) -> Result<Applied, String>,
    {
        let reply = match self.send(method, url, Some(body)).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "Gateway write did not complete");
                return SyncOutcome::Unknown {
                    message: e.to_string(),
                };
            }
        };

        if !reply.is_success() {
            return classify_error(reply.status, &reply.body);
        }
        match on_success(&reply.body) {
            Ok(applied) => SyncOutcome::Applied(applied),
            Err(message) => SyncOutcome::Unknown {
                message: format!("unreadable gateway response: {message}"),
            },
        }
    }

    async fn apply_rate_plan(&self, plan: &RatePlanPayload) -> SyncOutcome {
        let (method, url) = match plan.existing_name.as_deref() {
            Some(name) => (
                Method::PUT,
                self.url(&["apiproducts", plan.api_product.as_str(), "rateplans", name]),
            ),
            None => (
                Method::POST,
                self.url(&["apiproducts", plan.api_product.as_str(), "rateplans"]),
            ),
        };
        let url = match url {
            Ok(url) => url,
            Err(e) => return unsent(e),
        };

        self.write(method, url, &RatePlanBody::from(plan), |body| {
            let resp: RatePlanResponse = parse(body)?;
            tracing::debug!(name = %resp.name, display_name = %resp.display_name, "Rate plan synced");
            Ok(Applied {
                external_ref: resp.name,
                raw_response: body.to_string(),
                balance: None,
            })
        })
        .await
    }

    async fn apply_app_attributes(&self, app: &AppAttributesPayload) -> SyncOutcome {
        let url = match self.url(&[
            "developers",
            app.developer_email.as_str(),
            "apps",
            app.app_name.as_str(),
            "attributes",
        ]) {
            Ok(url) => url,
            Err(e) => return unsent(e),
        };
        let external_ref = format!("developers/{}/apps/{}", app.developer_email, app.app_name);

        let body = AttributesBody {
            attribute: &app.attributes,
        };
        self.write(Method::POST, url, &body, |body| {
            Ok(Applied {
                external_ref,
                raw_response: body.to_string(),
                balance: None,
            })
        })
        .await
    }

    async fn apply_kvm_entry(&self, entry: &KvmEntryPayload) -> SyncOutcome {
        let base = [
            "environments",
            entry.environment.as_str(),
            "keyvaluemaps",
            entry.map_name.as_str(),
            "entries",
        ];
        let (method, url) = if entry.replace {
            let mut segments = base.to_vec();
            segments.push(entry.name.as_str());
            (Method::PUT, self.url(&segments))
        } else {
            (Method::POST, self.url(&base))
        };
        let url = match url {
            Ok(url) => url,
            Err(e) => return unsent(e),
        };

        self.write(method, url, &KvmEntryBody::from(entry), |body| {
            let resp: KvmEntryResponse = parse(body)?;
            Ok(Applied {
                external_ref: resp.name,
                raw_response: body.to_string(),
                balance: None,
            })
        })
        .await
    }

    async fn apply_wallet(&self, tx: &WalletPayload) -> SyncOutcome {
        let amount = match tx.wire_amount() {
            Ok(amount) => amount,
            Err(e) => {
                return SyncOutcome::Rejected {
                    message: e.to_string(),
                    raw_response: String::new(),
                };
            }
        };
        let Some(transaction_id) = tx.transaction_id.as_deref() else {
            return SyncOutcome::Rejected {
                message: "wallet transaction has no transactionId".to_string(),
                raw_response: String::new(),
            };
        };

        let action = match tx.kind {
            TransactionKind::Credit => "balance:credit",
            TransactionKind::Debit => "balance:adjust",
        };
        let url = match self.url(&["developers", tx.developer_email.as_str(), action]) {
            Ok(url) => url,
            Err(e) => return unsent(e),
        };

        let currency = tx.currency_code.as_str();
        let on_success = |body: &str| {
            let resp: DeveloperBalance = parse(body)?;
            let balance = resp.balance_for(currency).map_err(|e| e.to_string())?;
            Ok(Applied {
                external_ref: transaction_id.to_string(),
                raw_response: body.to_string(),
                balance: Some(balance),
            })
        };

        match tx.kind {
            TransactionKind::Credit => {
                let body = CreditBody {
                    transaction_amount: amount,
                    transaction_id,
                };
                self.write(Method::POST, url, &body, on_success).await
            }
            TransactionKind::Debit => {
                let body = AdjustBody { adjustment: amount };
                self.write(Method::POST, url, &body, on_success).await
            }
        }
    }

    async fn read<T: DeserializeOwned>(&self, url: Url) -> Result<T, GatewayError> {
        let reply = self.send::<()>(Method::GET, url, None).await?;
        if !reply.is_success() {
            let message = match classify_error(reply.status, &reply.body) {
                SyncOutcome::Rejected { message, .. } => message,
                _ => reply.body,
            };
            return Err(GatewayError::Status {
                status: reply.status,
                message,
            });
        }
        parse(&reply.body).map_err(GatewayError::Malformed)
    }
}

fn parse<T: DeserializeOwned>(body: &str) -> Result<T, String> {
    serde_json::from_str(body).map_err(|e| e.to_string())
}

/// Nothing left the process, so the gateway cannot have changed
fn unsent(e: GatewayError) -> SyncOutcome {
    SyncOutcome::Rejected {
        message: e.to_string(),
        raw_response: String::new(),
    }
}

#[async_trait]
impl GatewaySync for HttpGatewaySync {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn apply(&self, payload: &ChangePayload) -> SyncOutcome {
        match payload {
            ChangePayload::RatePlan(p) => self.apply_rate_plan(p).await,
            ChangePayload::AppAttributes(p) => self.apply_app_attributes(p).await,
            ChangePayload::WalletTransaction(p) => self.apply_wallet(p).await,
            ChangePayload::KvmEntry(p) => self.apply_kvm_entry(p).await,
        }
    }

    async fn wallet_balance(
        &self,
        developer_email: &str,
        currency_code: &str,
    ) -> Result<Decimal, GatewayError> {
        let url = self.url(&["developers", developer_email, "balance"])?;
        let balance: DeveloperBalance = self.read(url).await?;
        balance
            .balance_for(currency_code)
            .map_err(|e| GatewayError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::payload::Attribute;
    use crate::credential::{CachedToken, IdentityProvider, MemoryTokenStore};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticProvider;

    #[async_trait]
    impl IdentityProvider for StaticProvider {
        async fn fetch_token(&self) -> Result<CachedToken, crate::credential::CredentialError> {
            CachedToken::new("test-token", 3600)
        }
    }

    fn client(server: &MockServer) -> HttpGatewaySync {
        let broker = Arc::new(CredentialBroker::new(
            Arc::new(MemoryTokenStore::new()),
            Arc::new(StaticProvider),
            300,
        ));
        let config = GatewayConfig {
            base_url: format!("{}/v1/organizations/acme/", server.uri()),
            timeout_secs: 5,
        };
        HttpGatewaySync::new(&config, broker).unwrap()
    }

    fn kvm(replace: bool) -> ChangePayload {
        ChangePayload::KvmEntry(KvmEntryPayload {
            environment: "prod".into(),
            map_name: "routing".into(),
            name: "std".into(),
            value: serde_json::json!("10"),
            replace,
        })
    }

    #[tokio::test]
    async fn test_kvm_first_sync_posts_to_collection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/organizations/acme/environments/prod/keyvaluemaps/routing/entries"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_json(serde_json::json!({"name": "std", "value": "10"})))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"name": "std", "value": "10"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client(&server).apply(&kvm(false)).await;
        let SyncOutcome::Applied(applied) = outcome else {
            panic!("expected applied, got {outcome:?}");
        };
        assert_eq!(applied.external_ref, "std");
    }

    #[tokio::test]
    async fn test_kvm_replace_puts_to_entry() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/organizations/acme/environments/prod/keyvaluemaps/routing/entries/std"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "std"})))
            .expect(1)
            .mount(&server)
            .await;

        assert!(client(&server).apply(&kvm(true)).await.is_effective());
    }

    #[tokio::test]
    async fn test_rate_plan_update_uses_put_against_existing_name() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/organizations/acme/apiproducts/payments/rateplans/rp-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"name": "rp-123", "displayName": "Standard v2"}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let plan = RatePlanPayload {
            api_product: "payments".into(),
            existing_name: Some("rp-123".into()),
            display_name: "Standard v2".into(),
            description: None,
            billing_period: crate::approval::payload::BillingPeriod::Monthly,
            currency_code: "USD".into(),
            fixed_fee_frequency: 0,
            setup_fee: None,
            fixed_recurring_fee: None,
            consumption_pricing_type: None,
            consumption_pricing_rates: vec![],
            start_time: 1,
            end_time: None,
            state: crate::approval::payload::RatePlanState::Draft,
        };
        let outcome = client(&server).apply(&ChangePayload::RatePlan(plan)).await;
        assert!(matches!(outcome, SyncOutcome::Applied(ref a) if a.external_ref == "rp-123"));
    }

    #[tokio::test]
    async fn test_aborted_conflict_is_already_applied() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "error": {"code": 409, "message": "Entry std already exists", "status": "ABORTED"}
            })))
            .mount(&server)
            .await;

        let outcome = client(&server).apply(&kvm(false)).await;
        assert!(matches!(outcome, SyncOutcome::AlreadyApplied { .. }));
    }

    #[tokio::test]
    async fn test_app_attributes_post() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/organizations/acme/developers/dev@example.com/apps/billing-app/attributes"))
            .and(body_json(serde_json::json!({"attribute": [{"name": "tier", "value": "gold"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"attribute": []})))
            .expect(1)
            .mount(&server)
            .await;

        let payload = ChangePayload::AppAttributes(AppAttributesPayload {
            developer_email: "dev@example.com".into(),
            app_name: "billing-app".into(),
            attributes: vec![Attribute {
                name: "tier".into(),
                value: "gold".into(),
            }],
        });
        let outcome = client(&server).apply(&payload).await;
        assert!(matches!(
            outcome,
            SyncOutcome::Applied(ref a) if a.external_ref == "developers/dev@example.com/apps/billing-app"
        ));
    }

    #[tokio::test]
    async fn test_wallet_credit_returns_gateway_balance() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/organizations/acme/developers/dev@example.com/balance:credit"))
            .and(body_json(serde_json::json!({
                "transactionAmount": {"currencyCode": "USD", "units": "12", "nanos": 500000000},
                "transactionId": "01J0000000000000000000TX01"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "wallets": [{"balance": {"currencyCode": "USD", "units": "112", "nanos": 500000000}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let payload = ChangePayload::WalletTransaction(WalletPayload {
            developer_email: "dev@example.com".into(),
            currency_code: "USD".into(),
            amount: Decimal::new(1250, 2),
            kind: TransactionKind::Credit,
            transaction_id: Some("01J0000000000000000000TX01".into()),
            note: None,
        });
        let SyncOutcome::Applied(applied) = client(&server).apply(&payload).await else {
            panic!("expected applied");
        };
        assert_eq!(applied.balance, Some(Decimal::new(1125, 1)));
        assert_eq!(applied.external_ref, "01J0000000000000000000TX01");
    }

    #[tokio::test]
    async fn test_wallet_balance_read() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/organizations/acme/developers/dev@example.com/balance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "wallets": [{"balance": {"currencyCode": "USD", "units": "5"}}]
            })))
            .mount(&server)
            .await;

        let balance = client(&server)
            .wallet_balance("dev@example.com", "USD")
            .await
            .unwrap();
        assert_eq!(balance, Decimal::from(5));
    }

    #[tokio::test]
    async fn test_unstructured_failure_is_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream connect error"))
            .mount(&server)
            .await;

        let outcome = client(&server).apply(&kvm(false)).await;
        assert!(matches!(outcome, SyncOutcome::Unknown { .. }));
    }
}
