/*!
 * Payment gateway seam.
 *
 * The checkout and confirmation services talk to the gateway through the
 * `PaymentGateway` trait; `CashfreeClient` is the production implementation
 * over the Cashfree PG REST API.
 */

use crate::config::AppConfig;
use crate::errors::ServiceError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument};

const API_VERSION: &str = "2023-08-01";

/// Request to open a payment order at the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct CreateGatewayOrder {
    pub gateway_order_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub customer_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub return_url: String,
    pub notify_url: String,
}

/// Session handle returned by the gateway; the client SDK on the storefront
/// drives the actual payment with `payment_session_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayOrderSession {
    pub payment_session_id: String,
    pub gateway_order_id: String,
}

/// One payment attempt against a gateway order.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPayment {
    pub status: GatewayPaymentStatus,
    pub payment_id: Option<String>,
    /// Gateway's instrument grouping (upi, credit_card, net_banking, ...).
    pub payment_group: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GatewayPaymentStatus {
    Success,
    Pending,
    Failed,
    #[serde(other)]
    Unknown,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens an order at the gateway and returns the payment session.
    async fn create_order(
        &self,
        request: &CreateGatewayOrder,
    ) -> Result<GatewayOrderSession, ServiceError>;

    /// Fetches all payment attempts recorded against a gateway order.
    async fn fetch_payments(
        &self,
        gateway_order_id: &str,
    ) -> Result<Vec<GatewayPayment>, ServiceError>;
}

/// Cashfree PG client (REST, x-client-id/x-client-secret auth).
#[derive(Clone)]
pub struct CashfreeClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl CashfreeClient {
    pub fn new(
        base_url: String,
        client_id: String,
        client_secret: String,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        Self::new(
            config.payment_api_base.clone(),
            config.payment_client_id.clone(),
            config.payment_client_secret.clone(),
            config.external_timeout(),
        )
    }

    fn auth_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-client-id", &self.client_id)
            .header("x-client-secret", &self.client_secret)
            .header("x-api-version", API_VERSION)
    }
}

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    order_id: &'a str,
    order_amount: Decimal,
    order_currency: &'a str,
    customer_details: CustomerDetails<'a>,
    order_meta: OrderMeta<'a>,
}

#[derive(Serialize)]
struct CustomerDetails<'a> {
    customer_id: &'a str,
    customer_name: &'a str,
    customer_email: &'a str,
    customer_phone: &'a str,
}

#[derive(Serialize)]
struct OrderMeta<'a> {
    return_url: &'a str,
    notify_url: &'a str,
}

#[derive(Deserialize)]
struct CreateOrderResponse {
    payment_session_id: String,
    order_id: Option<String>,
}

#[async_trait]
impl PaymentGateway for CashfreeClient {
    #[instrument(skip(self, request), fields(gateway_order_id = %request.gateway_order_id))]
    async fn create_order(
        &self,
        request: &CreateGatewayOrder,
    ) -> Result<GatewayOrderSession, ServiceError> {
        let body = CreateOrderBody {
            order_id: &request.gateway_order_id,
            order_amount: request.amount,
            order_currency: &request.currency,
            customer_details: CustomerDetails {
                customer_id: &request.customer_id,
                customer_name: &request.customer_name,
                customer_email: &request.customer_email,
                customer_phone: &request.customer_phone,
            },
            order_meta: OrderMeta {
                return_url: &request.return_url,
                notify_url: &request.notify_url,
            },
        };

        let url = format!("{}/orders", self.base_url);
        let response = self
            .auth_headers(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Payment gateway request failed: {}", e);
                ServiceError::ExternalServiceError(format!("Payment gateway unreachable: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!(status = %status, "Payment gateway rejected order creation: {}", detail);
            return Err(ServiceError::ExternalServiceError(format!(
                "Payment gateway returned {}",
                status
            )));
        }

        let parsed: CreateOrderResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("Malformed gateway response: {}", e))
        })?;

        debug!("Gateway order session created");
        Ok(GatewayOrderSession {
            payment_session_id: parsed.payment_session_id,
            gateway_order_id: parsed
                .order_id
                .unwrap_or_else(|| request.gateway_order_id.clone()),
        })
    }

    #[instrument(skip(self))]
    async fn fetch_payments(
        &self,
        gateway_order_id: &str,
    ) -> Result<Vec<GatewayPayment>, ServiceError> {
        let url = format!("{}/orders/{}/payments", self.base_url, gateway_order_id);
        let response = self
            .auth_headers(self.http.get(&url))
            .send()
            .await
            .map_err(|e| {
                error!("Payment gateway request failed: {}", e);
                ServiceError::ExternalServiceError(format!("Payment gateway unreachable: {}", e))
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "Payment gateway returned {}",
                status
            )));
        }

        #[derive(Deserialize)]
        struct PaymentEntry {
            payment_status: GatewayPaymentStatus,
            cf_payment_id: Option<serde_json::Value>,
            payment_group: Option<String>,
        }

        let entries: Vec<PaymentEntry> = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("Malformed gateway response: {}", e))
        })?;

        Ok(entries
            .into_iter()
            .map(|p| GatewayPayment {
                status: p.payment_status,
                // cf_payment_id arrives as a number or a string depending on
                // the API version
                payment_id: p.cf_payment_id.map(|v| match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                }),
                payment_group: p.payment_group,
            })
            .collect())
    }
}

/// Maps a gateway payment group onto the normalized method names stored on
/// orders.
pub fn normalize_payment_method(payment_group: Option<&str>) -> &'static str {
    match payment_group {
        Some(g) if g.eq_ignore_ascii_case("upi") => "upi",
        Some(g)
            if g.eq_ignore_ascii_case("credit_card") || g.eq_ignore_ascii_case("debit_card") =>
        {
            "card"
        }
        Some(g) if g.eq_ignore_ascii_case("net_banking") => "netbanking",
        Some(g) if g.eq_ignore_ascii_case("wallet") => "wallet",
        _ => "online",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_request() -> CreateGatewayOrder {
        CreateGatewayOrder {
            gateway_order_id: "ORD_1700000000000_abc123xyz".into(),
            amount: dec!(2459),
            currency: "INR".into(),
            customer_id: "user-1".into(),
            customer_name: "Asha Rao".into(),
            customer_email: "asha@example.com".into(),
            customer_phone: "9876543210".into(),
            return_url: "https://shop.example/payment-success?order_id={order_id}".into(),
            notify_url: "https://api.shop.example/api/v1/payments/webhook".into(),
        }
    }

    #[tokio::test]
    async fn create_order_parses_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(header("x-client-id", "id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "payment_session_id": "session_xyz",
                "order_id": "ORD_1700000000000_abc123xyz"
            })))
            .mount(&server)
            .await;

        let client = CashfreeClient::new(
            server.uri(),
            "id".into(),
            "secret".into(),
            Duration::from_secs(5),
        )
        .unwrap();

        let session = client.create_order(&sample_request()).await.unwrap();
        assert_eq!(session.payment_session_id, "session_xyz");
        assert_eq!(session.gateway_order_id, "ORD_1700000000000_abc123xyz");
    }

    #[tokio::test]
    async fn create_order_maps_gateway_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let client = CashfreeClient::new(
            server.uri(),
            "id".into(),
            "secret".into(),
            Duration::from_secs(5),
        )
        .unwrap();

        let err = client.create_order(&sample_request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::ExternalServiceError(_)));
    }

    #[tokio::test]
    async fn fetch_payments_handles_numeric_payment_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders/ORD_1/payments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"payment_status": "SUCCESS", "cf_payment_id": 123456, "payment_group": "upi"},
                {"payment_status": "FAILED", "cf_payment_id": "789", "payment_group": null}
            ])))
            .mount(&server)
            .await;

        let client = CashfreeClient::new(
            server.uri(),
            "id".into(),
            "secret".into(),
            Duration::from_secs(5),
        )
        .unwrap();

        let payments = client.fetch_payments("ORD_1").await.unwrap();
        assert_eq!(payments.len(), 2);
        assert_eq!(payments[0].status, GatewayPaymentStatus::Success);
        assert_eq!(payments[0].payment_id.as_deref(), Some("123456"));
        assert_eq!(payments[1].payment_id.as_deref(), Some("789"));
    }

    #[tokio::test]
    async fn fetch_payments_empty_on_unknown_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders/missing/payments"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = CashfreeClient::new(
            server.uri(),
            "id".into(),
            "secret".into(),
            Duration::from_secs(5),
        )
        .unwrap();

        assert!(client.fetch_payments("missing").await.unwrap().is_empty());
    }

    #[test]
    fn payment_method_normalization() {
        assert_eq!(normalize_payment_method(Some("upi")), "upi");
        assert_eq!(normalize_payment_method(Some("credit_card")), "card");
        assert_eq!(normalize_payment_method(Some("debit_card")), "card");
        assert_eq!(normalize_payment_method(Some("net_banking")), "netbanking");
        assert_eq!(normalize_payment_method(Some("wallet")), "wallet");
        assert_eq!(normalize_payment_method(Some("emi")), "online");
        assert_eq!(normalize_payment_method(None), "online");
    }
}
