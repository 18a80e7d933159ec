/*!
 * Shipping carrier seam.
 *
 * `ShippingGateway` is the trait the shipment orchestrator depends on;
 * `ShiprocketClient` implements it over the Shiprocket external API with a
 * cached bearer token.
 */

use crate::config::AppConfig;
use crate::errors::ServiceError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

/// Carrier tokens live for 10 days; we re-authenticate a day early.
const TOKEN_LIFETIME_DAYS: i64 = 10;
const TOKEN_REFRESH_MARGIN_DAYS: i64 = 1;

/// Address block sent to the carrier for billing and shipping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierAddress {
    pub full_name: String,
    pub address_line1: String,
    #[serde(default)]
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub country: String,
    pub pincode: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CarrierOrderItem {
    pub name: String,
    pub sku: String,
    pub units: u32,
    pub selling_price: Decimal,
    pub hsn: Option<String>,
}

/// Request to register an order with the carrier.
#[derive(Debug, Clone, Serialize)]
pub struct CreateCarrierOrder {
    pub order_number: String,
    pub order_date: DateTime<Utc>,
    pub customer_email: String,
    pub billing_address: CarrierAddress,
    pub shipping_address: CarrierAddress,
    pub items: Vec<CarrierOrderItem>,
    pub payment_method: String,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_charges: Decimal,
    /// Total billable weight in kg.
    pub weight_kg: Decimal,
    /// Parcel dimensions in cm.
    pub length_cm: u32,
    pub breadth_cm: u32,
    pub height_cm: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CarrierOrderCreated {
    pub shipment_order_id: String,
    pub shipment_id: String,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CourierAssignment {
    pub awb_code: String,
    pub courier_id: Option<String>,
    pub courier_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CourierOption {
    pub courier_id: String,
    pub courier_name: String,
    pub rate: Decimal,
    pub estimated_delivery_days: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingInfo {
    pub current_status: Option<String>,
    pub awb_code: Option<String>,
    pub courier_name: Option<String>,
    pub events: serde_json::Value,
}

#[async_trait]
pub trait ShippingGateway: Send + Sync {
    async fn create_order(
        &self,
        request: &CreateCarrierOrder,
    ) -> Result<CarrierOrderCreated, ServiceError>;

    /// Assigns an AWB to the shipment, optionally pinning a courier.
    async fn assign_courier(
        &self,
        shipment_id: &str,
        courier_id: Option<&str>,
    ) -> Result<CourierAssignment, ServiceError>;

    /// Serviceable couriers for a delivery pincode and weight, cheapest first.
    async fn recommend_courier(
        &self,
        delivery_pincode: &str,
        weight_kg: Decimal,
    ) -> Result<Vec<CourierOption>, ServiceError>;

    async fn schedule_pickup(&self, shipment_id: &str) -> Result<(), ServiceError>;

    async fn track(&self, shipment_id: &str) -> Result<TrackingInfo, ServiceError>;

    async fn cancel(&self, awb_code: &str) -> Result<(), ServiceError>;
}

struct CachedToken {
    token: String,
    refresh_after: DateTime<Utc>,
}

/// Shiprocket client. Credentials are exchanged for a bearer token that is
/// cached behind an RwLock and refreshed before expiry.
#[derive(Clone)]
pub struct ShiprocketClient {
    http: reqwest::Client,
    base_url: String,
    email: String,
    password: String,
    pickup_location: String,
    pickup_pincode: Option<String>,
    token: Arc<RwLock<Option<CachedToken>>>,
}

impl ShiprocketClient {
    pub fn new(
        base_url: String,
        email: String,
        password: String,
        pickup_location: String,
        pickup_pincode: Option<String>,
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
            email,
            password,
            pickup_location,
            pickup_pincode,
            token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Option<Self>, ServiceError> {
        match (&config.shipping_email, &config.shipping_password) {
            (Some(email), Some(password)) => Ok(Some(Self::new(
                config.shipping_api_base.clone(),
                email.clone(),
                password.clone(),
                config.shipping_pickup_location.clone(),
                config.shipping_pickup_pincode.clone(),
                config.external_timeout(),
            )?)),
            _ => Ok(None),
        }
    }

    async fn authenticate(&self) -> Result<String, ServiceError> {
        #[derive(Serialize)]
        struct LoginBody<'a> {
            email: &'a str,
            password: &'a str,
        }

        #[derive(Deserialize)]
        struct LoginResponse {
            token: String,
        }

        let url = format!("{}/auth/login", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&LoginBody {
                email: &self.email,
                password: &self.password,
            })
            .send()
            .await
            .map_err(|e| {
                error!("Carrier authentication request failed: {}", e);
                ServiceError::ExternalServiceError(format!("Carrier unreachable: {}", e))
            })?;

        if !response.status().is_success() {
            error!(status = %response.status(), "Carrier authentication rejected");
            return Err(ServiceError::ExternalServiceError(
                "Carrier authentication failed".into(),
            ));
        }

        let parsed: LoginResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("Malformed carrier response: {}", e))
        })?;

        let refresh_after = Utc::now()
            + ChronoDuration::days(TOKEN_LIFETIME_DAYS - TOKEN_REFRESH_MARGIN_DAYS);
        *self.token.write().await = Some(CachedToken {
            token: parsed.token.clone(),
            refresh_after,
        });

        info!("Carrier token refreshed");
        Ok(parsed.token)
    }

    async fn bearer_token(&self) -> Result<String, ServiceError> {
        {
            let guard = self.token.read().await;
            if let Some(cached) = guard.as_ref() {
                if Utc::now() < cached.refresh_after {
                    return Ok(cached.token.clone());
                }
            }
        }
        self.authenticate().await
    }

    async fn authed_post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, ServiceError> {
        let token = self.bearer_token().await?;
        self.http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!("Carrier request failed: {}", e);
                ServiceError::ExternalServiceError(format!("Carrier unreachable: {}", e))
            })
    }

    async fn authed_get(&self, path: &str) -> Result<reqwest::Response, ServiceError> {
        let token = self.bearer_token().await?;
        self.http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                error!("Carrier request failed: {}", e);
                ServiceError::ExternalServiceError(format!("Carrier unreachable: {}", e))
            })
    }
}

fn carrier_error(status: reqwest::StatusCode, detail: String) -> ServiceError {
    error!(status = %status, "Carrier rejected request: {}", detail);
    ServiceError::ExternalServiceError(format!("Carrier returned {}", status))
}

#[async_trait]
impl ShippingGateway for ShiprocketClient {
    #[instrument(skip(self, request), fields(order_number = %request.order_number))]
    async fn create_order(
        &self,
        request: &CreateCarrierOrder,
    ) -> Result<CarrierOrderCreated, ServiceError> {
        let billing = &request.billing_address;
        let shipping = &request.shipping_address;

        let body = serde_json::json!({
            "order_id": request.order_number,
            "order_date": request.order_date.format("%Y-%m-%d %H:%M").to_string(),
            "pickup_location": self.pickup_location,
            "billing_customer_name": billing.full_name,
            "billing_last_name": "",
            "billing_address": billing.address_line1,
            "billing_address_2": billing.address_line2.clone().unwrap_or_default(),
            "billing_city": billing.city,
            "billing_pincode": billing.pincode,
            "billing_state": billing.state,
            "billing_country": billing.country,
            "billing_email": request.customer_email.to_lowercase(),
            "billing_phone": billing.phone,
            "shipping_is_billing": false,
            "shipping_customer_name": shipping.full_name,
            "shipping_last_name": "",
            "shipping_address": shipping.address_line1,
            "shipping_address_2": shipping.address_line2.clone().unwrap_or_default(),
            "shipping_city": shipping.city,
            "shipping_pincode": shipping.pincode,
            "shipping_state": shipping.state,
            "shipping_country": shipping.country,
            "shipping_email": request.customer_email.to_lowercase(),
            "shipping_phone": shipping.phone,
            "order_items": request.items.iter().map(|item| serde_json::json!({
                "name": item.name,
                "sku": item.sku,
                "units": item.units.max(1),
                "selling_price": item.selling_price,
                "discount": 0,
                "tax": 0,
                "hsn": item.hsn.clone().unwrap_or_default(),
            })).collect::<Vec<_>>(),
            "payment_method": request.payment_method,
            "shipping_charges": request.shipping_charges,
            "giftwrap_charges": 0,
            "transaction_charges": 0,
            "total_discount": request.discount,
            "sub_total": request.subtotal,
            "length": request.length_cm,
            "breadth": request.breadth_cm,
            "height": request.height_cm,
            "weight": request.weight_kg,
        });

        let response = self.authed_post("/orders/create/adhoc", &body).await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(carrier_error(status, detail));
        }

        #[derive(Deserialize)]
        struct CreateResponse {
            order_id: serde_json::Value,
            shipment_id: serde_json::Value,
            status: Option<String>,
        }

        let parsed: CreateResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("Malformed carrier response: {}", e))
        })?;

        debug!("Carrier order registered");
        Ok(CarrierOrderCreated {
            shipment_order_id: json_id(&parsed.order_id),
            shipment_id: json_id(&parsed.shipment_id),
            status: parsed.status,
        })
    }

    #[instrument(skip(self))]
    async fn assign_courier(
        &self,
        shipment_id: &str,
        courier_id: Option<&str>,
    ) -> Result<CourierAssignment, ServiceError> {
        let mut body = serde_json::json!({ "shipment_id": shipment_id });
        if let Some(courier) = courier_id {
            body["courier_id"] = serde_json::Value::String(courier.to_string());
        }

        let response = self.authed_post("/courier/assign/awb", &body).await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(carrier_error(status, detail));
        }

        let payload: serde_json::Value = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("Malformed carrier response: {}", e))
        })?;

        // Successful assignment nests the AWB under response.data
        let data = payload
            .pointer("/response/data")
            .or_else(|| payload.get("data"))
            .unwrap_or(&payload);

        let awb_code = data
            .get("awb_code")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                warn!("Carrier returned no AWB: {}", payload);
                ServiceError::ExternalServiceError("Carrier did not assign an AWB".into())
            })?
            .to_string();

        Ok(CourierAssignment {
            awb_code,
            courier_id: data.get("courier_company_id").map(json_id),
            courier_name: data
                .get("courier_name")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        })
    }

    #[instrument(skip(self))]
    async fn recommend_courier(
        &self,
        delivery_pincode: &str,
        weight_kg: Decimal,
    ) -> Result<Vec<CourierOption>, ServiceError> {
        let mut path = format!(
            "/courier/serviceability/?delivery_postcode={}&weight={}&cod=0",
            delivery_pincode, weight_kg
        );
        if let Some(pickup) = &self.pickup_pincode {
            path.push_str(&format!("&pickup_postcode={}", pickup));
        }
        let response = self.authed_get(&path).await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(carrier_error(status, detail));
        }

        let payload: serde_json::Value = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("Malformed carrier response: {}", e))
        })?;

        let companies = payload
            .pointer("/data/available_courier_companies")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut options: Vec<CourierOption> = companies
            .iter()
            .filter_map(|c| {
                Some(CourierOption {
                    courier_id: json_id(c.get("courier_company_id")?),
                    courier_name: c.get("courier_name")?.as_str()?.to_string(),
                    rate: c
                        .get("rate")
                        .and_then(|v| v.as_f64())
                        .and_then(Decimal::from_f64_retain)?,
                    estimated_delivery_days: c
                        .get("estimated_delivery_days")
                        .map(json_id),
                })
            })
            .collect();

        options.sort_by(|a, b| a.rate.cmp(&b.rate));
        Ok(options)
    }

    #[instrument(skip(self))]
    async fn schedule_pickup(&self, shipment_id: &str) -> Result<(), ServiceError> {
        let body = serde_json::json!({ "shipment_id": [shipment_id] });
        let response = self.authed_post("/courier/generate/pickup", &body).await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(carrier_error(status, detail));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn track(&self, shipment_id: &str) -> Result<TrackingInfo, ServiceError> {
        let response = self
            .authed_get(&format!("/courier/track/shipment/{}", shipment_id))
            .await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(carrier_error(status, detail));
        }

        let payload: serde_json::Value = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("Malformed carrier response: {}", e))
        })?;

        let tracking = payload.get("tracking_data").cloned().unwrap_or_default();
        Ok(TrackingInfo {
            current_status: tracking
                .pointer("/shipment_track/0/current_status")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            awb_code: tracking
                .pointer("/shipment_track/0/awb_code")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            courier_name: tracking
                .pointer("/shipment_track/0/courier_name")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            events: tracking,
        })
    }

    #[instrument(skip(self))]
    async fn cancel(&self, awb_code: &str) -> Result<(), ServiceError> {
        let body = serde_json::json!({ "awbs": [awb_code] });
        let response = self
            .authed_post("/orders/cancel/shipment/awbs", &body)
            .await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(carrier_error(status, detail));
        }
        Ok(())
    }
}

/// The carrier mixes numeric and string ids between API versions.
fn json_id(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base: String) -> ShiprocketClient {
        ShiprocketClient::new(
            base,
            "ops@shop.example".into(),
            "password".into(),
            "Primary".into(),
            Some("110001".into()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    async fn mount_login(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"token": "carrier-token"})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn token_is_cached_across_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"token": "carrier-token"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/courier/generate/pickup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(2)
            .mount(&server)
            .await;

        let client = client(server.uri());
        client.schedule_pickup("12345").await.unwrap();
        client.schedule_pickup("12345").await.unwrap();
    }

    #[tokio::test]
    async fn assign_courier_extracts_nested_awb() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("POST"))
            .and(path("/courier/assign/awb"))
            .and(body_partial_json(serde_json::json!({"shipment_id": "987"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": {"data": {
                    "awb_code": "AWB123",
                    "courier_company_id": 24,
                    "courier_name": "Bluedart"
                }}
            })))
            .mount(&server)
            .await;

        let assignment = client(server.uri())
            .assign_courier("987", None)
            .await
            .unwrap();
        assert_eq!(assignment.awb_code, "AWB123");
        assert_eq!(assignment.courier_name.as_deref(), Some("Bluedart"));
        assert_eq!(assignment.courier_id.as_deref(), Some("24"));
    }

    #[tokio::test]
    async fn assign_courier_without_awb_is_an_error() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("POST"))
            .and(path("/courier/assign/awb"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": {"data": {"awb_code": ""}}
            })))
            .mount(&server)
            .await;

        let err = client(server.uri())
            .assign_courier("987", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ExternalServiceError(_)));
    }

    #[tokio::test]
    async fn recommend_courier_sends_both_pincodes_and_sorts_by_rate() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("GET"))
            .and(path("/courier/serviceability/"))
            .and(query_param("delivery_postcode", "560001"))
            .and(query_param("pickup_postcode", "110001"))
            .and(query_param("weight", "0.5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"available_courier_companies": [
                    {"courier_company_id": 1, "courier_name": "Slowpost", "rate": 120.0},
                    {"courier_company_id": 2, "courier_name": "Cheapship", "rate": 60.0}
                ]}
            })))
            .mount(&server)
            .await;

        let options = client(server.uri())
            .recommend_courier("560001", dec!(0.5))
            .await
            .unwrap();
        assert_eq!(options[0].courier_name, "Cheapship");
        assert_eq!(options[1].courier_name, "Slowpost");
    }
}
