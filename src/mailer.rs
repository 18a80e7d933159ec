use crate::config::AppConfig;
use crate::errors::ServiceError;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

/// Outbound mail seam. Delivery failures never fail the calling operation;
/// callers log and move on.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        to: &str,
        template: &str,
        context: serde_json::Value,
    ) -> Result<(), ServiceError>;
}

/// Posts mail jobs to an external dispatch endpoint.
#[derive(Clone)]
pub struct HttpMailer {
    http: reqwest::Client,
    dispatch_url: String,
    from: String,
}

impl HttpMailer {
    pub fn new(dispatch_url: String, from: String, timeout: Duration) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            dispatch_url,
            from,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Option<Self>, ServiceError> {
        match &config.mail_dispatch_url {
            Some(url) => Ok(Some(Self::new(
                url.clone(),
                config.mail_from.clone(),
                config.external_timeout(),
            )?)),
            None => Ok(None),
        }
    }
}

#[derive(Serialize)]
struct MailJob<'a> {
    from: &'a str,
    to: &'a str,
    template: &'a str,
    context: serde_json::Value,
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(
        &self,
        to: &str,
        template: &str,
        context: serde_json::Value,
    ) -> Result<(), ServiceError> {
        let job = MailJob {
            from: &self.from,
            to,
            template,
            context,
        };

        let response = self
            .http
            .post(&self.dispatch_url)
            .json(&job)
            .send()
            .await
            .map_err(|e| {
                error!("Mail dispatch request failed: {}", e);
                ServiceError::ExternalServiceError(format!("Mail dispatch unreachable: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "Mail dispatch returned {}",
                response.status()
            )));
        }

        debug!(template = template, "Mail job dispatched");
        Ok(())
    }
}

/// Used when no dispatch URL is configured and in tests.
#[derive(Clone, Default)]
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send(
        &self,
        to: &str,
        template: &str,
        _context: serde_json::Value,
    ) -> Result<(), ServiceError> {
        debug!(to = to, template = template, "Mail disabled; dropping job");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_job_to_dispatch_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "to": "asha@example.com",
                "template": "order-confirmation"
            })))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let mailer = HttpMailer::new(
            server.uri(),
            "orders@shop.example".into(),
            Duration::from_secs(5),
        )
        .unwrap();

        mailer
            .send(
                "asha@example.com",
                "order-confirmation",
                serde_json::json!({"order_number": "ORD_1"}),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dispatch_failure_surfaces_as_external_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mailer = HttpMailer::new(
            server.uri(),
            "orders@shop.example".into(),
            Duration::from_secs(5),
        )
        .unwrap();

        let err = mailer
            .send("asha@example.com", "order-confirmation", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ExternalServiceError(_)));
    }
}
