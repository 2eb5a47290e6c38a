use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::entities::order::{self, GatewayPaymentStatus, PaymentState};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::notifications::Mailer;

type HmacSha256 = Hmac<Sha256>;

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

fn hmac_hex(secret: &str, message: &[u8]) -> Result<String, ServiceError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::Internal(format!("HMAC key error: {}", e)))?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Provider-side order created ahead of client payment collection.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

/// Result of a refund request. `already_refunded` marks the idempotent case
/// where the provider reports the payment fully refunded by an earlier call.
#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub refund_id: Option<String>,
    pub already_refunded: bool,
}

/// Payment provider seam. All order/checkout code goes through this trait so
/// tests can substitute a scripted double.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key id handed to browser checkout widgets.
    fn key_id(&self) -> Result<String, ServiceError>;

    /// Creates a provider-side order for the given amount in minor units
    /// (e.g. paise).
    async fn create_provider_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
        notes: Value,
    ) -> Result<ProviderOrder, ServiceError>;

    /// Verifies the post-checkout signature over `"{order_id}|{payment_id}"`.
    fn verify_checkout_signature(
        &self,
        provider_order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, ServiceError>;

    /// Refunds a payment, fully when `amount_minor` is `None`.
    async fn refund(
        &self,
        payment_id: &str,
        amount_minor: Option<i64>,
    ) -> Result<RefundOutcome, ServiceError>;

    /// Verifies a webhook signature computed over the raw request body.
    fn verify_webhook_signature(&self, raw_body: &[u8], signature: &str)
        -> Result<bool, ServiceError>;
}

/// Razorpay credentials; absent credentials surface as `GatewayConfig`
/// errors at call time rather than at startup.
#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: Option<String>,
    pub key_secret: Option<String>,
    pub webhook_secret: Option<String>,
    pub base_url: String,
}

impl RazorpayConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            key_id: cfg.razorpay_key_id.clone(),
            key_secret: cfg.razorpay_key_secret.clone(),
            webhook_secret: cfg.razorpay_webhook_secret.clone(),
            base_url: cfg.razorpay_base_url.clone(),
        }
    }
}

/// Razorpay REST implementation: HTTP basic auth with `key_id:key_secret`,
/// amounts in minor units throughout.
pub struct RazorpayGateway {
    config: RazorpayConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorBody {
    error: Option<RazorpayErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorDetail {
    description: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RazorpayRefund {
    id: String,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn credentials(&self) -> Result<(&str, &str), ServiceError> {
        match (&self.config.key_id, &self.config.key_secret) {
            (Some(id), Some(secret)) => Ok((id.as_str(), secret.as_str())),
            _ => Err(ServiceError::GatewayConfig(
                "Razorpay credentials not configured".to_string(),
            )),
        }
    }

    fn basic_auth(&self) -> Result<String, ServiceError> {
        let (key_id, key_secret) = self.credentials()?;
        Ok(format!(
            "Basic {}",
            BASE64.encode(format!("{}:{}", key_id, key_secret))
        ))
    }

    async fn error_description(response: reqwest::Response) -> String {
        match response.json::<RazorpayErrorBody>().await {
            Ok(body) => body
                .error
                .and_then(|e| e.description.or(e.reason))
                .unwrap_or_else(|| "unknown gateway error".to_string()),
            Err(e) => format!("unreadable gateway error: {}", e),
        }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn key_id(&self) -> Result<String, ServiceError> {
        self.config
            .key_id
            .clone()
            .ok_or_else(|| ServiceError::GatewayConfig("Razorpay key not configured".to_string()))
    }

    #[instrument(skip(self, notes))]
    async fn create_provider_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
        notes: Value,
    ) -> Result<ProviderOrder, ServiceError> {
        if amount_minor <= 0 {
            return Err(ServiceError::Validation("Invalid amount".to_string()));
        }

        let auth = self.basic_auth()?;
        let url = format!("{}/orders", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, auth)
            .json(&serde_json::json!({
                "amount": amount_minor,
                "currency": currency,
                "receipt": receipt,
                "notes": notes,
            }))
            .send()
            .await
            .map_err(|e| ServiceError::GatewayRequest(e.to_string()))?;

        if !response.status().is_success() {
            let description = Self::error_description(response).await;
            return Err(ServiceError::GatewayRequest(description));
        }

        response
            .json::<ProviderOrder>()
            .await
            .map_err(|e| ServiceError::GatewayRequest(format!("malformed order response: {}", e)))
    }

    fn verify_checkout_signature(
        &self,
        provider_order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, ServiceError> {
        let (_, key_secret) = self.credentials()?;
        let message = format!("{}|{}", provider_order_id, payment_id);
        let expected = hmac_hex(key_secret, message.as_bytes())?;
        Ok(constant_time_eq(&expected, signature))
    }

    #[instrument(skip(self))]
    async fn refund(
        &self,
        payment_id: &str,
        amount_minor: Option<i64>,
    ) -> Result<RefundOutcome, ServiceError> {
        let auth = self.basic_auth()?;
        let url = format!("{}/payments/{}/refund", self.config.base_url, payment_id);

        let body = match amount_minor {
            Some(amount) => serde_json::json!({ "amount": amount }),
            None => serde_json::json!({}),
        };

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, auth)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::GatewayRequest(e.to_string()))?;

        if response.status().is_success() {
            let refund = response.json::<RazorpayRefund>().await.map_err(|e| {
                ServiceError::GatewayRequest(format!("malformed refund response: {}", e))
            })?;
            return Ok(RefundOutcome {
                refund_id: Some(refund.id),
                already_refunded: false,
            });
        }

        let description = Self::error_description(response).await;
        if description.to_lowercase().contains("fully refunded already") {
            // Retried refund of an already-settled payment is a success.
            info!(payment_id, "payment already fully refunded at provider");
            return Ok(RefundOutcome {
                refund_id: None,
                already_refunded: true,
            });
        }

        Err(ServiceError::GatewayRequest(description))
    }

    fn verify_webhook_signature(
        &self,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<bool, ServiceError> {
        let secret = self.config.webhook_secret.as_deref().ok_or_else(|| {
            ServiceError::GatewayConfig("Webhook secret not configured".to_string())
        })?;
        let expected = hmac_hex(secret, raw_body)?;
        Ok(constant_time_eq(&expected, signature))
    }
}

/// What a webhook delivery resolved to. Unknown orders and unrecognized
/// events acknowledge with 200 so the provider does not retry forever.
#[derive(Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    PaymentRecorded,
    PaymentFailed,
    Ignored(&'static str),
}

impl WebhookOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            Self::PaymentRecorded => "Order updated to paid via webhook",
            Self::PaymentFailed => "Order marked payment failed via webhook",
            Self::Ignored(msg) => msg,
        }
    }
}

/// Reconciles asynchronous gateway notifications against stored orders.
pub struct PaymentWebhookService {
    db: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    mailer: Arc<dyn Mailer>,
    event_sender: EventSender,
}

impl PaymentWebhookService {
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn Mailer>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            gateway,
            mailer,
            event_sender,
        }
    }

    /// Verifies the signature over the raw body, then applies the event.
    /// Signature failure is terminal; nothing is parsed before it passes.
    #[instrument(skip(self, raw_body, signature))]
    pub async fn process(
        &self,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<WebhookOutcome, ServiceError> {
        if !self.gateway.verify_webhook_signature(raw_body, signature)? {
            warn!("webhook signature mismatch");
            return Err(ServiceError::WebhookSignature);
        }

        let event: Value = serde_json::from_slice(raw_body)
            .map_err(|e| ServiceError::BadRequest(format!("invalid webhook json: {}", e)))?;

        let event_type = event.get("event").and_then(|v| v.as_str()).unwrap_or("");
        let payment = event
            .get("payload")
            .and_then(|p| p.get("payment"))
            .and_then(|p| p.get("entity"));

        let provider_order_id = payment
            .and_then(|p| p.get("order_id"))
            .and_then(|v| v.as_str());
        let payment_id = payment.and_then(|p| p.get("id")).and_then(|v| v.as_str());
        let amount_minor = payment
            .and_then(|p| p.get("amount"))
            .and_then(|v| v.as_i64());

        let Some(provider_order_id) = provider_order_id else {
            return Ok(WebhookOutcome::Ignored(
                "No order_id in webhook payload, ignored",
            ));
        };

        let Some(order) = order::Entity::find()
            .filter(order::Column::ProviderOrderId.eq(provider_order_id))
            .one(&*self.db)
            .await?
        else {
            return Ok(WebhookOutcome::Ignored(
                "Order not found for webhook order_id, ignored",
            ));
        };

        match event_type {
            "payment.authorized" | "payment.captured" => {
                let order_id = order.id;
                let user_id = order.user_id;
                let version = order.version;

                let mut active: order::ActiveModel = order.into();
                active.payment_status = Set(PaymentState::Paid);
                active.gateway_payment_status = Set(GatewayPaymentStatus::Completed);
                active.payment_provider = Set(Some("razorpay".to_string()));
                if let Some(payment_id) = payment_id {
                    active.payment_transaction_id = Set(Some(payment_id.to_string()));
                }
                if let Some(amount) = amount_minor {
                    // Minor units to currency units.
                    active.payment_amount = Set(Decimal::new(amount, 2));
                }
                active.payment_date = Set(Some(Utc::now()));
                active.updated_at = Set(Some(Utc::now()));
                active.version = Set(version + 1);
                let updated = active.update(&*self.db).await?;

                if let Err(e) = self.mailer.send_order_receipt(user_id, &updated).await {
                    error!(%order_id, "webhook receipt dispatch failed: {}", e);
                }
                let _ = self
                    .event_sender
                    .send(Event::PaymentCaptured {
                        order_id,
                        payment_id: payment_id.unwrap_or_default().to_string(),
                    })
                    .await;

                Ok(WebhookOutcome::PaymentRecorded)
            }
            "payment.failed" => {
                let order_id = order.id;
                let version = order.version;

                let mut active: order::ActiveModel = order.into();
                active.gateway_payment_status = Set(GatewayPaymentStatus::Failed);
                active.updated_at = Set(Some(Utc::now()));
                active.version = Set(version + 1);
                active.update(&*self.db).await?;

                let _ = self
                    .event_sender
                    .send(Event::PaymentFailed {
                        order_id,
                        reason: event_type.to_string(),
                    })
                    .await;

                Ok(WebhookOutcome::PaymentFailed)
            }
            _ => Ok(WebhookOutcome::Ignored(
                "Webhook received (no action for this event)",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway_with_secret() -> RazorpayGateway {
        RazorpayGateway::new(RazorpayConfig {
            key_id: Some("rzp_test_key".to_string()),
            key_secret: Some("test_secret".to_string()),
            webhook_secret: Some("whsec".to_string()),
            base_url: "https://api.razorpay.com/v1".to_string(),
        })
    }

    #[test]
    fn checkout_signature_round_trip() {
        let gateway = gateway_with_secret();
        let signature = hmac_hex("test_secret", b"order_abc|pay_xyz").unwrap();

        assert!(gateway
            .verify_checkout_signature("order_abc", "pay_xyz", &signature)
            .unwrap());
        assert!(!gateway
            .verify_checkout_signature("order_abc", "pay_other", &signature)
            .unwrap());
    }

    #[test]
    fn webhook_signature_round_trip() {
        let gateway = gateway_with_secret();
        let body = br#"{"event":"payment.captured"}"#;
        let signature = hmac_hex("whsec", body).unwrap();

        assert!(gateway.verify_webhook_signature(body, &signature).unwrap());
        assert!(!gateway.verify_webhook_signature(body, "deadbeef").unwrap());
    }

    #[test]
    fn missing_credentials_fail_as_config_error() {
        let gateway = RazorpayGateway::new(RazorpayConfig {
            key_id: None,
            key_secret: None,
            webhook_secret: None,
            base_url: "https://api.razorpay.com/v1".to_string(),
        });

        assert!(matches!(
            gateway.key_id(),
            Err(ServiceError::GatewayConfig(_))
        ));
        assert!(matches!(
            gateway.verify_checkout_signature("o", "p", "s"),
            Err(ServiceError::GatewayConfig(_))
        ));
        assert!(matches!(
            gateway.verify_webhook_signature(b"{}", "s"),
            Err(ServiceError::GatewayConfig(_))
        ));
    }

    #[test]
    fn constant_time_eq_rejects_length_mismatch() {
        assert!(!constant_time_eq("abc", "abcd"));
        assert!(constant_time_eq("abcd", "abcd"));
    }
}
