//! M-Pesa gateway adapter (Daraja STK push)
//!
//! Initiates an asynchronous payment request against the provider's REST
//! API. Credentials live inside the constructed adapter instance; the
//! short-lived OAuth token is cached per validity window and re-acquired
//! once on auth failure before surfacing an error.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use chrono_tz::Tz;
use serde_json::json;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::core::config::MpesaConfig;

/// One outstanding settlement request, correlated to a transaction via the
/// provider-issued checkout request id
#[derive(Debug, Clone, serde::Serialize)]
pub struct PaymentAttempt {
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
    pub account_reference: String,
    pub customer_message: Option<String>,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Credential acquisition failed (after one retry)
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network or provider-side failure before initiation could complete
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// Provider reached but rejected the initiation request
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Seam for the external payment provider
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Initiate asynchronous settlement of `amount` for a transaction.
    ///
    /// Success means the provider accepted the request, not that payment
    /// completed; completion arrives later on the callback endpoint.
    async fn initiate(
        &self,
        transaction_id: &str,
        phone: &str,
        amount: f64,
    ) -> Result<PaymentAttempt, GatewayError>;
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Production M-Pesa adapter
pub struct MpesaGateway {
    http: reqwest::Client,
    config: MpesaConfig,
    callback_url: String,
    timezone: Tz,
    token: RwLock<Option<CachedToken>>,
}

impl MpesaGateway {
    pub fn new(config: MpesaConfig, public_base_url: &str, timezone: Tz) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        let callback_url = format!("{}/mpesa/callback", public_base_url.trim_end_matches('/'));
        Self {
            http,
            config,
            callback_url,
            timezone,
            token: RwLock::new(None),
        }
    }

    /// Cached token if still within its validity window
    async fn cached_token(&self) -> Option<String> {
        let guard = self.token.read().await;
        guard
            .as_ref()
            .filter(|t| t.expires_at > Instant::now())
            .map(|t| t.value.clone())
    }

    async fn invalidate_token(&self) {
        *self.token.write().await = None;
    }

    /// Fetch a fresh OAuth token via client credentials
    #[instrument(skip(self))]
    async fn fetch_token(&self) -> Result<String, GatewayError> {
        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.config.base_url
        );
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(GatewayError::Auth(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Rejected(format!("invalid token response: {e}")))?;

        let token = body["access_token"]
            .as_str()
            .ok_or_else(|| GatewayError::Auth(format!("no access_token in response: {body}")))?
            .to_string();

        // expires_in arrives as a string ("3599"); keep a safety margin
        let expires_in = body["expires_in"]
            .as_str()
            .and_then(|s| s.parse::<u64>().ok())
            .or_else(|| body["expires_in"].as_u64())
            .unwrap_or(3599);
        let margin = expires_in.saturating_sub(60).max(30);

        *self.token.write().await = Some(CachedToken {
            value: token.clone(),
            expires_at: Instant::now() + Duration::from_secs(margin),
        });

        info!("Gateway access token refreshed");
        Ok(token)
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }
        // Single retry on credential failure, then surface the auth error
        match self.fetch_token().await {
            Ok(token) => Ok(token),
            Err(GatewayError::Auth(first)) => {
                warn!(error = %first, "Token fetch failed, retrying once");
                self.fetch_token().await
            }
            Err(other) => Err(other),
        }
    }

    /// Provider password: base64(shortcode + passkey + timestamp)
    fn password(&self, timestamp: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(format!(
            "{}{}{}",
            self.config.shortcode, self.config.passkey, timestamp
        ))
    }

    async fn send_stk_push(
        &self,
        token: &str,
        payload: &serde_json::Value,
    ) -> Result<reqwest::Response, GatewayError> {
        self.http
            .post(format!(
                "{}/mpesa/stkpush/v1/processrequest",
                self.config.base_url
            ))
            .bearer_auth(token)
            .json(payload)
            .send()
            .await
            .map_err(transport_error)
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    GatewayError::Unreachable(e.to_string())
}

#[async_trait]
impl PaymentGateway for MpesaGateway {
    #[instrument(skip(self), fields(transaction_id = %transaction_id))]
    async fn initiate(
        &self,
        transaction_id: &str,
        phone: &str,
        amount: f64,
    ) -> Result<PaymentAttempt, GatewayError> {
        let timestamp = Utc::now()
            .with_timezone(&self.timezone)
            .format("%Y%m%d%H%M%S")
            .to_string();
        let account_reference = format!("FIDPOS-{transaction_id}");
        // The provider only accepts whole shillings
        let amount = (amount.round() as i64).max(1);

        let payload = json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": self.password(&timestamp),
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": amount,
            "PartyA": phone,
            "PartyB": self.config.shortcode,
            "PhoneNumber": phone,
            "CallBackURL": self.callback_url,
            "AccountReference": account_reference,
            "TransactionDesc": "FidPOS Checkout Payment",
        });

        let token = self.access_token().await?;
        let mut response = self.send_stk_push(&token, &payload).await?;

        // Stale token: re-acquire once and retry the push
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            warn!("STK push unauthorized, refreshing token");
            self.invalidate_token().await;
            let token = self.access_token().await?;
            response = self.send_stk_push(&token, &payload).await?;
            if response.status() == reqwest::StatusCode::UNAUTHORIZED {
                return Err(GatewayError::Auth("STK push unauthorized".into()));
            }
        }

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Rejected(format!("invalid STK response: {e}")))?;

        let accepted = status.is_success()
            && body["ResponseCode"].as_str().is_some_and(|c| c == "0");
        if !accepted {
            return Err(GatewayError::Rejected(format!(
                "provider returned {status}: {body}"
            )));
        }

        let checkout_request_id = body["CheckoutRequestID"]
            .as_str()
            .ok_or_else(|| {
                GatewayError::Rejected(format!("no CheckoutRequestID in response: {body}"))
            })?
            .to_string();

        info!(checkout_request_id = %checkout_request_id, "STK push accepted");

        Ok(PaymentAttempt {
            checkout_request_id,
            merchant_request_id: body["MerchantRequestID"].as_str().map(String::from),
            account_reference,
            customer_message: body["CustomerMessage"].as_str().map(String::from),
        })
    }
}
