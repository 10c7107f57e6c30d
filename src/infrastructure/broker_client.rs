//! Opaque brokerage REST collaborator (spec §6, "Brokerage REST API"):
//! `place_order`, `cancel_order`, `modify_order`, `get_quote`,
//! `refresh_token`. Requests are HMAC-SHA256 signed and sent through a
//! retrying client, mirroring the teacher's `HttpClientFactory` plus the
//! pack's Binance-style signed-request convention.

use crate::config::broker_config::BrokerEnvConfig;
use crate::domain::ports::{BrokerClient, BrokerOrderAck};
use crate::domain::rule::action::{BrokerOrderType, TransactionType};
use crate::domain::rule::ActionConfig;
use crate::domain::session::Credentials;
use crate::error::{MonitorError, MonitorResult};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use rust_decimal::Decimal;
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// Signed REST client for the brokerage API (spec §6).
pub struct RestBrokerClient {
    client: ClientWithMiddleware,
    api_base_url: String,
    api_key: String,
    api_secret: String,
}

impl RestBrokerClient {
    pub fn new(config: &BrokerEnvConfig, rest_timeout_secs: u64) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = Client::builder()
            .pool_max_idle_per_host(5)
            .timeout(Duration::from_secs(rest_timeout_secs))
            .connect_timeout(Duration::from_secs(rest_timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            api_base_url: config.api_base_url.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        }
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts any key size");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_millis() as u64
    }

    fn signed_query(&self, params: &str) -> String {
        let ts = Self::timestamp_ms();
        let base = if params.is_empty() {
            format!("timestamp={ts}")
        } else {
            format!("{params}&timestamp={ts}")
        };
        let signature = self.sign(&base);
        format!("{base}&signature={signature}")
    }

    async fn send_signed(
        &self,
        method: reqwest::Method,
        path: &str,
        params: &str,
        access_token: &str,
    ) -> MonitorResult<serde_json::Value> {
        let qs = self.signed_query(params);
        let url = format!("{}{}?{}", self.api_base_url, path, qs);

        let resp = self
            .client
            .request(method, &url)
            .header("X-API-KEY", &self.api_key)
            .header("Authorization", format!("token {}:{}", self.api_key, access_token))
            .send()
            .await
            .map_err(|e| MonitorError::TransientNetwork {
                endpoint: path.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| MonitorError::Other(anyhow::anyhow!("malformed broker response: {e}")))?;

        if status.is_client_error() {
            return Err(MonitorError::BrokerRejection {
                rule_id: 0,
                reason: body.to_string(),
            });
        }
        if status.is_server_error() {
            return Err(MonitorError::TransientNetwork {
                endpoint: path.to_string(),
                reason: format!("{status}: {body}"),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl BrokerClient for RestBrokerClient {
    async fn place_order(&self, access_token: &str, action: &ActionConfig) -> MonitorResult<BrokerOrderAck> {
        let ActionConfig::PlaceOrder {
            symbol,
            transaction_type,
            quantity,
            order_type,
            product,
            price,
        } = action
        else {
            return Err(MonitorError::Other(anyhow::anyhow!(
                "place_order called with a non-place_order action"
            )));
        };

        let side = match transaction_type {
            TransactionType::Buy => "BUY",
            TransactionType::Sell => "SELL",
        };
        let order_type_str = match order_type {
            BrokerOrderType::Market => "MARKET",
            BrokerOrderType::Limit => "LIMIT",
        };

        let mut params = format!(
            "symbol={symbol}&transaction_type={side}&quantity={quantity}&order_type={order_type_str}&product={product:?}"
        );
        if let Some(p) = price {
            params.push_str(&format!("&price={p}"));
        }

        let body = self
            .send_signed(reqwest::Method::POST, "/orders", &params, access_token)
            .await?;
        let order_id = body["order_id"]
            .as_str()
            .ok_or_else(|| MonitorError::Other(anyhow::anyhow!("broker response missing order_id")))?
            .to_string();

        Ok(BrokerOrderAck {
            order_id,
            raw_response: body,
        })
    }

    async fn cancel_order(&self, access_token: &str, order_id: &str) -> MonitorResult<()> {
        self.send_signed(
            reqwest::Method::DELETE,
            &format!("/orders/{order_id}"),
            "",
            access_token,
        )
        .await?;
        Ok(())
    }

    async fn modify_order(
        &self,
        access_token: &str,
        order_id: &str,
        price: Option<Decimal>,
        quantity: Option<Decimal>,
    ) -> MonitorResult<()> {
        let mut params = String::new();
        if let Some(p) = price {
            params.push_str(&format!("price={p}"));
        }
        if let Some(q) = quantity {
            if !params.is_empty() {
                params.push('&');
            }
            params.push_str(&format!("quantity={q}"));
        }
        self.send_signed(
            reqwest::Method::PUT,
            &format!("/orders/{order_id}"),
            &params,
            access_token,
        )
        .await?;
        Ok(())
    }

    async fn get_quote(&self, access_token: &str, instrument_token: i64) -> MonitorResult<Decimal> {
        let body = self
            .send_signed(
                reqwest::Method::GET,
                "/quote",
                &format!("instrument_token={instrument_token}"),
                access_token,
            )
            .await?;
        body["ltp"]
            .as_str()
            .and_then(|s| s.parse::<Decimal>().ok())
            .ok_or_else(|| MonitorError::Other(anyhow::anyhow!("quote response missing ltp")))
    }

    async fn refresh_token(&self, refresh_token: &str) -> MonitorResult<Credentials> {
        let body = self
            .send_signed(
                reqwest::Method::POST,
                "/oauth/refresh",
                &format!("refresh_token={refresh_token}"),
                "",
            )
            .await?;

        let access_token = body["access_token"]
            .as_str()
            .ok_or_else(|| MonitorError::Other(anyhow::anyhow!("refresh response missing access_token")))?
            .to_string();
        let refresh_token = body["refresh_token"]
            .as_str()
            .unwrap_or(refresh_token)
            .to_string();
        let expires_in_secs = body["expires_in"].as_i64().unwrap_or(3600);

        Ok(Credentials {
            access_token,
            refresh_token,
            expires_at: Utc::now() + ChronoDuration::seconds(expires_in_secs),
        })
    }
}
