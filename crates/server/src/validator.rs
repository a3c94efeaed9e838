//! External validation of one-time tokens.

use crate::auth::AccessError;
use async_trait::async_trait;
use ferry_core::config::TokenValidationConfig;
use rand::Rng;
use rand::distr::Alphanumeric;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Service deciding whether a one-time token is live.
#[async_trait]
pub trait TokenValidator: Send + Sync + 'static {
    /// Validate a token. `Ok(false)` means the token is well-formed but not accepted.
    async fn validate(&self, token: &str) -> Result<bool, AccessError>;

    /// Whether uploads may request token protection at all.
    fn is_enabled(&self) -> bool;
}

/// Validator used when token protection is not configured.
pub struct DisabledValidator;

#[async_trait]
impl TokenValidator for DisabledValidator {
    async fn validate(&self, _token: &str) -> Result<bool, AccessError> {
        Err(AccessError::TokenProtectionDisabled)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Validator backed by the Yubico OTP verification protocol.
pub struct YubicoValidator {
    client: reqwest::Client,
    api_url: String,
    client_id: String,
}

impl YubicoValidator {
    pub fn new(
        api_url: impl Into<String>,
        client_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AccessError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AccessError::ValidatorUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            client_id: client_id.into(),
        })
    }
}

fn generate_nonce() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Parse the `key=value` lines of a verification response.
fn parse_response(body: &str) -> HashMap<&str, &str> {
    body.lines()
        .filter_map(|line| line.trim().split_once('='))
        .collect()
}

#[async_trait]
impl TokenValidator for YubicoValidator {
    async fn validate(&self, token: &str) -> Result<bool, AccessError> {
        let nonce = generate_nonce();
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("id", self.client_id.as_str()),
                ("otp", token),
                ("nonce", nonce.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AccessError::ValidatorUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AccessError::ValidatorUnavailable(format!(
                "verification service returned {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AccessError::ValidatorUnavailable(e.to_string()))?;
        let fields = parse_response(&body);

        match fields.get("status").copied() {
            Some("OK") => {
                // The answer must echo our request, otherwise it is not ours.
                let echoed = fields.get("otp") == Some(&token)
                    && fields.get("nonce") == Some(&nonce.as_str());
                if !echoed {
                    tracing::warn!("token verification response does not match request");
                }
                Ok(echoed)
            }
            Some("BAD_OTP") | Some("REPLAYED_OTP") | Some("REPLAYED_REQUEST") => Ok(false),
            Some(other) => Err(AccessError::ValidatorUnavailable(format!(
                "verification failed with status {other}"
            ))),
            None => Err(AccessError::ValidatorUnavailable(
                "verification response carries no status".to_string(),
            )),
        }
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Create a token validator from configuration.
pub fn from_config(config: &TokenValidationConfig) -> Result<Arc<dyn TokenValidator>, AccessError> {
    match config {
        TokenValidationConfig::Disabled => Ok(Arc::new(DisabledValidator)),
        TokenValidationConfig::Yubico {
            api_url, client_id, ..
        } => Ok(Arc::new(YubicoValidator::new(
            api_url.as_str(),
            client_id.as_str(),
            config.timeout(),
        )?)),
    }
}
