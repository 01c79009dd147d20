use super::{EbayClient, config::USER_SCOPES, rejection_message};
use serde::Deserialize;
use thiserror::Error;
use urlencoding::encode;

#[derive(Debug, Error)]
pub enum EbayAuthError {
    #[error("missing ebay app credentials in env")]
    MissingCredentials,
    #[error("oauth request failed: {0}")]
    Request(String),
}

/// Body of both the authorization-code exchange and the refresh grant.
/// eBay omits `refresh_token` on refresh responses.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

impl EbayClient {
    pub fn authorize_url(&self, state: &str) -> String {
        let cfg = self.config();
        format!(
            "{}/oauth2/authorize?client_id={}&response_type=code&redirect_uri={}&scope={}&state={}",
            cfg.auth_root,
            encode(&cfg.app_id),
            encode(&cfg.ru_name),
            encode(&USER_SCOPES.join(" ")),
            encode(state),
        )
    }

    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, EbayAuthError> {
        let ru_name = self.config().ru_name.clone();
        let body = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", ru_name.as_str()),
        ];
        self.request_token(&body).await
    }

    pub async fn refresh_user_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenGrant, EbayAuthError> {
        let scopes = USER_SCOPES.join(" ");
        let body = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", scopes.as_str()),
        ];
        self.request_token(&body).await
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenGrant, EbayAuthError> {
        let cfg = self.config();
        if cfg.app_id.is_empty() || cfg.cert_id.is_empty() {
            return Err(EbayAuthError::MissingCredentials);
        }
        let response = self
            .http
            .post(cfg.token_url())
            .basic_auth(&cfg.app_id, Some(&cfg.cert_id))
            .form(&params)
            .send()
            .await
            .map_err(|err| EbayAuthError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(EbayAuthError::Request(rejection_message(response).await));
        }

        response
            .json::<TokenGrant>()
            .await
            .map_err(|err| EbayAuthError::Request(err.to_string()))
    }
}
