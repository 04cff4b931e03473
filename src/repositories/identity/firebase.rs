use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{TokenVerifier, VerifyError};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

/// Verifies ID tokens through the identity toolkit `accounts:lookup` call.
pub struct FirebaseVerifier {
    api_key: String,
    url: String,
    client: reqwest::Client,
}

impl FirebaseVerifier {
    pub fn new(api_key: String, url: String, timeout: Duration) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            api_key,
            url,
            client,
        })
    }
}

#[async_trait]
impl TokenVerifier for FirebaseVerifier {
    async fn verify(&self, token: &str) -> Result<String, VerifyError> {
        let response = self
            .client
            .post(format!("{}/v1/accounts:lookup", self.url.trim_end_matches('/')))
            .query(&[("key", &self.api_key)])
            .json(&json!({ "idToken": token }))
            .send()
            .await
            .map_err(|e| VerifyError::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(VerifyError::InvalidToken(format!("{}: {}", status, body)));
        }
        if !status.is_success() {
            return Err(VerifyError::ProviderUnavailable(status.to_string()));
        }

        let lookup: LookupResponse = response
            .json()
            .await
            .map_err(|e| VerifyError::ProviderUnavailable(e.to_string()))?;

        match lookup.users.into_iter().next() {
            Some(user) if !user.local_id.is_empty() => Ok(user.local_id),
            _ => Err(VerifyError::InvalidToken(
                "lookup returned no account".to_string(),
            )),
        }
    }
}
