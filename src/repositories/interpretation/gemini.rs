use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{normalize_verdict, InterpretationError, Interpreter};
use crate::models::verdict::InterpretationVerdict;

const PROMPT: &str = r#"You turn chat messages into expense records.
Reply with one JSON object and nothing else.
If the message reports money that was spent, reply
{"valid": true, "category": "<one of Housing, Utilities, Food, Transportation, Entertainment, Health, Education, Shopping, Travel, Miscellaneous>", "amount": <positive number>, "description": "<short text>"}.
Otherwise reply {"valid": false, "reason": "<one short sentence for the user>"}.
Message: "#;

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateResponse {
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();

        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

pub struct GeminiApi {
    api_key: String,
    url: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiApi {
    pub fn new(
        api_key: String,
        url: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            api_key,
            url,
            model,
            client,
        })
    }
}

#[async_trait]
impl Interpreter for GeminiApi {
    async fn interpret(&self, text: &str) -> Result<InterpretationVerdict, InterpretationError> {
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": format!("{}{}", PROMPT, text) }]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "temperature": 0
            }
        });

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.url.trim_end_matches('/'),
                self.model
            ))
            .query(&[("key", &self.api_key)])
            .json(&payload)
            .send()
            .await
            .map_err(|e| InterpretationError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InterpretationError::Unavailable(format!(
                "{}: {}",
                status, body
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| InterpretationError::Unavailable(e.to_string()))?;

        let generated = serde_json::from_str::<GenerateResponse>(&body)
            .ok()
            .and_then(GenerateResponse::into_text);

        match generated {
            Some(text) => Ok(normalize_verdict(&text)),
            None => {
                log::warn!("Interpretation response carried no text: {}", body);
                Ok(normalize_verdict(""))
            }
        }
    }
}
