use crate::config::TranslationConfig;
use crate::http::build_client;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("translation disabled")]
    Disabled,
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("timed out after {0}s")]
    Timeout(u64),
}

/// External text translation provider. Failures are transient from the
/// caller's point of view.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String, TranslateError>;
}

pub struct HttpTranslator {
    http: Client,
    config: TranslationConfig,
}

impl HttpTranslator {
    pub fn new(config: TranslationConfig) -> Self {
        Self {
            http: build_client(),
            config,
        }
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslateError> {
        if !self.config.enabled {
            return Err(TranslateError::Disabled);
        }
        let endpoint = self.config.endpoint.trim();
        if endpoint.is_empty() {
            return Err(TranslateError::Disabled);
        }

        let response = self
            .http
            .get(endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", self.config.source_lang.as_str()),
                ("tl", self.config.target_lang.as_str()),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(|err| TranslateError::Http(err.to_string()))?;

        if !response.status().is_success() {
            return Err(TranslateError::Http(format!("HTTP {}", response.status())));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| TranslateError::InvalidResponse(err.to_string()))?;
        parse_segments(&payload)
    }
}

/// The response is `[[["translated", "original", ...], ...], ...]`; segments
/// are concatenated in order.
fn parse_segments(payload: &Value) -> Result<String, TranslateError> {
    let segments = payload
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| TranslateError::InvalidResponse("missing segments".into()))?;
    let text: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(Value::as_str))
        .collect();
    if text.trim().is_empty() {
        return Err(TranslateError::InvalidResponse("empty translation".into()));
    }
    Ok(text)
}
