use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::{header::CONTENT_TYPE, Client};
use std::time::Duration;

use crate::dto::ai_dto::{TtsRequest, TtsResponse};
use crate::error::{Error, Result};

const DEFAULT_AUDIO_TYPE: &str = "audio/mpeg";

/// Proxies text-to-speech requests to an external engine and returns the
/// audio inline as base64.
#[derive(Clone)]
pub struct TtsService {
    client: Client,
    endpoint: Option<String>,
}

impl TtsService {
    pub fn new(client: Client, endpoint: Option<String>) -> Self {
        Self { client, endpoint }
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    pub async fn synthesize(&self, request: &TtsRequest) -> Result<TtsResponse> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(Error::BadRequest("Text must not be empty".to_string()));
        }
        let endpoint = self.endpoint.as_deref().ok_or_else(|| {
            Error::NotImplemented("Text-to-speech is not configured".to_string())
        })?;

        let res = self
            .client
            .post(endpoint)
            .json(&serde_json::json!({ "text": text, "voice": request.voice }))
            .timeout(Duration::from_secs(60))
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            tracing::error!("TTS engine returned {}: {}", status, body);
            return Err(Error::Upstream(format!("TTS engine returned {}", status)));
        }

        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_AUDIO_TYPE)
            .to_string();
        let audio = res.bytes().await?;
        if audio.is_empty() {
            return Err(Error::Upstream("TTS engine returned no audio".to_string()));
        }

        Ok(TtsResponse {
            content_type,
            audio_base64: BASE64.encode(&audio),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> TtsRequest {
        TtsRequest {
            text: text.to_string(),
            voice: None,
        }
    }

    #[tokio::test]
    async fn empty_text_is_rejected_before_any_call() {
        let service = TtsService::new(Client::new(), Some("http://127.0.0.1:9".to_string()));
        let err = service.synthesize(&request("   ")).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn unconfigured_engine_is_not_implemented() {
        let service = TtsService::new(Client::new(), None);
        assert!(!service.is_configured());
        let err = service.synthesize(&request("你好")).await.unwrap_err();
        assert_eq!(err.code(), "not_implemented");
    }
}
