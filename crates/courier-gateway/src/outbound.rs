//! HTTP bridge to the messaging transport.

use async_trait::async_trait;
use serde::Serialize;

use courier_core::config::TransportConfig;
use courier_core::types::MediaKind;
use courier_channel::{Outbound, TransportError};

/// Posts outbound sends to the transport bridge as JSON. One endpoint per
/// payload shape; voice notes go out as a raw body to keep audio bytes off
/// the JSON path.
pub struct HttpOutbound {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct TextSend<'a> {
    to: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct MediaSend<'a> {
    to: &'a str,
    url: &'a str,
    kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<&'a str>,
}

impl HttpOutbound {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.post(format!("{}{}", self.base_url, path));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn check(
        response: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<(), TransportError> {
        let response = response.map_err(|e| TransportError::Failed(e.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(TransportError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Failed(format!(
                "transport returned {status}: {body}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Outbound for HttpOutbound {
    async fn send_text(&self, correspondent_id: &str, text: &str) -> Result<(), TransportError> {
        let response = self
            .request("/send/text")
            .json(&TextSend {
                to: correspondent_id,
                text,
            })
            .send()
            .await;
        Self::check(response).await
    }

    async fn send_media(
        &self,
        correspondent_id: &str,
        url: &str,
        kind: MediaKind,
        caption: Option<&str>,
    ) -> Result<(), TransportError> {
        let response = self
            .request("/send/media")
            .json(&MediaSend {
                to: correspondent_id,
                url,
                kind,
                caption,
            })
            .send()
            .await;
        Self::check(response).await
    }

    async fn send_voice(
        &self,
        correspondent_id: &str,
        audio: &[u8],
    ) -> Result<(), TransportError> {
        let response = self
            .request("/send/voice")
            .query(&[("to", correspondent_id)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(audio.to_vec())
            .send()
            .await;
        Self::check(response).await
    }
}
