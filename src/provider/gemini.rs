use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use super::stream::{forward_lines, sse_data, Frame};
use super::Provider;
use crate::wire::GenerationRequest;

pub struct GeminiProvider {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, endpoint: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, api_key, endpoint })
    }

    fn build_url(&self, model: &str, stream: bool) -> String {
        let base = self.endpoint.trim_end_matches('/');
        if stream {
            format!("{}/models/{}:streamGenerateContent?alt=sse", base, model)
        } else {
            format!("{}/models/{}:generateContent", base, model)
        }
    }

    async fn post(&self, req: &GenerationRequest, stream: bool) -> Result<reqwest::Response> {
        let url = self.build_url(&req.model, stream);
        debug!("gemini: POST {}", url);
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&GeminiRequest::from(req))
            .send()
            .await
            .context("gemini request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini API error ({}): {}", status, error_message(&text)));
        }
        Ok(resp)
    }
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

impl<'a> From<&'a GenerationRequest> for GeminiRequest<'a> {
    fn from(req: &'a GenerationRequest) -> Self {
        Self {
            contents: vec![Content { role: "user", parts: vec![Part { text: &req.prompt }] }],
            system_instruction: req
                .system_instruction
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(|s| SystemInstruction { parts: vec![Part { text: s }] }),
            generation_config: GenerationConfig { temperature: req.temperature_or_default() },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<PartOut>,
}

#[derive(Debug, Deserialize)]
struct PartOut {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate.
    fn text(self) -> Result<String> {
        if let Some(err) = self.error {
            return Err(anyhow!("Gemini API error: {}", err.message));
        }
        Ok(self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
            .unwrap_or_default())
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}

/// One SSE line of `streamGenerateContent`.
fn decode_sse(line: &str) -> Result<Frame> {
    let Some(data) = sse_data(line) else {
        return Ok(Frame::Skip);
    };
    let parsed: GeminiResponse =
        serde_json::from_str(data).map_err(|e| anyhow!("gemini stream parse error: {}", e))?;
    let text = parsed.text()?;
    Ok(if text.is_empty() { Frame::Skip } else { Frame::Text(text) })
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate(&self, req: &GenerationRequest) -> Result<String> {
        let resp = self.post(req, false).await?;
        let text = resp.text().await.context("gemini read body failed")?;
        let parsed: GeminiResponse =
            serde_json::from_str(&text).map_err(|e| anyhow!("gemini response parse error: {}", e))?;
        parsed.text()
    }

    async fn stream(&self, req: &GenerationRequest, tx: &mpsc::Sender<String>) -> Result<()> {
        let resp = self.post(req, true).await?;
        forward_lines(resp.bytes_stream(), tx, decode_sse).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GeminiProvider {
        GeminiProvider::new(
            "test-key".into(),
            "https://generativelanguage.googleapis.com/v1beta/".into(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn builds_both_urls() {
        let p = provider();
        assert_eq!(
            p.build_url("gemini-2.5-flash", false),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert!(p.build_url("gemini-2.5-flash", true).ends_with(":streamGenerateContent?alt=sse"));
        assert!(!p.build_url("m", false).contains("test-key"));
    }

    #[test]
    fn request_body_shape() {
        let req = GenerationRequest::new("Write.", "m").with_system("You are terse.");
        let body = serde_json::to_value(GeminiRequest::from(&req)).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Write.");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You are terse.");
        assert!((body["generationConfig"]["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);

        let bare = serde_json::to_value(GeminiRequest::from(&GenerationRequest::new("x", "m"))).unwrap();
        assert!(bare.get("systemInstruction").is_none());
    }

    #[test]
    fn response_parts_are_joined() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Chapter 1"},{"text":": Breach"}]}}]}"#;
        let parsed: GeminiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.text().unwrap(), "Chapter 1: Breach");
    }

    #[test]
    fn api_error_surfaces() {
        let parsed: GeminiResponse = serde_json::from_str(r#"{"error":{"message":"quota","code":429}}"#).unwrap();
        assert!(parsed.text().unwrap_err().to_string().contains("quota"));
        assert_eq!(error_message(r#"{"error":{"message":"bad key"}}"#), "bad key");
        assert_eq!(error_message("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn sse_lines_decode() {
        assert_eq!(
            decode_sse(r#"data: {"candidates":[{"content":{"parts":[{"text":"He ran"}]}}]}"#).unwrap(),
            Frame::Text("He ran".into())
        );
        assert_eq!(decode_sse("").unwrap(), Frame::Skip);
        assert_eq!(decode_sse(r#"data: {"candidates":[{"finishReason":"STOP"}]}"#).unwrap(), Frame::Skip);
        assert!(decode_sse("data: {not json").is_err());
    }

    #[tokio::test]
    #[ignore = "requires live GEMINI_API_KEY and network"]
    async fn live_generation() {
        let Ok(key) = std::env::var("GEMINI_API_KEY") else {
            return;
        };
        let p = GeminiProvider::new(key, crate::config::Config::default().gemini_url, Duration::from_secs(60)).unwrap();
        let text = p.generate(&GenerationRequest::new("Reply with exactly: OK", "gemini-2.5-flash")).await.unwrap();
        assert!(!text.trim().is_empty());
    }
}
