use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use super::stream::{forward_lines, sse_data, Frame};
use super::Provider;
use crate::wire::GenerationRequest;

/// OpenAI-compatible chat completions endpoint.
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    api_base: String,
}

impl OpenAIProvider {
    pub fn new(api_key: String, api_base: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, api_key, api_base })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response> {
        let url = self.url();
        debug!("openai: POST {}", url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .context("openai request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error ({}): {}", status, text));
        }
        Ok(resp)
    }
}

fn chat_body(req: &GenerationRequest, stream: bool) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = req.system_instruction.as_deref().filter(|s| !s.is_empty()) {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": req.prompt }));
    json!({
        "model": req.model,
        "messages": messages,
        "temperature": req.temperature_or_default(),
        "stream": stream,
    })
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: Delta,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

fn decode_sse(line: &str) -> Result<Frame> {
    let Some(data) = sse_data(line) else {
        return Ok(Frame::Skip);
    };
    if data == "[DONE]" {
        return Ok(Frame::Done);
    }
    let chunk: ChatChunk =
        serde_json::from_str(data).map_err(|e| anyhow!("openai stream parse error: {}", e))?;
    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect();
    Ok(if text.is_empty() { Frame::Skip } else { Frame::Text(text) })
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(&self, req: &GenerationRequest) -> Result<String> {
        let resp = self.post(&chat_body(req, false)).await?;
        let text = resp.text().await.context("openai read body failed")?;
        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse OpenAI response: {e}\nRaw: {text}"))?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn stream(&self, req: &GenerationRequest, tx: &mpsc::Sender<String>) -> Result<()> {
        let resp = self.post(&chat_body(req, true)).await?;
        forward_lines(resp.bytes_stream(), tx, decode_sse).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_puts_system_first() {
        let req = GenerationRequest::new("Write.", "gpt-4.1-mini").with_system("Editor.").with_temperature(0.2);
        let body = chat_body(&req, true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Write.");
        assert_eq!(body["stream"], true);
        assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);

        let bare = chat_body(&GenerationRequest::new("x", "m"), false);
        assert_eq!(bare["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn url_joins_base() {
        let p = OpenAIProvider::new("k".into(), "https://api.openai.com/v1/".into(), Duration::from_secs(1)).unwrap();
        assert_eq!(p.url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn stream_frames() {
        assert_eq!(
            decode_sse(r#"data: {"choices":[{"delta":{"content":"Rain"}}]}"#).unwrap(),
            Frame::Text("Rain".into())
        );
        assert_eq!(decode_sse(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(), Frame::Skip);
        assert_eq!(decode_sse("data: [DONE]").unwrap(), Frame::Done);
        assert_eq!(decode_sse("").unwrap(), Frame::Skip);
    }
}
