use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use super::stream::{forward_lines, Frame};
use super::Provider;
use crate::wire::GenerationRequest;

pub struct Ollama {
    client: Client,
    url: String,
}

impl Ollama {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.url.trim_end_matches('/'))
    }

    async fn post(&self, req: &GenerationRequest, stream: bool) -> Result<reqwest::Response> {
        let url = self.chat_url();
        debug!("ollama: POST {}", url);
        let resp = self
            .client
            .post(&url)
            .json(&ChatRequest::new(req, stream))
            .send()
            .await
            .context("ollama request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("ollama error ({}): {}", status, text));
        }
        Ok(resp)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

impl<'a> ChatRequest<'a> {
    fn new(req: &'a GenerationRequest, stream: bool) -> Self {
        let mut messages = Vec::new();
        if let Some(sys) = req.system_instruction.as_deref().filter(|s| !s.is_empty()) {
            messages.push(Msg { role: "system", content: sys });
        }
        messages.push(Msg { role: "user", content: &req.prompt });
        Self {
            model: &req.model,
            messages,
            stream,
            options: OllamaOptions { temperature: req.temperature_or_default() },
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<MsgOut>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct MsgOut {
    #[serde(default)]
    content: String,
}

/// One NDJSON line of a streaming chat.
fn decode_line(line: &str) -> Result<Frame> {
    if line.trim().is_empty() {
        return Ok(Frame::Skip);
    }
    let parsed: ChatResponse =
        serde_json::from_str(line).map_err(|e| anyhow!("ollama stream parse error: {}", e))?;
    if let Some(err) = parsed.error {
        return Err(anyhow!("ollama error: {}", err));
    }
    let text = parsed.message.map(|m| m.content).unwrap_or_default();
    Ok(match (text.is_empty(), parsed.done) {
        (false, _) => Frame::Text(text),
        (true, true) => Frame::Done,
        (true, false) => Frame::Skip,
    })
}

#[async_trait]
impl Provider for Ollama {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn generate(&self, req: &GenerationRequest) -> Result<String> {
        let resp = self.post(req, false).await?;
        let text = resp.text().await.context("ollama read body failed")?;
        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| anyhow!("ollama response parse error: {}", e))?;
        if let Some(err) = parsed.error {
            return Err(anyhow!("ollama error: {}", err));
        }
        Ok(parsed.message.map(|m| m.content).unwrap_or_default())
    }

    async fn stream(&self, req: &GenerationRequest, tx: &mpsc::Sender<String>) -> Result<()> {
        let resp = self.post(req, true).await?;
        forward_lines(resp.bytes_stream(), tx, decode_line).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_shape() {
        let req = GenerationRequest::new("Write.", "llama3.1").with_system("Novelist.");
        let body = serde_json::to_value(ChatRequest::new(&req, true)).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Write.");
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn ndjson_frames() {
        assert_eq!(
            decode_line(r#"{"message":{"role":"assistant","content":"Dusk"},"done":false}"#).unwrap(),
            Frame::Text("Dusk".into())
        );
        assert_eq!(decode_line(r#"{"message":{"role":"assistant","content":""},"done":true}"#).unwrap(), Frame::Done);
        assert!(decode_line(r#"{"error":"model not found"}"#).is_err());
        assert_eq!(decode_line("  ").unwrap(), Frame::Skip);
    }

    #[test]
    fn chat_url_trims_slash() {
        let o = Ollama::new("http://localhost:11434/".into(), Duration::from_secs(1)).unwrap();
        assert_eq!(o.chat_url(), "http://localhost:11434/api/chat");
    }
}
