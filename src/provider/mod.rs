use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cli::ProviderKind;
use crate::config::Config;
use crate::wire::{connection_lost_marker, Generation, GenerationRequest, NO_TEXT};

pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod stream;

/// A text-generation backend.
///
/// `stream` pushes fragments into `tx` in arrival order and returns once the
/// backend signals the end. A closed receiver means the consumer lost
/// interest; implementations stop reading and return `Ok(())`.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn generate(&self, req: &GenerationRequest) -> Result<String>;
    async fn stream(&self, req: &GenerationRequest, tx: &mpsc::Sender<String>) -> Result<()>;
}

pub type DynProvider = Box<dyn Provider + Send + Sync>;

pub fn make_provider(kind: ProviderKind, cfg: &Config) -> Result<DynProvider> {
    let timeout = Duration::from_secs(cfg.timeout_secs);
    match kind {
        ProviderKind::Gemini => {
            let api_key = std::env::var("GEMINI_API_KEY")
                .or_else(|_| std::env::var("API_KEY"))
                .map_err(|_| anyhow!("GEMINI_API_KEY (or API_KEY) env var is not set"))?;
            Ok(Box::new(gemini::GeminiProvider::new(api_key, cfg.gemini_url.clone(), timeout)?))
        }
        ProviderKind::OpenAI => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .map_err(|_| anyhow!("OPENAI_API_KEY env var is not set"))?;
            Ok(Box::new(openai::OpenAIProvider::new(api_key, cfg.openai_url.clone(), timeout)?))
        }
        ProviderKind::Ollama => Ok(Box::new(ollama::Ollama::new(cfg.ollama_url.clone(), timeout)?)),
    }
}

/// Wraps a provider with the error contract the rest of the core relies on:
/// generation never returns `Err`, failures come back as
/// [`Generation::Failed`].
pub struct GenerationClient {
    provider: DynProvider,
}

impl GenerationClient {
    pub fn new(provider: DynProvider) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// A reply without any text (a blocked prompt, for one) is a failure.
    pub async fn generate_once(&self, req: &GenerationRequest) -> Generation {
        debug!(provider = self.provider.name(), model = %req.model, "generate_once");
        match self.provider.generate(req).await {
            Ok(text) if text.trim().is_empty() => {
                warn!(provider = self.provider.name(), "empty reply");
                Generation::Failed(NO_TEXT.to_string())
            }
            Ok(text) => Generation::Text(text),
            Err(e) => {
                warn!(provider = self.provider.name(), error = %format!("{e:#}"), "generation failed");
                Generation::Failed(format!("{e:#}"))
            }
        }
    }

    /// Stream into `tx`. On transport failure one final marker chunk is sent
    /// after whatever partial output already went out; `tx` is dropped on
    /// return so the consumer sees the end of the stream.
    pub async fn generate_streaming(&self, req: &GenerationRequest, tx: mpsc::Sender<String>) -> Generation {
        debug!(provider = self.provider.name(), model = %req.model, "generate_streaming");
        match self.provider.stream(req, &tx).await {
            Ok(()) => Generation::Text(String::new()),
            Err(e) => {
                let msg = format!("{e:#}");
                warn!(provider = self.provider.name(), error = %msg, "stream failed");
                let _ = tx.send(connection_lost_marker(&msg)).await;
                Generation::Failed(msg)
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    //! Scripted in-memory provider for orchestration tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    pub enum Scripted {
        Text(String),
        Chunks(Vec<String>),
        /// Emit these chunks, then fail.
        Broken(Vec<String>, String),
        Fail(String),
    }

    #[derive(Clone, Default)]
    pub struct ScriptedProvider {
        pub replies: Arc<Mutex<VecDeque<Scripted>>>,
        pub calls: Arc<Mutex<Vec<GenerationRequest>>>,
    }

    impl ScriptedProvider {
        pub fn new(replies: impl IntoIterator<Item = Scripted>) -> Self {
            Self {
                replies: Arc::new(Mutex::new(replies.into_iter().collect())),
                calls: Arc::default(),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn prompts(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|r| r.prompt.clone()).collect()
        }

        fn next(&self, req: &GenerationRequest) -> Scripted {
            self.calls.lock().unwrap().push(req.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Scripted::Text(String::new()))
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn generate(&self, req: &GenerationRequest) -> Result<String> {
            match self.next(req) {
                Scripted::Text(t) => Ok(t),
                Scripted::Chunks(c) => Ok(c.concat()),
                Scripted::Broken(_, e) | Scripted::Fail(e) => Err(anyhow!(e)),
            }
        }

        async fn stream(&self, req: &GenerationRequest, tx: &mpsc::Sender<String>) -> Result<()> {
            let (chunks, err) = match self.next(req) {
                Scripted::Text(t) => (vec![t], None),
                Scripted::Chunks(c) => (c, None),
                Scripted::Broken(c, e) => (c, Some(e)),
                Scripted::Fail(e) => (vec![], Some(e)),
            };
            for c in chunks {
                if tx.send(c).await.is_err() {
                    return Ok(());
                }
            }
            match err {
                Some(e) => Err(anyhow!(e)),
                None => Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Scripted, ScriptedProvider};
    use super::*;

    fn client(replies: Vec<Scripted>) -> GenerationClient {
        GenerationClient::new(Box::new(ScriptedProvider::new(replies)))
    }

    #[tokio::test]
    async fn once_turns_errors_into_failed() {
        let c = client(vec![Scripted::Text("hook".into()), Scripted::Fail("503 overloaded".into())]);
        let req = GenerationRequest::new("p", "m");
        assert_eq!(c.generate_once(&req).await, Generation::Text("hook".into()));
        assert_eq!(c.generate_once(&req).await, Generation::Failed("503 overloaded".into()));
    }

    #[tokio::test]
    async fn empty_reply_is_a_failure() {
        let c = client(vec![Scripted::Text(String::new()), Scripted::Text(" \n".into())]);
        let req = GenerationRequest::new("p", "m");
        assert_eq!(c.generate_once(&req).await, Generation::Failed(NO_TEXT.into()));
        let blank = c.generate_once(&req).await;
        assert!(!blank.is_ok());
        assert_eq!(blank.into_field_text(), "Error: No text generated.");
    }

    #[tokio::test]
    async fn streaming_failure_appends_marker_after_partial_output() {
        let c = client(vec![Scripted::Broken(vec!["He ".into(), "ran.".into()], "reset".into())]);
        let (tx, mut rx) = mpsc::channel(8);
        let req = GenerationRequest::new("p", "m");
        let (outcome, got) = tokio::join!(c.generate_streaming(&req, tx), async {
            let mut acc = String::new();
            while let Some(chunk) = rx.recv().await {
                acc.push_str(&chunk);
            }
            acc
        });
        assert_eq!(outcome, Generation::Failed("reset".into()));
        assert_eq!(got, "He ran.\n[CONNECTION LOST: reset]");
    }

    #[tokio::test]
    async fn streaming_stops_quietly_when_consumer_leaves() {
        let c = client(vec![Scripted::Chunks(vec!["a".into(), "b".into(), "c".into()])]);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let outcome = c.generate_streaming(&GenerationRequest::new("p", "m"), tx).await;
        assert!(outcome.is_ok());
    }

    #[test]
    fn ollama_needs_no_key() {
        let cfg = Config::default();
        let p = make_provider(ProviderKind::Ollama, &cfg).unwrap();
        assert_eq!(p.name(), "ollama");
    }
}
