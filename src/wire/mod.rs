use serde::{Deserialize, Serialize};

// ========================================
// Generation request/outcome protocol
// ========================================

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Failure message for a call that came back without any text.
pub const NO_TEXT: &str = "No text generated.";

/// What the core hands to a backend. Backend-specific wire shapes live in
/// the provider adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            system_instruction: None,
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_instruction = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn temperature_or_default(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }
}

/// Outcome of one generation call.
///
/// Success and failure are distinct variants so callers can branch on them;
/// `into_field_text` renders either one as the text that lands in the
/// project field, which keeps saved projects readable the same way whether
/// or not the call succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "lowercase")]
pub enum Generation {
    Text(String),
    Failed(String),
}

impl Generation {
    pub fn is_ok(&self) -> bool {
        matches!(self, Generation::Text(_))
    }

    /// Text for a single-shot field.
    pub fn into_field_text(self) -> String {
        match self {
            Generation::Text(t) if t.is_empty() => format!("Error: {}", NO_TEXT),
            Generation::Text(t) => t,
            Generation::Failed(msg) if msg == NO_TEXT => format!("Error: {}", NO_TEXT),
            Generation::Failed(msg) => format!("System Failure: {}", msg),
        }
    }
}

/// Marker appended to a streamed field when the transport fails mid-stream.
pub fn connection_lost_marker(msg: &str) -> String {
    format!("\n[CONNECTION LOST: {}]", msg)
}
