use anyhow::{Context, Result};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cli::ProviderKind;
use crate::outline::DEFAULT_MARKERS;
use crate::project::Language;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema_version: String,
    pub provider: ProviderKind,
    pub language: Language,
    /// Quick calls: logline, setup fields, critique, cover, marketing.
    pub fast_model: String,
    /// Long-form calls: skeleton, bibles, outline, chapters, polish.
    pub pro_model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub gemini_url: String,
    pub openai_url: String,
    pub ollama_url: String,
    pub autopilot_tick_ms: u64,
    pub outline_markers: Vec<String>,
    pub transcript_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: "2025-10-01".into(),
            provider: ProviderKind::Gemini,
            language: Language::Ru,
            fast_model: "gemini-2.5-flash".into(),
            pro_model: "gemini-3-pro-preview".into(),
            temperature: 0.7,
            timeout_secs: 600,
            gemini_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            openai_url: "https://api.openai.com/v1".into(),
            ollama_url: "http://localhost:11434".into(),
            autopilot_tick_ms: 1000,
            outline_markers: DEFAULT_MARKERS.iter().map(|s| s.to_string()).collect(),
            transcript_dir: ".forge".into(),
        }
    }
}

impl Config {
    /// Defaults overlaid with whatever keys the TOML file sets.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = Config::from_toml_str(
            r#"
provider = "ollama"
pro_model = "llama3.1:70b"
outline_markers = ["Chapter", "Act"]
"#,
        )
        .unwrap();
        assert!(matches!(cfg.provider, ProviderKind::Ollama));
        assert_eq!(cfg.pro_model, "llama3.1:70b");
        assert_eq!(cfg.fast_model, "gemini-2.5-flash");
        assert_eq!(cfg.outline_markers, vec!["Chapter", "Act"]);
        assert_eq!(cfg.autopilot_tick_ms, 1000);
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(Config::from_toml_str("provider = 3").is_err());
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forge.toml");
        fs::write(&path, "language = \"en\"\nautopilot_tick_ms = 10\n").unwrap();
        let cfg = Config::from_toml_file(&path).unwrap();
        assert_eq!(cfg.language, Language::En);
        assert_eq!(cfg.autopilot_tick_ms, 10);
    }
}
