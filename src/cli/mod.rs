use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::Config;
use crate::forge::SetupField;
use crate::project::{ChapterField, Language, ProjectField};
use crate::steps::Step;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[value(alias = "google")]
    Gemini,
    #[value(name = "openai", alias = "open-ai")]
    OpenAI,
    Ollama,
}

#[derive(Parser, Debug)]
#[command(name = "thriller-forge", version, about = "Plan and write a thriller novel step by step with an LLM")]
pub struct Args {
    /// Project file every command reads and writes.
    #[arg(long, global = true, default_value = "project.json")]
    pub project: PathBuf,

    #[arg(long, global = true, value_enum)]
    pub provider: Option<ProviderKind>,

    /// Output language for generated text.
    #[arg(long, global = true, value_enum)]
    pub lang: Option<Language>,

    /// TOML file overriding the built-in defaults.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true)]
    pub fast_model: Option<String>,

    #[arg(long, global = true)]
    pub pro_model: Option<String>,

    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    /// Write each request and outcome under the transcript directory.
    #[arg(long, global = true, default_value_t = false)]
    pub save_transcript: bool,

    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a project from the language template.
    New {
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Print the project, or one step's content.
    Show {
        #[arg(long, value_enum)]
        step: Option<Step>,
    },
    /// Overwrite a project field by hand (`-` reads stdin).
    Set { field: ProjectField, value: String },
    /// Overwrite one field of chapter N (`-` reads stdin).
    SetChapter {
        number: usize,
        #[arg(value_enum)]
        field: ChapterField,
        value: String,
    },
    /// Ask for a setup field suggestion.
    Suggest {
        #[arg(value_enum)]
        field: SetupField,
    },
    /// Suggest an author-style blend for the current setup.
    Style,
    /// Run the generation behind a step.
    Generate {
        #[arg(value_enum)]
        step: Step,
    },
    /// Stream chapter N.
    Write { number: usize },
    /// Editorial critique of chapter N.
    Critique { number: usize },
    /// Stream a polished rewrite of chapter N.
    Polish { number: usize },
    /// Walk the planning steps until the outline checkpoint. Ctrl-C disarms.
    Autopilot {
        #[arg(long, value_enum, default_value_t = Step::Setup)]
        from: Step,
    },
    /// Parse outline text (file or `-` for stdin; the project's outline otherwise).
    ParseOutline {
        input: Option<String>,
        /// Rebuild the project's chapters from the parsed text.
        #[arg(long, default_value_t = false)]
        apply: bool,
    },
    /// Write the project as pretty JSON.
    Export { path: Option<PathBuf> },
    /// Replace the project with a JSON document.
    Import { path: PathBuf },
    /// Switch output language.
    Lang {
        #[arg(value_enum)]
        lang: Language,
    },
}

impl Args {
    /// CLI flags are the last configuration layer.
    pub fn apply_to(&self, cfg: &mut Config) {
        if let Some(p) = self.provider {
            cfg.provider = p;
        }
        if let Some(l) = self.lang {
            cfg.language = l;
        }
        if let Some(m) = &self.fast_model {
            cfg.fast_model = m.clone();
        }
        if let Some(m) = &self.pro_model {
            cfg.pro_model = m.clone();
        }
        if let Some(t) = self.timeout_secs {
            cfg.timeout_secs = t;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = Args::parse_from([
            "thriller-forge",
            "--provider",
            "openai",
            "--pro-model",
            "gpt-4.1",
            "--lang",
            "en",
            "generate",
            "skeleton",
        ]);
        let mut cfg = Config::default();
        args.apply_to(&mut cfg);
        assert_eq!(cfg.provider, ProviderKind::OpenAI);
        assert_eq!(cfg.pro_model, "gpt-4.1");
        assert_eq!(cfg.fast_model, Config::default().fast_model);
        assert_eq!(cfg.language, Language::En);
        assert!(matches!(args.command, Command::Generate { step: Step::Skeleton }));
    }

    #[test]
    fn step_aliases_and_field_names() {
        let args = Args::parse_from(["thriller-forge", "generate", "marketing"]);
        assert!(matches!(args.command, Command::Generate { step: Step::Blurb }));

        let args = Args::parse_from(["thriller-forge", "set", "author-style", "Le Carre"]);
        match args.command {
            Command::Set { field, value } => {
                assert_eq!(field, ProjectField::AuthorStyle);
                assert_eq!(value, "Le Carre");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_field_is_rejected() {
        assert!(Args::try_parse_from(["thriller-forge", "set", "budget", "x"]).is_err());
    }

    #[test]
    fn autopilot_defaults_to_setup() {
        let args = Args::parse_from(["thriller-forge", "--project", "p.json", "autopilot"]);
        assert!(matches!(args.command, Command::Autopilot { from: Step::Setup }));
        assert_eq!(args.project, PathBuf::from("p.json"));
    }
}
