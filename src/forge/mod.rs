use clap::ValueEnum;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::ForgeError;
use crate::log::Transcript;
use crate::outline::{chapters_from_outline, MarkerSet};
use crate::project::{Language, Project, ProjectField};
use crate::prompt::{self, PERSONA_ANALYST, PERSONA_EDITOR, PERSONA_NOVELIST, PERSONA_THRILLER_WRITER};
use crate::provider::GenerationClient;
use crate::steps::Step;
use crate::wire::{Generation, GenerationRequest};

const STREAM_BUFFER: usize = 64;

/// Single gate serializing every generation. Cloning shares the flag.
#[derive(Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

/// Clears the flag when dropped.
pub struct BusyGuard(Arc<AtomicBool>);

impl BusyFlag {
    pub fn acquire(&self) -> Result<BusyGuard, ForgeError> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| BusyGuard(self.0.clone()))
            .map_err(|_| ForgeError::Busy)
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Setup fields the story-element generator can fill.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupField {
    Title,
    Protagonist,
    Antagonist,
    Setting,
    Tone,
}

impl SetupField {
    pub fn field(self) -> ProjectField {
        match self {
            SetupField::Title => ProjectField::Title,
            SetupField::Protagonist => ProjectField::Protagonist,
            SetupField::Antagonist => ProjectField::Antagonist,
            SetupField::Setting => ProjectField::Setting,
            SetupField::Tone => ProjectField::Tone,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Models {
    pub fast: String,
    pub pro: String,
}

/// Owns the project and runs every generation against it.
pub struct Forge {
    pub project: Project,
    language: Language,
    client: GenerationClient,
    models: Models,
    temperature: f32,
    markers: MarkerSet,
    busy: BusyFlag,
    transcript: Option<Transcript>,
}

impl Forge {
    pub fn new(client: GenerationClient, cfg: &Config, project: Project) -> anyhow::Result<Self> {
        Ok(Self {
            project,
            language: cfg.language,
            client,
            models: Models { fast: cfg.fast_model.clone(), pro: cfg.pro_model.clone() },
            temperature: cfg.temperature,
            markers: MarkerSet::new(cfg.outline_markers.iter().cloned())?,
            busy: BusyFlag::default(),
            transcript: None,
        })
    }

    pub fn with_transcript(mut self, root: &Path) -> Self {
        let t = Transcript::new(root);
        info!(dir = %t.dir().display(), "saving transcript");
        self.transcript = Some(t);
        self
    }

    pub fn language(&self) -> Language {
        self.language
    }

    #[cfg(test)]
    pub fn busy_flag(&self) -> BusyFlag {
        self.busy.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_set()
    }

    pub fn provider_name(&self) -> &'static str {
        self.client.provider_name()
    }

    fn once(&self, prompt: String, model: &str, persona: Option<&str>) -> GenerationRequest {
        let req = GenerationRequest::new(prompt, model).with_temperature(self.temperature);
        match persona {
            Some(p) => req.with_system(p),
            None => req,
        }
    }

    fn record(&mut self, stage: &str, req: &GenerationRequest, outcome: &Generation) {
        if !outcome.is_ok() {
            warn!(stage, "generation failed; failure text written to the field");
        }
        if let Some(t) = self.transcript.as_mut() {
            match t.save_stage(stage, req, outcome) {
                Ok(saved) => debug!(
                    stage,
                    request = %saved.request.display(),
                    outcome = %saved.outcome.display(),
                    "transcript saved"
                ),
                Err(e) => warn!(stage, error = %e, "could not save transcript"),
            }
        }
    }

    /// Single-shot generation straight into one project field.
    async fn fill(&mut self, stage: &str, field: ProjectField, req: GenerationRequest) -> Result<Generation, ForgeError> {
        let _busy = self.busy.acquire()?;
        info!(stage, model = %req.model, "generating");
        let outcome = self.client.generate_once(&req).await;
        self.project.set(field, outcome.clone().into_field_text());
        self.record(stage, &req, &outcome);
        Ok(outcome)
    }

    /// Stream a generation, handing each fragment to `apply` and `on_chunk`
    /// as it arrives. The returned text is everything received.
    async fn stream<F>(&mut self, req: &GenerationRequest, mut apply: F, on_chunk: &mut dyn FnMut(&str)) -> Generation
    where
        F: FnMut(&mut Project, &str),
    {
        let (tx, mut rx) = mpsc::channel::<String>(STREAM_BUFFER);
        let client = &self.client;
        let project = &mut self.project;
        let consume = async move {
            let mut acc = String::new();
            while let Some(chunk) = rx.recv().await {
                acc.push_str(&chunk);
                apply(&mut *project, chunk.as_str());
                on_chunk(chunk.as_str());
            }
            acc
        };
        let (outcome, acc) = tokio::join!(client.generate_streaming(req, tx), consume);
        match outcome {
            Generation::Text(_) => Generation::Text(acc),
            failed => failed,
        }
    }

    pub async fn suggest_field(&mut self, target: SetupField) -> Result<Generation, ForgeError> {
        let field = target.field();
        let req = self.once(
            prompt::story_element(field.as_str(), &self.project, self.language),
            &self.models.fast,
            Some(PERSONA_THRILLER_WRITER),
        );
        let _busy = self.busy.acquire()?;
        let outcome = self.client.generate_once(&req).await;
        self.project.set(field, prompt::clean_setup_value(&outcome.clone().into_field_text()));
        self.record("suggest", &req, &outcome);
        Ok(outcome)
    }

    pub async fn suggest_style(&mut self) -> Result<Generation, ForgeError> {
        let req = self.once(prompt::style_suggestion(&self.project, self.language), &self.models.fast, Some(PERSONA_ANALYST));
        self.fill("style", ProjectField::AuthorStyle, req).await
    }

    pub async fn generate_one_liner(&mut self) -> Result<Generation, ForgeError> {
        let req = self.once(prompt::one_liner(&self.project, self.language), &self.models.fast, Some(PERSONA_NOVELIST));
        self.fill("one-liner", ProjectField::OneLiner, req).await
    }

    pub async fn generate_skeleton(&mut self) -> Result<Generation, ForgeError> {
        let req = self.once(prompt::skeleton(&self.project, self.language), &self.models.pro, Some(PERSONA_NOVELIST));
        self.fill("skeleton", ProjectField::Skeleton, req).await
    }

    pub async fn generate_characters(&mut self) -> Result<Generation, ForgeError> {
        let req = self.once(prompt::characters(&self.project, self.language), &self.models.pro, Some(PERSONA_NOVELIST));
        self.fill("characters", ProjectField::Characters, req).await
    }

    pub async fn generate_world(&mut self) -> Result<Generation, ForgeError> {
        let req = self.once(prompt::world(&self.project, self.language), &self.models.pro, Some(PERSONA_NOVELIST));
        self.fill("world", ProjectField::World, req).await
    }

    pub async fn generate_dna(&mut self) -> Result<Generation, ForgeError> {
        let req = self.once(prompt::dna(self.language), &self.models.pro, Some(PERSONA_NOVELIST));
        self.fill("dna", ProjectField::Dna, req).await
    }

    /// Generates the raw outline and rebuilds the chapter list from it.
    /// Existing chapters are replaced.
    pub async fn generate_outline(&mut self) -> Result<Generation, ForgeError> {
        let req = self.once(prompt::outline(&self.project, self.language), &self.models.pro, Some(PERSONA_NOVELIST));
        let outcome = self.fill("outline", ProjectField::OutlineRaw, req).await?;
        self.project.chapters = chapters_from_outline(&self.project.outline_raw, &self.markers);
        info!(chapters = self.project.chapters.len(), "outline parsed");
        Ok(outcome)
    }

    /// Stream chapter `number` (1-based) into its content.
    pub async fn write_chapter(&mut self, number: usize, on_chunk: &mut dyn FnMut(&str)) -> Result<Generation, ForgeError> {
        self.project.chapter(number)?;
        let index = number - 1;
        let req = GenerationRequest::new(prompt::write_chapter(&self.project, index, self.language), &self.models.pro)
            .with_system(PERSONA_NOVELIST);
        let _busy = self.busy.acquire()?;
        info!(chapter = number, model = %req.model, "writing chapter");
        self.project.chapters[index].content.clear();
        let outcome = self
            .stream(&req, |p, chunk| p.chapters[index].content.push_str(chunk), on_chunk)
            .await;
        self.record("write-chapter", &req, &outcome);
        Ok(outcome)
    }

    pub async fn critique_chapter(&mut self, number: usize) -> Result<Generation, ForgeError> {
        let chapter = self.project.chapter(number)?;
        let req = self.once(prompt::critique(chapter, self.language), &self.models.fast, Some(PERSONA_EDITOR));
        let _busy = self.busy.acquire()?;
        let outcome = self.client.generate_once(&req).await;
        self.project.chapters[number - 1].critique = outcome.clone().into_field_text();
        self.record("critique", &req, &outcome);
        Ok(outcome)
    }

    pub async fn consistency_check(&mut self) -> Result<Generation, ForgeError> {
        let req = self.once(prompt::consistency(&self.project, self.language), &self.models.pro, Some(PERSONA_EDITOR));
        self.fill("consistency", ProjectField::ConsistencyReport, req).await
    }

    /// Stream a polished rewrite of chapter `number` into the manuscript field.
    pub async fn polish(&mut self, number: usize, on_chunk: &mut dyn FnMut(&str)) -> Result<Generation, ForgeError> {
        let chapter = self.project.chapter(number)?;
        if chapter.content.is_empty() {
            return Err(ForgeError::EmptyChapter(number));
        }
        let req = GenerationRequest::new(prompt::polish(&self.project, chapter, self.language), &self.models.pro)
            .with_system(PERSONA_NOVELIST);
        let _busy = self.busy.acquire()?;
        info!(chapter = number, "polishing");
        self.project.polished_manuscript.clear();
        let outcome = self
            .stream(&req, |p, chunk| p.polished_manuscript.push_str(chunk), on_chunk)
            .await;
        self.record("polish", &req, &outcome);
        Ok(outcome)
    }

    pub async fn generate_cover_prompt(&mut self) -> Result<Generation, ForgeError> {
        let req = self.once(prompt::cover(&self.project), &self.models.fast, Some(PERSONA_NOVELIST));
        self.fill("cover", ProjectField::CoverPrompt, req).await
    }

    /// Blurb and keywords, requested concurrently.
    pub async fn generate_marketing(&mut self) -> Result<(Generation, Generation), ForgeError> {
        let blurb_req = self.once(prompt::blurb(&self.project, self.language), &self.models.fast, None);
        let keywords_req = self.once(prompt::keywords(self.language), &self.models.fast, None);
        let _busy = self.busy.acquire()?;
        let (blurb, keywords) = tokio::join!(
            self.client.generate_once(&blurb_req),
            self.client.generate_once(&keywords_req)
        );
        self.project.blurb = blurb.clone().into_field_text();
        self.project.keywords = keywords.clone().into_field_text();
        self.record("blurb", &blurb_req, &blurb);
        self.record("keywords", &keywords_req, &keywords);
        Ok((blurb, keywords))
    }

    /// The generation behind a wizard step. Steps that work per chapter or
    /// have no generation are rejected.
    pub async fn generate_step(&mut self, step: Step) -> Result<Generation, ForgeError> {
        match step {
            Step::OneLiner => self.generate_one_liner().await,
            Step::Skeleton => self.generate_skeleton().await,
            Step::Characters => self.generate_characters().await,
            Step::World => self.generate_world().await,
            Step::Dna => self.generate_dna().await,
            Step::Outline => self.generate_outline().await,
            Step::Consistency => self.consistency_check().await,
            Step::CoverArt => self.generate_cover_prompt().await,
            Step::Blurb | Step::Keywords => {
                let (blurb, keywords) = self.generate_marketing().await?;
                Ok(if blurb.is_ok() { keywords } else { blurb })
            }
            Step::Setup | Step::ChapterGen | Step::ErrorKiller | Step::Polish | Step::Manual => {
                Err(ForgeError::NotGenerative(step.label().to_string()))
            }
        }
    }
}
