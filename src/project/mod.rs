use anyhow::{Context, Result};
use clap::ValueEnum;
use fs_err as fs;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;
use tempfile::NamedTempFile;

use crate::errors::ForgeError;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Ru,
}

impl Language {
    /// Directive appended to every prompt (except the cover prompt, which is
    /// always English).
    pub fn directive(self) -> &'static str {
        match self {
            Language::Ru => "IMPORTANT: Output strictly in Russian language.",
            Language::En => "Output in English.",
        }
    }

    pub fn template(self) -> Project {
        match self {
            Language::En => Project {
                title: "Untitled Project".into(),
                author_style: "Dan Brown mixed with John Wick".into(),
                tone: "Dark, gritty, 18+, blood and tactical realism".into(),
                protagonist: "Ex-PMC Operative".into(),
                antagonist: "Corrupt Intelligence Director".into(),
                setting: "Cyberpunk Moscow, 2035".into(),
                ..Project::default()
            },
            Language::Ru => Project {
                title: "Проект 'Тишина'".into(),
                author_style: "Смесь Дэна Брауна и Джона Уика".into(),
                tone: "Мрачный, жесткий, 18+, кровь и тактический реализм".into(),
                protagonist: "Бывший оперативник ЧВК".into(),
                antagonist: "Коррумпированный директор разведки".into(),
                setting: "Киберпанк Москва, 2035".into(),
                ..Project::default()
            },
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Language::En => "en",
            Language::Ru => "ru",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Chapter {
    pub id: u32,
    pub title: String,
    /// From the outline.
    pub summary: String,
    /// Generated prose.
    pub content: String,
    /// Editorial feedback.
    pub critique: String,
}

/// One writing session. Field names on disk are camelCase and must stay
/// stable so project files remain interchangeable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    pub title: String,
    pub author_style: String,
    pub tone: String,
    pub protagonist: String,
    pub antagonist: String,
    pub setting: String,

    pub one_liner: String,
    pub skeleton: String,

    pub characters: String,
    /// World rules plus the inventory bible.
    pub world: String,
    /// Dialogue tone, violence doctrine, tension curve.
    pub dna: String,

    pub outline_raw: String,
    pub chapters: Vec<Chapter>,
    pub consistency_report: String,
    pub polished_manuscript: String,
    pub cover_prompt: String,
    pub blurb: String,
    pub keywords: String,
}

impl Project {
    /// True when the title still matches one of the language templates.
    pub fn is_untouched(&self) -> bool {
        self.title == Language::En.template().title || self.title == Language::Ru.template().title
    }

    /// Language switch rule: an untouched project is replaced by the new
    /// language's template, anything else is kept. Returns whether it swapped.
    pub fn switch_language(&mut self, lang: Language) -> bool {
        if !self.is_untouched() {
            return false;
        }
        *self = lang.template();
        true
    }

    pub fn get(&self, field: ProjectField) -> &str {
        match field {
            ProjectField::Title => &self.title,
            ProjectField::AuthorStyle => &self.author_style,
            ProjectField::Tone => &self.tone,
            ProjectField::Protagonist => &self.protagonist,
            ProjectField::Antagonist => &self.antagonist,
            ProjectField::Setting => &self.setting,
            ProjectField::OneLiner => &self.one_liner,
            ProjectField::Skeleton => &self.skeleton,
            ProjectField::Characters => &self.characters,
            ProjectField::World => &self.world,
            ProjectField::Dna => &self.dna,
            ProjectField::OutlineRaw => &self.outline_raw,
            ProjectField::ConsistencyReport => &self.consistency_report,
            ProjectField::PolishedManuscript => &self.polished_manuscript,
            ProjectField::CoverPrompt => &self.cover_prompt,
            ProjectField::Blurb => &self.blurb,
            ProjectField::Keywords => &self.keywords,
        }
    }

    pub fn set(&mut self, field: ProjectField, value: impl Into<String>) {
        let slot = match field {
            ProjectField::Title => &mut self.title,
            ProjectField::AuthorStyle => &mut self.author_style,
            ProjectField::Tone => &mut self.tone,
            ProjectField::Protagonist => &mut self.protagonist,
            ProjectField::Antagonist => &mut self.antagonist,
            ProjectField::Setting => &mut self.setting,
            ProjectField::OneLiner => &mut self.one_liner,
            ProjectField::Skeleton => &mut self.skeleton,
            ProjectField::Characters => &mut self.characters,
            ProjectField::World => &mut self.world,
            ProjectField::Dna => &mut self.dna,
            ProjectField::OutlineRaw => &mut self.outline_raw,
            ProjectField::ConsistencyReport => &mut self.consistency_report,
            ProjectField::PolishedManuscript => &mut self.polished_manuscript,
            ProjectField::CoverPrompt => &mut self.cover_prompt,
            ProjectField::Blurb => &mut self.blurb,
            ProjectField::Keywords => &mut self.keywords,
        };
        *slot = value.into();
    }

    pub fn chapter_mut(&mut self, number: usize) -> Result<&mut Chapter, ForgeError> {
        number
            .checked_sub(1)
            .and_then(|i| self.chapters.get_mut(i))
            .ok_or(ForgeError::MissingChapter(number))
    }

    pub fn chapter(&self, number: usize) -> Result<&Chapter, ForgeError> {
        number
            .checked_sub(1)
            .and_then(|i| self.chapters.get(i))
            .ok_or(ForgeError::MissingChapter(number))
    }
}

/// Every text field of a [`Project`], addressable by its on-disk name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectField {
    Title,
    AuthorStyle,
    Tone,
    Protagonist,
    Antagonist,
    Setting,
    OneLiner,
    Skeleton,
    Characters,
    World,
    Dna,
    OutlineRaw,
    ConsistencyReport,
    PolishedManuscript,
    CoverPrompt,
    Blurb,
    Keywords,
}

impl ProjectField {
    pub const ALL: [ProjectField; 17] = [
        ProjectField::Title,
        ProjectField::AuthorStyle,
        ProjectField::Tone,
        ProjectField::Protagonist,
        ProjectField::Antagonist,
        ProjectField::Setting,
        ProjectField::OneLiner,
        ProjectField::Skeleton,
        ProjectField::Characters,
        ProjectField::World,
        ProjectField::Dna,
        ProjectField::OutlineRaw,
        ProjectField::ConsistencyReport,
        ProjectField::PolishedManuscript,
        ProjectField::CoverPrompt,
        ProjectField::Blurb,
        ProjectField::Keywords,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectField::Title => "title",
            ProjectField::AuthorStyle => "authorStyle",
            ProjectField::Tone => "tone",
            ProjectField::Protagonist => "protagonist",
            ProjectField::Antagonist => "antagonist",
            ProjectField::Setting => "setting",
            ProjectField::OneLiner => "oneLiner",
            ProjectField::Skeleton => "skeleton",
            ProjectField::Characters => "characters",
            ProjectField::World => "world",
            ProjectField::Dna => "dna",
            ProjectField::OutlineRaw => "outlineRaw",
            ProjectField::ConsistencyReport => "consistencyReport",
            ProjectField::PolishedManuscript => "polishedManuscript",
            ProjectField::CoverPrompt => "coverPrompt",
            ProjectField::Blurb => "blurb",
            ProjectField::Keywords => "keywords",
        }
    }
}

impl fmt::Display for ProjectField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts the camelCase file name as well as kebab/snake spellings.
impl FromStr for ProjectField {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        ProjectField::ALL
            .into_iter()
            .find(|f| f.as_str().to_lowercase() == norm)
            .ok_or_else(|| ForgeError::UnknownField(s.to_string()))
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterField {
    Title,
    Summary,
    Content,
    Critique,
}

impl Chapter {
    pub fn set(&mut self, field: ChapterField, value: impl Into<String>) {
        let slot = match field {
            ChapterField::Title => &mut self.title,
            ChapterField::Summary => &mut self.summary,
            ChapterField::Content => &mut self.content,
            ChapterField::Critique => &mut self.critique,
        };
        *slot = value.into();
    }
}

// ---------- store ----------

/// Pretty JSON document of the whole project.
pub fn export_json(project: &Project) -> Result<String> {
    Ok(serde_json::to_string_pretty(project)?)
}

/// Parse a project document. A document is accepted only when it is a JSON
/// object carrying a `title` key; anything else is rejected whole.
pub fn import_json(text: &str) -> Result<Project, ForgeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ForgeError::InvalidProject(e.to_string()))?;
    if value.get("title").is_none() {
        return Err(ForgeError::InvalidProject("missing `title` field".into()));
    }
    serde_json::from_value(value).map_err(|e| ForgeError::InvalidProject(e.to_string()))
}

/// Replace `current` with the imported document, or leave it untouched.
pub fn import_into(current: &mut Project, text: &str) -> Result<(), ForgeError> {
    *current = import_json(text)?;
    Ok(())
}

/// `thrillerforge-<slug>.json`
pub fn export_file_name(title: &str) -> String {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    let re = NON_WORD.get_or_init(|| Regex::new(r"[^A-Za-z0-9_]+").expect("static regex"));
    format!("thrillerforge-{}.json", re.replace_all(title, "-").to_lowercase())
}

pub fn load(path: &Path) -> Result<Project> {
    let text = fs::read_to_string(path)?;
    import_json(&text).with_context(|| format!("loading {}", path.display()))
}

/// Write atomically: temp file next to the target, then persist over it.
pub fn save(path: &Path, project: &Project) -> Result<u64> {
    let data = export_json(project)?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let tmp = NamedTempFile::new_in(dir)?;
    fs::write(tmp.path(), &data)?;
    tmp.persist(path)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(data.len() as u64)
}
