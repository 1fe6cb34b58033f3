use clap::ValueEnum;
use std::fmt;

use crate::project::{Project, ProjectField};

/// Wizard steps. The first eight form the autopilot sequence; the rest are
/// peripheral and reached only by hand.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Setup,
    #[value(alias = "hook", alias = "logline")]
    OneLiner,
    Skeleton,
    Characters,
    World,
    Dna,
    Outline,
    #[value(alias = "execution", alias = "chapters")]
    ChapterGen,
    #[value(alias = "kill-house", alias = "critique")]
    ErrorKiller,
    #[value(alias = "intel")]
    Consistency,
    Polish,
    #[value(alias = "cover")]
    CoverArt,
    #[value(alias = "promo", alias = "marketing")]
    Blurb,
    Keywords,
    Manual,
}

pub const SEQUENCE: [Step; 8] = [
    Step::Setup,
    Step::OneLiner,
    Step::Skeleton,
    Step::Characters,
    Step::World,
    Step::Dna,
    Step::Outline,
    Step::ChapterGen,
];

impl Step {
    pub fn is_sequenced(self) -> bool {
        SEQUENCE.contains(&self)
    }

    /// Next step in the autopilot sequence; `None` at the end or off-sequence.
    pub fn next(self) -> Option<Step> {
        let pos = SEQUENCE.iter().position(|s| *s == self)?;
        SEQUENCE.get(pos + 1).copied()
    }

    /// Field a step's generation fills. Setup and chapter steps have none.
    pub fn content_field(self) -> Option<ProjectField> {
        match self {
            Step::OneLiner => Some(ProjectField::OneLiner),
            Step::Skeleton => Some(ProjectField::Skeleton),
            Step::Characters => Some(ProjectField::Characters),
            Step::World => Some(ProjectField::World),
            Step::Dna => Some(ProjectField::Dna),
            Step::Outline => Some(ProjectField::OutlineRaw),
            Step::Consistency => Some(ProjectField::ConsistencyReport),
            Step::Polish => Some(ProjectField::PolishedManuscript),
            Step::CoverArt => Some(ProjectField::CoverPrompt),
            Step::Blurb => Some(ProjectField::Blurb),
            Step::Keywords => Some(ProjectField::Keywords),
            Step::Setup | Step::ChapterGen | Step::ErrorKiller | Step::Manual => None,
        }
    }

    /// Whether the step's artifact already exists. Steps without a field of
    /// their own count as populated.
    pub fn is_populated(self, project: &Project) -> bool {
        match self.content_field() {
            Some(f) => !project.get(f).is_empty(),
            None => true,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Step::Setup => "0. Setup",
            Step::OneLiner => "1. One-Liner",
            Step::Skeleton => "2. Skeleton",
            Step::Characters => "3. Characters",
            Step::World => "4. World & Arsenal",
            Step::Dna => "5. Story DNA",
            Step::Outline => "6. Outline",
            Step::ChapterGen => "7. Execution",
            Step::ErrorKiller => "8. Kill House",
            Step::Consistency => "9. Intel Check",
            Step::Polish => "10. Final Polish",
            Step::CoverArt => "11. Cover Ops",
            Step::Blurb | Step::Keywords => "12. Propaganda",
            Step::Manual => "Field Manual",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_walks_to_chapter_execution() {
        let mut s = Step::Setup;
        let mut seen = vec![s];
        while let Some(n) = s.next() {
            seen.push(n);
            s = n;
        }
        assert_eq!(seen, SEQUENCE.to_vec());
        assert_eq!(Step::ChapterGen.next(), None);
        assert_eq!(Step::Polish.next(), None);
    }

    #[test]
    fn peripheral_steps_are_not_sequenced() {
        for s in [Step::ErrorKiller, Step::Consistency, Step::Polish, Step::CoverArt, Step::Blurb, Step::Keywords, Step::Manual] {
            assert!(!s.is_sequenced());
        }
    }

    #[test]
    fn populated_follows_field() {
        let mut p = Project::default();
        assert!(Step::Setup.is_populated(&p));
        assert!(!Step::Outline.is_populated(&p));
        p.outline_raw = "Chapter 1".into();
        assert!(Step::Outline.is_populated(&p));
    }
}
