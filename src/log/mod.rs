use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::Serialize;
use serde_json::to_string_pretty;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::wire::{Generation, GenerationRequest};

/// Stderr logging; stdout carries generated text.
pub fn init_tracing(debug: bool) {
    let fallback = if debug { "thriller_forge=debug" } else { "thriller_forge=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Serialize)]
struct RequestRecord<'a> {
    session: Uuid,
    seq: u32,
    stage: &'a str,
    timestamp: DateTime<Utc>,
    request: &'a GenerationRequest,
}

#[derive(Serialize)]
struct OutcomeRecord<'a> {
    session: Uuid,
    seq: u32,
    stage: &'a str,
    timestamp: DateTime<Utc>,
    outcome: &'a Generation,
}

/// Per-session record of every generation request and its outcome.
pub struct Transcript {
    session: Uuid,
    dir: PathBuf,
    seq: u32,
}

pub struct SavedPaths {
    pub request: PathBuf,
    pub outcome: PathBuf,
}

fn session_dir(root: &Path, session: Uuid) -> PathBuf {
    root.join("tx").join(session.to_string())
}

impl Transcript {
    pub fn new(root: &Path) -> Self {
        let session = Uuid::new_v4();
        Self { session, dir: session_dir(root, session), seq: 0 }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_stage(
        &mut self,
        stage: &str,
        req: &GenerationRequest,
        outcome: &Generation,
    ) -> anyhow::Result<SavedPaths> {
        fs::create_dir_all(&self.dir)?;
        self.seq += 1;
        let now = Utc::now();

        let request = self.dir.join(format!("{:03}-{stage}.request.json", self.seq));
        fs::write(
            &request,
            to_string_pretty(&RequestRecord { session: self.session, seq: self.seq, stage, timestamp: now, request: req })?,
        )?;

        let outcome_path = self.dir.join(format!("{:03}-{stage}.outcome.json", self.seq));
        fs::write(
            &outcome_path,
            to_string_pretty(&OutcomeRecord { session: self.session, seq: self.seq, stage, timestamp: now, outcome })?,
        )?;

        Ok(SavedPaths { request, outcome: outcome_path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_numbered_in_order() {
        let root = tempfile::tempdir().unwrap();
        let mut t = Transcript::new(root.path());
        let req = GenerationRequest::new("Write a hook.", "gemini-2.5-flash");

        let first = t.save_stage("one-liner", &req, &Generation::Text("Hook.".into())).unwrap();
        let second = t.save_stage("skeleton", &req, &Generation::Failed("503".into())).unwrap();

        assert!(first.request.ends_with("001-one-liner.request.json"));
        assert!(second.outcome.ends_with("002-skeleton.outcome.json"));
        assert!(t.dir().starts_with(root.path().join("tx")));

        let saved: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&second.outcome).unwrap()).unwrap();
        assert_eq!(saved["outcome"]["kind"], "failed");
        assert_eq!(saved["outcome"]["text"], "503");
        assert_eq!(saved["stage"], "skeleton");
    }
}
