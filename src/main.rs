use anyhow::{Context, Result};
use clap::Parser;
use fs_err as fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

mod autopilot;
mod cli;
mod config;
mod errors;
mod forge;
mod log;
mod outline;
mod project;
mod prompt;
mod provider;
mod steps;
mod ux;
mod wire;

use autopilot::{Autopilot, TickOutcome};
use cli::{Args, Command};
use config::Config;
use errors::ForgeError;
use forge::Forge;
use outline::{chapters_from_outline, parse_outline, MarkerSet};
use project::Project;
use provider::GenerationClient;
use steps::Step;
use wire::Generation;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    log::init_tracing(args.debug);

    let mut cfg = match &args.config {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::default(),
    };
    args.apply_to(&mut cfg);
    debug!(?cfg, "configuration");

    if let Command::New { force } = args.command {
        return new_project(&args.project, &cfg, force);
    }

    let mut project = open_project(&args.project, &cfg)?;

    match &args.command {
        Command::New { .. } => unreachable!("handled above"),
        Command::Show { step } => {
            match step {
                Some(s) => ux::print_step(*s, &project, cfg.language),
                None => ux::print_project(&project, cfg.language),
            }
            return Ok(());
        }
        Command::Set { field, value } => {
            project.set(*field, read_value(value).await?);
            info!(field = %field, "updated");
        }
        Command::SetChapter { number, field, value } => {
            let value = read_value(value).await?;
            project.chapter_mut(*number)?.set(*field, value);
            info!(chapter = number, ?field, "updated");
        }
        Command::ParseOutline { input, apply } => {
            let text = match input.as_deref() {
                Some("-") => read_value("-").await?,
                Some(path) => fs::read_to_string(path)?,
                None => project.outline_raw.clone(),
            };
            let markers = MarkerSet::new(cfg.outline_markers.iter().cloned())?;
            debug!(markers = ?markers.keywords(), "parsing outline");
            ux::print_outline(&parse_outline(&text, &markers));
            if !apply {
                return Ok(());
            }
            project.chapters = chapters_from_outline(&text, &markers);
            if input.is_some() {
                project.outline_raw = text;
            }
        }
        Command::Export { path } => {
            let path = path.clone().unwrap_or_else(|| PathBuf::from(project::export_file_name(&project.title)));
            let bytes = project::save(&path, &project)?;
            ux::print_saved(&path, bytes);
            return Ok(());
        }
        Command::Import { path } => {
            let text = fs::read_to_string(path)?;
            project::import_into(&mut project, &text)?;
            info!(title = %project.title, chapters = project.chapters.len(), "imported");
        }
        Command::Lang { lang } => {
            if project.switch_language(*lang) {
                info!(%lang, "project reset to the {lang} template");
            } else {
                info!("project has been edited; content kept");
            }
            eprintln!("Pass --lang {lang} (or set `language` in the config file) to generate in this language.");
        }
        generation => {
            project = run_generation(generation, &args, &cfg, project).await?;
        }
    }

    let bytes = project::save(&args.project, &project)?;
    ux::print_saved(&args.project, bytes);
    Ok(())
}

fn new_project(path: &Path, cfg: &Config, force: bool) -> Result<()> {
    if path.exists() && !force && !ux::confirm(&format!("{} exists. Overwrite?", path.display())) {
        eprintln!("Aborted.");
        return Ok(());
    }
    let bytes = project::save(path, &cfg.language.template())?;
    ux::print_saved(path, bytes);
    Ok(())
}

fn open_project(path: &Path, cfg: &Config) -> Result<Project> {
    if path.exists() {
        return project::load(path);
    }
    info!(path = %path.display(), lang = %cfg.language, "no project file; starting from the template");
    Ok(cfg.language.template())
}

/// Literal value, or stdin when the value is `-`.
async fn read_value(value: &str) -> Result<String> {
    if value != "-" {
        return Ok(value.to_string());
    }
    let mut buf = String::new();
    tokio::io::stdin().read_to_string(&mut buf).await.context("reading stdin")?;
    Ok(buf.trim_end_matches(['\r', '\n']).to_string())
}

async fn with_spinner<F>(label: &str, fut: F) -> Result<Generation, ForgeError>
where
    F: Future<Output = Result<Generation, ForgeError>>,
{
    let pb = ux::spinner(label.to_string());
    let res = fut.await;
    pb.finish_and_clear();
    if let Ok(outcome) = &res {
        ux::print_outcome(label, outcome);
    }
    res
}

async fn run_generation(cmd: &Command, args: &Args, cfg: &Config, project: Project) -> Result<Project> {
    let client = GenerationClient::new(provider::make_provider(cfg.provider, cfg)?);
    let mut forge = Forge::new(client, cfg, project)?;
    if args.save_transcript {
        let base = args.project.parent().unwrap_or(Path::new("."));
        forge = forge.with_transcript(&base.join(&cfg.transcript_dir));
    }
    info!(provider = forge.provider_name(), lang = %forge.language(), "ready");
    let lang = forge.language();

    match cmd {
        Command::Suggest { field } => {
            let label = format!("suggest {}", field.field());
            with_spinner(&label, forge.suggest_field(*field)).await?;
            println!("{}", forge.project.get(field.field()));
        }
        Command::Style => {
            with_spinner("author style", forge.suggest_style()).await?;
            println!("{}", forge.project.author_style);
        }
        Command::Generate { step: Step::Blurb | Step::Keywords } => {
            let pb = ux::spinner("blurb + keywords");
            let (blurb, keywords) = forge.generate_marketing().await?;
            pb.finish_and_clear();
            ux::print_outcome("blurb", &blurb);
            ux::print_outcome("keywords", &keywords);
            ux::print_step(Step::Blurb, &forge.project, lang);
            ux::print_step(Step::Keywords, &forge.project, lang);
        }
        Command::Generate { step } => {
            with_spinner(step.label(), forge.generate_step(*step)).await?;
            ux::print_step(*step, &forge.project, lang);
            if *step == Step::Outline {
                ux::print_chapters(&forge.project.chapters, false);
            }
        }
        Command::Write { number } => {
            let outcome = forge.write_chapter(*number, &mut |c: &str| ux::echo_chunk(c)).await?;
            println!();
            ux::print_outcome(&format!("chapter {number}"), &outcome);
        }
        Command::Critique { number } => {
            with_spinner(&format!("critique chapter {number}"), forge.critique_chapter(*number)).await?;
            println!("{}", forge.project.chapter(*number)?.critique);
        }
        Command::Polish { number } => {
            let outcome = forge.polish(*number, &mut |c: &str| ux::echo_chunk(c)).await?;
            println!();
            ux::print_outcome(&format!("polish chapter {number}"), &outcome);
        }
        Command::Autopilot { from } => run_autopilot(&mut forge, *from, cfg, &args.project).await?,
        other => unreachable!("not a generation command: {other:?}"),
    }
    Ok(forge.project)
}

async fn run_autopilot(forge: &mut Forge, from: Step, cfg: &Config, path: &Path) -> Result<()> {
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if autopilot::relay_interrupts(tokio::signal::ctrl_c, stop_tx).await {
            eprintln!("\ninterrupted");
            std::process::exit(130);
        }
    });

    let mut pilot = Autopilot::new(from, Duration::from_millis(cfg.autopilot_tick_ms));
    pilot.arm();
    info!(from = %from, "autopilot armed");
    pilot
        .run(forge, stop_rx, &mut |event, p| {
            ux::print_tick(event);
            if matches!(event, TickOutcome::Generated(..)) {
                if let Err(e) = project::save(path, p) {
                    warn!(error = %e, "could not save progress");
                }
            }
        })
        .await?;
    info!(step = %pilot.step(), "autopilot disarmed");
    Ok(())
}
