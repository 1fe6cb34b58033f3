use colored::Colorize;
use humansize::{format_size, DECIMAL};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use crate::autopilot::TickOutcome;
use crate::outline::OutlineEntry;
use crate::project::{Chapter, Language, Project, ProjectField};
use crate::steps::{Step, SEQUENCE};
use crate::wire::Generation;

const PREVIEW_CHARS: usize = 160;

const FIELD_MANUAL: &str = "\
0. Setup        title, style, tone, protagonist, antagonist, setting (`suggest`, `style`, `set`)
1-5. Planning   one-liner, skeleton, characters, world, dna (`generate <step>`)
6. Outline      `generate outline` rebuilds the chapter list; edit with `set outline-raw`
7. Execution    `write <n>` streams a chapter using the previous chapter's ending
8. Kill House   `critique <n>`
9. Intel Check  `generate consistency`
10. Polish      `polish <n>`
11-12. Release  `generate cover`, `generate marketing`
Autopilot       `autopilot` runs steps 0-6 and stops at the outline for review";

/// Spinner on stderr while a single-shot call is in flight.
pub fn spinner(msg: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]") {
        pb.set_style(style);
    }
    pb.set_message(msg.into());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Streaming sink: prints each fragment as it arrives.
pub fn echo_chunk(chunk: &str) {
    let mut out = io::stdout().lock();
    let _ = out.write_all(chunk.as_bytes());
    let _ = out.flush();
}

pub fn print_outcome(label: &str, outcome: &Generation) {
    match outcome {
        Generation::Text(t) => eprintln!("{} {} ({} chars)", "✓".green().bold(), label.bold(), t.chars().count()),
        Generation::Failed(msg) => eprintln!("{} {}: {}", "✗".red().bold(), label.bold(), msg.red()),
    }
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        flat
    } else {
        format!("{}…", flat.chars().take(PREVIEW_CHARS).collect::<String>())
    }
}

fn status(populated: bool) -> colored::ColoredString {
    if populated {
        "[done]".green().bold()
    } else {
        "[todo]".yellow()
    }
}

/// Dashboard of the whole project: setup, then each step's status and a preview.
pub fn print_project(project: &Project, lang: Language) {
    println!("\n{}  {}", project.title.bold(), format!("[{lang}]").dimmed());
    for f in [
        ProjectField::AuthorStyle,
        ProjectField::Tone,
        ProjectField::Protagonist,
        ProjectField::Antagonist,
        ProjectField::Setting,
    ] {
        println!("  {:<12} {}", f.as_str().cyan(), project.get(f));
    }
    println!();
    for step in SEQUENCE.iter().skip(1).filter(|s| s.content_field().is_some()) {
        let text = step.content_field().map(|f| project.get(f)).unwrap_or_default();
        println!("{} {}", status(step.is_populated(project)), step.label().bold());
        if !text.is_empty() {
            println!("       {}", preview(text).dimmed());
        }
    }
    let written = project.chapters.iter().filter(|c| !c.content.is_empty()).count();
    println!(
        "{} {}  {}/{} chapters written",
        status(!project.chapters.is_empty() && written == project.chapters.len()),
        Step::ChapterGen.label().bold(),
        written,
        project.chapters.len()
    );
    for step in [Step::Consistency, Step::Polish, Step::CoverArt, Step::Blurb, Step::Keywords] {
        let name = step.content_field().map(|f| f.as_str()).unwrap_or_default();
        println!("{} {} {}", status(step.is_populated(project)), step.label().bold(), name.dimmed());
    }
    println!();
}

/// Full content of one step.
pub fn print_step(step: Step, project: &Project, lang: Language) {
    println!("{}", step.label().bold().underline());
    match step {
        Step::Setup => print_project(project, lang),
        Step::ChapterGen => print_chapters(&project.chapters, false),
        Step::ErrorKiller => print_chapters(&project.chapters, true),
        Step::Manual => println!("{FIELD_MANUAL}"),
        _ => {
            let text = step.content_field().map(|f| project.get(f)).unwrap_or_default();
            if text.is_empty() {
                println!("{}", "(empty)".dimmed());
            } else {
                println!("{text}");
            }
        }
    }
}

pub fn print_chapters(chapters: &[Chapter], with_critique: bool) {
    if chapters.is_empty() {
        println!("{}", "(no chapters; generate the outline first)".dimmed());
        return;
    }
    for c in chapters {
        let words = c.content.split_whitespace().count();
        let mark = if words > 0 { format!("{words} words").green() } else { "not written".yellow() };
        println!("{:>3}. {}  {}", c.id, c.title.bold(), mark);
        if !c.summary.is_empty() {
            println!("     {}", preview(&c.summary).dimmed());
        }
        if with_critique && !c.critique.is_empty() {
            println!("{}\n", c.critique);
        }
    }
}

pub fn print_outline(entries: &[OutlineEntry]) {
    if entries.is_empty() {
        println!("{}", "(no chapter markers found)".dimmed());
        return;
    }
    for (i, e) in entries.iter().enumerate() {
        println!("{:>3}. {}", i + 1, e.title.bold());
        if !e.summary.is_empty() {
            println!("     {}", preview(&e.summary));
        }
    }
}

pub fn print_tick(outcome: &TickOutcome) {
    match outcome {
        TickOutcome::Idle | TickOutcome::Waiting => {}
        TickOutcome::Generated(step, g) => print_outcome(step.label(), g),
        TickOutcome::Advanced(step) => eprintln!("{} {}", "→".cyan(), step.label()),
        TickOutcome::Paused(step) => eprintln!(
            "{} outline ready; review it, then continue with {}",
            "■".yellow().bold(),
            step.label().bold()
        ),
        TickOutcome::Stopped(step) => eprintln!("{} autopilot stopped at {}", "■".yellow().bold(), step.label()),
    }
}

pub fn print_saved(path: &Path, bytes: u64) {
    eprintln!("{} {} ({})", "saved".green(), path.display(), format_size(bytes, DECIMAL));
}

pub fn confirm(prompt: &str) -> bool {
    eprint!("{} [y/N]: ", prompt);
    let _ = io::stderr().flush();
    let mut s = String::new();
    if io::stdin().read_line(&mut s).is_ok() {
        let ans = s.trim().to_lowercase();
        ans == "y" || ans == "yes"
    } else {
        false
    }
}
