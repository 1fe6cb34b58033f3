use crate::project::{Chapter, Language, Project};

pub const PERSONA_NOVELIST: &str =
    "You are an expert thriller novelist. Your style is gritty, fast-paced, and cinematic.";
pub const PERSONA_EDITOR: &str = "You are a ruthless special-ops editor. You hate passive voice, plot holes, and factual inaccuracies. You are brutal but constructive.";
pub const PERSONA_ANALYST: &str = "You are a literary analyst.";
pub const PERSONA_THRILLER_WRITER: &str = "You are an expert thriller writer.";

/// Tail of the previous chapter handed to the next one as context.
pub const PREVIOUS_CONTEXT_CHARS: usize = 1000;

fn or_unknown(s: &str) -> &str {
    if s.is_empty() { "Unknown" } else { s }
}

/// Last `n` characters of `s`, on a char boundary.
fn tail_chars(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    let skip = count - n;
    match s.char_indices().nth(skip) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

pub fn style_suggestion(p: &Project, lang: Language) -> String {
    format!(r#"Analyze these story parameters:
Protagonist: {}
Antagonist: {}
Setting: {}
Tone: {}

Suggest a specific "Author Protocol" (writing style description).
Example: "Stephen King mixed with Tom Clancy, heavy on technical details but psychological horror atmosphere."
Keep it under 20 words.
{}"#,
        p.protagonist, p.antagonist, p.setting, p.tone, lang.directive())
}

pub fn story_element(target_field: &str, p: &Project, lang: Language) -> String {
    format!(r#"You are a creative writing assistant.
Task: Generate a creative, unique, and fitting concept for the field: "{field}".

CURRENT CONTEXT (Use this to match the vibe):
Title/Codename: {}
Protagonist: {}
Antagonist: {}
Setting: {}
Tone: {}

Requirements:
- Output ONLY the content for "{field}".
- Keep it short, punchy, and evocative (max 10-15 words).
- Do not write "Here is a suggestion". Just the text.
{}"#,
        or_unknown(&p.title),
        or_unknown(&p.protagonist),
        or_unknown(&p.antagonist),
        or_unknown(&p.setting),
        or_unknown(&p.tone),
        lang.directive(),
        field = target_field)
}

pub fn one_liner(p: &Project, lang: Language) -> String {
    format!(r#"Based on:
Protagonist: {}
Antagonist: {}
Setting: {}
Style: {}

Write a single, high-concept logline (one sentence) for a thriller novel.
{}"#,
        p.protagonist, p.antagonist, p.setting, p.author_style, lang.directive())
}

pub fn skeleton(p: &Project, lang: Language) -> String {
    format!(r#"Create a full novel skeleton (20-30 points) for:
Title: {}
Logline: {}

Include:
- Hero + 3 key traits
- Antagonist + motive
- The Stakes
- 20 Key Scenes (one line each)
- 3 Major Twists
- Ending (Open/Closed)

{}"#,
        p.title, p.one_liner, lang.directive())
}

pub fn characters(p: &Project, lang: Language) -> String {
    format!(r#"Create a Character Bible (BIBLE OF CHARACTERS).
Context:
{}
{}

For each major character (Protagonist, Antagonist, 2-3 supporting):
[Name]
- Age
- Appearance
- Background
- Character (3-5 traits)
- Skills
- Motivation
- Weakness
- Emotional Arc

{}"#,
        p.one_liner, p.skeleton, lang.directive())
}

pub fn world(p: &Project, lang: Language) -> String {
    format!(r#"Create World Rules and Inventory Bible.
Context: {}

1. WORLD RULES:
- Technology
- Politics
- Criminal Underworld
- Geography
- Anomalies (if any)
- Taboos/Limitations

2. INVENTORY BIBLE (Prop List):
List key items (Weapons, Gadgets, Artifacts). For each:
- Description
- Specs
- Owner
- Limitations

{}"#,
        p.setting, lang.directive())
}

pub fn dna(lang: Language) -> String {
    format!(r#"Define the Story DNA.

1. DIALOGUE TONE:
- Hero's speech style
- Antagonist's speech style
- Sarcasm/Profanity level

2. VIOLENCE DOCTRINE (S0-S3):
- Level (e.g., S2 - Heavy Tactical)
- What is allowed vs forbidden

3. TENSION CURVE:
- Chapters 1-3
- Chapters 4-7
- Chapters 8-12
- Climax

{}"#,
        lang.directive())
}

pub fn outline(p: &Project, lang: Language) -> String {
    format!(r#"Write a detailed 15-chapter outline.
Reference:
{}
{}

Format required:
Chapter X: [Title]
[3-4 lines of detailed summary describing the action, conflict, and outcome]

{}"#,
        p.skeleton, p.dna, lang.directive())
}

/// Prompt for chapter `index` (0-based), with the tail of the previous
/// chapter as continuity context.
pub fn write_chapter(p: &Project, index: usize, lang: Language) -> String {
    let chapter = &p.chapters[index];
    let prev_context = match index.checked_sub(1).and_then(|i| p.chapters.get(i)) {
        Some(prev) => format!(
            "Previous chapter ended with: ...{}",
            tail_chars(&prev.content, PREVIOUS_CONTEXT_CHARS)
        ),
        None => "Start of novel.".to_string(),
    };

    format!(r#"ROLE: {}
TASK: Write Chapter {}: {}.

SUMMARY: {}

CONTEXT DATA:
--- CHARACTERS ---
{}
--- WORLD RULES ---
{}
--- TONE & DNA ---
{}
--- PREVIOUS CONTEXT ---
{}

INSTRUCTIONS:
1. First, output a "TACTICAL DRAFT" (5-7 bullet points of the scene beat-by-beat).
2. Then, write the full chapter content.
3. Adhere strictly to the Violence Doctrine and Dialogue Tone.
4. NO FILLER. ACTION, DIALOGUE, FACTS.

{}"#,
        p.author_style, chapter.id, chapter.title, chapter.summary,
        p.characters, p.world, p.dna, prev_context, lang.directive())
}

pub fn critique(chapter: &Chapter, lang: Language) -> String {
    format!(r#"You are a special-forces editor. Analyze the following chapter text.
Find logical errors, factual errors (weapons, tactics, geography), plot holes, and continuity issues.

Text:
{}

Output ONLY a Markdown table with these columns:
| # | Quote | Type | Why it's wrong | Fix |

{}"#,
        chapter.content, lang.directive())
}

pub fn consistency(p: &Project, lang: Language) -> String {
    let full_context = p
        .chapters
        .iter()
        .map(|c| format!("Ch{}: {}", c.id, c.summary))
        .collect::<Vec<_>>()
        .join("\n");
    format!(r#"Check internal consistency.
Input:
{}
{}
{}

List every contradiction found (Names, Dates, Rules, Inventory).
{}"#,
        full_context, p.skeleton, p.world, lang.directive())
}

pub fn polish(p: &Project, chapter: &Chapter, lang: Language) -> String {
    format!(r#"Rewrite in style: {}.
- Cut 15% water.
- Enhance grit and tone.

Text:
{}

{}"#,
        p.author_style, chapter.content, lang.directive())
}

/// Image prompts are always requested in English.
pub fn cover(p: &Project) -> String {
    format!(r#"Create a high-end AI art prompt (Flux/MidJourney).
Book: {}
Vibe: {}
Setting: {}

Output format: "Dark cinematic cover, [Subject], [Action], [Lighting], [Color Grading] --ar 3:2 --v 6"
Output strictly in ENGLISH."#,
        p.title, p.tone, p.setting)
}

pub fn blurb(p: &Project, lang: Language) -> String {
    format!("Write a 600-character killer blurb for LitRes/Amazon.\nContext: {}\n{}", p.one_liner, lang.directive())
}

pub fn keywords(lang: Language) -> String {
    format!("Generate 30 high-ranking SEO keywords for Thriller/Action category 2025. {}", lang.directive())
}

/// Strip wrapping quotes and a leading `Title: ` from a generated setup value.
pub fn clean_setup_value(text: &str) -> String {
    let s = text.strip_prefix('"').unwrap_or(text);
    let s = s.strip_suffix('"').unwrap_or(s);
    let s = match s.get(..7) {
        Some(head) if head.eq_ignore_ascii_case("title: ") => &s[7..],
        _ => s,
    };
    s.trim().to_string()
}
