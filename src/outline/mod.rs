use regex::Regex;

use crate::project::Chapter;

pub const DEFAULT_MARKERS: [&str; 3] = ["Chapter", "Глава", "Часть"];

/// One parsed outline entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineEntry {
    pub title: String,
    pub summary: String,
}

/// Recognized chapter-marker keywords, compiled once.
///
/// A line is a marker when, trimmed, it starts with one of the keywords
/// (case-insensitive) followed by whitespace and an ASCII number.
#[derive(Debug, Clone)]
pub struct MarkerSet {
    keywords: Vec<String>,
    re: Regex,
}

impl MarkerSet {
    pub fn new<I, S>(keywords: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(Into::into)
            .filter(|k| !k.trim().is_empty())
            .collect();
        let alternation = keywords
            .iter()
            .map(|k| regex::escape(k.trim()))
            .collect::<Vec<_>>()
            .join("|");
        // An empty keyword list must never match.
        let pattern = if alternation.is_empty() {
            r"\b\B".to_string()
        } else {
            format!(r"(?i)^(?:{})\s+[0-9]+", alternation)
        };
        Ok(Self { keywords, re: Regex::new(&pattern)? })
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn is_marker(&self, trimmed_line: &str) -> bool {
        self.re.is_match(trimmed_line)
    }
}

impl Default for MarkerSet {
    fn default() -> Self {
        Self::new(DEFAULT_MARKERS).expect("default markers are valid")
    }
}

/// Split raw outline text into chapter entries.
///
/// Lines before the first marker are dropped, blank lines are skipped, body
/// lines are joined with single spaces. No markers yields an empty vec.
pub fn parse_outline(raw: &str, markers: &MarkerSet) -> Vec<OutlineEntry> {
    let mut out = Vec::new();
    let mut current: Option<OutlineEntry> = None;
    let mut parts: Vec<&str> = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim_matches(|c: char| c.is_whitespace() || c == '\u{FEFF}');
        if trimmed.is_empty() {
            continue;
        }
        if markers.is_marker(trimmed) {
            if let Some(mut entry) = current.take() {
                entry.summary = parts.join(" ");
                out.push(entry);
            }
            current = Some(OutlineEntry { title: trimmed.to_string(), summary: String::new() });
            parts.clear();
        } else if current.is_some() {
            parts.push(trimmed);
        }
    }

    if let Some(mut entry) = current {
        entry.summary = parts.join(" ");
        out.push(entry);
    }
    out
}

/// Fresh chapter records for a parsed outline, numbered from 1.
pub fn chapters_from_outline(raw: &str, markers: &MarkerSet) -> Vec<Chapter> {
    parse_outline(raw, markers)
        .into_iter()
        .enumerate()
        .map(|(i, e)| Chapter {
            id: (i + 1) as u32,
            title: e.title,
            summary: e.summary,
            content: String::new(),
            critique: String::new(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Vec<OutlineEntry> {
        parse_outline(raw, &MarkerSet::default())
    }

    fn entry(title: &str, summary: &str) -> OutlineEntry {
        OutlineEntry { title: title.into(), summary: summary.into() }
    }

    #[test]
    fn parses_two_chapters() {
        let raw = "Chapter 1: Breach\nHe moved fast.\nNo one saw.\nChapter 2: Extraction\nThe exfil failed.";
        assert_eq!(
            parse(raw),
            vec![
                entry("Chapter 1: Breach", "He moved fast. No one saw."),
                entry("Chapter 2: Extraction", "The exfil failed."),
            ]
        );
    }

    #[test]
    fn consecutive_markers_give_empty_summary() {
        assert_eq!(
            parse("Chapter 1: A\nChapter 2: B\ntext"),
            vec![entry("Chapter 1: A", ""), entry("Chapter 2: B", "text")]
        );
    }

    #[test]
    fn no_markers_is_empty() {
        assert!(parse("").is_empty());
        assert!(parse("\n\n   \n").is_empty());
        assert!(parse("Prologue\nSome text\nChapter one: words not digits").is_empty());
        assert!(parse("Chapter1: no space").is_empty());
    }

    #[test]
    fn preamble_and_blank_lines_are_dropped() {
        let raw = "Here is your outline:\n\n  Chapter 1: Dawn  \n\n   First line.  \n\t\nSecond line.\n\n";
        let got = parse(raw);
        assert_eq!(got, vec![entry("Chapter 1: Dawn", "First line. Second line.")]);
        assert!(!got[0].summary.contains("  "));
    }

    #[test]
    fn localized_and_case_insensitive_markers() {
        let raw = "ГЛАВА 1. Тишина\nОн ждал.\nчасть 2\nchapter 3 - Out\nend";
        let got = parse(raw);
        assert_eq!(
            got,
            vec![
                entry("ГЛАВА 1. Тишина", "Он ждал."),
                entry("часть 2", ""),
                entry("chapter 3 - Out", "end"),
            ]
        );
    }

    #[test]
    fn custom_marker_set_replaces_defaults() {
        let markers = MarkerSet::new(["Capítulo", "Act"]).unwrap();
        let got = parse_outline("Chapter 1: ignored\nCapítulo 1: Uno\nbody\nAct 2", &markers);
        assert_eq!(got, vec![entry("Capítulo 1: Uno", "body"), entry("Act 2", "")]);
        assert_eq!(markers.keywords(), ["Capítulo", "Act"]);
    }

    #[test]
    fn empty_marker_set_matches_nothing() {
        let markers = MarkerSet::new(Vec::<String>::new()).unwrap();
        assert!(parse_outline("Chapter 1: A\nbody", &markers).is_empty());
    }

    #[test]
    fn keywords_are_escaped() {
        let markers = MarkerSet::new(["Ch."]).unwrap();
        assert!(markers.is_marker("Ch. 4"));
        assert!(!markers.is_marker("Chx 4"));
    }

    #[test]
    fn reparsing_rendered_chapters_is_stable() {
        let raw = "Intro\nChapter 1: Breach\nHe moved fast.\n\nNo one saw.\nChapter 2: Extraction\nChapter 3: Fallout\nSmoke.";
        let markers = MarkerSet::default();
        let chapters = chapters_from_outline(raw, &markers);
        let rendered = chapters
            .iter()
            .map(|c| format!("Chapter {}: {}\n{}", c.id, c.title, c.summary))
            .collect::<Vec<_>>()
            .join("\n");
        let again: Vec<(String, String)> = parse_outline(&rendered, &markers)
            .into_iter()
            .map(|e| (e.title, e.summary))
            .collect();
        let expected: Vec<(String, String)> = chapters
            .iter()
            .map(|c| (format!("Chapter {}: {}", c.id, c.title), c.summary.clone()))
            .collect();
        assert_eq!(again, expected);
    }

    #[test]
    fn chapter_ids_follow_position() {
        let chapters = chapters_from_outline("Chapter 7: X\nChapter 9: Y", &MarkerSet::default());
        assert_eq!(chapters.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(chapters.iter().all(|c| c.content.is_empty() && c.critique.is_empty()));
    }

    #[test]
    fn only_ascii_digits_number_a_chapter() {
        let markers = MarkerSet::default();
        assert!(markers.is_marker("Chapter 12: Night"));
        assert!(!markers.is_marker("Chapter １"));
        assert!(!markers.is_marker("Chapter ٣"));
    }

    #[test]
    fn leading_byte_order_mark_is_ignored() {
        assert_eq!(parse("\u{FEFF}Chapter 1: A\nx"), vec![entry("Chapter 1: A", "x")]);
        assert_eq!(parse("Chapter 1: A\n\u{FEFF}\nx"), vec![entry("Chapter 1: A", "x")]);
    }
}
