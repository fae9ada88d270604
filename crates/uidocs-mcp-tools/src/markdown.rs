//! Text filters for MDX component documentation.
//!
//! Everything here is a pure function over `&str`. Fenced code blocks are
//! treated as opaque: headings and macros inside them are never touched.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?ms)^import\s.*?["'][^"'\n]+["'];?[ \t]*(?:\n|\z)"#).expect("valid import regex")
});

static EXPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^export\s+(?:const|let|default|function)\b.*(?:\n|\z)").expect("valid export regex")
});

static JSX_COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{/\*.*?\*/\}").expect("valid comment regex"));

static TEMPLATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{%.*?%\}").expect("valid template regex"));

// A capitalized JSX tag alone on its line; content between such tags is kept.
static LONE_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*</?[A-Z][A-Za-z0-9.]*(?:\s[^>]*)?/?>[ \t]*(?:\n|\z)")
        .expect("valid tag regex")
});

static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})[ \t]+(.+?)[ \t]*#*[ \t]*$").expect("valid heading regex"));

/// YAML header of a documentation page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frontmatter {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heading {
    pub level: u8,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub meta: Option<String>,
    pub code: String,
}

/// Tracks whether successive lines are inside a fenced code block.
#[derive(Debug, Default)]
struct FenceState {
    open: Option<(char, usize)>,
}

impl FenceState {
    /// Feed one line; true when it is a fence delimiter or fenced content.
    fn feed(&mut self, line: &str) -> bool {
        let trimmed = line.trim();
        match (self.open, fence_marker(trimmed)) {
            (None, Some(marker)) => {
                self.open = Some(marker);
                true
            }
            (Some((c, n)), Some((mc, mn)))
                if c == mc && mn >= n && trimmed.chars().all(|ch| ch == c) =>
            {
                self.open = None;
                true
            }
            (Some(_), _) => true,
            (None, None) => false,
        }
    }
}

fn fence_marker(trimmed: &str) -> Option<(char, usize)> {
    let c = trimmed.chars().next()?;
    if c != '`' && c != '~' {
        return None;
    }
    let n = trimmed.chars().take_while(|&x| x == c).count();
    (n >= 3).then_some((c, n))
}

fn parse_heading(line: &str) -> Option<Heading> {
    let caps = HEADING_RE.captures(line.trim_end())?;
    Some(Heading {
        level: caps[1].len() as u8,
        title: caps[2].to_string(),
    })
}

/// Split a leading `---` YAML block from the body.
///
/// Unparsable frontmatter is dropped and the body returned on its own.
pub fn split_frontmatter(source: &str) -> (Option<Frontmatter>, &str) {
    let rest = match source
        .strip_prefix("---\n")
        .or_else(|| source.strip_prefix("---\r\n"))
    {
        Some(rest) => rest,
        None => return (None, source),
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            if yaml.trim().is_empty() {
                return (Some(Frontmatter::default()), body);
            }
            return match serde_yaml::from_str::<Frontmatter>(yaml) {
                Ok(frontmatter) => (Some(frontmatter), body),
                Err(e) => {
                    debug!(error = %e, "Ignoring unparsable frontmatter");
                    (None, body)
                }
            };
        }
        offset += line.len();
    }
    (None, source)
}

/// Removes MDX-only constructs so the text reads as plain markdown.
#[derive(Debug, Clone)]
pub struct MacroStripper {
    drop_tags: Vec<(Regex, Regex)>,
}

impl MacroStripper {
    /// `drop_tags` are removed together with their content; any other
    /// component tag on a line of its own is unwrapped.
    pub fn new<S: AsRef<str>>(drop_tags: &[S]) -> Result<Self, regex::Error> {
        let drop_tags = drop_tags
            .iter()
            .map(|tag| {
                let tag = regex::escape(tag.as_ref());
                let self_closing = Regex::new(&format!(r"(?s)<{tag}(?:\s[^>]*?)?/>"))?;
                let paired = Regex::new(&format!(r"(?s)<{tag}(?:\s[^>]*?[^/>])?>.*?</{tag}>"))?;
                Ok((self_closing, paired))
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { drop_tags })
    }

    pub fn strip(&self, source: &str) -> String {
        let mut out = String::with_capacity(source.len());
        let mut prose = String::new();
        let mut fences = FenceState::default();

        for line in source.split_inclusive('\n') {
            if fences.feed(line) {
                if !prose.is_empty() {
                    out.push_str(&self.strip_prose(&prose));
                    prose.clear();
                }
                out.push_str(line);
            } else {
                prose.push_str(line);
            }
        }
        if !prose.is_empty() {
            out.push_str(&self.strip_prose(&prose));
        }

        collapse_blank_lines(&out)
    }

    fn strip_prose(&self, prose: &str) -> String {
        let mut text = IMPORT_RE.replace_all(prose, "").into_owned();
        text = EXPORT_RE.replace_all(&text, "").into_owned();
        text = JSX_COMMENT_RE.replace_all(&text, "").into_owned();
        text = TEMPLATE_RE.replace_all(&text, "").into_owned();
        for (self_closing, paired) in &self.drop_tags {
            text = paired.replace_all(&text, "").into_owned();
            text = self_closing.replace_all(&text, "").into_owned();
        }
        LONE_TAG_RE.replace_all(&text, "").into_owned()
    }
}

/// Runs of blank lines outside code fences become a single blank line.
fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut fences = FenceState::default();
    let mut previous_blank = true;
    for line in text.split_inclusive('\n') {
        let blank = !fences.feed(line) && line.trim().is_empty();
        if blank && previous_blank {
            continue;
        }
        previous_blank = blank;
        out.push_str(line);
    }
    out.trim_end().to_string()
}

/// Convenience wrapper around [`MacroStripper`].
pub fn strip_macros<S: AsRef<str>>(source: &str, drop_tags: &[S]) -> Result<String, regex::Error> {
    Ok(MacroStripper::new(drop_tags)?.strip(source))
}

/// Outline of the document, skipping fenced code.
pub fn headings(markdown: &str) -> Vec<Heading> {
    let mut fences = FenceState::default();
    markdown
        .lines()
        .filter(|line| !fences.feed(line))
        .filter_map(parse_heading)
        .collect()
}

/// The section under `heading` (matched case-insensitively), up to the next
/// heading of the same or a higher level. Includes the heading line.
pub fn extract_section(markdown: &str, heading: &str) -> Option<String> {
    let wanted = heading.trim().trim_start_matches('#').trim();
    if wanted.is_empty() {
        return None;
    }

    let mut fences = FenceState::default();
    let mut level = None;
    let mut section = String::new();

    for line in markdown.split_inclusive('\n') {
        let fenced = fences.feed(line);
        let parsed = if fenced { None } else { parse_heading(line) };

        match (level, parsed) {
            (None, Some(h)) if h.title.eq_ignore_ascii_case(wanted) => {
                level = Some(h.level);
                section.push_str(line);
            }
            (Some(start), Some(h)) if h.level <= start => break,
            (Some(_), _) => section.push_str(line),
            (None, _) => {}
        }
    }

    level.map(|_| section.trim_end().to_string())
}

/// First section matching any of `candidates`, in order.
pub fn extract_first_section(markdown: &str, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .find_map(|heading| extract_section(markdown, heading))
}

pub fn extract_code_blocks(markdown: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut fences = FenceState::default();
    let mut current: Option<CodeBlock> = None;

    for line in markdown.split_inclusive('\n') {
        let was_open = fences.open.is_some();
        if !fences.feed(line) {
            continue;
        }
        let now_open = fences.open.is_some();

        match (was_open, now_open) {
            (false, true) => {
                let info = line.trim().trim_start_matches(['`', '~']).trim();
                let mut parts = info.splitn(2, char::is_whitespace);
                let language = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
                let meta = parts
                    .next()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                current = Some(CodeBlock {
                    language,
                    meta,
                    code: String::new(),
                });
            }
            (true, false) => {
                if let Some(mut block) = current.take() {
                    block.code = block.code.trim_end_matches(['\n', '\r']).to_string();
                    blocks.push(block);
                }
            }
            _ => {
                if let Some(block) = current.as_mut() {
                    block.code.push_str(line);
                }
            }
        }
    }
    blocks
}
