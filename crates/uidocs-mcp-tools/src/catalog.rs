// ABOUTME: Component lookup over the documentation mirror
// ABOUTME: Validates component names, lists, loads, renders and searches documentation pages

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uidocs_mirror::DocsMirror;

use crate::markdown::{split_frontmatter, Frontmatter, MacroStripper};
use crate::ToolError;

static COMPONENT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{0,63}$").expect("valid component name regex"));

/// A component slug such as `button` or `dropdown-menu`.
///
/// Only lowercase ASCII, digits and dashes are accepted, so a name can
/// never escape the content root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ComponentName(String);

impl ComponentName {
    pub fn parse(raw: &str) -> Result<Self, ToolError> {
        let name = raw.trim();
        if COMPONENT_NAME_RE.is_match(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(ToolError::InvalidArguments(format!(
                "invalid component name {:?}: expected lowercase letters, digits and dashes",
                raw
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How documentation pages are laid out inside the content root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocsLayout {
    /// File extension of a component page (default: mdx)
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Component tags removed together with their content
    #[serde(default = "default_drop_tags")]
    pub drop_tags: Vec<String>,
}

impl Default for DocsLayout {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            drop_tags: default_drop_tags(),
        }
    }
}

fn default_extension() -> String {
    "mdx".to_string()
}

fn default_drop_tags() -> Vec<String> {
    ["ComponentPreview", "ComponentSource", "TabsList", "TabsTrigger"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentSummary {
    pub name: ComponentName,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ComponentDoc {
    pub name: ComponentName,
    pub frontmatter: Frontmatter,
    pub body: String,
}

impl ComponentDoc {
    pub fn title(&self) -> &str {
        self.frontmatter
            .title
            .as_deref()
            .unwrap_or_else(|| self.name.as_str())
    }

    pub fn summary(&self) -> ComponentSummary {
        ComponentSummary {
            name: self.name.clone(),
            title: self.title().to_string(),
            description: self.frontmatter.description.clone(),
        }
    }
}

/// Read-only view of the component pages in the mirror.
pub struct DocsLibrary {
    mirror: Arc<dyn DocsMirror>,
    layout: DocsLayout,
    stripper: MacroStripper,
}

impl DocsLibrary {
    pub fn new(mirror: Arc<dyn DocsMirror>, layout: DocsLayout) -> Result<Self, ToolError> {
        let stripper = MacroStripper::new(&layout.drop_tags)?;
        Ok(Self {
            mirror,
            layout,
            stripper,
        })
    }

    pub fn mirror(&self) -> &Arc<dyn DocsMirror> {
        &self.mirror
    }

    fn page_path(&self, name: &ComponentName) -> PathBuf {
        self.mirror
            .content_root()
            .join(format!("{}.{}", name, self.layout.extension))
    }

    pub async fn load(&self, name: &ComponentName) -> Result<ComponentDoc, ToolError> {
        let path = self.page_path(name);
        let source = match tokio::fs::read_to_string(&path).await {
            Ok(source) => source,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(component = %name, path = %path.display(), "Component page missing");
                return Err(ToolError::ComponentNotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let (frontmatter, body) = split_frontmatter(&source);
        Ok(ComponentDoc {
            name: name.clone(),
            frontmatter: frontmatter.unwrap_or_default(),
            body: body.to_string(),
        })
    }

    /// Every component page, sorted by name.
    pub async fn list(&self) -> Result<Vec<ComponentSummary>, ToolError> {
        let root = self.mirror.content_root();
        let mut entries = match tokio::fs::read_dir(&root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::DocsUnavailable(format!(
                    "{} does not exist; run `uidocs sync`",
                    root.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.layout.extension.as_str()) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(name) = ComponentName::parse(stem) else {
                debug!(file = %path.display(), "Skipping page with unusable name");
                continue;
            };
            match self.load(&name).await {
                Ok(doc) => summaries.push(doc.summary()),
                Err(e) => warn!(component = %name, error = %e, "Failed to read component page"),
            }
        }

        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    /// Cleaned markdown: title and description header, then the body with
    /// MDX constructs stripped.
    pub fn render(&self, doc: &ComponentDoc) -> String {
        let mut out = format!("# {}\n\n", doc.title());
        if let Some(description) = &doc.frontmatter.description {
            out.push_str(description.trim());
            out.push_str("\n\n");
        }
        out.push_str(&self.stripper.strip(&doc.body));
        out
    }

    pub fn strip(&self, markdown: &str) -> String {
        self.stripper.strip(markdown)
    }

    /// Rank components against a free-text query.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<ComponentSummary>, ToolError> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if terms.is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".into()));
        }

        let mut scored: Vec<(u32, ComponentSummary)> = self
            .list()
            .await?
            .into_iter()
            .filter_map(|summary| {
                let score = score(&summary, &terms);
                (score > 0).then_some((score, summary))
            })
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then_with(|| a.name.cmp(&b.name)));
        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, summary)| summary)
            .collect())
    }
}

fn score(summary: &ComponentSummary, terms: &[String]) -> u32 {
    let name = summary.name.as_str();
    let title = summary.title.to_lowercase();
    let description = summary
        .description
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();

    terms
        .iter()
        .map(|term| {
            let mut s = 0;
            if name == term {
                s += 100;
            } else if name.starts_with(term.as_str()) {
                s += 50;
            } else if name.contains(term.as_str()) {
                s += 30;
            }
            if title.contains(term.as_str()) {
                s += 20;
            }
            if description.contains(term.as_str()) {
                s += 10;
            }
            s
        })
        .sum()
}
