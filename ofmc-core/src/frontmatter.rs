//! Front matter parsing for vault notes.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrontmatterError {
    #[error("Invalid YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Metadata block at the top of a note
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Frontmatter {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub banner: Option<serde_yaml::Value>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Frontmatter {
    /// The banner image target with any wikilink wrapping removed
    ///
    /// Accepts `banner: "[[cover.png]]"`, `banner: cover.png`, and the unquoted
    /// `banner: [[cover.png]]` which YAML reads as a nested list.
    pub fn banner_target(&self) -> Option<String> {
        let raw = first_string(self.banner.as_ref()?)?;
        let raw = raw.trim().trim_start_matches('!');
        let raw = raw.strip_prefix("[[").unwrap_or(raw);
        let raw = raw.strip_suffix("]]").unwrap_or(raw);
        let raw = raw.split('|').next().unwrap_or(raw).trim();

        if raw.is_empty() {
            None
        } else {
            Some(raw.to_string())
        }
    }
}

fn first_string(value: &serde_yaml::Value) -> Option<&str> {
    match value {
        serde_yaml::Value::String(s) => Some(s.as_str()),
        serde_yaml::Value::Sequence(items) => items.iter().find_map(first_string),
        _ => None,
    }
}

static FRONTMATTER_REGEX: OnceLock<regex::Regex> = OnceLock::new();

fn frontmatter_regex() -> &'static regex::Regex {
    FRONTMATTER_REGEX.get_or_init(|| {
        regex::Regex::new(r"(?s)^---[ \t]*\r?\n(?:(.*?)\r?\n)?---[ \t]*(?:\r?\n(.*))?$").unwrap()
    })
}

/// Parse front matter from note content
///
/// Returns a tuple of (frontmatter, markdown_body). Content without a
/// leading `---` block yields default front matter and the full text.
///
/// # Example
///
/// ```
/// use ofmc_core::frontmatter::parse_frontmatter;
///
/// let content = "---\nbanner: \"[[cover.png]]\"\n---\n# Hello\n";
/// let (fm, body) = parse_frontmatter(content).unwrap();
/// assert_eq!(fm.banner_target().as_deref(), Some("cover.png"));
/// assert_eq!(body, "# Hello\n");
/// ```
pub fn parse_frontmatter(content: &str) -> Result<(Frontmatter, &str), FrontmatterError> {
    let Some(captures) = frontmatter_regex().captures(content) else {
        return Ok((Frontmatter::default(), content));
    };

    let yaml = captures.get(1).map_or("", |m| m.as_str());
    let body = captures.get(2).map_or("", |m| m.as_str());

    let frontmatter = if yaml.trim().is_empty() {
        Frontmatter::default()
    } else {
        serde_yaml::from_str(yaml)?
    };

    Ok((frontmatter, body))
}

/// Split front matter from the body, treating malformed YAML as empty metadata
pub fn split_frontmatter(content: &str) -> (Frontmatter, &str) {
    match parse_frontmatter(content) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!("Ignoring malformed front matter: {}", e);
            let body = frontmatter_regex()
                .captures(content)
                .and_then(|c| c.get(2))
                .map_or("", |m| m.as_str());
            (Frontmatter::default(), body)
        }
    }
}
