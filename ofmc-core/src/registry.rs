//! Vault-wide registry of cross-reference labels.
//!
//! Every note, heading and block anchor in the vault gets a key of the form
//! `note`, `note#Heading Text` or `note^abc123`, and each key maps to a
//! stable LaTeX label. Book-mode rendering consults the registry to decide whether a
//! wikilink becomes a `\hyperref` or a visibly broken reference.

use crate::slug::heading_slug;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use uuid::Uuid;

const LABEL_PREFIX_LEN: usize = 40;

static HEADING_REGEX: OnceLock<Regex> = OnceLock::new();
static BLOCK_ID_REGEX: OnceLock<Regex> = OnceLock::new();

fn heading_regex() -> &'static Regex {
    HEADING_REGEX.get_or_init(|| Regex::new(r"^\s*#+\s+(.+?)\s*$").unwrap())
}

fn block_id_regex() -> &'static Regex {
    BLOCK_ID_REGEX.get_or_init(|| Regex::new(r"\^([a-fA-F0-9]{6})\s*$").unwrap())
}

/// Text of an ATX heading line (`## Title` yields `Title`)
pub fn atx_heading_text(line: &str) -> Option<&str> {
    heading_regex()
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Deterministic LaTeX label for a registry key
///
/// The readable prefix keeps at most 40 ASCII alphanumerics of the key; the
/// suffix is the first 8 hex digits of a name-based UUID of the full key.
pub fn build_label(key: &str) -> String {
    let readable: String = key
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(LABEL_PREFIX_LEN)
        .collect();
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_DNS, key.as_bytes()).simple().to_string();

    format!("wikilink:{}:{}", readable, &digest[..8])
}

/// Normalize a wikilink target into a registry key
///
/// Drops any `|alias`, qualifies local `#heading` / `^id` targets with the
/// current note, and folds `#^id` into `^id`.
pub fn canonical_key(raw_target: &str, current_note: &str) -> String {
    let target = raw_target.split('|').next().unwrap_or(raw_target).trim();

    let qualified = if target.starts_with('#') || target.starts_with('^') {
        format!("{}{}", current_note, target)
    } else {
        target.to_string()
    };

    qualified.replacen("#^", "^", 1)
}

/// Heading form that ignores case, punctuation, spacing and hyphens
fn loose_heading(heading: &str) -> String {
    heading_slug(heading).replace('-', "")
}

/// Map of registry keys to labels
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkRegistry {
    labels: BTreeMap<String, String>,

    #[serde(skip)]
    by_slug: HashMap<String, String>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan every file and register its headings and block anchors
    ///
    /// Unreadable files are logged and skipped.
    pub fn build<P: AsRef<Path>>(files: &[P]) -> Self {
        let mut registry = Self::new();

        for file in files {
            let file = file.as_ref();
            let Some(note) = file.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match fs::read_to_string(file) {
                Ok(content) => registry.scan_note(note, &content),
                Err(e) => tracing::warn!("Could not read {:?} for link registry: {}", file, e),
            }
        }

        tracing::info!("Link registry holds {} targets", registry.len());
        registry
    }

    /// Register a note together with its headings and block anchors
    pub fn scan_note(&mut self, note: &str, content: &str) {
        self.insert(note.to_string());
        let mut fence: Option<&str> = None;

        for line in content.lines() {
            let trimmed = line.trim_start();
            if let Some(marker) = fence {
                if trimmed.starts_with(marker) {
                    fence = None;
                }
                continue;
            }
            if trimmed.starts_with("```") {
                fence = Some("```");
                continue;
            }
            if trimmed.starts_with("~~~") {
                fence = Some("~~~");
                continue;
            }

            if let Some(heading) = atx_heading_text(line) {
                self.insert(format!("{}#{}", note, heading));
                self.by_slug.insert(
                    format!("{}#{}", note, loose_heading(heading)),
                    format!("{}#{}", note, heading),
                );
            }

            if let Some(id) = block_id_regex().captures(line).and_then(|c| c.get(1)) {
                self.insert(format!("{}^{}", note, id.as_str()));
            }
        }
    }

    fn insert(&mut self, key: String) {
        let label = build_label(&key);
        self.labels.insert(key, label);
    }

    /// Label for a canonical key, falling back to a slug match for headings
    pub fn label(&self, key: &str) -> Option<&str> {
        if let Some(label) = self.labels.get(key) {
            return Some(label);
        }

        let (note, heading) = key.split_once('#')?;
        let original = self.by_slug.get(&format!("{}#{}", note, loose_heading(heading)))?;
        self.labels.get(original).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.label(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Pretty JSON dump of every key and label
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.labels)
    }
}
