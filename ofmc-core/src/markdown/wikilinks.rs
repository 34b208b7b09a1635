//! Wikilinks (`[[target|alias]]`) and embeds (`![[target]]`).
//!
//! Embeds are resolved against the vault while parsing: images become image
//! tokens, other files become transclusions, and unresolvable targets are
//! replaced by a visible `[Broken Embed: ...]` marker.

use super::tokens::{push_merged, ImageRef, InlineToken, Token, Transclusion, WikiLink};
use crate::locator::Locator;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "svg"];

static WIKILINK_REGEX: OnceLock<Regex> = OnceLock::new();

fn wikilink_regex() -> &'static Regex {
    WIKILINK_REGEX.get_or_init(|| Regex::new(r"(!?)\[\[([^\]]+)\]\]").unwrap())
}

/// The parts of a wikilink body
#[derive(Debug, Clone, PartialEq)]
pub struct WikiTarget {
    /// Note or file name, possibly with a path
    pub file: String,
    /// `#heading`, `#^id` or `^id`
    pub sub_target: Option<String>,
    pub alias: Option<String>,
}

impl WikiTarget {
    pub fn parse(body: &str) -> Self {
        let (link, alias) = match body.split_once('|') {
            Some((link, alias)) => (link, Some(alias.trim().to_string())),
            None => (body, None),
        };

        let (file, sub_target) = if let Some(pos) = link.find('#') {
            (&link[..pos], Some(link[pos..].to_string()))
        } else if let Some(pos) = link.find('^') {
            (&link[..pos], Some(link[pos..].to_string()))
        } else {
            (link, None)
        };

        Self {
            file: file.trim().to_string(),
            sub_target,
            alias,
        }
    }

    /// Text shown for a link
    ///
    /// The alias wins; otherwise a `#section` shows the section (without a
    /// leading `^`), a bare `^id` shows the note name, and a plain target
    /// shows itself.
    pub fn display(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match self.sub_target.as_deref() {
            Some(sub) if sub.starts_with('#') => sub[1..].trim_start_matches('^').to_string(),
            Some(_) => self.file.clone(),
            None => self.file.clone(),
        }
    }
}

/// Replaces wikilink and embed syntax inside text tokens
pub struct WikilinkTransformer<'a> {
    locator: &'a Locator,
}

impl<'a> WikilinkTransformer<'a> {
    pub fn new(locator: &'a Locator) -> Self {
        Self { locator }
    }

    pub fn transform(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens
            .into_iter()
            .map(|token| match token {
                Token::Inline(mut block) => {
                    block.children = self.process_children(block.children);
                    Token::Inline(block)
                }
                Token::CalloutOpen { kind, title } => Token::CalloutOpen {
                    kind,
                    title: self.process_children(title),
                },
                other => other,
            })
            .collect()
    }

    fn process_children(&self, children: Vec<InlineToken>) -> Vec<InlineToken> {
        let mut out = Vec::with_capacity(children.len());
        for child in children {
            match child {
                InlineToken::Text(text) if text.contains("[[") => {
                    for token in self.split_text(&text) {
                        push_merged(&mut out, token);
                    }
                }
                other => push_merged(&mut out, other),
            }
        }
        out
    }

    fn split_text(&self, text: &str) -> Vec<InlineToken> {
        let mut tokens = Vec::new();
        let mut last = 0;

        for caps in wikilink_regex().captures_iter(text) {
            let (Some(whole), Some(body)) = (caps.get(0), caps.get(2)) else {
                continue;
            };
            if whole.start() > last {
                tokens.push(InlineToken::Text(text[last..whole.start()].to_string()));
            }

            let is_embed = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
            if is_embed {
                tokens.push(self.embed(body.as_str()));
            } else {
                let target = WikiTarget::parse(body.as_str());
                tokens.push(InlineToken::WikiLink(WikiLink {
                    target: body.as_str().to_string(),
                    display: target.display(),
                }));
            }

            last = whole.end();
        }

        if last < text.len() {
            tokens.push(InlineToken::Text(text[last..].to_string()));
        }

        tokens
    }

    fn embed(&self, body: &str) -> InlineToken {
        let target = WikiTarget::parse(body);

        let resolved = self
            .locator
            .resolve(&target.file)
            .or_else(|| self.locator.resolve(&format!("{}.md", target.file)));

        let Some(path) = resolved else {
            tracing::warn!("Broken embed: {}", target.file);
            return InlineToken::Text(format!("[Broken Embed: {}]", target.file));
        };

        if is_image(&path) {
            return InlineToken::Image(ImageRef {
                src: path.to_string_lossy().into_owned(),
                caption: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                size_hint: target.alias,
            });
        }

        InlineToken::Transclusion(Transclusion {
            path,
            sub_target: target.sub_target,
            original: body.to_string(),
        })
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
