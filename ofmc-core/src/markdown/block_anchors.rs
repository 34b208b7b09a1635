//! Block anchors: `^abc123` at the end of a block or alone on its last line.
//!
//! The anchor text is always removed from the output. When compiling a book
//! and the registry knows `note^abc123`, the block records the label so the
//! renderer can emit it after the block.

use super::tokens::{InlineBlock, InlineToken, Token};
use crate::registry::LinkRegistry;
use regex::Regex;
use std::sync::OnceLock;

static STANDALONE_REGEX: OnceLock<Regex> = OnceLock::new();
static TRAILING_REGEX: OnceLock<Regex> = OnceLock::new();

fn standalone_regex() -> &'static Regex {
    STANDALONE_REGEX.get_or_init(|| Regex::new(r"^\s*\^([a-fA-F0-9]{6})\s*$").unwrap())
}

fn trailing_regex() -> &'static Regex {
    TRAILING_REGEX.get_or_init(|| Regex::new(r"\s+\^([a-fA-F0-9]{6})\s*$").unwrap())
}

pub struct BlockAnchorTransformer<'a> {
    note: &'a str,
    registry: Option<&'a LinkRegistry>,
}

impl<'a> BlockAnchorTransformer<'a> {
    pub fn new(note: &'a str, registry: Option<&'a LinkRegistry>) -> Self {
        Self { note, registry }
    }

    pub fn transform(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens
            .into_iter()
            .map(|token| match token {
                Token::Inline(block) => Token::Inline(self.process_block(block)),
                other => other,
            })
            .collect()
    }

    fn process_block(&self, mut block: InlineBlock) -> InlineBlock {
        let (children, id) = strip_anchors(std::mem::take(&mut block.children));
        block.children = children;

        if let Some(id) = id {
            if let Some(registry) = self.registry {
                let key = format!("{}^{}", self.note, id);
                match registry.label(&key) {
                    Some(label) => block.anchor_label = Some(label.to_string()),
                    None => tracing::debug!("Block anchor {} is not in the link registry", key),
                }
            }
            block.block_id = Some(id);
        }

        block
    }
}

/// Remove every anchor from the block, returning the last id found
fn strip_anchors(children: Vec<InlineToken>) -> (Vec<InlineToken>, Option<String>) {
    // Split into lines, remembering the break that ended each line
    let mut lines: Vec<(Vec<InlineToken>, Option<InlineToken>)> = vec![(Vec::new(), None)];
    for child in children {
        match child {
            InlineToken::SoftBreak | InlineToken::HardBreak => {
                if let Some(last) = lines.last_mut() {
                    last.1 = Some(child);
                }
                lines.push((Vec::new(), None));
            }
            other => {
                if let Some(last) = lines.last_mut() {
                    last.0.push(other);
                }
            }
        }
    }

    let mut found = None;
    let mut kept: Vec<(Vec<InlineToken>, Option<InlineToken>)> = Vec::with_capacity(lines.len());

    for (mut line, brk) in lines {
        if let [InlineToken::Text(text)] = line.as_slice() {
            if let Some(caps) = standalone_regex().captures(text) {
                found = caps.get(1).map(|m| m.as_str().to_string());
                // Drop the line together with the break that led into it
                if brk.is_none() {
                    if let Some(prev) = kept.last_mut() {
                        prev.1 = None;
                    }
                }
                continue;
            }
        }

        if let Some(InlineToken::Text(text)) = line.last_mut() {
            if let Some(caps) = trailing_regex().captures(text) {
                found = caps.get(1).map(|m| m.as_str().to_string());
                let start = caps.get(0).map_or(text.len(), |m| m.start());
                text.truncate(start);
                if text.is_empty() {
                    line.pop();
                }
            }
        }

        kept.push((line, brk));
    }

    let mut out = Vec::new();
    for (line, brk) in kept {
        out.extend(line);
        out.extend(brk);
    }

    (out, found)
}
