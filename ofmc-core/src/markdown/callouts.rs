//! Obsidian callouts: block quotes whose first line is `[!type] Title`.
//!
//! ```markdown
//! > [!warning] Careful
//! > Body text
//! ```
//!
//! The quote's open/close pair becomes a callout pair carrying the lowered
//! type and the title; the header line is removed from the body.

use super::tokens::{InlineBlock, InlineToken, Token};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

static CALLOUT_REGEX: OnceLock<Regex> = OnceLock::new();

fn callout_regex() -> &'static Regex {
    CALLOUT_REGEX.get_or_init(|| Regex::new(r"^\s*\[!([A-Za-z][\w-]*)\]([+-])?[ \t]*").unwrap())
}

#[derive(Debug, Default)]
pub struct CalloutTransformer;

struct Detected {
    kind: String,
    title: Vec<InlineToken>,
    body: InlineBlock,
    close: usize,
}

impl CalloutTransformer {
    pub fn new() -> Self {
        Self
    }

    pub fn transform(&self, tokens: Vec<Token>) -> Vec<Token> {
        let partners = match_quotes(&tokens);

        let mut detected: HashMap<usize, Detected> = HashMap::new();
        for (&open, &close) in &partners {
            if let Some((kind, title, body)) = detect(&tokens, open) {
                detected.insert(
                    open,
                    Detected {
                        kind,
                        title,
                        body,
                        close,
                    },
                );
            }
        }

        if detected.is_empty() {
            return tokens;
        }

        let closes: HashSet<usize> = detected.values().map(|d| d.close).collect();
        let mut skip_until = 0;
        let mut replacement: Option<(usize, InlineBlock)> = None;
        let mut out = Vec::with_capacity(tokens.len());

        for (i, token) in tokens.into_iter().enumerate() {
            if i < skip_until {
                continue;
            }

            if let Some(found) = detected.remove(&i) {
                out.push(Token::CalloutOpen {
                    kind: found.kind,
                    title: found.title,
                });
                if found.body.is_blank() {
                    // Header-only paragraph: drop open, inline and close
                    skip_until = i + 4;
                } else {
                    replacement = Some((i + 2, found.body));
                }
                continue;
            }

            if closes.contains(&i) {
                out.push(Token::CalloutClose);
                continue;
            }

            match replacement.take() {
                Some((at, body)) if at == i => out.push(Token::Inline(body)),
                other => {
                    replacement = other;
                    out.push(token);
                }
            }
        }

        out
    }
}

/// Pair every quote-open index with its matching close index
fn match_quotes(tokens: &[Token]) -> HashMap<usize, usize> {
    let mut stack = Vec::new();
    let mut partners = HashMap::new();

    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::BlockquoteOpen => stack.push(i),
            Token::BlockquoteClose => {
                if let Some(open) = stack.pop() {
                    partners.insert(open, i);
                }
            }
            _ => {}
        }
    }

    partners
}

/// Check the quote opened at `open` for a callout header
fn detect(tokens: &[Token], open: usize) -> Option<(String, Vec<InlineToken>, InlineBlock)> {
    if tokens.get(open + 1) != Some(&Token::ParagraphOpen) {
        return None;
    }
    let Some(Token::Inline(block)) = tokens.get(open + 2) else {
        return None;
    };
    let Some(InlineToken::Text(first)) = block.children.first() else {
        return None;
    };

    let caps = callout_regex().captures(first)?;
    let kind = caps.get(1)?.as_str().to_lowercase();
    let header_end = caps.get(0)?.end();

    let break_at = block
        .children
        .iter()
        .position(|c| matches!(c, InlineToken::SoftBreak | InlineToken::HardBreak));
    let line_end = break_at.unwrap_or(block.children.len());

    let mut title = Vec::new();
    let rest = &first[header_end..];
    if !rest.is_empty() {
        title.push(InlineToken::Text(rest.to_string()));
    }
    title.extend(block.children[1..line_end].iter().cloned());
    if let Some(InlineToken::Text(last)) = title.last_mut() {
        let trimmed = last.trim_end().len();
        last.truncate(trimmed);
    }
    title.retain(|c| !matches!(c, InlineToken::Text(t) if t.is_empty()));
    if title.is_empty() {
        title.push(InlineToken::Text(capitalize(&kind)));
    }

    let body_children = match break_at {
        Some(idx) => block.children[idx + 1..].to_vec(),
        None => Vec::new(),
    };
    let body = InlineBlock {
        content: block
            .content
            .split_once('\n')
            .map(|(_, rest)| rest.to_string())
            .unwrap_or_default(),
        children: body_children,
        block_id: block.block_id.clone(),
        anchor_label: block.anchor_label.clone(),
    };

    Some((kind, title, body))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::DialectParser;

    fn run(input: &str) -> Vec<Token> {
        CalloutTransformer::new().transform(DialectParser::new().tokenize(input))
    }

    #[test]
    fn test_callout_with_title_and_body() {
        let tokens = run("> [!Warning] Be careful\n> Body text\n");
        assert_eq!(
            tokens[0],
            Token::CalloutOpen {
                kind: "warning".into(),
                title: vec![InlineToken::Text("Be careful".into())],
            }
        );
        assert_eq!(tokens[1], Token::ParagraphOpen);
        let Token::Inline(body) = &tokens[2] else {
            panic!("expected body inline");
        };
        assert_eq!(body.children, vec![InlineToken::Text("Body text".into())]);
        assert_eq!(tokens.last(), Some(&Token::CalloutClose));
        assert!(!tokens.contains(&Token::BlockquoteOpen));
    }

    #[test]
    fn test_default_title_and_header_only_paragraph_dropped() {
        let tokens = run("> [!tip]\n>\n> Second paragraph\n");
        assert_eq!(
            tokens[0],
            Token::CalloutOpen {
                kind: "tip".into(),
                title: vec![InlineToken::Text("Tip".into())],
            }
        );
        assert_eq!(tokens[1], Token::ParagraphOpen);
        assert!(matches!(&tokens[2], Token::Inline(b) if b.content == "Second paragraph"));
    }

    #[test]
    fn test_fold_marker() {
        let tokens = run("> [!faq]- Folded\n> hidden\n");
        assert!(matches!(&tokens[0], Token::CalloutOpen { kind, title }
            if kind == "faq" && title == &vec![InlineToken::Text("Folded".into())]));
    }

    #[test]
    fn test_title_keeps_math() {
        let tokens = run("> [!note] Lemma $x$\n> body\n");
        let Token::CalloutOpen { title, .. } = &tokens[0] else {
            panic!("expected callout");
        };
        assert_eq!(
            title,
            &vec![InlineToken::Text("Lemma ".into()), InlineToken::Math("x".into())]
        );
    }

    #[test]
    fn test_header_trim_keeps_body_math() {
        let tokens = run("> [!note] My Title\n> Body $x^2$ remains.\n");
        let Token::CalloutOpen { title, .. } = &tokens[0] else {
            panic!("expected callout");
        };
        assert_eq!(title, &vec![InlineToken::Text("My Title".into())]);

        let Token::Inline(body) = &tokens[2] else {
            panic!("expected body inline");
        };
        assert_eq!(
            body.children,
            vec![
                InlineToken::Text("Body ".into()),
                InlineToken::Math("x^2".into()),
                InlineToken::Text(" remains.".into()),
            ]
        );
    }

    #[test]
    fn test_plain_quote_untouched() {
        let tokens = run("> just a quote\n");
        assert_eq!(tokens[0], Token::BlockquoteOpen);
        assert_eq!(tokens.last(), Some(&Token::BlockquoteClose));
    }

    #[test]
    fn test_nested_callouts_pair_correctly() {
        let tokens = run("> [!note] Outer\n> text\n>\n> > [!tip] Inner\n> > inner text\n>\n> after\n");
        let opens = tokens
            .iter()
            .filter(|t| matches!(t, Token::CalloutOpen { .. }))
            .count();
        let closes = tokens.iter().filter(|t| **t == Token::CalloutClose).count();
        assert_eq!(opens, 2);
        assert_eq!(closes, 2);
        assert_eq!(tokens.last(), Some(&Token::CalloutClose));
        let after = tokens
            .iter()
            .rposition(|t| matches!(t, Token::Inline(b) if b.content == "after"))
            .unwrap();
        let inner_close = tokens.iter().position(|t| *t == Token::CalloutClose).unwrap();
        assert!(inner_close < after);
    }
}
