//! `==highlight==` spans.
//!
//! Delimiters pair only with another delimiter at the same nesting level,
//! so `==a **b== c**` is left alone. Unpaired delimiters stay literal.

use super::tokens::{push_merged, InlineToken, Token};

#[derive(Debug, Default)]
pub struct MarkTransformer;

enum Piece {
    Token(InlineToken),
    Delimiter,
}

impl MarkTransformer {
    pub fn new() -> Self {
        Self
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
        if !children
            .iter()
            .any(|c| matches!(c, InlineToken::Text(t) if t.contains("==")))
        {
            return children;
        }

        let pieces = split_delimiters(children);
        let roles = pair_delimiters(&pieces);

        let mut out = Vec::with_capacity(pieces.len());
        for (piece, role) in pieces.into_iter().zip(roles) {
            match (piece, role) {
                (Piece::Token(token), _) => push_merged(&mut out, token),
                (Piece::Delimiter, Role::Open) => out.push(InlineToken::MarkOpen),
                (Piece::Delimiter, Role::Close) => out.push(InlineToken::MarkClose),
                (Piece::Delimiter, Role::Literal) => {
                    push_merged(&mut out, InlineToken::Text("==".to_string()))
                }
            }
        }
        out
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Role {
    Open,
    Close,
    Literal,
}

fn split_delimiters(children: Vec<InlineToken>) -> Vec<Piece> {
    let mut pieces = Vec::new();
    for child in children {
        match child {
            InlineToken::Text(text) if text.contains("==") => {
                let mut parts = text.split("==").peekable();
                while let Some(part) = parts.next() {
                    if !part.is_empty() {
                        pieces.push(Piece::Token(InlineToken::Text(part.to_string())));
                    }
                    if parts.peek().is_some() {
                        pieces.push(Piece::Delimiter);
                    }
                }
            }
            other => pieces.push(Piece::Token(other)),
        }
    }
    pieces
}

fn pair_delimiters(pieces: &[Piece]) -> Vec<Role> {
    let mut roles = vec![Role::Literal; pieces.len()];
    // Index of the unmatched opener at each nesting depth
    let mut pending: Vec<Option<usize>> = vec![None];
    let mut depth = 0usize;

    for (i, piece) in pieces.iter().enumerate() {
        match piece {
            Piece::Token(token) => match token.nesting() {
                1 => {
                    depth += 1;
                    if pending.len() <= depth {
                        pending.push(None);
                    }
                    pending[depth] = None;
                }
                -1 => {
                    pending[depth] = None;
                    depth = depth.saturating_sub(1);
                }
                _ => {}
            },
            Piece::Delimiter => match pending[depth].take() {
                // An empty span (`====`) is not a highlight
                Some(open) if open + 1 == i => pending[depth] = Some(i),
                Some(open) => {
                    roles[open] = Role::Open;
                    roles[i] = Role::Close;
                }
                None => pending[depth] = Some(i),
            },
        }
    }

    roles
}
