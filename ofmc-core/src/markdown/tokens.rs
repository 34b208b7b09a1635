//! Token stream produced by the dialect parser and consumed by the renderer.

use std::ops::Range;
use std::path::PathBuf;

/// Block-level token
///
/// Container tokens come in open/close pairs. Inline content always sits in
/// an [`Token::Inline`] between them.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    HeadingOpen {
        level: u8,
        /// Source lines (0-based, end exclusive)
        lines: Range<usize>,
        /// Heading text as written in the source
        raw: String,
    },
    HeadingClose {
        level: u8,
    },
    ParagraphOpen,
    ParagraphClose,
    Inline(InlineBlock),
    BulletListOpen,
    BulletListClose,
    OrderedListOpen {
        start: u64,
    },
    OrderedListClose,
    ListItemOpen,
    ListItemClose,
    TableOpen {
        columns: usize,
    },
    TableClose,
    TableHeadOpen,
    TableHeadClose,
    TableBodyOpen,
    TableBodyClose,
    RowOpen,
    RowClose,
    CellOpen {
        header: bool,
    },
    CellClose,
    BlockquoteOpen,
    BlockquoteClose,
    CalloutOpen {
        kind: String,
        title: Vec<InlineToken>,
    },
    CalloutClose,
    CodeBlock {
        lang: Option<String>,
        code: String,
    },
    HtmlBlock(String),
    Rule,
}

/// A run of inline content with its attached metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InlineBlock {
    /// Raw source text of the enclosing block
    pub content: String,
    pub children: Vec<InlineToken>,
    /// Block anchor id stripped from this block (`^abc123`)
    pub block_id: Option<String>,
    /// LaTeX label emitted after the block when the anchor is a known target
    pub anchor_label: Option<String>,
}

impl InlineBlock {
    /// Append a child, merging adjacent text
    pub fn push(&mut self, token: InlineToken) {
        push_merged(&mut self.children, token);
    }

    pub fn is_blank(&self) -> bool {
        self.children.iter().all(|child| match child {
            InlineToken::Text(text) => text.trim().is_empty(),
            InlineToken::SoftBreak | InlineToken::HardBreak => true,
            _ => false,
        })
    }
}

/// Push onto an inline list, merging consecutive text tokens
pub fn push_merged(children: &mut Vec<InlineToken>, token: InlineToken) {
    if let InlineToken::Text(text) = &token {
        if text.is_empty() {
            return;
        }
        if let Some(InlineToken::Text(last)) = children.last_mut() {
            last.push_str(text);
            return;
        }
    }
    children.push(token);
}

/// Inline token
#[derive(Debug, Clone, PartialEq)]
pub enum InlineToken {
    Text(String),
    Code(String),
    Math(String),
    DisplayMath(String),
    SoftBreak,
    HardBreak,
    StrongOpen,
    StrongClose,
    EmphasisOpen,
    EmphasisClose,
    StrikeOpen,
    StrikeClose,
    MarkOpen,
    MarkClose,
    LinkOpen { href: String },
    LinkClose,
    TaskMarker { checked: bool },
    Image(ImageRef),
    WikiLink(WikiLink),
    Transclusion(Transclusion),
    Html(String),
}

impl InlineToken {
    /// Nesting change caused by this token
    pub fn nesting(&self) -> i32 {
        match self {
            InlineToken::StrongOpen
            | InlineToken::EmphasisOpen
            | InlineToken::StrikeOpen
            | InlineToken::MarkOpen
            | InlineToken::LinkOpen { .. } => 1,
            InlineToken::StrongClose
            | InlineToken::EmphasisClose
            | InlineToken::StrikeClose
            | InlineToken::MarkClose
            | InlineToken::LinkClose => -1,
            _ => 0,
        }
    }
}

/// An image reference, either `![alt](src)` or an embedded image wikilink
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRef {
    pub src: String,
    pub caption: String,
    /// Alias from `![[img.png|300]]`, interpreted as a width hint
    pub size_hint: Option<String>,
}

/// A `[[target|alias]]` link
#[derive(Debug, Clone, PartialEq)]
pub struct WikiLink {
    /// Everything between the brackets, alias included
    pub target: String,
    pub display: String,
}

/// A resolved `![[note#section]]` embed
#[derive(Debug, Clone, PartialEq)]
pub struct Transclusion {
    pub path: PathBuf,
    /// `#heading`, `^id` or `#^id`
    pub sub_target: Option<String>,
    pub original: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_merges_text() {
        let mut block = InlineBlock::default();
        block.push(InlineToken::Text("a".into()));
        block.push(InlineToken::Text("b".into()));
        block.push(InlineToken::SoftBreak);
        block.push(InlineToken::Text("".into()));
        block.push(InlineToken::Text("c".into()));
        assert_eq!(
            block.children,
            vec![
                InlineToken::Text("ab".into()),
                InlineToken::SoftBreak,
                InlineToken::Text("c".into()),
            ]
        );
    }

    #[test]
    fn test_is_blank() {
        let mut block = InlineBlock::default();
        assert!(block.is_blank());
        block.push(InlineToken::Text("  ".into()));
        block.push(InlineToken::SoftBreak);
        assert!(block.is_blank());
        block.push(InlineToken::Math("x".into()));
        assert!(!block.is_blank());
    }
}
