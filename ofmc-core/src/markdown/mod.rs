//! Markdown parsing with Obsidian dialect extensions.
//!
//! CommonMark structure comes from pulldown-cmark; the dialect rules
//! (callouts, wikilinks and embeds, `==highlight==`, block anchors) run as
//! token-rewriting passes over the resulting stream.

pub mod block_anchors;
pub mod callouts;
pub mod mark;
pub mod tokens;
pub mod wikilinks;

use crate::locator::Locator;
use crate::registry::{atx_heading_text, LinkRegistry};
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use std::ops::Range;

pub use block_anchors::BlockAnchorTransformer;
pub use callouts::CalloutTransformer;
pub use mark::MarkTransformer;
pub use tokens::{ImageRef, InlineBlock, InlineToken, Token, Transclusion, WikiLink};
pub use wikilinks::{WikiTarget, WikilinkTransformer};

/// What the dialect rules need to know about the note being parsed
pub struct ParseContext<'a> {
    pub locator: &'a Locator,
    pub note_name: &'a str,
    /// Present only when compiling for a book
    pub registry: Option<&'a LinkRegistry>,
}

/// A heading found in a document outline
#[derive(Debug, Clone, PartialEq)]
pub struct HeadingInfo {
    pub level: u8,
    pub text: String,
    /// 0-based line of the heading
    pub line: usize,
}

/// Markdown parser with the Obsidian rule set
pub struct DialectParser {
    options: Options,
}

impl DialectParser {
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_MATH);

        Self { options }
    }

    /// Parse text into tokens with every dialect rule applied
    pub fn parse(&self, text: &str, ctx: &ParseContext<'_>) -> Vec<Token> {
        let tokens = self.tokenize(text);

        // Callouts first: they only look at the raw first line of a quote
        let tokens = CalloutTransformer::new().transform(tokens);

        let tokens = WikilinkTransformer::new(ctx.locator).transform(tokens);
        let tokens = MarkTransformer::new().transform(tokens);

        BlockAnchorTransformer::new(ctx.note_name, ctx.registry).transform(tokens)
    }

    /// Plain CommonMark structure without dialect rules
    pub fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut builder = TokenBuilder::new(text);
        for (event, range) in Parser::new_ext(text, self.options).into_offset_iter() {
            builder.handle(event, range);
        }
        builder.finish()
    }

    /// Headings of a document, in source order
    pub fn outline(&self, text: &str) -> Vec<HeadingInfo> {
        self.tokenize(text)
            .into_iter()
            .filter_map(|token| match token {
                Token::HeadingOpen { level, lines, raw } => Some(HeadingInfo {
                    level,
                    text: raw,
                    line: lines.start,
                }),
                _ => None,
            })
            .collect()
    }
}

impl Default for DialectParser {
    fn default() -> Self {
        Self::new()
    }
}

struct TokenBuilder<'s> {
    source: &'s str,
    line_starts: Vec<usize>,
    tokens: Vec<Token>,
    inline: Option<InlineBlock>,
    implicit_span: Option<Range<usize>>,
    code: Option<(Option<String>, String)>,
    html: Option<String>,
    image: Option<(String, String)>,
    in_table_head: bool,
    table_body_open: bool,
}

impl<'s> TokenBuilder<'s> {
    fn new(source: &'s str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        Self {
            source,
            line_starts,
            tokens: Vec::new(),
            inline: None,
            implicit_span: None,
            code: None,
            html: None,
            image: None,
            in_table_head: false,
            table_body_open: false,
        }
    }

    fn line_of(&self, offset: usize) -> usize {
        self.line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1)
    }

    fn slice(&self, range: &Range<usize>) -> &'s str {
        self.source.get(range.clone()).unwrap_or("")
    }

    fn handle(&mut self, event: Event<'_>, range: Range<usize>) {
        if let Some((_, code)) = self.code.as_mut() {
            match event {
                Event::Text(text) => code.push_str(&text),
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((lang, code)) = self.code.take() {
                        self.tokens.push(Token::CodeBlock { lang, code });
                    }
                }
                _ => {}
            }
            return;
        }

        if let Some(html) = self.html.as_mut() {
            match event {
                Event::Html(text) | Event::Text(text) => html.push_str(&text),
                Event::End(TagEnd::HtmlBlock) => {
                    if let Some(html) = self.html.take() {
                        self.tokens.push(Token::HtmlBlock(html));
                    }
                }
                _ => {}
            }
            return;
        }

        match event {
            Event::Start(tag) => self.start(tag, range),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if let Some((_, alt)) = self.image.as_mut() {
                    alt.push_str(&text);
                } else {
                    self.push_inline(InlineToken::Text(text.to_string()), &range);
                }
            }
            Event::Code(code) => self.push_inline(InlineToken::Code(code.to_string()), &range),
            Event::InlineMath(math) => {
                self.push_inline(InlineToken::Math(math.to_string()), &range)
            }
            Event::DisplayMath(math) => {
                self.push_inline(InlineToken::DisplayMath(math.to_string()), &range)
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                self.push_inline(InlineToken::Html(html.to_string()), &range)
            }
            Event::FootnoteReference(name) => {
                self.push_inline(InlineToken::Text(format!("[^{}]", name)), &range)
            }
            Event::SoftBreak => self.push_inline(InlineToken::SoftBreak, &range),
            Event::HardBreak => self.push_inline(InlineToken::HardBreak, &range),
            Event::TaskListMarker(checked) => {
                self.push_inline(InlineToken::TaskMarker { checked }, &range)
            }
            Event::Rule => {
                self.flush();
                self.tokens.push(Token::Rule);
            }
        }
    }

    fn start(&mut self, tag: Tag<'_>, range: Range<usize>) {
        match tag {
            Tag::Paragraph => {
                self.flush();
                self.tokens.push(Token::ParagraphOpen);
                self.inline = Some(InlineBlock {
                    content: self.slice(&range).trim_end().to_string(),
                    ..InlineBlock::default()
                });
            }
            Tag::Heading { level, .. } => {
                self.flush();
                let first_line = self.slice(&range).lines().next().unwrap_or("");
                let raw = atx_heading_text(first_line)
                    .unwrap_or_else(|| first_line.trim())
                    .to_string();
                let start = self.line_of(range.start);
                let end = self.line_of(range.end.saturating_sub(1).max(range.start)) + 1;
                self.tokens.push(Token::HeadingOpen {
                    level: level as u8,
                    lines: start..end,
                    raw: raw.clone(),
                });
                self.inline = Some(InlineBlock {
                    content: raw,
                    ..InlineBlock::default()
                });
            }
            Tag::BlockQuote(_) => {
                self.flush();
                self.tokens.push(Token::BlockquoteOpen);
            }
            Tag::CodeBlock(kind) => {
                self.flush();
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .map(|lang| lang.to_string()),
                    CodeBlockKind::Indented => None,
                };
                self.code = Some((lang, String::new()));
            }
            Tag::HtmlBlock => {
                self.flush();
                self.html = Some(String::new());
            }
            Tag::List(Some(start)) => {
                self.flush();
                self.tokens.push(Token::OrderedListOpen { start });
            }
            Tag::List(None) => {
                self.flush();
                self.tokens.push(Token::BulletListOpen);
            }
            Tag::Item => {
                self.flush();
                self.tokens.push(Token::ListItemOpen);
            }
            Tag::Table(alignments) => {
                self.flush();
                self.table_body_open = false;
                self.tokens.push(Token::TableOpen {
                    columns: alignments.len(),
                });
            }
            Tag::TableHead => {
                self.in_table_head = true;
                self.tokens.push(Token::TableHeadOpen);
                self.tokens.push(Token::RowOpen);
            }
            Tag::TableRow => {
                if !self.table_body_open {
                    self.table_body_open = true;
                    self.tokens.push(Token::TableBodyOpen);
                }
                self.tokens.push(Token::RowOpen);
            }
            Tag::TableCell => {
                self.flush();
                self.tokens.push(Token::CellOpen {
                    header: self.in_table_head,
                });
                self.inline = Some(InlineBlock::default());
            }
            Tag::Emphasis => self.push_inline(InlineToken::EmphasisOpen, &range),
            Tag::Strong => self.push_inline(InlineToken::StrongOpen, &range),
            Tag::Strikethrough => self.push_inline(InlineToken::StrikeOpen, &range),
            Tag::Link { dest_url, .. } => self.push_inline(
                InlineToken::LinkOpen {
                    href: dest_url.to_string(),
                },
                &range,
            ),
            Tag::Image { dest_url, .. } => {
                self.image = Some((dest_url.to_string(), String::new()));
            }
            _ => self.flush(),
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.flush();
                self.tokens.push(Token::ParagraphClose);
            }
            TagEnd::Heading(level) => {
                self.flush();
                self.tokens.push(Token::HeadingClose { level: level as u8 });
            }
            TagEnd::BlockQuote(_) => {
                self.flush();
                self.tokens.push(Token::BlockquoteClose);
            }
            TagEnd::List(ordered) => {
                self.flush();
                self.tokens.push(if ordered {
                    Token::OrderedListClose
                } else {
                    Token::BulletListClose
                });
            }
            TagEnd::Item => {
                self.flush();
                self.tokens.push(Token::ListItemClose);
            }
            TagEnd::Table => {
                self.flush();
                if self.table_body_open {
                    self.tokens.push(Token::TableBodyClose);
                }
                self.table_body_open = false;
                self.tokens.push(Token::TableClose);
            }
            TagEnd::TableHead => {
                self.flush();
                self.in_table_head = false;
                self.tokens.push(Token::RowClose);
                self.tokens.push(Token::TableHeadClose);
            }
            TagEnd::TableRow => {
                self.flush();
                self.tokens.push(Token::RowClose);
            }
            TagEnd::TableCell => {
                self.flush();
                self.tokens.push(Token::CellClose);
            }
            TagEnd::Emphasis => self.push_inline(InlineToken::EmphasisClose, &(0..0)),
            TagEnd::Strong => self.push_inline(InlineToken::StrongClose, &(0..0)),
            TagEnd::Strikethrough => self.push_inline(InlineToken::StrikeClose, &(0..0)),
            TagEnd::Link => self.push_inline(InlineToken::LinkClose, &(0..0)),
            TagEnd::Image => {
                if let Some((src, caption)) = self.image.take() {
                    self.push_inline(
                        InlineToken::Image(ImageRef {
                            src,
                            caption,
                            size_hint: None,
                        }),
                        &(0..0),
                    );
                }
            }
            _ => self.flush(),
        }
    }

    /// Add inline content, opening an implicit block for tight list items
    fn push_inline(&mut self, token: InlineToken, range: &Range<usize>) {
        match self.inline.as_mut() {
            Some(block) => block.push(token),
            None => {
                let mut block = InlineBlock::default();
                block.push(token);
                self.inline = Some(block);
                self.implicit_span = Some(range.clone());
                return;
            }
        }

        if let Some(span) = self.implicit_span.as_mut() {
            if range.end > span.end {
                span.end = range.end;
            }
        }
    }

    fn flush(&mut self) {
        if let Some(mut block) = self.inline.take() {
            if let Some(span) = self.implicit_span.take() {
                block.content = self.slice(&span).trim_end().to_string();
            }
            self.tokens.push(Token::Inline(block));
        }
    }

    fn finish(mut self) -> Vec<Token> {
        self.flush();
        self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(tokens: &[Token]) -> Vec<String> {
        tokens
            .iter()
            .filter_map(|t| match t {
                Token::Inline(block) => Some(
                    block
                        .children
                        .iter()
                        .filter_map(|c| match c {
                            InlineToken::Text(s) => Some(s.as_str()),
                            _ => None,
                        })
                        .collect::<String>(),
                ),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_paragraph_structure() {
        let tokens = DialectParser::new().tokenize("Hello *world*\n");
        assert_eq!(tokens.first(), Some(&Token::ParagraphOpen));
        assert_eq!(tokens.last(), Some(&Token::ParagraphClose));
        let Token::Inline(block) = &tokens[1] else {
            panic!("expected inline");
        };
        assert_eq!(block.content, "Hello *world*");
        assert_eq!(
            block.children,
            vec![
                InlineToken::Text("Hello ".into()),
                InlineToken::EmphasisOpen,
                InlineToken::Text("world".into()),
                InlineToken::EmphasisClose,
            ]
        );
    }

    #[test]
    fn test_wikilink_text_is_merged() {
        let tokens = DialectParser::new().tokenize("See [[Other Note|here]] now\n");
        assert_eq!(texts(&tokens), vec!["See [[Other Note|here]] now"]);
    }

    #[test]
    fn test_heading_lines_and_raw_text() {
        let tokens = DialectParser::new().tokenize("intro\n\n## Section *Two*\n\nbody\n");
        let heading = tokens
            .iter()
            .find_map(|t| match t {
                Token::HeadingOpen { level, lines, raw } => Some((*level, lines.clone(), raw.clone())),
                _ => None,
            })
            .unwrap();
        assert_eq!(heading, (2, 2..3, "Section *Two*".to_string()));
    }

    #[test]
    fn test_outline() {
        let outline = DialectParser::new().outline("# A\n\ntext\n\n## B\n\n# C\n");
        let summary: Vec<_> = outline.iter().map(|h| (h.level, h.text.as_str(), h.line)).collect();
        assert_eq!(summary, vec![(1, "A", 0), (2, "B", 4), (1, "C", 6)]);
    }

    #[test]
    fn test_math_events() {
        let tokens = DialectParser::new().tokenize("Inline $a_b$ here\n\n$$\nx^2\n$$\n");
        let math: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Inline(b) => Some(b.children.clone()),
                _ => None,
            })
            .flatten()
            .filter(|c| matches!(c, InlineToken::Math(_) | InlineToken::DisplayMath(_)))
            .collect();
        assert_eq!(math[0], InlineToken::Math("a_b".into()));
        assert!(matches!(&math[1], InlineToken::DisplayMath(m) if m.contains("x^2")));
    }

    #[test]
    fn test_tight_list_gets_inline_block() {
        let tokens = DialectParser::new().tokenize("- one\n- two\n");
        assert_eq!(tokens[0], Token::BulletListOpen);
        assert_eq!(tokens[1], Token::ListItemOpen);
        assert!(matches!(&tokens[2], Token::Inline(b) if b.content == "one"));
        assert_eq!(tokens[3], Token::ListItemClose);
        assert_eq!(texts(&tokens), vec!["one", "two"]);
    }

    #[test]
    fn test_table_structure() {
        let tokens = DialectParser::new().tokenize("| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert_eq!(tokens[0], Token::TableOpen { columns: 2 });
        assert_eq!(tokens[1], Token::TableHeadOpen);
        assert_eq!(tokens[2], Token::RowOpen);
        assert_eq!(tokens[3], Token::CellOpen { header: true });
        assert!(tokens.contains(&Token::TableBodyOpen));
        assert!(tokens.contains(&Token::CellOpen { header: false }));
        assert_eq!(tokens.last(), Some(&Token::TableClose));
        assert_eq!(texts(&tokens), vec!["a", "b", "1", "2"]);
    }

    #[test]
    fn test_code_block() {
        let tokens = DialectParser::new().tokenize("```rust\nlet x = [[a]];\n```\n");
        assert_eq!(
            tokens,
            vec![Token::CodeBlock {
                lang: Some("rust".into()),
                code: "let x = [[a]];\n".into(),
            }]
        );
    }

    #[test]
    fn test_markdown_image() {
        let tokens = DialectParser::new().tokenize("![A cat](img/cat%20one.png)\n");
        let Token::Inline(block) = &tokens[1] else {
            panic!("expected inline");
        };
        assert_eq!(
            block.children,
            vec![InlineToken::Image(ImageRef {
                src: "img/cat%20one.png".into(),
                caption: "A cat".into(),
                size_hint: None,
            })]
        );
    }
}
